//! Runtime counters and instrumentation for the soma engine.
//!
//! Structural operations are hot-path work inside a simulation tick, so
//! the counters are lock-free `AtomicU64`s incremented in place and read
//! by dashboard exports. The tick-budget monitor keeps a small timing
//! history behind a `parking_lot::Mutex` for the rare percentile read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters for structural-operation events.
#[derive(Debug, Default)]
pub struct SomaCounters {
    /// Parts attached to any soma since startup.
    pub parts_attached: AtomicU64,
    /// Parts removed from any soma (severed away or destroyed).
    pub parts_lost: AtomicU64,
    /// Explicit severance operations performed.
    pub severances: AtomicU64,
    /// Child somas produced by splits.
    pub splits_produced: AtomicU64,
    /// Destruction cascades run.
    pub cascades_run: AtomicU64,
    /// Synthetic hole centers installed.
    pub holes_synthesized: AtomicU64,
    /// Spirits moved to a different part by a retether pass.
    pub spirits_retethered: AtomicU64,
    /// Spirits ejected to the world.
    pub spirits_ejected: AtomicU64,
}

impl SomaCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            parts_attached: AtomicU64::new(0),
            parts_lost: AtomicU64::new(0),
            severances: AtomicU64::new(0),
            splits_produced: AtomicU64::new(0),
            cascades_run: AtomicU64::new(0),
            holes_synthesized: AtomicU64::new(0),
            spirits_retethered: AtomicU64::new(0),
            spirits_ejected: AtomicU64::new(0),
        }
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            parts_attached: self.parts_attached.load(Ordering::Relaxed),
            parts_lost: self.parts_lost.load(Ordering::Relaxed),
            severances: self.severances.load(Ordering::Relaxed),
            splits_produced: self.splits_produced.load(Ordering::Relaxed),
            cascades_run: self.cascades_run.load(Ordering::Relaxed),
            holes_synthesized: self.holes_synthesized.load(Ordering::Relaxed),
            spirits_retethered: self.spirits_retethered.load(Ordering::Relaxed),
            spirits_ejected: self.spirits_ejected.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct CounterSnapshot {
    /// Parts attached.
    pub parts_attached: u64,
    /// Parts removed.
    pub parts_lost: u64,
    /// Severance operations.
    pub severances: u64,
    /// Child somas produced.
    pub splits_produced: u64,
    /// Destruction cascades.
    pub cascades_run: u64,
    /// Synthetic hole centers.
    pub holes_synthesized: u64,
    /// Spirits retethered.
    pub spirits_retethered: u64,
    /// Spirits ejected.
    pub spirits_ejected: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows = [
            ("soma_parts_attached_total", "Parts attached", self.parts_attached),
            ("soma_parts_lost_total", "Parts removed", self.parts_lost),
            ("soma_severances_total", "Severance operations", self.severances),
            ("soma_splits_produced_total", "Child somas produced by splits", self.splits_produced),
            ("soma_cascades_run_total", "Destruction cascades run", self.cascades_run),
            ("soma_holes_synthesized_total", "Synthetic hole centers installed", self.holes_synthesized),
            ("soma_spirits_retethered_total", "Spirits retethered", self.spirits_retethered),
            ("soma_spirits_ejected_total", "Spirits ejected", self.spirits_ejected),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tick budget monitor
// ---------------------------------------------------------------------------

/// Tracks time spent in structural operations against a per-tick budget.
pub struct TickBudgetMonitor {
    budget_us: u64,
    history: Mutex<TimingRing>,
}

struct TimingRing {
    timings_us: [u64; 64],
    write_idx: usize,
    count: u64,
}

impl TickBudgetMonitor {
    /// Create a monitor with the given per-tick budget (microseconds).
    #[must_use]
    pub fn new(budget_us: u64) -> Self {
        Self {
            budget_us,
            history: Mutex::new(TimingRing {
                timings_us: [0; 64],
                write_idx: 0,
                count: 0,
            }),
        }
    }

    /// Begin timing an operation. Elapsed time is recorded on drop.
    pub fn begin(&self) -> TickGuard<'_> {
        TickGuard {
            monitor: self,
            start: Instant::now(),
        }
    }

    /// Record a timing manually (microseconds).
    pub fn record(&self, us: u64) {
        let mut ring = self.history.lock();
        let idx = ring.write_idx;
        ring.timings_us[idx] = us;
        ring.write_idx = (idx + 1) % ring.timings_us.len();
        ring.count += 1;
    }

    /// Whether the most recent recorded timing exceeded the budget.
    #[must_use]
    pub fn last_over_budget(&self) -> bool {
        let ring = self.history.lock();
        if ring.count == 0 {
            return false;
        }
        let idx = (ring.write_idx + ring.timings_us.len() - 1) % ring.timings_us.len();
        ring.timings_us[idx] > self.budget_us
    }

    /// Median and worst recorded timings (microseconds) over the history
    /// window, plus the fraction of recorded operations over budget.
    #[must_use]
    pub fn summary(&self) -> TimingSummary {
        let ring = self.history.lock();
        let n = (ring.count as usize).min(ring.timings_us.len());
        if n == 0 {
            return TimingSummary {
                median_us: 0,
                worst_us: 0,
                over_budget_ratio: 0.0,
            };
        }
        let mut sorted: Vec<u64> = ring.timings_us[..n].to_vec();
        sorted.sort_unstable();
        let over = sorted.iter().filter(|&&t| t > self.budget_us).count();
        TimingSummary {
            median_us: sorted[n / 2],
            worst_us: sorted[n - 1],
            over_budget_ratio: over as f64 / n as f64,
        }
    }

    /// The configured budget in microseconds.
    #[must_use]
    pub fn budget_us(&self) -> u64 {
        self.budget_us
    }
}

/// RAII guard that records elapsed time when dropped.
pub struct TickGuard<'a> {
    monitor: &'a TickBudgetMonitor,
    start: Instant,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        let us = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.monitor.record(us);
    }
}

/// Timing summary over the monitor's history window.
#[derive(Debug, Clone, Copy)]
pub struct TimingSummary {
    /// Median recorded timing (microseconds).
    pub median_us: u64,
    /// Worst recorded timing (microseconds).
    pub worst_us: u64,
    /// Fraction of recorded operations over budget (0.0–1.0).
    pub over_budget_ratio: f64,
}

// ---------------------------------------------------------------------------
// Tracing span names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!` for profiler integration.
pub mod spans {
    /// Attach operation.
    pub const ATTACH: &str = "soma::attach";
    /// Explicit severance.
    pub const SEVER: &str = "soma::sever";
    /// Destruction cascade.
    pub const CASCADE: &str = "soma::cascade";
    /// Spirit retether pass.
    pub const RETETHER: &str = "soma::retether";
    /// Form-condition evaluation.
    pub const CONDITION: &str = "soma::condition";
    /// Per-tick effect and channel-hub pass.
    pub const TICK: &str = "soma::tick";
}
