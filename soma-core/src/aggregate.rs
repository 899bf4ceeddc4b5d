//! Incremental whole-body aggregation of part stats and channel resources.
//!
//! The tracker keeps, per stat, an `(aggregate, contributing_count)` pair
//! maintained on every part add and removal, so whole-body reads never
//! rescan the graph. Removal is the subtle half: `Sum` and `Mean` invert
//! arithmetically, but `Min`/`Max` cannot be decremented from the pair
//! alone — for those the tracker rescans the remaining parts' values.
//!
//! Consistency contract for the invertible combinators:
//! `remove(combine(agg, v), v) == agg`.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::part::ComponentPart;
use crate::types::{ResourceId, StatId};

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

/// How per-part values of a stat fold into the body-wide aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combine {
    /// Aggregate is the sum of part values.
    Sum,
    /// Aggregate is the arithmetic mean of part values.
    Mean,
    /// Aggregate is the minimum part value.
    Min,
    /// Aggregate is the maximum part value.
    Max,
}

impl Combine {
    /// Whether removal can be computed from `(aggregate, count)` alone.
    #[must_use]
    pub fn is_invertible(self) -> bool {
        matches!(self, Self::Sum | Self::Mean)
    }

    fn combine(self, aggregate: f32, value: f32, count: u32) -> f32 {
        match self {
            Self::Sum => aggregate + value,
            Self::Mean => {
                let count = count as f32;
                (aggregate * count + value) / (count + 1.0)
            }
            Self::Min => aggregate.min(value),
            Self::Max => aggregate.max(value),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StatAccum {
    value: f32,
    count: u32,
    combine: Combine,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Incremental aggregate state for one soma.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateTracker {
    combinators: BTreeMap<StatId, Combine>,
    stats: BTreeMap<StatId, StatAccum>,
    resources: BTreeMap<ResourceId, f64>,
}

impl AggregateTracker {
    /// Create an empty tracker. Stats fold with [`Combine::Sum`] unless
    /// registered otherwise before parts are folded in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the combinator for a stat. Must happen before any part
    /// carrying that stat is folded in; later registration does not
    /// re-fold existing contributions.
    pub fn register_stat(&mut self, stat: StatId, combine: Combine) {
        self.combinators.insert(stat, combine);
    }

    /// A contribution-free tracker inheriting this tracker's combinator
    /// registry. Split-off children start from one of these.
    #[must_use]
    pub fn fresh_with_registry(&self) -> Self {
        Self {
            combinators: self.combinators.clone(),
            stats: BTreeMap::new(),
            resources: BTreeMap::new(),
        }
    }

    /// The combinator a stat folds with.
    #[must_use]
    pub fn combinator_for(&self, stat: &StatId) -> Combine {
        self.combinators.get(stat).copied().unwrap_or(Combine::Sum)
    }

    /// Fold a part's stats and resources into the aggregates.
    pub fn fold_part(&mut self, part: &ComponentPart) {
        for (stat, &value) in &part.stats {
            let combine = self.combinator_for(stat);
            let accum = self.stats.entry(stat.clone()).or_insert(StatAccum {
                value,
                count: 0,
                combine,
            });
            if accum.count > 0 {
                accum.value = accum.combine.combine(accum.value, value, accum.count);
            } else {
                accum.value = value;
            }
            accum.count += 1;
        }
        for (resource, &amount) in &part.resources {
            *self.resources.entry(resource.clone()).or_insert(0.0) += amount;
        }
    }

    /// Remove a part's contributions.
    ///
    /// `remaining` is the body's part set *after* the removal; it is only
    /// consulted for non-invertible combinators (`Min`/`Max`), which must
    /// rescan to find the new extremum.
    pub fn remove_part(&mut self, part: &ComponentPart, remaining: &[&ComponentPart]) {
        for (stat, &value) in &part.stats {
            let Some(accum) = self.stats.get_mut(stat) else {
                continue;
            };
            if accum.count <= 1 {
                self.stats.remove(stat);
                continue;
            }
            let count = accum.count as f32;
            match accum.combine {
                Combine::Sum => accum.value -= value,
                Combine::Mean => accum.value = (accum.value * count - value) / (count - 1.0),
                Combine::Min => {
                    if let Some(min) = Self::rescan_extremum(stat, remaining, true) {
                        accum.value = min;
                    }
                }
                Combine::Max => {
                    if let Some(max) = Self::rescan_extremum(stat, remaining, false) {
                        accum.value = max;
                    }
                }
            }
            accum.count -= 1;
        }
        for (resource, &amount) in &part.resources {
            if let Some(total) = self.resources.get_mut(resource) {
                *total -= amount;
            }
        }
    }

    fn rescan_extremum(stat: &StatId, parts: &[&ComponentPart], min: bool) -> Option<f32> {
        let values = parts.iter().filter_map(|p| p.stat(stat)).map(OrderedFloat);
        let extremum = if min { values.min() } else { values.max() };
        extremum.map(OrderedFloat::into_inner)
    }

    /// Rebuild one stat's aggregate from scratch over the given parts.
    ///
    /// Used after an in-place stat edit on a live part, where neither the
    /// old contribution nor the incremental path applies cleanly.
    pub fn refresh_stat(&mut self, stat: &StatId, parts: &[&ComponentPart]) {
        let combine = self.combinator_for(stat);
        self.stats.remove(stat);
        let mut accum: Option<StatAccum> = None;
        for part in parts {
            let Some(value) = part.stat(stat) else {
                continue;
            };
            match &mut accum {
                None => {
                    accum = Some(StatAccum {
                        value,
                        count: 1,
                        combine,
                    });
                }
                Some(a) => {
                    a.value = combine.combine(a.value, value, a.count);
                    a.count += 1;
                }
            }
        }
        if let Some(a) = accum {
            self.stats.insert(stat.clone(), a);
        }
    }

    /// Read a stat's whole-body aggregate.
    ///
    /// With no contributing parts the default is computed against the
    /// body's center part: the center's own value, else 0.0.
    #[must_use]
    pub fn stat(&self, stat: &StatId, center: &ComponentPart) -> f32 {
        match self.stats.get(stat) {
            Some(accum) => accum.value,
            None => center.stat(stat).unwrap_or(0.0),
        }
    }

    /// How many parts contribute to a stat.
    #[must_use]
    pub fn stat_count(&self, stat: &StatId) -> u32 {
        self.stats.get(stat).map_or(0, |a| a.count)
    }

    /// Read a resource's whole-body amount (0.0 if untracked).
    #[must_use]
    pub fn resource(&self, resource: &ResourceId) -> f64 {
        self.resources.get(resource).copied().unwrap_or(0.0)
    }

    /// Add to a resource's whole-body amount (used when a live part gains
    /// or loses resource in place).
    pub fn adjust_resource(&mut self, resource: &ResourceId, delta: f64) {
        *self.resources.entry(resource.clone()).or_insert(0.0) += delta;
    }

    /// The stats currently carrying contributions.
    pub fn tracked_stats(&self) -> impl Iterator<Item = &StatId> {
        self.stats.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::{Material, Shape};

    fn part_with_stat(stat: &StatId, value: f32) -> ComponentPart {
        ComponentPart::new("segment", Material::new("flesh"), Shape::new("blob"), 0.1)
            .with_stat(stat.clone(), value)
    }

    #[test]
    fn sum_add_remove_round_trips() {
        let stat = StatId::new("strength");
        let mut tracker = AggregateTracker::new();
        let a = part_with_stat(&stat, 3.0);
        let b = part_with_stat(&stat, 4.0);

        tracker.fold_part(&a);
        tracker.fold_part(&b);
        assert_eq!(tracker.stat(&stat, &a), 7.0);
        assert_eq!(tracker.stat_count(&stat), 2);

        tracker.remove_part(&b, &[&a]);
        assert_eq!(tracker.stat(&stat, &a), 3.0);
        assert_eq!(tracker.stat_count(&stat), 1);
    }

    #[test]
    fn mean_removal_inverts() {
        let stat = StatId::new("warmth");
        let mut tracker = AggregateTracker::new();
        tracker.register_stat(stat.clone(), Combine::Mean);
        let parts: Vec<ComponentPart> = [2.0, 4.0, 6.0]
            .iter()
            .map(|&v| part_with_stat(&stat, v))
            .collect();
        for p in &parts {
            tracker.fold_part(p);
        }
        assert!((tracker.stat(&stat, &parts[0]) - 4.0).abs() < 1e-5);

        let remaining: Vec<&ComponentPart> = vec![&parts[0], &parts[1]];
        tracker.remove_part(&parts[2], &remaining);
        assert!((tracker.stat(&stat, &parts[0]) - 3.0).abs() < 1e-5);
    }

    #[test]
    fn min_removal_rescans() {
        let stat = StatId::new("armor");
        let mut tracker = AggregateTracker::new();
        tracker.register_stat(stat.clone(), Combine::Min);
        let low = part_with_stat(&stat, 1.0);
        let mid = part_with_stat(&stat, 5.0);
        let high = part_with_stat(&stat, 9.0);
        for p in [&low, &mid, &high] {
            tracker.fold_part(p);
        }
        assert_eq!(tracker.stat(&stat, &low), 1.0);

        // Removing the current minimum forces the rescan path.
        tracker.remove_part(&low, &[&mid, &high]);
        assert_eq!(tracker.stat(&stat, &mid), 5.0);
        assert_eq!(tracker.stat_count(&stat), 2);
    }

    #[test]
    fn empty_stat_defaults_to_center_value() {
        let stat = StatId::new("sight");
        let tracker = AggregateTracker::new();
        let center = part_with_stat(&stat, 2.5);
        assert_eq!(tracker.stat(&stat, &center), 2.5);

        let other = StatId::new("echolocation");
        assert_eq!(tracker.stat(&other, &center), 0.0);
    }

    #[test]
    fn resources_add_and_subtract() {
        let blood = ResourceId::new("blood");
        let mut tracker = AggregateTracker::new();
        let torso = ComponentPart::new("torso", Material::new("flesh"), Shape::new("trunk"), 0.5)
            .with_resource(blood.clone(), 4.0);
        let arm = ComponentPart::new("arm", Material::new("flesh"), Shape::new("limb"), 0.2)
            .with_resource(blood.clone(), 1.0);

        tracker.fold_part(&torso);
        tracker.fold_part(&arm);
        assert!((tracker.resource(&blood) - 5.0).abs() < 1e-9);

        tracker.remove_part(&arm, &[&torso]);
        assert!((tracker.resource(&blood) - 4.0).abs() < 1e-9);

        tracker.adjust_resource(&blood, -0.5);
        assert!((tracker.resource(&blood) - 3.5).abs() < 1e-9);
    }

    #[test]
    fn refresh_stat_rebuilds_after_in_place_edit() {
        let stat = StatId::new("strength");
        let mut tracker = AggregateTracker::new();
        let mut a = part_with_stat(&stat, 3.0);
        let b = part_with_stat(&stat, 4.0);
        tracker.fold_part(&a);
        tracker.fold_part(&b);

        a.stats.insert(stat.clone(), 10.0);
        tracker.refresh_stat(&stat, &[&a, &b]);
        assert_eq!(tracker.stat(&stat, &a), 14.0);
        assert_eq!(tracker.stat_count(&stat), 2);
    }
}
