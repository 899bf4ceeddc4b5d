//! Blueprint-driven body construction.
//!
//! A [`BodyBlueprint`] is the declarative path for generating a soma:
//! labeled part specs with size weights, a connection list, a coverage
//! list, and a center designation. `build` validates the whole description
//! up front — unknown labels, a missing center, or a disconnected graph
//! are [`SomaError::Blueprint`] errors before any body exists — then
//! normalizes the weights into relative sizes summing to 1.0.

use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregate::{AggregateTracker, Combine};
use crate::config::SomaConfig;
use crate::coverage::CoverageGraph;
use crate::error::{Result, SomaError};
use crate::graph::PartGraph;
use crate::metrics::SomaCounters;
use crate::part::ComponentPart;
use crate::soma::Soma;
use crate::types::{ConnectionKind, PartId, Side, StatId};

/// Declarative description of one body.
#[derive(Debug)]
pub struct BodyBlueprint {
    size: f32,
    mass: f32,
    parts: Vec<(String, ComponentPart)>,
    connections: Vec<(String, String, ConnectionKind)>,
    covers: Vec<(String, String, Side)>,
    center: Option<String>,
    stats: Vec<(StatId, Combine)>,
}

impl BodyBlueprint {
    /// Start a blueprint for a body of the given absolute size and mass.
    #[must_use]
    pub fn new(size: f32, mass: f32) -> Self {
        Self {
            size,
            mass,
            parts: Vec::new(),
            connections: Vec::new(),
            covers: Vec::new(),
            center: None,
            stats: Vec::new(),
        }
    }

    /// Add a labeled part. The part's `relative_size` is its weight;
    /// weights are normalized into fractions at build time.
    #[must_use]
    pub fn part(mut self, label: impl Into<String>, part: ComponentPart) -> Self {
        self.parts.push((label.into(), part));
        self
    }

    /// Designate the center part by label.
    #[must_use]
    pub fn center(mut self, label: impl Into<String>) -> Self {
        self.center = Some(label.into());
        self
    }

    /// Connect two labeled parts.
    #[must_use]
    pub fn connect(
        mut self,
        a: impl Into<String>,
        b: impl Into<String>,
        kind: ConnectionKind,
    ) -> Self {
        self.connections.push((a.into(), b.into(), kind));
        self
    }

    /// Record that one labeled part covers a side of another.
    #[must_use]
    pub fn cover(
        mut self,
        covering: impl Into<String>,
        covered: impl Into<String>,
        side: Side,
    ) -> Self {
        self.covers.push((covering.into(), covered.into(), side));
        self
    }

    /// Register the combinator a stat folds with on the built body.
    #[must_use]
    pub fn stat(mut self, stat: StatId, combine: Combine) -> Self {
        self.stats.push((stat, combine));
        self
    }

    /// Build the body with the default configuration.
    ///
    /// # Errors
    /// [`SomaError::Blueprint`] for any validation failure.
    pub fn build(self) -> Result<Soma> {
        self.build_with(SomaConfig::default())
    }

    /// Build the body with an explicit configuration.
    ///
    /// # Errors
    /// [`SomaError::Blueprint`] for any validation failure.
    pub fn build_with(self, config: SomaConfig) -> Result<Soma> {
        if self.parts.is_empty() {
            return Err(SomaError::Blueprint("no parts".to_string()));
        }
        if self.parts.len() > config.blueprint.max_parts {
            return Err(SomaError::Blueprint(format!(
                "{} parts exceeds the cap of {}",
                self.parts.len(),
                config.blueprint.max_parts
            )));
        }

        let mut ids: HashMap<String, PartId> = HashMap::with_capacity(self.parts.len());
        for (label, part) in &self.parts {
            if ids.insert(label.clone(), part.id).is_some() {
                return Err(SomaError::Blueprint(format!("duplicate label \"{label}\"")));
            }
        }
        let lookup = |label: &str| -> Result<PartId> {
            ids.get(label)
                .copied()
                .ok_or_else(|| SomaError::Blueprint(format!("unknown label \"{label}\"")))
        };

        let center_label = self
            .center
            .as_deref()
            .ok_or_else(|| SomaError::Blueprint("no center designated".to_string()))?;
        let center = lookup(center_label)?;

        let total_weight: f32 = self.parts.iter().map(|(_, p)| p.relative_size).sum();
        if total_weight <= 0.0 {
            return Err(SomaError::Blueprint(
                "part weights must sum to a positive total".to_string(),
            ));
        }

        let mut graph = PartGraph::new();
        for (_, part) in &self.parts {
            graph.insert_node(part.id);
        }
        for (a, b, kind) in &self.connections {
            let a_id = lookup(a)?;
            let b_id = lookup(b)?;
            let inserted = graph.connect(
                a_id,
                b_id,
                kind.clone(),
                config.graph.default_connection_integrity,
            )?;
            if !inserted {
                return Err(SomaError::Blueprint(format!(
                    "duplicate or degenerate connection {a} <-> {b}"
                )));
            }
        }
        if !graph.is_single_component() {
            return Err(SomaError::Blueprint(
                "blueprint describes a disconnected body".to_string(),
            ));
        }

        let mut coverage = CoverageGraph::new();
        for (covering, covered, side) in &self.covers {
            coverage.add_cover(lookup(covering)?, lookup(covered)?, *side);
        }

        let mut parts = HashMap::with_capacity(self.parts.len());
        for (_, mut part) in self.parts {
            part.relative_size /= total_weight;
            parts.insert(part.id, part);
        }

        let mut aggregates = AggregateTracker::new();
        for (stat, combine) in self.stats {
            aggregates.register_stat(stat, combine);
        }

        Ok(Soma::assemble(
            parts,
            graph,
            coverage,
            center,
            self.size,
            self.mass,
            Vec::new(),
            Arc::new(|_, part: &ComponentPart| part.gone),
            config,
            Arc::new(SomaCounters::new()),
            aggregates,
        ))
    }
}
