//! The soma — aggregate root of one composite body.
//!
//! A soma owns its parts in an arena keyed by [`PartId`], the part graph
//! and coverage graph over those keys, the center part, absolute size and
//! mass, and the incremental aggregate tracker. All structural mutation
//! goes through the soma so graphs and aggregates always change together
//! within one call: attach grows the body, severance and the destruction
//! cascade tear it apart, and both push split-off children onto a
//! drain-once list the world installs next tick.
//!
//! Nothing here blocks or retries; every operation is a single synchronous
//! transformation that either completes or fails up front.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use crate::aggregate::{AggregateTracker, Combine};
use crate::channel::{ChannelSystem, TopologyEvent};
use crate::config::SomaConfig;
use crate::coverage::CoverageGraph;
use crate::error::{Result, SomaError};
use crate::graph::PartGraph;
use crate::metrics::SomaCounters;
use crate::part::{ComponentPart, Material, Shape};
use crate::spirit::{Retether, SpiritResolver};
use crate::types::{ConnectionKind, PartId, ResourceId, Side, SomaId, SpiritId, StatId};

/// Pluggable decision for whether a changed part counts as destroyed.
///
/// The default predicate destroys a part whose derived `gone` flag is set
/// (hole shape or destroyed material).
pub type DestructionPredicate = Arc<dyn Fn(&Soma, &ComponentPart) -> bool + Send + Sync>;

/// One composite body: a graph of parts plus aggregate state.
pub struct Soma {
    id: SomaId,
    parts: HashMap<PartId, ComponentPart>,
    graph: PartGraph,
    coverage: CoverageGraph,
    center: PartId,
    size: f32,
    mass: f32,
    aggregates: AggregateTracker,
    channels: Vec<Box<dyn ChannelSystem>>,
    destruction: DestructionPredicate,
    children: Vec<Soma>,
    ejected: Vec<SpiritId>,
    contiguous: HashSet<PartId>,
    destroyed: bool,
    config: SomaConfig,
    counters: Arc<SomaCounters>,
}

impl std::fmt::Debug for Soma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Soma")
            .field("id", &self.id)
            .field("parts", &self.parts.len())
            .field("center", &self.center)
            .field("size", &self.size)
            .field("mass", &self.mass)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl Soma {
    /// Create a body from its center part alone.
    #[must_use]
    pub fn new(center_part: ComponentPart, size: f32, mass: f32) -> Self {
        Self::with_config(center_part, size, mass, SomaConfig::default())
    }

    /// Create a body from its center part with an explicit configuration.
    #[must_use]
    pub fn with_config(
        mut center_part: ComponentPart,
        size: f32,
        mass: f32,
        config: SomaConfig,
    ) -> Self {
        center_part.relative_size = 1.0;
        let center = center_part.id;
        let mut parts = HashMap::new();
        parts.insert(center, center_part);
        let mut graph = PartGraph::new();
        graph.insert_node(center);
        Self::assemble(
            parts,
            graph,
            CoverageGraph::new(),
            center,
            size,
            mass,
            Vec::new(),
            Arc::new(|_, part: &ComponentPart| part.gone),
            config,
            Arc::new(SomaCounters::new()),
            AggregateTracker::new(),
        )
    }

    /// Build a soma from pre-assembled state, folding every part into the
    /// given (contribution-free) tracker.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        parts: HashMap<PartId, ComponentPart>,
        graph: PartGraph,
        coverage: CoverageGraph,
        center: PartId,
        size: f32,
        mass: f32,
        channels: Vec<Box<dyn ChannelSystem>>,
        destruction: DestructionPredicate,
        config: SomaConfig,
        counters: Arc<SomaCounters>,
        mut aggregates: AggregateTracker,
    ) -> Self {
        for part in parts.values() {
            aggregates.fold_part(part);
        }
        let mut soma = Self {
            id: SomaId::new(),
            parts,
            graph,
            coverage,
            center,
            size,
            mass,
            aggregates,
            channels,
            destruction,
            children: Vec::new(),
            ejected: Vec::new(),
            contiguous: HashSet::new(),
            destroyed: false,
            config,
            counters,
        };
        soma.recompute_contiguous();
        soma.destroyed = soma.all_holes();
        soma
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// This body's identifier.
    #[must_use]
    pub fn id(&self) -> SomaId {
        self.id
    }

    /// Absolute size of the whole body.
    #[must_use]
    pub fn size(&self) -> f32 {
        self.size
    }

    /// Absolute mass of the whole body.
    #[must_use]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// The center part's id.
    #[must_use]
    pub fn center(&self) -> PartId {
        self.center
    }

    /// Look up a part by id.
    #[must_use]
    pub fn part(&self, id: PartId) -> Option<&ComponentPart> {
        self.parts.get(&id)
    }

    /// Iterate over all parts.
    pub fn parts(&self) -> impl Iterator<Item = &ComponentPart> {
        self.parts.values()
    }

    /// Number of parts in the body.
    #[must_use]
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// The part graph.
    #[must_use]
    pub fn graph(&self) -> &PartGraph {
        &self.graph
    }

    /// The coverage graph.
    #[must_use]
    pub fn coverage(&self) -> &CoverageGraph {
        &self.coverage
    }

    /// Parts reachable from the center via attachment edges.
    #[must_use]
    pub fn contiguous_parts(&self) -> &HashSet<PartId> {
        &self.contiguous
    }

    /// Whether the body has been logically destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether every remaining part is a hole.
    #[must_use]
    pub fn is_all_holes(&self) -> bool {
        self.all_holes()
    }

    /// This body's configuration.
    #[must_use]
    pub fn config(&self) -> &SomaConfig {
        &self.config
    }

    /// The counters this body reports into.
    #[must_use]
    pub fn counters(&self) -> &SomaCounters {
        &self.counters
    }

    /// Read a stat's whole-body aggregate. With no contributing parts the
    /// default is computed against the center part.
    #[must_use]
    pub fn stat(&self, stat: &StatId) -> f32 {
        match self.parts.get(&self.center) {
            Some(center) => self.aggregates.stat(stat, center),
            None => 0.0,
        }
    }

    /// Read a resource's whole-body amount (0.0 if untracked).
    #[must_use]
    pub fn resource(&self, resource: &ResourceId) -> f64 {
        self.aggregates.resource(resource)
    }

    /// Whether relative sizes currently sum to 1.0 within tolerance.
    #[must_use]
    pub fn size_invariant_holds(&self) -> bool {
        let sum: f32 = self.parts.values().map(|p| p.relative_size).sum();
        (sum - 1.0).abs() <= self.config.graph.size_epsilon
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Register the combinator a stat folds with. Must happen before parts
    /// carrying that stat are attached.
    pub fn register_stat(&mut self, stat: StatId, combine: Combine) {
        self.aggregates.register_stat(stat, combine);
    }

    /// Activate a channel system on this body.
    pub fn add_channel_system(&mut self, channel: Box<dyn ChannelSystem>) {
        self.channels.push(channel);
    }

    /// Replace the destruction predicate.
    pub fn set_destruction_predicate(&mut self, predicate: DestructionPredicate) {
        self.destruction = predicate;
    }

    /// Report into a shared counter block instead of this body's own.
    pub fn set_counters(&mut self, counters: Arc<SomaCounters>) {
        self.counters = counters;
    }

    // -----------------------------------------------------------------------
    // Attach
    // -----------------------------------------------------------------------

    /// Attach a part to the body with a typed connection.
    ///
    /// If `part` is new to the body it is inserted into both graphs, its
    /// stats fold into the aggregates, and every part's `relative_size` is
    /// renormalized over the grown total. A part whose id is already in
    /// the arena only gains the new edge. `covered_sides` lists the sides
    /// of existing parts the attached part physically covers.
    ///
    /// Returns `Ok(false)` — with no other effect — only when the edge
    /// insertion itself fails (an edge of that kind already exists between
    /// the pair, or the endpoints are the same part).
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] if `to` is not in the body graph.
    pub fn attach(
        &mut self,
        part: ComponentPart,
        to: PartId,
        kind: ConnectionKind,
        covered_sides: &[(PartId, Side)],
    ) -> Result<bool> {
        let _span = tracing::debug_span!("soma::attach").entered();
        if !self.graph.contains(to) {
            return Err(SomaError::PartNotFound(to));
        }
        let integrity = self.config.graph.default_connection_integrity;
        if !(0.0..=1.0).contains(&integrity) {
            // Checked before any mutation so a bad config cannot leave a
            // half-attached part behind.
            return Err(SomaError::IntegrityOutOfRange(integrity));
        }
        let pid = part.id;
        let new_part = !self.parts.contains_key(&pid);
        if new_part {
            let total = 1.0 + part.relative_size;
            self.graph.insert_node(pid);
            self.aggregates.fold_part(&part);
            self.parts.insert(pid, part);
            for p in self.parts.values_mut() {
                p.relative_size /= total;
            }
            self.counters.parts_attached.fetch_add(1, Ordering::Relaxed);
        }

        let inserted = self.graph.connect(pid, to, kind.clone(), integrity)?;
        if !inserted {
            debug!(part = %pid, other = %to, kind = %kind, "edge insertion rejected");
            return Ok(false);
        }

        if kind.is_attachment() && (self.contiguous.contains(&pid) != self.contiguous.contains(&to))
        {
            self.recompute_contiguous();
        }

        for &(covered, side) in covered_sides {
            if self.parts.contains_key(&covered) {
                self.coverage.add_cover(pid, covered, side);
            } else {
                warn!(part = %pid, covered = %covered, "coverage target not in body; skipped");
            }
        }

        let event = TopologyEvent::Attached {
            soma: self.id,
            part: pid,
            kind,
            other: to,
            new_part,
        };
        self.notify_topology(&event);
        debug!(soma = %self.id, part = %pid, new_part, "part attached");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Sever
    // -----------------------------------------------------------------------

    /// Cut every edge between two parts.
    ///
    /// If the cut leaves the graph in one component, nothing else happens.
    /// Otherwise the component not containing the center is extracted into
    /// a child soma: it takes its fraction of size and mass, both sides'
    /// relative sizes renormalize, and the extracted side's former
    /// attach-point becomes the child's center. The child lands on the
    /// drain list; spirits on extracted parts go through the retether
    /// protocol.
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] for an unknown part,
    /// [`SomaError::NoSharedEdge`] if the parts share no edge to begin
    /// with.
    pub fn sever_connection(
        &mut self,
        a: PartId,
        b: PartId,
        resolver: &mut dyn SpiritResolver,
    ) -> Result<()> {
        let _span = tracing::debug_span!("soma::sever").entered();
        if !self.parts.contains_key(&a) {
            return Err(SomaError::PartNotFound(a));
        }
        if !self.parts.contains_key(&b) {
            return Err(SomaError::PartNotFound(b));
        }
        if !self.graph.has_edge(a, b) && !self.coverage.has_edge_between(a, b) {
            return Err(SomaError::NoSharedEdge { a, b });
        }
        self.counters.severances.fetch_add(1, Ordering::Relaxed);
        self.graph.disconnect_all(a, b);
        self.coverage.remove_between(a, b);
        self.notify_topology(&TopologyEvent::Severed { soma: self.id, a, b });

        if self.graph.is_single_component() {
            self.recompute_contiguous();
            return Ok(());
        }

        let mut extracted = self.graph.reachable(a, false);
        if extracted.contains(&self.center) {
            extracted = self.graph.reachable(b, false);
        }
        let anchor = if extracted.contains(&a) { a } else { b };
        let snapshot = self.spirit_snapshot(extracted.iter().copied());

        let child = self.extract_component(&extracted, anchor);
        debug!(
            soma = %self.id,
            child = %child.id(),
            parts = extracted.len(),
            "body split by severance"
        );
        self.children.push(child);
        self.counters.splits_produced.fetch_add(1, Ordering::Relaxed);

        self.recompute_contiguous();
        if self.all_holes() {
            self.destroyed = true;
        }
        self.retether_pass(&snapshot, resolver);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Destruction cascade
    // -----------------------------------------------------------------------

    /// React to a part's material or shape having changed.
    ///
    /// If the destruction predicate spares the part, only its spirits are
    /// re-resolved. If the part is destroyed it is dropped entirely — its
    /// share of size and mass vanishes with it — and the whole remaining
    /// graph is re-partitioned: one part's loss can fragment the body into
    /// many pieces at once. The center-containing component remains as
    /// this body; every other component becomes a child. If no component
    /// holds the center, a zero-size hole part is synthesized as the new
    /// center so the body never lacks one.
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] if the part is not in this body.
    pub fn on_destroyable_part_change(
        &mut self,
        part: PartId,
        resolver: &mut dyn SpiritResolver,
    ) -> Result<()> {
        let _span = tracing::debug_span!("soma::cascade").entered();
        {
            let p = self
                .parts
                .get_mut(&part)
                .ok_or(SomaError::PartNotFound(part))?;
            p.refresh_derived_flags();
        }
        let doomed = {
            let predicate = Arc::clone(&self.destruction);
            let p = self
                .parts
                .get(&part)
                .ok_or(SomaError::PartNotFound(part))?;
            (*predicate)(self, p)
        };
        if !doomed {
            let snapshot = self.spirit_snapshot([part]);
            self.retether_pass(&snapshot, resolver);
            return Ok(());
        }

        self.counters.cascades_run.fetch_add(1, Ordering::Relaxed);
        if part == self.center {
            self.destroyed = true;
        }

        // Snapshot the doomed part's spirits before it disappears.
        let mut snapshot = self.spirit_snapshot([part]);

        // Drop the part entirely; its share of size and mass is lost.
        self.graph.remove_node(part);
        self.coverage.remove_part(part);
        self.notify_loss(part);
        if let Some(p) = self.parts.remove(&part) {
            let remaining: Vec<&ComponentPart> = self.parts.values().collect();
            self.aggregates.remove_part(&p, &remaining);
            self.counters.parts_lost.fetch_add(1, Ordering::Relaxed);
            let keep = (1.0 - p.relative_size).max(0.0);
            self.size *= keep;
            self.mass *= keep;
            if keep > self.config.graph.size_epsilon {
                for q in self.parts.values_mut() {
                    q.relative_size /= keep;
                }
            }
        }

        // Re-partition everything that remains.
        let components = self.graph.components();
        for component in components {
            if component.contains(&self.center) {
                continue;
            }
            let Some(anchor) = component.iter().min().copied() else {
                continue;
            };
            snapshot.extend(self.spirit_snapshot(component.iter().copied()));
            let child = self.extract_component(&component, anchor);
            debug!(
                soma = %self.id,
                child = %child.id(),
                parts = component.len(),
                "cascade split off component"
            );
            self.children.push(child);
            self.counters.splits_produced.fetch_add(1, Ordering::Relaxed);
        }

        if !self.parts.contains_key(&self.center) {
            self.synthesize_hole_center();
        }
        self.recompute_contiguous();
        if self.all_holes() {
            self.destroyed = true;
        }
        self.retether_pass(&snapshot, resolver);
        Ok(())
    }

    /// Report an observable-state change on a part (abilities, stats,
    /// effects) and run the retether protocol for its spirits.
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] if the part is not in this body.
    pub fn notify_part_changed(
        &mut self,
        part: PartId,
        resolver: &mut dyn SpiritResolver,
    ) -> Result<()> {
        if !self.parts.contains_key(&part) {
            return Err(SomaError::PartNotFound(part));
        }
        let snapshot = self.spirit_snapshot([part]);
        self.retether_pass(&snapshot, resolver);
        Ok(())
    }

    /// Replace a part's material, then run the destruction cascade.
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] if the part is not in this body.
    pub fn change_part_material(
        &mut self,
        part: PartId,
        material: Material,
        resolver: &mut dyn SpiritResolver,
    ) -> Result<()> {
        let p = self
            .parts
            .get_mut(&part)
            .ok_or(SomaError::PartNotFound(part))?;
        p.set_material(material);
        self.on_destroyable_part_change(part, resolver)
    }

    /// Replace a part's shape, then run the destruction cascade.
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] if the part is not in this body.
    pub fn change_part_shape(
        &mut self,
        part: PartId,
        shape: Shape,
        resolver: &mut dyn SpiritResolver,
    ) -> Result<()> {
        let p = self
            .parts
            .get_mut(&part)
            .ok_or(SomaError::PartNotFound(part))?;
        p.set_shape(shape);
        self.on_destroyable_part_change(part, resolver)
    }

    // -----------------------------------------------------------------------
    // In-place part mutation (aggregates kept in sync)
    // -----------------------------------------------------------------------

    /// Set a stat on a live part and rebuild that stat's aggregate.
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] if the part is not in this body.
    pub fn set_part_stat(&mut self, part: PartId, stat: StatId, value: f32) -> Result<()> {
        {
            let p = self
                .parts
                .get_mut(&part)
                .ok_or(SomaError::PartNotFound(part))?;
            p.stats.insert(stat.clone(), value);
        }
        let parts: Vec<&ComponentPart> = self.parts.values().collect();
        self.aggregates.refresh_stat(&stat, &parts);
        Ok(())
    }

    /// Adjust the resource amount held in a part, clamped at zero, and
    /// keep the whole-body total in step. Returns the part's new amount.
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] if the part is not in this body.
    pub fn adjust_part_resource(
        &mut self,
        part: PartId,
        resource: &ResourceId,
        delta: f64,
    ) -> Result<f64> {
        let p = self
            .parts
            .get_mut(&part)
            .ok_or(SomaError::PartNotFound(part))?;
        let old = p.resource(resource);
        let new = (old + delta).max(0.0);
        p.resources.insert(resource.clone(), new);
        self.aggregates.adjust_resource(resource, new - old);
        Ok(new)
    }

    /// Update the integrity of a connection edge.
    ///
    /// # Errors
    /// [`SomaError::IntegrityOutOfRange`] or [`SomaError::NoSharedEdge`].
    pub fn set_connection_integrity(
        &mut self,
        a: PartId,
        b: PartId,
        kind: &ConnectionKind,
        integrity: f32,
    ) -> Result<()> {
        self.graph.set_integrity(a, b, kind, integrity)
    }

    // -----------------------------------------------------------------------
    // Spirits
    // -----------------------------------------------------------------------

    /// Tether a spirit to a part.
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] if the part is not in this body.
    pub fn tether_spirit(&mut self, spirit: SpiritId, part: PartId) -> Result<()> {
        let p = self
            .parts
            .get_mut(&part)
            .ok_or(SomaError::PartNotFound(part))?;
        p.spirits.insert(spirit);
        Ok(())
    }

    /// Remove a spirit's tether without ejecting it to the world.
    ///
    /// # Errors
    /// [`SomaError::PartNotFound`] if the part is not in this body.
    pub fn untether_spirit(&mut self, spirit: SpiritId, part: PartId) -> Result<()> {
        let p = self
            .parts
            .get_mut(&part)
            .ok_or(SomaError::PartNotFound(part))?;
        p.spirits.remove(&spirit);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tick & drain
    // -----------------------------------------------------------------------

    /// Once-per-tick pass: tick down status effects and hand every channel
    /// hub part to its system's tick callback.
    pub fn tick(&mut self) {
        let _span = tracing::debug_span!("soma::tick").entered();
        for p in self.parts.values_mut() {
            p.tick_effects();
        }
        let mut channels = std::mem::take(&mut self.channels);
        for channel in &mut channels {
            let id = channel.id().clone();
            let hubs: Vec<PartId> = self
                .parts
                .values()
                .filter(|p| p.is_channel_hub(&id))
                .map(|p| p.id)
                .collect();
            for hub in hubs {
                let Some(p) = self.parts.get(&hub) else {
                    continue;
                };
                let deltas = channel.tick_hub(p);
                for (resource, delta) in deltas {
                    let _ = self.adjust_part_resource(hub, &resource, delta);
                }
            }
        }
        self.channels = channels;
    }

    /// Drain the children produced by recent splits. Single-consumer: the
    /// world pops this once per tick and installs the children.
    pub fn take_children(&mut self) -> Vec<Soma> {
        std::mem::take(&mut self.children)
    }

    /// Drain the spirits ejected by recent retether passes.
    pub fn take_ejected(&mut self) -> Vec<SpiritId> {
        std::mem::take(&mut self.ejected)
    }

    // -----------------------------------------------------------------------
    // Deep copy
    // -----------------------------------------------------------------------

    /// Deep-copy this body: rebuild the arena and every index table from
    /// scratch. The copy has a fresh [`SomaId`] and shares nothing with
    /// the original.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let mut parts = HashMap::with_capacity(self.parts.len());
        for (id, part) in &self.parts {
            parts.insert(*id, part.clone());
        }
        let mut graph = PartGraph::new();
        for id in self.graph.nodes() {
            graph.insert_node(id);
        }
        let all: HashSet<PartId> = self.graph.nodes().collect();
        for (from, edge) in self.graph.edges_within(&all) {
            let _ = graph.connect(from, edge.to, edge.kind, edge.integrity);
        }
        let mut coverage = CoverageGraph::new();
        for &id in &all {
            for cover in self.coverage.covers(id) {
                coverage.add_cover(id, cover.covered, cover.side);
            }
        }
        let mut copy = Self::assemble(
            parts,
            graph,
            coverage,
            self.center,
            self.size,
            self.mass,
            self.channels.clone(),
            Arc::clone(&self.destruction),
            self.config.clone(),
            Arc::clone(&self.counters),
            self.aggregates.fresh_with_registry(),
        );
        copy.destroyed = self.destroyed;
        copy.children = self.children.iter().map(Soma::deep_copy).collect();
        copy.ejected = self.ejected.clone();
        copy
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn all_holes(&self) -> bool {
        self.parts.values().all(ComponentPart::is_hole)
    }

    fn recompute_contiguous(&mut self) {
        self.contiguous = self.graph.reachable(self.center, true);
    }

    fn notify_topology(&mut self, event: &TopologyEvent) {
        let mut channels = std::mem::take(&mut self.channels);
        for channel in &mut channels {
            channel.on_topology(event);
        }
        self.channels = channels;
    }

    fn notify_loss(&mut self, part: PartId) {
        let mut channels = std::mem::take(&mut self.channels);
        for channel in &mut channels {
            channel.on_body_loss(self.id, part);
        }
        self.channels = channels;
    }

    /// Split the given component off into a child soma, taking its
    /// fraction of size and mass with it and renormalizing both sides.
    fn extract_component(&mut self, extracted: &HashSet<PartId>, new_center: PartId) -> Soma {
        let fraction: f32 = extracted
            .iter()
            .filter_map(|id| self.parts.get(id))
            .map(|p| p.relative_size)
            .sum();
        let child_size = fraction * self.size;
        let child_mass = fraction * self.mass;
        self.size -= child_size;
        self.mass -= child_mass;

        let mut child_graph = PartGraph::new();
        for &id in extracted {
            child_graph.insert_node(id);
        }
        for (from, edge) in self.graph.edges_within(extracted) {
            let _ = child_graph.connect(from, edge.to, edge.kind, edge.integrity);
        }

        let mut child_coverage = CoverageGraph::new();
        for &id in extracted {
            for cover in self.coverage.covers(id).to_vec() {
                if extracted.contains(&cover.covered) {
                    child_coverage.add_cover(id, cover.covered, cover.side);
                }
            }
        }

        let mut child_parts = HashMap::with_capacity(extracted.len());
        for &id in extracted {
            self.graph.remove_node(id);
            self.coverage.remove_part(id);
            self.notify_loss(id);
            if let Some(mut part) = self.parts.remove(&id) {
                let remaining: Vec<&ComponentPart> = self.parts.values().collect();
                self.aggregates.remove_part(&part, &remaining);
                self.counters.parts_lost.fetch_add(1, Ordering::Relaxed);
                if fraction > f32::EPSILON {
                    part.relative_size /= fraction;
                }
                child_parts.insert(id, part);
            }
        }

        let remainder = 1.0 - fraction;
        if remainder > self.config.graph.size_epsilon {
            for p in self.parts.values_mut() {
                p.relative_size /= remainder;
            }
        }

        Self::assemble(
            child_parts,
            child_graph,
            child_coverage,
            new_center,
            child_size,
            child_mass,
            self.channels.clone(),
            Arc::clone(&self.destruction),
            self.config.clone(),
            Arc::clone(&self.counters),
            self.aggregates.fresh_with_registry(),
        )
    }

    fn synthesize_hole_center(&mut self) {
        let mut hole = ComponentPart::new("hole", Material::new("void"), Shape::hole(), 1.0);
        hole.relative_size = 1.0;
        let id = hole.id;
        self.graph.insert_node(id);
        self.aggregates.fold_part(&hole);
        self.parts.insert(id, hole);
        self.center = id;
        self.counters.holes_synthesized.fetch_add(1, Ordering::Relaxed);
        warn!(soma = %self.id, "center component empty; synthesized hole center");
    }

    /// Collect `(spirit, part)` pairs for the given parts. Decisions are
    /// applied over this snapshot so the tether map is never mutated while
    /// being iterated.
    fn spirit_snapshot<I>(&self, parts: I) -> Vec<(SpiritId, PartId)>
    where
        I: IntoIterator<Item = PartId>,
    {
        let mut snapshot = Vec::new();
        let mut seen = HashSet::new();
        for id in parts {
            if !seen.insert(id) {
                continue;
            }
            if let Some(p) = self.parts.get(&id) {
                for &spirit in &p.spirits {
                    snapshot.push((spirit, id));
                }
            }
        }
        snapshot
    }

    fn retether_pass(&mut self, snapshot: &[(SpiritId, PartId)], resolver: &mut dyn SpiritResolver) {
        if snapshot.is_empty() {
            return;
        }
        let _span = tracing::debug_span!("soma::retether").entered();
        let mut decisions = Vec::with_capacity(snapshot.len());
        for &(spirit, at) in snapshot {
            let body: &Soma = self.body_holding(at).unwrap_or(self);
            decisions.push((spirit, at, resolver.resolve(spirit, at, body)));
        }
        for (spirit, at, decision) in decisions {
            match decision {
                Retether::Stay => {
                    if !self.contains_part_anywhere(at) {
                        warn!(spirit = %spirit, part = %at, "tethered part is gone; spirit ejected");
                        self.eject_spirit(spirit, at);
                    }
                }
                Retether::MoveTo(target) => {
                    if target == at && self.contains_part_anywhere(at) {
                        continue;
                    }
                    if self.contains_part_anywhere(target) {
                        self.detach_spirit(spirit, at);
                        self.attach_spirit(spirit, target);
                        self.counters.spirits_retethered.fetch_add(1, Ordering::Relaxed);
                    } else if self.config.spirits.eject_on_invalid_move {
                        warn!(
                            spirit = %spirit,
                            target = %target,
                            "retether target outside owning soma set; spirit ejected"
                        );
                        self.eject_spirit(spirit, at);
                    } else {
                        warn!(
                            spirit = %spirit,
                            target = %target,
                            "retether target outside owning soma set; tether left in place"
                        );
                    }
                }
                Retether::Eject => self.eject_spirit(spirit, at),
            }
        }
    }

    fn eject_spirit(&mut self, spirit: SpiritId, at: PartId) {
        self.detach_spirit(spirit, at);
        self.ejected.push(spirit);
        self.counters.spirits_ejected.fetch_add(1, Ordering::Relaxed);
    }

    fn detach_spirit(&mut self, spirit: SpiritId, at: PartId) {
        if let Some(p) = self.parts.get_mut(&at) {
            p.spirits.remove(&spirit);
            return;
        }
        for child in &mut self.children {
            if let Some(p) = child.parts.get_mut(&at) {
                p.spirits.remove(&spirit);
                return;
            }
        }
    }

    fn attach_spirit(&mut self, spirit: SpiritId, target: PartId) {
        if let Some(p) = self.parts.get_mut(&target) {
            p.spirits.insert(spirit);
            return;
        }
        for child in &mut self.children {
            if let Some(p) = child.parts.get_mut(&target) {
                p.spirits.insert(spirit);
                return;
            }
        }
    }

    fn contains_part_anywhere(&self, id: PartId) -> bool {
        self.parts.contains_key(&id) || self.children.iter().any(|c| c.parts.contains_key(&id))
    }

    fn body_holding(&self, id: PartId) -> Option<&Soma> {
        if self.parts.contains_key(&id) {
            Some(self)
        } else {
            self.children.iter().find(|c| c.parts.contains_key(&id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flesh_part(kind: &str, weight: f32) -> ComponentPart {
        ComponentPart::new(kind, Material::new("flesh"), Shape::new(kind), weight)
    }

    /// A–B–C chain with A as center, equal thirds by construction.
    fn three_part_chain() -> (Soma, PartId, PartId, PartId) {
        let a = flesh_part("core", 1.0);
        let a_id = a.id;
        let mut soma = Soma::new(a, 9.0, 9.0);

        let b = flesh_part("link", 1.0);
        let b_id = b.id;
        soma.attach(b, a_id, ConnectionKind::Joined, &[])
            .expect("attach b");

        let c = flesh_part("tip", 1.0);
        let c_id = c.id;
        soma.attach(c, b_id, ConnectionKind::Joined, &[])
            .expect("attach c");

        // Weights 1.0 each renormalize unevenly; flatten them for the
        // arithmetic in the tests below.
        for id in [a_id, b_id, c_id] {
            if let Some(p) = soma.parts.get_mut(&id) {
                p.relative_size = 1.0 / 3.0;
            }
        }
        (soma, a_id, b_id, c_id)
    }

    #[test]
    fn attach_renormalizes_sizes() {
        let torso = flesh_part("torso", 1.0);
        let torso_id = torso.id;
        let mut soma = Soma::new(torso, 10.0, 50.0);
        assert!(soma.size_invariant_holds());

        soma.attach(flesh_part("arm", 0.25), torso_id, ConnectionKind::Joined, &[])
            .expect("attach");
        assert!(soma.size_invariant_holds());
        assert_eq!(soma.part_count(), 2);
        assert_eq!(soma.contiguous_parts().len(), 2);
    }

    #[test]
    fn attach_to_unknown_part_is_an_error() {
        let torso = flesh_part("torso", 1.0);
        let mut soma = Soma::new(torso, 10.0, 50.0);
        let ghost = PartId::new();
        assert!(matches!(
            soma.attach(flesh_part("arm", 0.2), ghost, ConnectionKind::Joined, &[]),
            Err(SomaError::PartNotFound(_))
        ));
    }

    #[test]
    fn duplicate_edge_returns_false() {
        let (mut soma, a, b, _) = three_part_chain();
        let ok = soma
            .attach(flesh_part("ignored", 0.0), a, ConnectionKind::Joined, &[])
            .expect("attach");
        assert!(ok);
        // Re-connecting b to a with the same kind fails softly.
        let b_part = soma.part(b).expect("b").clone();
        let ok = soma
            .attach(b_part, a, ConnectionKind::Joined, &[])
            .expect("attach");
        assert!(!ok);
    }

    #[test]
    fn sever_without_shared_edge_is_an_error() {
        let (mut soma, a, _, c) = three_part_chain();
        assert!(matches!(
            soma.sever_connection(a, c, &mut ()),
            Err(SomaError::NoSharedEdge { .. })
        ));
    }

    #[test]
    fn sever_conserves_size_and_mass() {
        let (mut soma, _, b, c) = three_part_chain();
        let before_size = soma.size();
        let before_mass = soma.mass();

        soma.sever_connection(b, c, &mut ()).expect("sever");
        let children = soma.take_children();
        assert_eq!(children.len(), 1);
        let child = &children[0];

        assert!((soma.size() + child.size() - before_size).abs() < 1e-3);
        assert!((soma.mass() + child.mass() - before_mass).abs() < 1e-3);
        assert!(soma.size_invariant_holds());
        assert!(child.size_invariant_holds());
        assert_eq!(child.center(), c);
        assert_eq!(child.part_count(), 1);
        assert_eq!(soma.part_count(), 2);
    }

    #[test]
    fn sever_keeps_center_side() {
        let (mut soma, a, b, _) = three_part_chain();
        soma.sever_connection(a, b, &mut ()).expect("sever");
        let children = soma.take_children();
        assert_eq!(children.len(), 1);
        // The center stays with `soma`; b and c leave.
        assert_eq!(soma.part_count(), 1);
        assert_eq!(soma.center(), a);
        assert_eq!(children[0].part_count(), 2);
        assert_eq!(children[0].center(), b);
    }

    #[test]
    fn cascade_splits_chain_and_drops_destroyed_part() {
        let (mut soma, a, b, c) = three_part_chain();
        let before_size = soma.size();

        // Destroy B: its material burns away.
        soma.change_part_material(
            b,
            {
                let mut m = Material::new("ash");
                m.destroyed = true;
                m
            },
            &mut (),
        )
        .expect("cascade");

        // B is dropped entirely; A remains as center, C splits off.
        assert_eq!(soma.part_count(), 1);
        assert_eq!(soma.center(), a);
        assert!(soma.part(b).is_none());
        assert!(!soma.is_destroyed());

        let children = soma.take_children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].part_count(), 1);
        assert!(children[0].part(c).is_some());

        // A's and C's shares are each one third of the original.
        assert!((soma.size() - before_size / 3.0).abs() < 1e-3);
        assert!((children[0].size() - before_size / 3.0).abs() < 1e-3);
        assert!(soma.size_invariant_holds());
        assert!(children[0].size_invariant_holds());
    }

    #[test]
    fn destroying_center_synthesizes_hole() {
        let (mut soma, a, _, _) = three_part_chain();
        soma.change_part_shape(a, Shape::hole(), &mut ())
            .expect("cascade");

        assert!(soma.is_destroyed());
        // The old center is gone, but a center always exists.
        assert!(soma.part(soma.center()).is_some());
        assert!(soma.part(soma.center()).expect("center").is_hole());
        assert_eq!(soma.counters().snapshot().holes_synthesized, 1);

        // B–C stayed connected, so they leave as one child.
        let children = soma.take_children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].part_count(), 2);
    }

    #[test]
    fn surviving_part_change_only_retethers() {
        let (mut soma, a, _, _) = three_part_chain();
        let spirit = SpiritId::new();
        soma.tether_spirit(spirit, a).expect("tether");

        // Material swap that does not destroy the part.
        soma.change_part_material(a, Material::new("stone"), &mut ())
            .expect("change");
        assert_eq!(soma.part_count(), 3);
        assert!(soma.part(a).expect("a").spirits.contains(&spirit));
        assert!(!soma.part(a).expect("a").usual);
    }

    #[test]
    fn ejected_spirit_lands_on_drain_list() {
        struct AlwaysEject;
        impl SpiritResolver for AlwaysEject {
            fn resolve(&mut self, _: SpiritId, _: PartId, _: &Soma) -> Retether {
                Retether::Eject
            }
        }

        let (mut soma, _, b, c) = three_part_chain();
        let spirit = SpiritId::new();
        soma.tether_spirit(spirit, c).expect("tether");

        soma.sever_connection(b, c, &mut AlwaysEject).expect("sever");
        assert_eq!(soma.take_ejected(), vec![spirit]);
        let children = soma.take_children();
        assert!(!children[0].part(c).expect("c").spirits.contains(&spirit));
    }

    #[test]
    fn spirit_moves_into_surviving_body() {
        struct MoveToCenter;
        impl SpiritResolver for MoveToCenter {
            fn resolve(&mut self, _: SpiritId, _: PartId, soma: &Soma) -> Retether {
                Retether::MoveTo(soma.center())
            }
        }

        let (mut soma, _a, b, c) = three_part_chain();
        let spirit = SpiritId::new();
        soma.tether_spirit(spirit, c).expect("tether");

        soma.sever_connection(b, c, &mut MoveToCenter).expect("sever");
        // The spirit asked for its (child) body's center — c itself, which
        // now lives in the child.
        let children = soma.take_children();
        assert!(children[0].part(c).expect("c").spirits.contains(&spirit));
        assert!(soma.take_ejected().is_empty());
    }

    #[test]
    fn aggregates_follow_splits() {
        let strength = StatId::new("strength");
        let torso = flesh_part("torso", 1.0).with_stat(strength.clone(), 5.0);
        let torso_id = torso.id;
        let mut soma = Soma::new(torso, 10.0, 50.0);

        let arm = flesh_part("arm", 0.25).with_stat(strength.clone(), 3.0);
        let arm_id = arm.id;
        soma.attach(arm, torso_id, ConnectionKind::Joined, &[])
            .expect("attach");
        assert!((soma.stat(&strength) - 8.0).abs() < 1e-5);

        soma.sever_connection(torso_id, arm_id, &mut ())
            .expect("sever");
        assert!((soma.stat(&strength) - 5.0).abs() < 1e-5);
        let children = soma.take_children();
        assert!((children[0].stat(&strength) - 3.0).abs() < 1e-5);
    }

    #[test]
    fn deep_copy_shares_nothing() {
        let (mut soma, a, b, _) = three_part_chain();
        let copy = soma.deep_copy();
        assert_ne!(copy.id(), soma.id());
        assert_eq!(copy.part_count(), soma.part_count());

        // Mutating the original leaves the copy untouched.
        soma.sever_connection(a, b, &mut ()).expect("sever");
        assert_eq!(soma.part_count(), 1);
        assert_eq!(copy.part_count(), 3);
        assert!(copy.graph().has_edge(a, b));
    }

    #[test]
    fn holding_edge_does_not_extend_contiguity() {
        let (mut soma, a, _, _) = three_part_chain();
        let rock = flesh_part("rock", 0.0);
        let rock_id = rock.id;
        soma.attach(rock, a, ConnectionKind::Holding, &[])
            .expect("attach");
        assert_eq!(soma.part_count(), 4);
        assert!(!soma.contiguous_parts().contains(&rock_id));
    }
}
