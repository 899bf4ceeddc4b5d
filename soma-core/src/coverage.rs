//! The coverage graph — which parts physically cover which sides of others.
//!
//! Coverage is independent of structural connection: a gauntlet covers a
//! hand's sides without being joined to it. Edges are directed from the
//! covering part to the covered part and carry the covered [`Side`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{PartId, Side};

/// One coverage relation: the owner of the edge covers `covered` on `side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cover {
    /// The part being covered.
    pub covered: PartId,
    /// Which side of it is covered.
    pub side: Side,
}

/// Directed coverage relations over the parts of one soma.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageGraph {
    covers: HashMap<PartId, Vec<Cover>>,
}

impl CoverageGraph {
    /// Create an empty coverage graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `covering` covers `covered` on `side`.
    ///
    /// Returns `false` if that exact relation already exists.
    pub fn add_cover(&mut self, covering: PartId, covered: PartId, side: Side) -> bool {
        let entry = self.covers.entry(covering).or_default();
        let cover = Cover { covered, side };
        if entry.contains(&cover) {
            return false;
        }
        entry.push(cover);
        true
    }

    /// The sides this part covers on other parts.
    #[must_use]
    pub fn covers(&self, covering: PartId) -> &[Cover] {
        self.covers.get(&covering).map_or(&[], Vec::as_slice)
    }

    /// The parts and sides covering the given part.
    #[must_use]
    pub fn covered_by(&self, covered: PartId) -> Vec<(PartId, Side)> {
        self.covers
            .iter()
            .flat_map(|(&covering, list)| {
                list.iter()
                    .filter(move |c| c.covered == covered)
                    .map(move |c| (covering, c.side))
            })
            .collect()
    }

    /// Whether any coverage relation exists between the pair, in either
    /// direction.
    #[must_use]
    pub fn has_edge_between(&self, a: PartId, b: PartId) -> bool {
        self.covers(a).iter().any(|c| c.covered == b)
            || self.covers(b).iter().any(|c| c.covered == a)
    }

    /// Remove every coverage relation between the pair, in both directions.
    /// Returns how many were removed.
    pub fn remove_between(&mut self, a: PartId, b: PartId) -> usize {
        let mut removed = 0;
        for (covering, covered) in [(a, b), (b, a)] {
            if let Some(list) = self.covers.get_mut(&covering) {
                let before = list.len();
                list.retain(|c| c.covered != covered);
                removed += before - list.len();
            }
        }
        removed
    }

    /// Remove every relation touching the part, in either role.
    pub fn remove_part(&mut self, id: PartId) {
        self.covers.remove(&id);
        for list in self.covers.values_mut() {
            list.retain(|c| c.covered != id);
        }
    }

    /// Total number of coverage relations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.covers.values().map(Vec::len).sum()
    }

    /// Whether no coverage relations exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_and_query() {
        let mut cov = CoverageGraph::new();
        let gauntlet = PartId::new();
        let hand = PartId::new();

        assert!(cov.add_cover(gauntlet, hand, Side::Front));
        assert!(cov.add_cover(gauntlet, hand, Side::Back));
        assert!(!cov.add_cover(gauntlet, hand, Side::Front)); // duplicate

        assert_eq!(cov.covers(gauntlet).len(), 2);
        assert_eq!(cov.covered_by(hand).len(), 2);
        assert!(cov.has_edge_between(hand, gauntlet));
    }

    #[test]
    fn remove_between_cuts_both_directions() {
        let mut cov = CoverageGraph::new();
        let a = PartId::new();
        let b = PartId::new();
        cov.add_cover(a, b, Side::Top);
        cov.add_cover(b, a, Side::Bottom);

        assert_eq!(cov.remove_between(a, b), 2);
        assert!(cov.is_empty());
    }

    #[test]
    fn remove_part_strips_both_roles() {
        let mut cov = CoverageGraph::new();
        let plate = PartId::new();
        let torso = PartId::new();
        let strap = PartId::new();
        cov.add_cover(plate, torso, Side::Front);
        cov.add_cover(strap, plate, Side::Back);

        cov.remove_part(plate);
        assert!(cov.is_empty());
    }
}
