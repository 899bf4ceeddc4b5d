//! Form conditions — declarative structural patterns over a body.
//!
//! A form condition is a small graph of named part-slots, constraints on
//! each slot (ability tokens, stat/trait comparisons, combined with AND/OR
//! connectors), and `connected` edges requiring two slots' parts to share a
//! direct attachment edge. Actions evaluate conditions against a soma's
//! part graph to decide whether the body can perform them ("does this body
//! have a graspable hand connected to an arm?").
//!
//! Conditions are plain data (serde-loadable JSON) so action definitions
//! can author them in data files.
//!
//! The connectivity pruning is pairwise and greedy, not a full
//! constraint-satisfaction search: with three or more mutually connected
//! slots it can accept candidate sets that are pairwise consistent but not
//! jointly realizable by one concrete part assignment. This matches the
//! behavior action gating was balanced around; do not "fix" it silently.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SomaError};
use crate::part::ComponentPart;
use crate::soma::Soma;
use crate::types::{PartId, StatId};

// ---------------------------------------------------------------------------
// Comparators
// ---------------------------------------------------------------------------

/// Comparison operator between a live value and a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    /// Live value equals the literal.
    Equals,
    /// Live value differs from the literal.
    NotEquals,
    /// Live value is strictly greater.
    GreaterThan,
    /// Live value is greater or equal.
    GreaterThanOrEqual,
    /// Live value is strictly less.
    LessThan,
    /// Live value is less or equal.
    LessThanOrEqual,
    /// Live value is an integer multiple of the literal.
    MultipleOf,
    /// Live value is an integer factor of the literal.
    FactorOf,
}

impl Comparator {
    /// Apply the comparison. The divisibility operators truncate both
    /// values to integers; a zero divisor never matches.
    #[must_use]
    pub fn compare(self, live: f32, literal: f32) -> bool {
        match self {
            Self::Equals => (live - literal).abs() < 1e-6,
            Self::NotEquals => (live - literal).abs() >= 1e-6,
            Self::GreaterThan => live > literal,
            Self::GreaterThanOrEqual => live >= literal,
            Self::LessThan => live < literal,
            Self::LessThanOrEqual => live <= literal,
            Self::MultipleOf => {
                let divisor = literal as i64;
                divisor != 0 && (live as i64) % divisor == 0
            }
            Self::FactorOf => {
                let divisor = live as i64;
                divisor != 0 && (literal as i64) % divisor == 0
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// A single constraint a candidate part must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// The part's ability set contains the token.
    Ability(String),
    /// The part's live stat value satisfies the comparison.
    Stat {
        /// Which stat to read.
        stat: StatId,
        /// Comparison operator.
        cmp: Comparator,
        /// Literal to compare against.
        value: f32,
    },
    /// A sensable trait of the part's material satisfies the comparison.
    Trait {
        /// Which trait to read.
        key: String,
        /// Comparison operator.
        cmp: Comparator,
        /// Literal to compare against.
        value: f32,
    },
}

impl Constraint {
    fn admits(&self, part: &ComponentPart) -> bool {
        match self {
            Self::Ability(token) => part.has_ability(token),
            Self::Stat { stat, cmp, value } => {
                part.stat(stat).is_some_and(|live| cmp.compare(live, *value))
            }
            Self::Trait { key, cmp, value } => part
                .material
                .trait_value(key)
                .is_some_and(|live| cmp.compare(live, *value)),
        }
    }
}

/// A tree of constraints joined by logical connectors.
///
/// `All` is the implicit default when no connector is written; `Any`
/// branches union their candidate sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintExpr {
    /// Every branch must admit the part (AND). Empty = unconstrained.
    All(Vec<ConstraintExpr>),
    /// At least one branch must admit the part (OR).
    Any(Vec<ConstraintExpr>),
    /// A leaf constraint.
    Leaf(Constraint),
}

impl ConstraintExpr {
    /// The unconstrained expression — admits every part.
    #[must_use]
    pub fn unconstrained() -> Self {
        Self::All(Vec::new())
    }

    /// Shorthand for a single ability-token leaf.
    #[must_use]
    pub fn ability(token: impl Into<String>) -> Self {
        Self::Leaf(Constraint::Ability(token.into()))
    }

    fn admits(&self, part: &ComponentPart) -> bool {
        match self {
            Self::All(branches) => branches.iter().all(|b| b.admits(part)),
            Self::Any(branches) => branches.iter().any(|b| b.admits(part)),
            Self::Leaf(constraint) => constraint.admits(part),
        }
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// One named part-slot of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot name, referenced by `connected` edges. Two slots with the same
    /// name share one candidate set (their constraints intersect).
    pub name: String,
    /// Constraints candidates must satisfy.
    pub constraints: ConstraintExpr,
}

/// A declarative structural pattern evaluated against a soma's part graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormCondition {
    slots: Vec<Slot>,
    links: Vec<(String, String)>,
}

impl FormCondition {
    /// Start building a condition.
    #[must_use]
    pub fn builder() -> FormConditionBuilder {
        FormConditionBuilder::default()
    }

    /// Parse a condition from its JSON data form.
    ///
    /// # Errors
    /// Returns [`SomaError::Condition`] for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SomaError::Condition(e.to_string()))
    }

    /// Serialize the condition to its JSON data form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Whether the condition has no slots — trivially satisfied by any
    /// body, meaning "has a body at all".
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.slots.is_empty()
    }

    /// Evaluate the condition against a body.
    #[must_use]
    pub fn matches(&self, soma: &Soma) -> bool {
        self.candidates(soma).is_some()
    }

    /// Evaluate and return each slot's surviving candidate set, or `None`
    /// if some slot filtered to empty.
    ///
    /// Action systems use the candidate sets to pick the concrete part an
    /// action runs with.
    #[must_use]
    pub fn candidates(&self, soma: &Soma) -> Option<BTreeMap<String, HashSet<PartId>>> {
        let _span = tracing::debug_span!("soma::condition").entered();
        if self.slots.is_empty() {
            return Some(BTreeMap::new());
        }

        // Per-slot filtering; same-named slots intersect into one set.
        let mut candidates: BTreeMap<String, HashSet<PartId>> = BTreeMap::new();
        for slot in &self.slots {
            let admitted: HashSet<PartId> = soma
                .parts()
                .filter(|p| slot.constraints.admits(p))
                .map(|p| p.id)
                .collect();
            match candidates.entry(slot.name.clone()) {
                std::collections::btree_map::Entry::Vacant(e) => {
                    e.insert(admitted);
                }
                std::collections::btree_map::Entry::Occupied(mut e) => {
                    let merged: HashSet<PartId> =
                        e.get().intersection(&admitted).copied().collect();
                    *e.get_mut() = merged;
                }
            }
        }

        // Pairwise connectivity pruning, one pass per link.
        for (a, b) in &self.links {
            let set_a = candidates.get(a).cloned().unwrap_or_default();
            let set_b = candidates.get(b).cloned().unwrap_or_default();
            let mut kept_a = HashSet::new();
            let mut kept_b = HashSet::new();
            for &p in &set_a {
                for &q in &set_b {
                    if p != q && soma.graph().has_attachment(p, q) {
                        kept_a.insert(p);
                        kept_b.insert(q);
                    }
                }
            }
            candidates.insert(a.clone(), kept_a);
            candidates.insert(b.clone(), kept_b);
        }

        if candidates.values().all(|set| !set.is_empty()) {
            Some(candidates)
        } else {
            None
        }
    }
}

/// Chained builder for [`FormCondition`].
#[derive(Debug, Default)]
pub struct FormConditionBuilder {
    slots: Vec<Slot>,
    links: Vec<(String, String)>,
}

impl FormConditionBuilder {
    /// Add a constrained slot.
    #[must_use]
    pub fn slot(mut self, name: impl Into<String>, constraints: ConstraintExpr) -> Self {
        self.slots.push(Slot {
            name: name.into(),
            constraints,
        });
        self
    }

    /// Add an unconstrained slot.
    #[must_use]
    pub fn free_slot(self, name: impl Into<String>) -> Self {
        self.slot(name, ConstraintExpr::unconstrained())
    }

    /// Require two slots' parts to share a direct attachment edge.
    #[must_use]
    pub fn connected(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.links.push((a.into(), b.into()));
        self
    }

    /// Finish the condition.
    #[must_use]
    pub fn build(self) -> FormCondition {
        FormCondition {
            slots: self.slots,
            links: self.links,
        }
    }
}
