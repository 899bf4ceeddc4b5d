//! Component parts — the nodes of a body's part graph.
//!
//! A part carries identity, material, shape, its fraction of the owning
//! body's size, plane membership, abilities, stats, resources, embedded
//! materials, active status effects, and the set of spirits tethered to it.
//! Parts are owned exclusively by exactly one [`Soma`](crate::soma::Soma) at
//! a time; ownership transfers wholesale when a body splits.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::plane::PlaneSet;
use crate::types::{ChannelId, PartId, ResourceId, SpiritId, StatId};

// ---------------------------------------------------------------------------
// Material & Shape
// ---------------------------------------------------------------------------

/// The substance a part is made of.
///
/// `traits` are the material's sensable properties (temperature, hardness,
/// …) — the values the form-condition matcher's trait constraints read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Material name, e.g. `flesh`, `chitin`, `stone`.
    pub name: String,
    /// Sensable properties of the material.
    pub traits: BTreeMap<String, f32>,
    /// Whether the material has been destroyed (burned away, dissolved, …).
    pub destroyed: bool,
}

impl Material {
    /// Create an intact material with no traits.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            traits: BTreeMap::new(),
            destroyed: false,
        }
    }

    /// Builder-style: add a sensable trait.
    #[must_use]
    pub fn with_trait(mut self, key: impl Into<String>, value: f32) -> Self {
        self.traits.insert(key.into(), value);
        self
    }

    /// Read a sensable trait, if the material has it.
    #[must_use]
    pub fn trait_value(&self, key: &str) -> Option<f32> {
        self.traits.get(key).copied()
    }
}

/// The form a part currently takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    /// Shape name, e.g. `hand`, `plate`, `orb`.
    pub name: String,
    /// Whether this shape is a hole — the absence left by a destroyed part.
    pub hole: bool,
}

impl Shape {
    /// Create a solid shape.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hole: false,
        }
    }

    /// The hole shape — what remains where a part used to be.
    #[must_use]
    pub fn hole() -> Self {
        Self {
            name: "hole".to_string(),
            hole: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Abilities & Status Effects
// ---------------------------------------------------------------------------

/// A capability a part grants its body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    /// Plain capability token, e.g. `grasp`, `see`, `walk`.
    Token(String),
    /// Channel hub — marks this part as the center of a named channel
    /// system (e.g. a heart for `circulatory`).
    ChannelHub(ChannelId),
}

impl Ability {
    /// Shorthand for a plain token ability.
    #[must_use]
    pub fn token(name: impl Into<String>) -> Self {
        Self::Token(name.into())
    }

    /// Whether this ability answers to the given token.
    ///
    /// A channel hub answers to its system's name, so conditions can ask
    /// for "a part with the `circulatory` ability".
    #[must_use]
    pub fn matches(&self, token: &str) -> bool {
        match self {
            Self::Token(t) => t == token,
            Self::ChannelHub(id) => id.0 == token,
        }
    }
}

/// An active status-effect instance on a part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Effect name, e.g. `burning`, `numb`.
    pub name: String,
    /// Remaining duration in simulation ticks.
    pub remaining_ticks: u32,
}

impl StatusEffect {
    /// Create a new effect instance.
    #[must_use]
    pub fn new(name: impl Into<String>, remaining_ticks: u32) -> Self {
        Self {
            name: name.into(),
            remaining_ticks,
        }
    }
}

// ---------------------------------------------------------------------------
// Component Part
// ---------------------------------------------------------------------------

/// A single node in a body's part graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentPart {
    /// Stable unique identifier.
    pub id: PartId,
    /// Non-unique kind name used for pattern matching, e.g. `hand`.
    pub kind: String,
    /// Current material.
    pub material: Material,
    /// Current shape.
    pub shape: Shape,
    /// Fraction of the owning soma's total size. The owning soma keeps the
    /// sum over all its parts at 1.0.
    pub relative_size: f32,
    /// Planes on which this part can detect.
    pub detection_planes: PlaneSet,
    /// Planes on which this part can act and be acted upon.
    pub interaction_planes: PlaneSet,
    /// Abilities this part grants.
    pub abilities: HashSet<Ability>,
    /// Per-part stat values, aggregated body-wide by the tracker.
    pub stats: BTreeMap<StatId, f32>,
    /// Channel-resource amounts held in this part.
    pub resources: BTreeMap<ResourceId, f64>,
    /// Materials embedded in the part (shrapnel, stingers, grafts).
    pub embedded: Vec<Material>,
    /// Active status-effect instances.
    pub effects: Vec<StatusEffect>,
    /// Spirits tethered to this part. Weak relation — the part never owns
    /// a spirit's lifecycle.
    pub spirits: HashSet<SpiritId>,
    /// Whether material and shape still match what the part was made with.
    pub usual: bool,
    /// Whether the part is effectively absent (hole shape or destroyed
    /// material).
    pub gone: bool,
    original_material: String,
    original_shape: String,
}

impl ComponentPart {
    /// Create a new part of the given kind, material, and shape.
    ///
    /// `relative_size` is this part's size weight; the owning soma
    /// renormalizes weights so they sum to 1.0 across the body.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        material: Material,
        shape: Shape,
        relative_size: f32,
    ) -> Self {
        let original_material = material.name.clone();
        let original_shape = shape.name.clone();
        let mut part = Self {
            id: PartId::new(),
            kind: kind.into(),
            material,
            shape,
            relative_size: relative_size.max(0.0),
            detection_planes: PlaneSet::EMPTY,
            interaction_planes: PlaneSet::EMPTY,
            abilities: HashSet::new(),
            stats: BTreeMap::new(),
            resources: BTreeMap::new(),
            embedded: Vec::new(),
            effects: Vec::new(),
            spirits: HashSet::new(),
            usual: true,
            gone: false,
            original_material,
            original_shape,
        };
        part.refresh_derived_flags();
        part
    }

    /// Builder-style: grant an ability.
    #[must_use]
    pub fn with_ability(mut self, ability: Ability) -> Self {
        self.abilities.insert(ability);
        self
    }

    /// Builder-style: set a stat value.
    #[must_use]
    pub fn with_stat(mut self, stat: StatId, value: f32) -> Self {
        self.stats.insert(stat, value);
        self
    }

    /// Builder-style: set a resource amount.
    #[must_use]
    pub fn with_resource(mut self, resource: ResourceId, amount: f64) -> Self {
        self.resources.insert(resource, amount);
        self
    }

    /// Whether any of this part's abilities answers to the token.
    #[must_use]
    pub fn has_ability(&self, token: &str) -> bool {
        self.abilities.iter().any(|a| a.matches(token))
    }

    /// Whether this part is the hub of the given channel system.
    #[must_use]
    pub fn is_channel_hub(&self, channel: &ChannelId) -> bool {
        self.abilities
            .iter()
            .any(|a| matches!(a, Ability::ChannelHub(id) if id == channel))
    }

    /// Read a stat value, if set on this part.
    #[must_use]
    pub fn stat(&self, stat: &StatId) -> Option<f32> {
        self.stats.get(stat).copied()
    }

    /// Read a resource amount held in this part (0.0 if none).
    #[must_use]
    pub fn resource(&self, resource: &ResourceId) -> f64 {
        self.resources.get(resource).copied().unwrap_or(0.0)
    }

    /// Whether the part is a hole — the placeholder for destroyed matter.
    #[must_use]
    pub fn is_hole(&self) -> bool {
        self.shape.hole
    }

    /// Recompute the `usual` / `gone` flags from material and shape state.
    ///
    /// Must be called after any material or shape change; the soma's
    /// destruction cascade does this before evaluating its predicate.
    pub fn refresh_derived_flags(&mut self) {
        self.usual = self.material.name == self.original_material
            && self.shape.name == self.original_shape
            && !self.material.destroyed;
        self.gone = self.shape.hole || self.material.destroyed;
    }

    /// Replace the part's material and refresh derived flags.
    pub fn set_material(&mut self, material: Material) {
        self.material = material;
        self.refresh_derived_flags();
    }

    /// Replace the part's shape and refresh derived flags.
    pub fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
        self.refresh_derived_flags();
    }

    /// Tick down status effects, dropping expired instances.
    ///
    /// Returns `true` if any effect expired this tick.
    pub fn tick_effects(&mut self) -> bool {
        let before = self.effects.len();
        for effect in &mut self.effects {
            effect.remaining_ticks = effect.remaining_ticks.saturating_sub(1);
        }
        self.effects.retain(|e| e.remaining_ticks > 0);
        self.effects.len() != before
    }
}
