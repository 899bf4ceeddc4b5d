//! Core identifier and connection types for the soma engine.
//!
//! All types are serializable; ids are uuid newtypes so parts, bodies, and
//! spirits can be referenced across the world without back-pointers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a component part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartId(pub Uuid);

impl PartId {
    /// Create a new random part ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PartId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a soma (one composite body).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SomaId(pub Uuid);

impl SomaId {
    /// Create a new random soma ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SomaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SomaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a tethered spirit.
///
/// Spirits are external controllers; the engine only records the tether
/// relation and never owns a spirit's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpiritId(pub Uuid);

impl SpiritId {
    /// Create a new random spirit ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SpiritId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SpiritId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Named keys
// ---------------------------------------------------------------------------

/// Name of a channel system (e.g. `circulatory`, `nervous`).
///
/// Channel systems are external collaborators; the engine only needs their
/// names for edge typing and hub-ability lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Create a channel ID from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a per-part stat tracked by the aggregate tracker (e.g. `strength`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatId(pub String);

impl StatId {
    /// Create a stat ID from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for StatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a channel resource carried by parts (e.g. `blood`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Create a resource ID from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// The kind of a connection edge between two parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Structural joint — the parts articulate against each other.
    Joined,
    /// The parts are fused into one continuous whole.
    Merged,
    /// One part grips the other without structural attachment.
    Holding,
    /// A channel-system link (one edge kind per named channel system).
    Channel(ChannelId),
}

impl ConnectionKind {
    /// Whether this kind counts toward body contiguity.
    ///
    /// Only `Joined` and `Merged` edges make two parts contiguous; holding
    /// something does not make it part of the body.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        matches!(self, Self::Joined | Self::Merged)
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joined => write!(f, "joined"),
            Self::Merged => write!(f, "merged"),
            Self::Holding => write!(f, "holding"),
            Self::Channel(id) => write!(f, "channel:{id}"),
        }
    }
}

/// A side of a part that another part can physically cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Anterior face.
    Front,
    /// Posterior face.
    Back,
    /// Left face.
    Left,
    /// Right face.
    Right,
    /// Upper face.
    Top,
    /// Lower face.
    Bottom,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Front => write!(f, "front"),
            Self::Back => write!(f, "back"),
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Top => write!(f, "top"),
            Self::Bottom => write!(f, "bottom"),
        }
    }
}
