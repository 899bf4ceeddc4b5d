//! Channel-system collaborator interface.
//!
//! A channel system (circulatory, nervous, …) is an external collaborator
//! that flows resources or signals along designated edges of the part
//! graph. The engine owns none of that business logic; it only notifies
//! the system on every topology change and hands it hub parts to tick.

use crate::part::ComponentPart;
use crate::types::{ChannelId, ConnectionKind, PartId, ResourceId, SomaId};

/// A topology change a channel system is notified about.
#[derive(Debug, Clone)]
pub enum TopologyEvent {
    /// A connection edge was added (and possibly a brand-new part with it).
    Attached {
        /// The body whose topology changed.
        soma: SomaId,
        /// The part on the new edge's near end.
        part: PartId,
        /// The kind of the new edge.
        kind: ConnectionKind,
        /// The part on the new edge's far end.
        other: PartId,
        /// Whether `part` entered the body with this event.
        new_part: bool,
    },
    /// Every edge between two parts was cut.
    Severed {
        /// The body whose topology changed.
        soma: SomaId,
        /// One end of the cut.
        a: PartId,
        /// The other end of the cut.
        b: PartId,
    },
}

/// An external channel system bound to a soma.
///
/// Implementations live outside this crate; the engine calls these hooks
/// synchronously during its own structural operations, so they must not
/// call back into the soma.
pub trait ChannelSystem {
    /// The channel system's name.
    fn id(&self) -> &ChannelId;

    /// React to a topology change.
    fn on_topology(&mut self, event: &TopologyEvent);

    /// React to a part leaving the body (severed away or destroyed).
    fn on_body_loss(&mut self, soma: SomaId, part: PartId);

    /// Per-tick callback for each part carrying this system's
    /// [`Ability::ChannelHub`](crate::part::Ability::ChannelHub).
    ///
    /// Returns resource deltas for the soma to apply on the hub part; the
    /// soma routes them through its aggregate tracker so whole-body totals
    /// stay in step with per-part amounts.
    fn tick_hub(&mut self, part: &ComponentPart) -> Vec<(ResourceId, f64)>;

    /// Clone into a box — needed when a body splits and the child inherits
    /// the parent's active channel systems.
    fn clone_box(&self) -> Box<dyn ChannelSystem>;
}

impl Clone for Box<dyn ChannelSystem> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl std::fmt::Debug for Box<dyn ChannelSystem> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelSystem({})", self.id())
    }
}
