//! Spirit retethering protocol.
//!
//! A spirit is an external controller tethered to exactly one part at a
//! time; the part records the relation, the spirit's owning context decides
//! behavior. Whenever a part's observable state changes — or it is severed
//! away or destroyed — every spirit tethered to it is asked, through the
//! [`SpiritResolver`] capability, where it goes next. Decisions are applied
//! only after the triggering structural change completes, over a snapshot
//! of the affected spirit set, so the tether map is never mutated while it
//! is being iterated.

use crate::soma::Soma;
use crate::types::{PartId, SpiritId};

/// A spirit's answer to "your part changed — where do you go?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retether {
    /// Remain tethered to the same part. If that part no longer exists,
    /// the spirit is ejected instead.
    Stay,
    /// Move the tether to another part in the same current owning soma
    /// set (the changed body plus its freshly split-off children).
    MoveTo(PartId),
    /// Leave the body entirely; the spirit is handed to the world as an
    /// untethered entity.
    Eject,
}

/// The capability callback a spirit's owning context supplies.
///
/// `soma` is the body that currently holds `current` — for a part that was
/// just removed outright, the body that owned it last.
pub trait SpiritResolver {
    /// Decide where the given spirit goes after its part changed.
    fn resolve(&mut self, spirit: SpiritId, current: PartId, soma: &Soma) -> Retether;
}

/// The unit resolver leaves every spirit where it is.
impl SpiritResolver for () {
    fn resolve(&mut self, _spirit: SpiritId, _current: PartId, _soma: &Soma) -> Retether {
        Retether::Stay
    }
}
