//! # Soma Core Library
//!
//! Body-composition graph engine for a real-time world simulation.
//!
//! Every composite body — creature, object, construct — is a [`Soma`]: an
//! arena of [`ComponentPart`]s under two typed graphs (structural
//! connections and physical coverage), a designated center part, and
//! incrementally maintained whole-body aggregates. The engine keeps the
//! structural invariants alive while the graph is grown or torn apart:
//!
//! - **Size conservation** — relative part sizes sum to 1.0 after every
//!   operation; absolute size and mass partition proportionally on split.
//! - **Connectivity** — the contiguous set always equals the BFS-reachable
//!   set from the center over attachment edges.
//! - **Center** — a soma has exactly one center part at all times, even
//!   immediately after the original center is destroyed.
//! - **Aggregate correctness** — incremental stat/resource totals equal a
//!   full rescan after any add/remove sequence.
//!
//! [`FormCondition`](condition::FormCondition) patterns gate actions
//! against the part graph ("a graspable hand connected to an arm?"), and
//! the channel-system and spirit collaborators plug in at trait seams.
//!
//! Everything is single-threaded per simulation tick: no operation blocks,
//! suspends, or retries.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod aggregate;
pub mod blueprint;
pub mod channel;
pub mod condition;
pub mod config;
pub mod coverage;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod part;
pub mod plane;
pub mod soma;
pub mod spirit;
pub mod types;

pub use blueprint::BodyBlueprint;
pub use config::SomaConfig;
pub use error::{Result, SomaError};
pub use part::ComponentPart;
pub use soma::Soma;
pub use types::*;
