//! Lantern Core Library
//!
//! The room session engine: models, phase machine, seat registry,
//! assignment engine, nomination/vote engine, execution resolver, and the
//! per-viewer visibility projector. Pure state + logic; transport lives in
//! `lantern-net`.

pub mod assign;
pub mod ballot;
pub mod command;
pub mod error;
pub mod invariants;
pub mod models;
pub mod phase;
pub mod projection;
pub mod registry;
pub mod seating;
pub mod verdict;

pub use command::Command;
pub use error::{AssignmentGap, Error, RejectionKind, Result};
pub use models::*;
pub use projection::{project, Principal, RoomSnapshot};
pub use registry::{CatalogError, ScriptRegistry};
pub use verdict::{execution_threshold, BlockOutcome};
