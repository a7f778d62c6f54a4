//! lanes-core: a local, file-backed status event-sourcing engine.
//!
//! Work packages move through a seven-lane lifecycle driven by many
//! independent actors (humans, agents, CI jobs), possibly concurrently and
//! offline. Every transition is an immutable [`event::StatusEvent`] appended
//! to a per-scope JSONL log; the current state is always a pure
//! [`reduce::reduce`] over that log. Because the reduction is deterministic
//! and order-independent as a set, two histories produced on different
//! branches can be merged by plain text concatenation under source control
//! and still converge to one unambiguous state — including the case where a
//! reviewer's send-back must survive a concurrently-merged "done".
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums per module, each exposing a stable
//!   [`error::ErrorCode`]; `anyhow::Result` only at config loading and
//!   collaborator seams.
//! - **Logging**: `tracing` macros; the library installs no subscriber.

pub mod config;
pub mod emit;
pub mod error;
pub mod event;
pub mod matrix;
pub mod model;
pub mod phase;
pub mod reduce;
pub mod store;

pub use emit::{EmitError, EmitOutcome, EmitRequest, Notifier, SnapshotHealth, StatusEngine, ViewSink};
pub use error::ErrorCode;
pub use event::{EventValidationError, StatusEvent};
pub use matrix::{Preconditions, TransitionError, TransitionRequest};
pub use model::evidence::{DoneEvidence, ReviewApproval, ReviewVerdict};
pub use model::lane::{ExecutionMode, Lane, ParseLaneError};
pub use model::snapshot::{ItemStatus, StatusSnapshot};
pub use phase::{Phase, PhaseContext, PhaseSource};
pub use reduce::reduce;
pub use store::{EventStore, StoreError};
