//! Immutable value types: lanes, completion evidence, and the derived
//! per-scope snapshot.

pub mod evidence;
pub mod lane;
pub mod snapshot;

pub use evidence::{DoneEvidence, RepoRef, ReviewApproval, ReviewVerdict, VerificationResult, VerifyOutcome};
pub use lane::{ExecutionMode, Lane, ParseExecutionModeError, ParseLaneError};
pub use snapshot::{ItemStatus, StatusSnapshot};
