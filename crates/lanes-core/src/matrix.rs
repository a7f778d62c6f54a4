//! The transition matrix: which lane pairs are legal, and the guard each
//! pair carries.
//!
//! The table is a closed match over `(Lane, Lane)` so the compiler checks
//! exhaustiveness whenever a lane is added. Guards are attached per
//! transition, not global; `force = true` bypasses the pair table and the
//! guards but never the actor/reason requirement.

use crate::error::ErrorCode;
use crate::model::evidence::DoneEvidence;
use crate::model::lane::Lane;

/// Facts about the caller's environment that guards consume.
///
/// The engine does not inspect worktrees or subtask lists itself; callers
/// assert these preconditions and the matrix holds them to account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preconditions {
    /// An execution context (worktree, checkout, job) exists for the item.
    pub execution_ready: bool,
    /// The item's subtasks are complete.
    pub subtasks_complete: bool,
}

/// Everything the matrix needs to judge one requested transition.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRequest<'a> {
    pub from: Lane,
    pub to: Lane,
    pub force: bool,
    pub actor: &'a str,
    pub reason: Option<&'a str>,
    pub evidence: Option<&'a DoneEvidence>,
    pub review_ref: Option<&'a str>,
    pub preconditions: Preconditions,
}

/// Why a requested transition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The lane pair is not in the matrix and the request was not forced.
    #[error(
        "transition {from} -> {to} is not allowed by the lane matrix; \
         a forced transition with actor and reason can override"
    )]
    IllegalTransition { from: Lane, to: Lane },

    /// The pair is legal but its guard is unmet.
    #[error("transition {from} -> {to} requires {requirement}")]
    MissingGuardEvidence {
        from: Lane,
        to: Lane,
        requirement: &'static str,
    },

    /// `force = true` with an empty actor or reason.
    #[error("forced transition requires a non-empty {missing}")]
    MissingForceJustification { missing: &'static str },
}

impl TransitionError {
    /// Stable machine-readable code for this rejection.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::IllegalTransition { .. } => ErrorCode::IllegalTransition,
            Self::MissingGuardEvidence { .. } => ErrorCode::MissingGuardEvidence,
            Self::MissingForceJustification { .. } => ErrorCode::MissingForceJustification,
        }
    }
}

/// Whether `(from, to)` is in the legal-transition table.
///
/// Same-lane requests are no-ops and never legal. `done` and `canceled`
/// have no outgoing edges; leaving either requires force.
#[must_use]
pub const fn is_allowed(from: Lane, to: Lane) -> bool {
    matches!(
        (from, to),
        (Lane::Planned, Lane::Claimed)
            | (Lane::Claimed, Lane::InProgress)
            | (Lane::InProgress, Lane::ForReview | Lane::Planned)
            | (Lane::ForReview, Lane::Done | Lane::InProgress)
            | (
                Lane::Planned | Lane::Claimed | Lane::InProgress | Lane::ForReview,
                Lane::Blocked
            )
            | (Lane::Blocked, Lane::InProgress)
            | (
                Lane::Planned | Lane::Claimed | Lane::InProgress | Lane::ForReview | Lane::Blocked,
                Lane::Canceled
            )
    )
}

/// Validate a requested transition against the matrix and its guard.
///
/// A forced request skips the pair table and the guard but must still carry
/// a non-empty actor and reason — that requirement is an invariant, not a
/// policy knob.
///
/// # Errors
///
/// - [`TransitionError::MissingForceJustification`] when forced without
///   actor or reason.
/// - [`TransitionError::IllegalTransition`] when the pair is not in the
///   table and the request is not forced.
/// - [`TransitionError::MissingGuardEvidence`] when the pair is legal but
///   its guard is unmet; the message names what would satisfy it.
pub fn validate(req: &TransitionRequest<'_>) -> Result<(), TransitionError> {
    if req.force {
        if req.actor.trim().is_empty() {
            return Err(TransitionError::MissingForceJustification { missing: "actor" });
        }
        if !req.reason.is_some_and(|r| !r.trim().is_empty()) {
            return Err(TransitionError::MissingForceJustification { missing: "reason" });
        }
        return Ok(());
    }

    if !is_allowed(req.from, req.to) {
        return Err(TransitionError::IllegalTransition {
            from: req.from,
            to: req.to,
        });
    }

    check_guard(req)
}

/// Per-transition guard dispatch. One arm per guarded pair; everything else
/// in the table passes unconditionally.
fn check_guard(req: &TransitionRequest<'_>) -> Result<(), TransitionError> {
    let unmet = |requirement: &'static str| TransitionError::MissingGuardEvidence {
        from: req.from,
        to: req.to,
        requirement,
    };

    match (req.from, req.to) {
        (Lane::Planned, Lane::Claimed) => {
            if req.actor.trim().is_empty() {
                return Err(unmet("a claiming actor"));
            }
        }
        (Lane::Claimed, Lane::InProgress) => {
            if !req.preconditions.execution_ready {
                return Err(unmet("an execution context for the item"));
            }
        }
        (Lane::InProgress, Lane::ForReview) => {
            if !req.preconditions.subtasks_complete {
                return Err(unmet("completed subtasks (or a forced override)"));
            }
        }
        (Lane::ForReview, Lane::Done) => {
            if !req.evidence.is_some_and(DoneEvidence::is_approved) {
                return Err(unmet("review evidence with an approved verdict"));
            }
        }
        (Lane::ForReview, Lane::InProgress) => {
            if !req.review_ref.is_some_and(|r| !r.trim().is_empty()) {
                return Err(unmet("a review reference marking the rollback"));
            }
        }
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
