//! The status event: the sole unit of write.
//!
//! A [`StatusEvent`] records one lane transition for one work package. Events
//! are created exactly once by the emit orchestrator, appended to the scope's
//! `status.events.jsonl`, and never mutated or deleted — corrections are new
//! events, optionally forced. Everything else the engine produces (snapshots,
//! lane counts) is a pure function of the event sequence.
//!
//! # Wire format
//!
//! One JSON object per line, field names exactly as the struct declares them.
//! Deserialization is strict (`deny_unknown_fields`): a record that does not
//! match the schema surfaces as corruption instead of being half-read.

pub mod canonical;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::model::evidence::DoneEvidence;
use crate::model::lane::{ExecutionMode, Lane};

/// Fixed-format timestamp serde: RFC 3339 UTC with exactly six fractional
/// digits (`2026-03-01T12:00:00.000000Z`). Reads are lenient (any RFC 3339
/// offset), writes are byte-stable.
pub mod ts {
    use chrono::{DateTime, SecondsFormat, Timelike, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Render a timestamp in the persisted format.
    #[must_use]
    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Current UTC time truncated to microsecond precision, so an in-memory
    /// event and its replayed form compare and sort identically.
    #[must_use]
    pub fn now() -> DateTime<Utc> {
        let now = Utc::now();
        now.with_nanosecond(now.timestamp_subsec_micros() * 1000)
            .unwrap_or(now)
    }

    /// Serialize in the fixed persisted format.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    /// Deserialize from any RFC 3339 timestamp, normalized to UTC.
    ///
    /// # Errors
    ///
    /// Fails if the input is not valid RFC 3339.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// One immutable lane transition.
///
/// # Fields
///
/// - `event_id` — ULID; its lexicographic order is time-monotonic, giving
///   the reducer a total `(at, event_id)` order.
/// - `item_id` / `scope_id` — the owning work package and feature scope.
/// - `from_lane` / `to_lane` — canonical lanes; aliases never reach here.
/// - `at` — UTC, microsecond precision, fixed wire format.
/// - `actor` — who performed the transition (human, agent, or job id).
/// - `force` — explicit override of matrix and guard checks; requires `reason`.
/// - `execution_mode` — where the work is happening.
/// - `review_ref` — set only on a `for_review -> in_progress` reviewer
///   rollback; this is the signal that wins over concurrent forward progress.
/// - `evidence` — completion proof, required on unforced `done` transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusEvent {
    pub event_id: Ulid,
    pub item_id: String,
    pub scope_id: String,
    pub from_lane: Lane,
    pub to_lane: Lane,
    #[serde(with = "ts")]
    pub at: DateTime<Utc>,
    pub actor: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<DoneEvidence>,
}

/// Structural validation failures for a single event.
///
/// These are about the event's own shape; whether the lane pair is legal is
/// the transition matrix's concern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventValidationError {
    #[error("status event requires a non-empty actor")]
    EmptyActor,

    #[error("forced transition requires a non-empty reason")]
    MissingForceReason,

    #[error("transition to done requires evidence (or force)")]
    MissingDoneEvidence,

    #[error(
        "review_ref is only valid on a for_review -> in_progress rollback, not {from} -> {to}"
    )]
    UnexpectedReviewRef { from: Lane, to: Lane },
}

impl EventValidationError {
    /// Stable machine-readable code for this rejection.
    #[must_use]
    pub const fn code(&self) -> crate::error::ErrorCode {
        crate::error::ErrorCode::InvalidEventField
    }
}

impl StatusEvent {
    /// Check the event's structural invariants.
    ///
    /// # Errors
    ///
    /// - [`EventValidationError::EmptyActor`] if `actor` is blank.
    /// - [`EventValidationError::MissingForceReason`] if `force` without a reason.
    /// - [`EventValidationError::MissingDoneEvidence`] on an unforced `done`
    ///   transition without evidence.
    /// - [`EventValidationError::UnexpectedReviewRef`] if `review_ref` is set
    ///   on anything but a `for_review -> in_progress` rollback.
    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.actor.trim().is_empty() {
            return Err(EventValidationError::EmptyActor);
        }
        let has_reason = self
            .reason
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        if self.force && !has_reason {
            return Err(EventValidationError::MissingForceReason);
        }
        if self.to_lane == Lane::Done && !self.force && self.evidence.is_none() {
            return Err(EventValidationError::MissingDoneEvidence);
        }
        if self.review_ref.is_some() && !self.is_review_rollback() {
            return Err(EventValidationError::UnexpectedReviewRef {
                from: self.from_lane,
                to: self.to_lane,
            });
        }
        Ok(())
    }

    /// An explicit reviewer rollback: `for_review -> in_progress` carrying a
    /// reference to the review feedback. Rollbacks take precedence over
    /// concurrent forward progress during reduction.
    #[must_use]
    pub fn is_review_rollback(&self) -> bool {
        self.review_ref.is_some()
            && self.from_lane == Lane::ForReview
            && self.to_lane == Lane::InProgress
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} -> {} by {}",
            ts::format(&self.at),
            self.item_id,
            self.from_lane,
            self.to_lane,
            self.actor,
        )?;
        if self.force {
            f.write_str(" (forced)")?;
        }
        if self.review_ref.is_some() {
            f.write_str(" (rollback)")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
