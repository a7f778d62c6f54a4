//! Lanes: the closed set of lifecycle states a work package moves through.
//!
//! Seven canonical lanes plus one input-boundary alias (`doing`, accepted in
//! place of `in_progress`). The alias is resolved during parsing and never
//! reaches a persisted event or snapshot: serde deserialization of stored
//! records accepts only canonical spellings.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The seven lifecycle lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Planned,
    Claimed,
    InProgress,
    ForReview,
    Done,
    Blocked,
    Canceled,
}

impl Lane {
    /// All lanes in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Planned,
        Self::Claimed,
        Self::InProgress,
        Self::ForReview,
        Self::Done,
        Self::Blocked,
        Self::Canceled,
    ];

    /// Canonical lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Claimed => "claimed",
            Self::InProgress => "in_progress",
            Self::ForReview => "for_review",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Canceled => "canceled",
        }
    }

    /// Terminal lanes have no outgoing edges in the transition matrix;
    /// leaving one requires a forced transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a lane from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLaneError {
    /// The unrecognised input string.
    pub got: String,
}

impl fmt::Display for ParseLaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid lane '{}': expected one of planned, claimed, in_progress, \
             for_review, done, blocked, canceled (alias: doing)",
            self.got
        )
    }
}

impl std::error::Error for ParseLaneError {}

impl ParseLaneError {
    /// Stable machine-readable code for this rejection.
    #[must_use]
    pub const fn code(&self) -> crate::error::ErrorCode {
        crate::error::ErrorCode::InvalidLaneValue
    }
}

impl FromStr for Lane {
    type Err = ParseLaneError;

    /// Parse a lane name, resolving the `doing` alias to `in_progress`.
    ///
    /// This is the input boundary: callers hand free text in, canonical
    /// lanes come out. Persisted records do not go through here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planned" => Ok(Self::Planned),
            "claimed" => Ok(Self::Claimed),
            "in_progress" | "doing" => Ok(Self::InProgress),
            "for_review" => Ok(Self::ForReview),
            "done" => Ok(Self::Done),
            "blocked" => Ok(Self::Blocked),
            "canceled" => Ok(Self::Canceled),
            _ => Err(ParseLaneError { got: s.to_string() }),
        }
    }
}

/// Where the work behind a transition is being executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// An isolated worktree dedicated to the item.
    Worktree,
    /// Directly on the primary checkout.
    #[default]
    Direct,
    /// Outside any checkout this engine can see (e.g. hosted CI).
    External,
}

impl ExecutionMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Worktree => "worktree",
            Self::Direct => "direct",
            Self::External => "external",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an execution mode from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseExecutionModeError {
    /// The unrecognised input string.
    pub got: String,
}

impl fmt::Display for ParseExecutionModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid execution mode '{}': expected one of worktree, direct, external",
            self.got
        )
    }
}

impl std::error::Error for ParseExecutionModeError {}

impl FromStr for ExecutionMode {
    type Err = ParseExecutionModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "worktree" => Ok(Self::Worktree),
            "direct" => Ok(Self::Direct),
            "external" => Ok(Self::External),
            _ => Err(ParseExecutionModeError { got: s.to_string() }),
        }
    }
}
