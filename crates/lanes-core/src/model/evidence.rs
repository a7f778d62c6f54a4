//! Structured completion proof attached to `done` transitions.
//!
//! Evidence is a value, not a reference: everything needed to audit why an
//! item was allowed into `done` travels inside the event itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one verification command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyOutcome {
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
        })
    }
}

/// A reviewer's verdict on the completed work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    ChangesRequested,
}

impl fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
        })
    }
}

/// A repository reference: where the delivered work lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoRef {
    pub repo: String,
    pub branch: String,
    pub commit: String,
    /// Files touched, when the producer knows them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

/// One verification run (build, test suite, linter, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationResult {
    pub command: String,
    pub outcome: VerifyOutcome,
    pub summary: String,
}

/// The single review approval every piece of done-evidence carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewApproval {
    pub reviewer: String,
    pub verdict: ReviewVerdict,
    /// Free-form pointer to the review itself (PR URL, comment id, ...).
    pub reference: String,
}

/// Completion proof: repository references, verification results, and
/// exactly one review approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DoneEvidence {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<RepoRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verifications: Vec<VerificationResult>,
    pub review: ReviewApproval,
}

impl DoneEvidence {
    /// Minimal evidence: an approval with no repo refs or verification runs.
    #[must_use]
    pub fn approved_by(reviewer: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            repos: Vec::new(),
            verifications: Vec::new(),
            review: ReviewApproval {
                reviewer: reviewer.into(),
                verdict: ReviewVerdict::Approved,
                reference: reference.into(),
            },
        }
    }

    /// Whether the attached review approves the work.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self.review.verdict, ReviewVerdict::Approved)
    }
}
