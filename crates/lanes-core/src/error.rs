use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
///
/// Every rejection or failure the engine can produce maps to one stable
/// code. Agents and CI wrappers branch on the code; humans read the
/// message and hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidLaneValue,
    IllegalTransition,
    MissingGuardEvidence,
    MissingForceJustification,
    InvalidEventField,
    CorruptRecord,
    CorruptSnapshot,
    StaleSnapshot,
    EventAppendFailed,
    SnapshotWriteFailed,
    EventLogReadFailed,
    ViewRegenerationFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidLaneValue => "E1002",
            Self::IllegalTransition => "E2001",
            Self::MissingGuardEvidence => "E2002",
            Self::MissingForceJustification => "E2003",
            Self::InvalidEventField => "E2004",
            Self::CorruptRecord => "E3001",
            Self::CorruptSnapshot => "E3002",
            Self::StaleSnapshot => "E3003",
            Self::EventAppendFailed => "E5001",
            Self::SnapshotWriteFailed => "E5002",
            Self::EventLogReadFailed => "E5003",
            Self::ViewRegenerationFailed => "E5004",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidLaneValue => "Invalid lane value",
            Self::IllegalTransition => "Illegal lane transition",
            Self::MissingGuardEvidence => "Transition guard not satisfied",
            Self::MissingForceJustification => "Forced transition lacks justification",
            Self::InvalidEventField => "Invalid status event field",
            Self::CorruptRecord => "Corrupt event record",
            Self::CorruptSnapshot => "Corrupt status snapshot",
            Self::StaleSnapshot => "Snapshot disagrees with the event log",
            Self::EventAppendFailed => "Event log append failed",
            Self::SnapshotWriteFailed => "Snapshot write failed",
            Self::EventLogReadFailed => "Event log read failed",
            Self::ViewRegenerationFailed => "Legacy view regeneration failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in config.yaml / meta.json and retry."),
            Self::InvalidLaneValue => {
                Some("Use one of: planned, claimed, in_progress, for_review, done, blocked, canceled.")
            }
            Self::IllegalTransition => {
                Some("Consult the lane matrix, or force the transition with an actor and reason.")
            }
            Self::MissingGuardEvidence => {
                Some("Supply the evidence or precondition named in the error, or force with a reason.")
            }
            Self::MissingForceJustification => {
                Some("Forced transitions always require a non-empty actor and reason.")
            }
            Self::InvalidEventField => None,
            Self::CorruptRecord => {
                Some("Inspect the reported line; repair or explicitly discard it. Nothing is skipped silently.")
            }
            Self::CorruptSnapshot => Some("Delete status.json and rebuild it from the event log."),
            Self::StaleSnapshot => Some("Rematerialize the scope; the event log is authoritative."),
            Self::EventAppendFailed => Some("Check disk space and write permissions."),
            Self::SnapshotWriteFailed => Some("Check disk space; the event log is unaffected."),
            Self::EventLogReadFailed => Some("Check file permissions on the scope directory."),
            Self::ViewRegenerationFailed => {
                Some("The event is already durably appended; rerun the view generator.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
