//! Phase-gated rollout: which read/write mode the engine runs in.
//!
//! The event log coexists with a legacy "current state only" representation
//! during migration. A phase per scope decides how:
//!
//! - **0, hardening** — validate-only; no event is appended, the legacy
//!   state stays authoritative.
//! - **1, dual-write** — events are appended and the legacy compatibility
//!   view is regenerated; the legacy view remains the read source for
//!   external consumers.
//! - **2, canonical-read** — the event log plus the reducer is the sole
//!   source of truth; the legacy view is a generated-only cache.
//!
//! Resolution is three-tier, highest first: per-scope override → global
//! default → built-in default. The resolved context always records which
//! tier decided, for diagnosability.

use std::fmt;

use crate::config::{GlobalConfig, ScopeMeta};
use crate::error::ErrorCode;

/// The rollout phase of one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Validate-only; the event log is not yet written.
    Hardening,
    /// Events are appended and the legacy view is kept in sync.
    DualWrite,
    /// The event log is the sole read source.
    CanonicalRead,
}

impl Phase {
    /// The numeric form used in configuration files.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Hardening => 0,
            Self::DualWrite => 1,
            Self::CanonicalRead => 2,
        }
    }

    /// Parse the numeric configuration form.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Hardening),
            1 => Some(Self::DualWrite),
            2 => Some(Self::CanonicalRead),
            _ => None,
        }
    }

    /// Whether emit appends events in this phase.
    #[must_use]
    pub const fn appends_events(self) -> bool {
        !matches!(self, Self::Hardening)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hardening => "hardening",
            Self::DualWrite => "dual-write",
            Self::CanonicalRead => "canonical-read",
        };
        write!(f, "{} ({name})", self.as_u8())
    }
}

/// Which configuration tier supplied the resolved phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseSource {
    /// `<scope>/meta.json` set `status_phase`.
    ScopeOverride,
    /// `config.yaml` set `status.phase`.
    GlobalConfig,
    /// Neither file set a phase.
    BuiltinDefault,
}

impl PhaseSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ScopeOverride => "scope meta.json override",
            Self::GlobalConfig => "global config.yaml default",
            Self::BuiltinDefault => "built-in default",
        }
    }
}

impl fmt::Display for PhaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for PhaseSource {}

/// The phase decision for one scope, computed once per operation and passed
/// explicitly, never read from ambient global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseContext {
    pub scope_id: String,
    pub phase: Phase,
    pub source: PhaseSource,
}

/// Phase resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    /// A configuration tier supplied a phase outside `0..=2`.
    #[error("invalid status phase {value} from {source}: expected 0, 1, or 2")]
    InvalidPhase { value: u8, source: PhaseSource },

    /// A configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

impl PhaseError {
    /// Stable machine-readable code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ConfigParseError
    }
}

/// Resolve the active phase for a scope from already-loaded configuration.
///
/// Tier precedence, highest first: scope override → global default →
/// built-in default ([`Phase::Hardening`]).
///
/// # Errors
///
/// [`PhaseError::InvalidPhase`] if the winning tier holds a number outside
/// `0..=2`; an invalid value is surfaced, not skipped in favor of a lower
/// tier.
pub fn resolve_phase(
    meta: &ScopeMeta,
    global: &GlobalConfig,
    scope_id: &str,
) -> Result<PhaseContext, PhaseError> {
    let (value, source) = if let Some(value) = meta.status_phase {
        (value, PhaseSource::ScopeOverride)
    } else if let Some(value) = global.status.phase {
        (value, PhaseSource::GlobalConfig)
    } else {
        (Phase::Hardening.as_u8(), PhaseSource::BuiltinDefault)
    };

    let phase = Phase::from_u8(value).ok_or(PhaseError::InvalidPhase { value, source })?;
    Ok(PhaseContext {
        scope_id: scope_id.to_string(),
        phase,
        source,
    })
}
