//! Configuration files the phase resolver consults.
//!
//! Two sources, both optional on disk:
//!
//! - `config.yaml` — global defaults, YAML:
//!   ```yaml
//!   status:
//!     phase: 1
//!   ```
//! - `<scope>/meta.json` — per-scope metadata, JSON:
//!   ```json
//!   {"status_phase": 2}
//!   ```
//!
//! Loading is layered with `serde(default)` so a file that only sets some
//! keys still parses; a file that exists but fails to parse is an error,
//! never silently ignored.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Global configuration (`config.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub status: StatusConfig,
}

/// The `status:` section of the global configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Global default rollout phase, if set.
    #[serde(default)]
    pub phase: Option<u8>,
}

impl GlobalConfig {
    /// Load from a YAML file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// Load from a YAML file if one is configured and present; defaults
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Fails only if a file exists but cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }
}

/// Per-scope metadata (`meta.json`).
///
/// Unknown keys are preserved-by-ignoring: other tools may keep their own
/// metadata in the same file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeMeta {
    /// Per-scope rollout phase override, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_phase: Option<u8>,
}

impl ScopeMeta {
    /// Load from a JSON file, defaulting when the file does not exist.
    ///
    /// # Errors
    ///
    /// Fails if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read scope meta at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse scope meta at {}", path.display()))
    }
}
