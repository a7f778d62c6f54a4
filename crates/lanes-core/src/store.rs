//! Append-only, file-backed persistence for status events and snapshots.
//!
//! # Directory layout (per scope)
//!
//! ```text
//! <root>/<scope_id>/
//!   status.events.jsonl   # canonical, append-only, one JSON record per line
//!   status.json           # derived snapshot, regenerable, never hand-edited
//!   meta.json             # optional per-scope phase override
//! ```
//!
//! # Invariants
//!
//! - Each append is one `write_all` + `flush`; a batch of events is one
//!   buffered write so a multi-event operation never becomes partially
//!   visible.
//! - Snapshot writes go to a temporary file and then rename into place, so a
//!   crash mid-write never corrupts the previously-valid snapshot.
//! - A record that fails to parse surfaces its 1-based line number; nothing
//!   is skipped silently. Blank lines are the one tolerated artifact, since
//!   text-level merges of append-only files can introduce them.
//! - One appending process per scope is assumed; concurrent histories from
//!   other machines or branches are merged by concatenation and reduced
//!   deterministically, not serialized by locks.

use std::fs::{self, OpenOptions};
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ErrorCode;
use crate::event::StatusEvent;
use crate::model::snapshot::StatusSnapshot;

/// Canonical event log file name within a scope directory.
pub const EVENTS_FILE: &str = "status.events.jsonl";

/// Derived snapshot file name within a scope directory.
pub const SNAPSHOT_FILE: &str = "status.json";

/// Optional per-scope metadata (phase override) file name.
pub const META_FILE: &str = "meta.json";

const SNAPSHOT_TMP_FILE: &str = "status.json.tmp";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures while reading or writing the on-disk representation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Appending to the event log failed; the log is unmodified.
    #[error("failed to append to event log {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading a scope file failed for filesystem reasons.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing or renaming the snapshot failed; the event log is unaffected.
    #[error("failed to write snapshot {path}: {source}")]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stored event record failed to parse. `line` is 1-based.
    #[error("corrupt event record at {path}:{line}: {detail}")]
    CorruptRecord {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    /// The snapshot file exists but does not parse.
    #[error("corrupt snapshot at {path}: {detail}")]
    CorruptSnapshot { path: PathBuf, detail: String },

    /// Serializing an event or snapshot failed.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A serialized record contained a literal newline (one-line invariant).
    #[error("serialized record contains a literal newline")]
    NewlineInPayload,
}

impl StoreError {
    /// Stable machine-readable code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Append { .. } | Self::Serialize(_) | Self::NewlineInPayload => {
                ErrorCode::EventAppendFailed
            }
            Self::Read { .. } => ErrorCode::EventLogReadFailed,
            Self::SnapshotWrite { .. } => ErrorCode::SnapshotWriteFailed,
            Self::CorruptRecord { .. } => ErrorCode::CorruptRecord,
            Self::CorruptSnapshot { .. } => ErrorCode::CorruptSnapshot,
        }
    }
}

// ---------------------------------------------------------------------------
// EventStore
// ---------------------------------------------------------------------------

/// Owns the on-disk event sequence for every scope under one root directory.
#[derive(Debug, Clone)]
pub struct EventStore {
    root: PathBuf,
}

impl EventStore {
    /// Create a store rooted at `root`. Directories are created lazily on
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory this store manages.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one scope's files.
    #[must_use]
    pub fn scope_dir(&self, scope_id: &str) -> PathBuf {
        self.root.join(scope_id)
    }

    /// Path of a scope's event log.
    #[must_use]
    pub fn events_path(&self, scope_id: &str) -> PathBuf {
        self.scope_dir(scope_id).join(EVENTS_FILE)
    }

    /// Path of a scope's derived snapshot.
    #[must_use]
    pub fn snapshot_path(&self, scope_id: &str) -> PathBuf {
        self.scope_dir(scope_id).join(SNAPSHOT_FILE)
    }

    /// Path of a scope's optional metadata file.
    #[must_use]
    pub fn meta_path(&self, scope_id: &str) -> PathBuf {
        self.scope_dir(scope_id).join(META_FILE)
    }

    /// Append one event to the scope's log.
    ///
    /// # Errors
    ///
    /// Serialization or I/O failures; on error the log is unmodified (the
    /// record is fully serialized before the file is opened).
    pub fn append(&self, scope_id: &str, event: &StatusEvent) -> Result<(), StoreError> {
        self.append_payload(scope_id, &event_line(event)?, 1)
    }

    /// Append a batch of events as one buffered write.
    ///
    /// The whole batch is serialized up front and written with a single
    /// `write_all`, so a logical multi-event operation (e.g. a migration
    /// import) never becomes partially visible to a concurrent reader.
    ///
    /// # Errors
    ///
    /// Serialization or I/O failures; on error the log is unmodified.
    pub fn append_batch(&self, scope_id: &str, events: &[StatusEvent]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut payload = String::new();
        for event in events {
            payload.push_str(&event_line(event)?);
        }
        self.append_payload(scope_id, &payload, events.len())
    }

    fn append_payload(
        &self,
        scope_id: &str,
        payload: &str,
        count: usize,
    ) -> Result<(), StoreError> {
        let path = self.events_path(scope_id);
        self.ensure_scope_dir(scope_id, &path)?;
        let io_err = |source| StoreError::Append {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(io_err)?;
        file.write_all(payload.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        debug!(scope = scope_id, events = count, "appended to event log");
        Ok(())
    }

    /// Read and parse every event in the scope's log, in file order.
    ///
    /// A missing log is an empty sequence. Blank lines are skipped; any
    /// other unparseable line is fatal and reported with its 1-based line
    /// number; corruption surfaces, it is never swallowed.
    ///
    /// # Errors
    ///
    /// [`StoreError::Read`] on filesystem failure,
    /// [`StoreError::CorruptRecord`] on the first malformed record.
    pub fn read_all(&self, scope_id: &str) -> Result<Vec<StatusEvent>, StoreError> {
        let path = self.events_path(scope_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Read { path, source: err }),
        };

        let mut events = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event: StatusEvent =
                serde_json::from_str(line).map_err(|err| StoreError::CorruptRecord {
                    path: path.clone(),
                    line: idx + 1,
                    detail: err.to_string(),
                })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Atomically write the scope's snapshot: serialize to canonical JSON,
    /// write a temporary file, rename into place.
    ///
    /// # Errors
    ///
    /// Serialization or I/O failures; the previously-valid snapshot (if any)
    /// survives any failure here.
    pub fn write_snapshot(
        &self,
        scope_id: &str,
        snapshot: &StatusSnapshot,
    ) -> Result<(), StoreError> {
        let path = self.snapshot_path(scope_id);
        self.ensure_scope_dir(scope_id, &path)?;
        let mut payload = snapshot.to_canonical_json()?;
        payload.push('\n');

        let tmp = self.scope_dir(scope_id).join(SNAPSHOT_TMP_FILE);
        fs::write(&tmp, payload).map_err(|source| StoreError::SnapshotWrite {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::SnapshotWrite {
            path: path.clone(),
            source,
        })?;
        debug!(scope = scope_id, "snapshot written");
        Ok(())
    }

    /// Read the scope's cached snapshot, if one exists.
    ///
    /// A missing snapshot is `None`: always safe, it can be rebuilt from
    /// the log.
    ///
    /// # Errors
    ///
    /// [`StoreError::CorruptSnapshot`] if the file exists but does not
    /// parse; the caller decides whether to discard and rebuild.
    pub fn read_snapshot(&self, scope_id: &str) -> Result<Option<StatusSnapshot>, StoreError> {
        let path = self.snapshot_path(scope_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Read { path, source: err }),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StoreError::CorruptSnapshot {
                path,
                detail: err.to_string(),
            })
    }

    fn ensure_scope_dir(&self, scope_id: &str, for_path: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(self.scope_dir(scope_id)).map_err(|source| StoreError::Append {
            path: for_path.to_path_buf(),
            source,
        })
    }
}

/// Serialize one event to its JSONL line (with trailing newline).
fn event_line(event: &StatusEvent) -> Result<String, StoreError> {
    let mut json = serde_json::to_string(event)?;
    if json.contains('\n') {
        return Err(StoreError::NewlineInPayload);
    }
    json.push('\n');
    Ok(json)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
