//! The derived status snapshot.
//!
//! A snapshot is a cache of the reduction, never authoritative: it may be
//! discarded and rebuilt from the event log at any time without information
//! loss. Serialization goes through the canonical JSON writer so identical
//! event sequences produce byte-identical `status.json` files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

use crate::event::canonical::canonical_json;
use crate::event::ts;
use crate::model::lane::Lane;

/// Current state of one work package, as reduced from its events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemStatus {
    pub lane: Lane,
    pub last_actor: String,
    #[serde(with = "ts")]
    pub last_at: DateTime<Utc>,
    pub last_event_id: Ulid,
    /// How many applied transitions for this item were forced.
    pub force_count: u64,
}

/// Per-scope summary of every item plus aggregate lane counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusSnapshot {
    /// Item id -> current status. `BTreeMap` keeps key order stable.
    pub items: BTreeMap<String, ItemStatus>,
    /// Number of items currently in each lane; lanes with zero items are
    /// omitted.
    pub lane_counts: BTreeMap<Lane, u64>,
    /// Number of distinct events that produced this snapshot.
    pub event_count: u64,
}

impl StatusSnapshot {
    /// Current lane of an item, if the scope has seen any event for it.
    #[must_use]
    pub fn lane_of(&self, item_id: &str) -> Option<Lane> {
        self.items.get(item_id).map(|s| s.lane)
    }

    /// Serialize to canonical JSON: compact, keys sorted at every depth.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialization failures.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        Ok(canonical_json(&serde_json::to_value(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::{ItemStatus, StatusSnapshot};
    use crate::model::lane::Lane;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn status(lane: Lane) -> ItemStatus {
        ItemStatus {
            lane,
            last_actor: "alice".into(),
            last_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            last_event_id: Ulid::from_string("01HZA3M9Q0AAAAAAAAAAAAAAAA").unwrap(),
            force_count: 0,
        }
    }

    fn sample() -> StatusSnapshot {
        let mut snap = StatusSnapshot::default();
        snap.items.insert("PKG-9".into(), status(Lane::Done));
        snap.items.insert("PKG-1".into(), status(Lane::Claimed));
        snap.lane_counts.insert(Lane::Done, 1);
        snap.lane_counts.insert(Lane::Claimed, 1);
        snap.event_count = 5;
        snap
    }

    #[test]
    fn lane_of_known_and_unknown() {
        let snap = sample();
        assert_eq!(snap.lane_of("PKG-1"), Some(Lane::Claimed));
        assert_eq!(snap.lane_of("PKG-404"), None);
    }

    #[test]
    fn serde_roundtrip() {
        let snap = sample();
        let json = snap.to_canonical_json().unwrap();
        let back: StatusSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
    }

    #[test]
    fn canonical_json_is_sorted_and_compact() {
        let json = sample().to_canonical_json().unwrap();
        assert!(json.starts_with(r#"{"event_count":5,"items":{"PKG-1""#), "{json}");
        assert!(!json.contains(' '));
    }

    #[test]
    fn canonical_json_is_insertion_order_independent() {
        let a = sample();
        let mut b = StatusSnapshot {
            event_count: 5,
            ..StatusSnapshot::default()
        };
        // Insert in the opposite order
        b.lane_counts.insert(Lane::Claimed, 1);
        b.lane_counts.insert(Lane::Done, 1);
        b.items.insert("PKG-1".into(), status(Lane::Claimed));
        b.items.insert("PKG-9".into(), status(Lane::Done));
        assert_eq!(
            a.to_canonical_json().unwrap(),
            b.to_canonical_json().unwrap()
        );
    }

    #[test]
    fn timestamps_use_fixed_format() {
        let json = sample().to_canonical_json().unwrap();
        assert!(json.contains("\"last_at\":\"2026-03-01T12:00:00.000000Z\""));
    }

    #[test]
    fn empty_snapshot_canonical_form() {
        let snap = StatusSnapshot::default();
        assert_eq!(
            snap.to_canonical_json().unwrap(),
            r#"{"event_count":0,"items":{},"lane_counts":{}}"#
        );
    }
}
