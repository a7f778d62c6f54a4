//! Deterministic reduction of an event sequence into a snapshot.
//!
//! `reduce` is a pure function over an owned, fully-materialized sequence:
//! the same set of events yields byte-identical output regardless of input
//! order. That property is what makes cross-branch merging safe: two
//! independently-appended logs can be concatenated text-wise, deduplicated,
//! and reduced, with no merge tooling beyond this algorithm.
//!
//! # Algorithm
//!
//! 1. Deduplicate by `event_id`, first occurrence wins (duplicates come
//!    from re-delivery, never from distinct facts).
//! 2. Sort by `(at, event_id)`. ULID order is time-monotonic, so ties on
//!    `at` still resolve to one total, deterministic order.
//! 3. Fold per item with rollback-aware precedence (below).
//!
//! # Rollback precedence
//!
//! When two branches each extend the same lane — the incoming event's
//! `from_lane` matches the *previous* event's `from_lane` rather than the
//! current lane — they are concurrent siblings, and ranking them by how
//! "complete" their target lane looks would be wrong: a concurrently-merged
//! `for_review -> done` must not erase a reviewer's `for_review ->
//! in_progress` send-back. A sibling carrying `review_ref` therefore wins
//! regardless of apparent progress; absent a rollback on either side, later
//! `(at, event_id)` wins.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use crate::event::StatusEvent;
use crate::model::snapshot::{ItemStatus, StatusSnapshot};

/// Per-item fold state: the current lane and the event that set it.
struct Folded<'a> {
    last: &'a StatusEvent,
    force_count: u64,
}

/// Reduce an event sequence to its snapshot.
///
/// Pure and total: no I/O, no clock, no shared state. Input order is
/// irrelevant beyond duplicate resolution (first occurrence of an
/// `event_id` wins).
#[must_use]
pub fn reduce(events: &[StatusEvent]) -> StatusSnapshot {
    let mut seen = HashSet::with_capacity(events.len());
    let mut ordered: Vec<&StatusEvent> = Vec::with_capacity(events.len());
    for event in events {
        if seen.insert(event.event_id) {
            ordered.push(event);
        }
    }
    ordered.sort_by_key(|e| (e.at, e.event_id));

    let mut items: BTreeMap<&str, Folded<'_>> = BTreeMap::new();
    for &event in &ordered {
        match items.entry(event.item_id.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(Folded {
                    last: event,
                    force_count: u64::from(event.force),
                });
            }
            Entry::Occupied(mut slot) => {
                let folded = slot.get_mut();
                if wins_over(event, folded.last) {
                    folded.last = event;
                    folded.force_count += u64::from(event.force);
                }
            }
        }
    }

    let mut snapshot = StatusSnapshot {
        event_count: ordered.len() as u64,
        ..StatusSnapshot::default()
    };
    for (item_id, folded) in items {
        *snapshot.lane_counts.entry(folded.last.to_lane).or_insert(0) += 1;
        snapshot.items.insert(
            item_id.to_string(),
            ItemStatus {
                lane: folded.last.to_lane,
                last_actor: folded.last.actor.clone(),
                last_at: folded.last.at,
                last_event_id: folded.last.event_id,
                force_count: folded.force_count,
            },
        );
    }
    snapshot
}

/// Decide whether `incoming` (later in the total order) supersedes the
/// state set by `applied`.
///
/// - A causal successor (`from_lane` matches the current lane) always
///   applies.
/// - Concurrent siblings (same `from_lane` as the applied event) defer to
///   an applied rollback; otherwise the later event wins.
/// - Anything else (out-of-lane histories, forced corrections) follows the
///   default later-wins precedence.
fn wins_over(incoming: &StatusEvent, applied: &StatusEvent) -> bool {
    if incoming.from_lane == applied.to_lane {
        return true;
    }
    if incoming.from_lane == applied.from_lane
        && applied.is_review_rollback()
        && !incoming.is_review_rollback()
    {
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::reduce;
    use crate::event::StatusEvent;
    use crate::model::lane::{ExecutionMode, Lane};
    use chrono::{DateTime, TimeZone, Utc};
    use ulid::Ulid;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, secs).unwrap()
    }

    fn event(id: &str, item: &str, from: Lane, to: Lane, secs: u32, actor: &str) -> StatusEvent {
        StatusEvent {
            event_id: Ulid::from_string(id).unwrap(),
            item_id: item.into(),
            scope_id: "checkout-flow".into(),
            from_lane: from,
            to_lane: to,
            at: at(secs),
            actor: actor.into(),
            force: false,
            reason: None,
            execution_mode: ExecutionMode::Direct,
            review_ref: None,
            evidence: None,
        }
    }

    // ULIDs ordered lexicographically: A < B < C < D
    const ID_A: &str = "01HZA3M9Q0AAAAAAAAAAAAAAAA";
    const ID_B: &str = "01HZA3M9Q0BBBBBBBBBBBBBBBB";
    const ID_C: &str = "01HZA3M9Q0CCCCCCCCCCCCCCCC";
    const ID_D: &str = "01HZA3M9Q0DDDDDDDDDDDDDDDD";

    #[test]
    fn empty_input_empty_snapshot() {
        let snap = reduce(&[]);
        assert!(snap.items.is_empty());
        assert!(snap.lane_counts.is_empty());
        assert_eq!(snap.event_count, 0);
    }

    #[test]
    fn linear_history_folds_to_last_lane() {
        let events = vec![
            event(ID_A, "PKG-1", Lane::Planned, Lane::Claimed, 1, "alice"),
            event(ID_B, "PKG-1", Lane::Claimed, Lane::InProgress, 2, "alice"),
            event(ID_C, "PKG-1", Lane::InProgress, Lane::ForReview, 3, "alice"),
        ];
        let snap = reduce(&events);
        assert_eq!(snap.lane_of("PKG-1"), Some(Lane::ForReview));
        let item = &snap.items["PKG-1"];
        assert_eq!(item.last_actor, "alice");
        assert_eq!(item.last_event_id.to_string(), ID_C);
        assert_eq!(item.force_count, 0);
        assert_eq!(snap.event_count, 3);
        assert_eq!(snap.lane_counts[&Lane::ForReview], 1);
    }

    #[test]
    fn duplicates_are_dropped() {
        let e = event(ID_A, "PKG-1", Lane::Planned, Lane::Claimed, 1, "alice");
        let snap = reduce(&[e.clone(), e.clone(), e]);
        assert_eq!(snap.event_count, 1);
        assert_eq!(snap.lane_of("PKG-1"), Some(Lane::Claimed));
    }

    #[test]
    fn order_independence() {
        let mut events = vec![
            event(ID_A, "PKG-1", Lane::Planned, Lane::Claimed, 1, "alice"),
            event(ID_B, "PKG-1", Lane::Claimed, Lane::InProgress, 2, "bob"),
            event(ID_C, "PKG-2", Lane::Planned, Lane::Claimed, 2, "carol"),
            event(ID_D, "PKG-1", Lane::InProgress, Lane::ForReview, 3, "bob"),
        ];
        let forward = reduce(&events);
        events.reverse();
        let backward = reduce(&events);
        assert_eq!(forward, backward);
        assert_eq!(
            forward.to_canonical_json().unwrap(),
            backward.to_canonical_json().unwrap()
        );
    }

    #[test]
    fn same_timestamp_resolved_by_event_id() {
        // Concurrent forward/forward at the same instant: the greater ULID wins
        let a = event(ID_A, "PKG-1", Lane::InProgress, Lane::ForReview, 5, "alice");
        let b = event(ID_B, "PKG-1", Lane::InProgress, Lane::Blocked, 5, "bob");
        let forward = reduce(&[a.clone(), b.clone()]);
        let backward = reduce(&[b, a]);
        assert_eq!(forward, backward);
        assert_eq!(forward.lane_of("PKG-1"), Some(Lane::Blocked));
    }

    #[test]
    fn rollback_beats_concurrent_done_in_both_orders() {
        // A: for_review -> done (forward), later in the total order.
        // B: for_review -> in_progress with review_ref (rollback), earlier.
        let done = event(ID_D, "PKG-1", Lane::ForReview, Lane::Done, 9, "agent-7");
        let mut rollback = event(ID_B, "PKG-1", Lane::ForReview, Lane::InProgress, 8, "dana");
        rollback.review_ref = Some("review-41".into());

        let ab = reduce(&[done.clone(), rollback.clone()]);
        let ba = reduce(&[rollback, done]);
        assert_eq!(ab, ba);
        assert_eq!(ab.lane_of("PKG-1"), Some(Lane::InProgress));
    }

    #[test]
    fn rollback_wins_even_when_it_sorts_last() {
        let done = event(ID_A, "PKG-1", Lane::ForReview, Lane::Done, 8, "agent-7");
        let mut rollback = event(ID_B, "PKG-1", Lane::ForReview, Lane::InProgress, 9, "dana");
        rollback.review_ref = Some("review-41".into());
        let snap = reduce(&[done, rollback]);
        assert_eq!(snap.lane_of("PKG-1"), Some(Lane::InProgress));
    }

    #[test]
    fn causal_successor_of_a_rollback_applies() {
        // After a rollback is folded, genuine follow-up work proceeds from
        // in_progress as normal.
        let mut rollback = event(ID_A, "PKG-1", Lane::ForReview, Lane::InProgress, 5, "dana");
        rollback.review_ref = Some("review-41".into());
        let resumed = event(ID_B, "PKG-1", Lane::InProgress, Lane::ForReview, 6, "alice");
        let snap = reduce(&[rollback, resumed]);
        assert_eq!(snap.lane_of("PKG-1"), Some(Lane::ForReview));
    }

    #[test]
    fn two_rollbacks_later_wins() {
        let mut first = event(ID_A, "PKG-1", Lane::ForReview, Lane::InProgress, 5, "dana");
        first.review_ref = Some("review-41".into());
        let mut second = event(ID_B, "PKG-1", Lane::ForReview, Lane::InProgress, 6, "erin");
        second.review_ref = Some("review-42".into());
        let snap = reduce(&[first, second]);
        assert_eq!(snap.items["PKG-1"].last_actor, "erin");
    }

    #[test]
    fn force_count_tracks_applied_forced_events() {
        let mut done = event(ID_A, "PKG-1", Lane::ForReview, Lane::Done, 1, "alice");
        done.force = true;
        done.reason = Some("migrated".into());
        let mut reopened = event(ID_B, "PKG-1", Lane::Done, Lane::InProgress, 2, "bob");
        reopened.force = true;
        reopened.reason = Some("reopen for regression".into());
        let snap = reduce(&[done, reopened]);
        assert_eq!(snap.items["PKG-1"].force_count, 2);
        assert_eq!(snap.lane_of("PKG-1"), Some(Lane::InProgress));
    }

    #[test]
    fn discarded_sibling_does_not_count_force() {
        let mut rollback = event(ID_A, "PKG-1", Lane::ForReview, Lane::InProgress, 5, "dana");
        rollback.review_ref = Some("review-41".into());
        let mut done = event(ID_B, "PKG-1", Lane::ForReview, Lane::Done, 6, "agent-7");
        done.force = true;
        done.reason = Some("concurrent completion".into());
        let snap = reduce(&[rollback, done]);
        assert_eq!(snap.lane_of("PKG-1"), Some(Lane::InProgress));
        assert_eq!(snap.items["PKG-1"].force_count, 0);
    }

    #[test]
    fn lane_counts_aggregate_across_items() {
        let events = vec![
            event(ID_A, "PKG-1", Lane::Planned, Lane::Claimed, 1, "alice"),
            event(ID_B, "PKG-2", Lane::Planned, Lane::Claimed, 2, "bob"),
            event(ID_C, "PKG-3", Lane::Planned, Lane::Blocked, 3, "carol"),
        ];
        let snap = reduce(&events);
        assert_eq!(snap.lane_counts[&Lane::Claimed], 2);
        assert_eq!(snap.lane_counts[&Lane::Blocked], 1);
        assert_eq!(snap.lane_counts.get(&Lane::Done), None);
    }

    #[test]
    fn items_are_independent() {
        let mut rollback = event(ID_A, "PKG-1", Lane::ForReview, Lane::InProgress, 5, "dana");
        rollback.review_ref = Some("review-41".into());
        let other = event(ID_B, "PKG-2", Lane::ForReview, Lane::Done, 6, "agent-7");
        let snap = reduce(&[rollback, other]);
        assert_eq!(snap.lane_of("PKG-1"), Some(Lane::InProgress));
        assert_eq!(snap.lane_of("PKG-2"), Some(Lane::Done));
    }

    #[test]
    fn reduction_is_idempotent_over_rereads() {
        let events = vec![
            event(ID_A, "PKG-1", Lane::Planned, Lane::Claimed, 1, "alice"),
            event(ID_B, "PKG-1", Lane::Claimed, Lane::InProgress, 2, "alice"),
        ];
        let first = reduce(&events);
        let second = reduce(&events);
        assert_eq!(
            first.to_canonical_json().unwrap(),
            second.to_canonical_json().unwrap()
        );
    }
}
