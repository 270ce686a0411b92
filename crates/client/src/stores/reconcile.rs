//! Merge rules for the presence set.
//!
//! Every function here keeps the invariant that the set holds at most one
//! entry per user id, and reports whether the set actually changed so the
//! store can skip redundant notifications.

use std::collections::HashSet;

use labpresence_shared::{OccupancySnapshot, PresenceEntry, PresenceEvent, UserId};

/// Replace `entries` with the snapshot's contents.
///
/// A snapshot is complete, so nothing accumulated before it survives. Should
/// the server list a user twice, the last occurrence wins.
pub fn reconcile_snapshot(entries: &mut Vec<PresenceEntry>, snapshot: OccupancySnapshot) -> bool {
    let mut seen = HashSet::new();
    let mut merged: Vec<PresenceEntry> = snapshot
        .entries
        .into_iter()
        .rev()
        .filter(|entry| seen.insert(entry.user_id))
        .collect();
    merged.reverse();

    if *entries == merged {
        return false;
    }
    *entries = merged;
    true
}

/// Apply one streamed event.
pub fn reconcile_event(entries: &mut Vec<PresenceEntry>, event: PresenceEvent) -> bool {
    match event {
        PresenceEvent::Arrived(entry) => upsert(entries, entry),
        PresenceEvent::Departed(user_id) => remove_user(entries, user_id),
    }
}

/// Optimistic arrival from this client's own check-in.
///
/// Only fills a gap: if the server already told us about this user, its entry
/// is authoritative and stays.
pub fn reconcile_local_arrival(entries: &mut Vec<PresenceEntry>, entry: PresenceEntry) -> bool {
    if entries.iter().any(|e| e.user_id == entry.user_id) {
        return false;
    }
    entries.push(entry);
    true
}

fn upsert(entries: &mut Vec<PresenceEntry>, entry: PresenceEntry) -> bool {
    if let Some(pos) = entries.iter().position(|e| e.user_id == entry.user_id) {
        // Newest arrival goes last; a repeat of the last arrival changes nothing.
        if entries[pos] == entry && pos + 1 == entries.len() {
            return false;
        }
        entries.remove(pos);
    }
    entries.push(entry);
    true
}

fn remove_user(entries: &mut Vec<PresenceEntry>, user_id: UserId) -> bool {
    let before = entries.len();
    entries.retain(|e| e.user_id != user_id);
    entries.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use labpresence_shared::EntryId;

    fn entry(id: u64, user: u64, name: &str) -> PresenceEntry {
        PresenceEntry {
            id: EntryId(id),
            user_id: UserId(user),
            display_name: name.to_string(),
            check_in_at: Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap(),
            provisional: false,
        }
    }

    fn users(entries: &[PresenceEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.user_id.0).collect()
    }

    #[test]
    fn arrival_replaces_an_existing_entry_for_the_same_user() {
        let mut set = vec![entry(1, 1, "A"), entry(2, 2, "B")];
        assert!(reconcile_event(&mut set, PresenceEvent::Arrived(entry(9, 1, "A again"))));
        assert_eq!(users(&set), vec![2, 1]);
        assert_eq!(set[1].id, EntryId(9));
    }

    #[test]
    fn arrival_is_idempotent() {
        let mut once = vec![entry(1, 1, "A")];
        reconcile_event(&mut once, PresenceEvent::Arrived(entry(2, 2, "B")));

        let mut twice = once.clone();
        assert!(!reconcile_event(&mut twice, PresenceEvent::Arrived(entry(2, 2, "B"))));
        assert_eq!(once, twice);
    }

    #[test]
    fn departure_of_an_absent_user_is_a_no_op() {
        let mut set = vec![entry(1, 1, "A")];
        assert!(!reconcile_event(&mut set, PresenceEvent::Departed(UserId(42))));
        assert_eq!(users(&set), vec![1]);
    }

    #[test]
    fn any_event_sequence_keeps_users_unique() {
        let mut set = Vec::new();
        let events = [
            PresenceEvent::Arrived(entry(1, 1, "A")),
            PresenceEvent::Arrived(entry(2, 2, "B")),
            PresenceEvent::Arrived(entry(3, 1, "A")),
            PresenceEvent::Departed(UserId(2)),
            PresenceEvent::Arrived(entry(4, 2, "B")),
            PresenceEvent::Arrived(entry(4, 2, "B")),
            PresenceEvent::Departed(UserId(2)),
            PresenceEvent::Departed(UserId(2)),
            PresenceEvent::Arrived(entry(5, 3, "C")),
            PresenceEvent::Arrived(entry(6, 1, "A")),
        ];
        for event in events {
            reconcile_event(&mut set, event);
            let mut ids = users(&set);
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), set.len(), "duplicate user in {set:?}");
        }
        assert_eq!(users(&set), vec![3, 1]);
    }

    #[test]
    fn snapshot_discards_everything_not_listed() {
        let mut set = vec![entry(1, 1, "A"), entry(2, 2, "B")];
        let snapshot = OccupancySnapshot::new(vec![entry(7, 3, "C")]);
        assert!(reconcile_snapshot(&mut set, snapshot));
        assert_eq!(users(&set), vec![3]);
    }

    #[test]
    fn snapshot_with_duplicate_users_keeps_the_last() {
        let mut set = Vec::new();
        let snapshot = OccupancySnapshot::new(vec![
            entry(1, 1, "old"),
            entry(2, 2, "B"),
            entry(3, 1, "new"),
        ]);
        reconcile_snapshot(&mut set, snapshot);
        assert_eq!(users(&set), vec![2, 1]);
        assert_eq!(set[1].display_name, "new");
    }

    #[test]
    fn identical_snapshot_reports_no_change() {
        let mut set = vec![entry(1, 1, "A")];
        let snapshot = OccupancySnapshot::new(vec![entry(1, 1, "A")]);
        assert!(!reconcile_snapshot(&mut set, snapshot));
    }

    #[test]
    fn local_arrival_yields_to_server_entry() {
        let mut set = vec![entry(5, 1, "A")];
        let local = PresenceEntry::provisional(UserId(1), "A", Utc::now());
        assert!(!reconcile_local_arrival(&mut set, local.clone()));
        assert!(!set[0].provisional);

        let mut empty = Vec::new();
        assert!(reconcile_local_arrival(&mut empty, local));
        assert!(empty[0].provisional);

        // The server's confirmation replaces the provisional entry.
        reconcile_event(&mut empty, PresenceEvent::Arrived(entry(8, 1, "A")));
        assert_eq!(empty.len(), 1);
        assert!(!empty[0].provisional);
        assert_eq!(empty[0].id, EntryId(8));
    }
}
