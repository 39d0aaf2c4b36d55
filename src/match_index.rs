//! Match-result index.
//!
//! Maps a participant's original handle to the session and slot it was
//! placed into, so a caller that only knows its handle can find its room.
//! Entries are never dropped on read; several polls may race before the
//! client navigates. They leave only by explicit release or an age sweep.

use crate::queue::Tag;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub original_handle: String,
    pub participant_id: String,
    /// Updated once if session creation was retried under a new id.
    pub session_id: String,
    pub slot_index: usize,
    pub tag: Tag,
    pub matched_at: DateTime<Utc>,
}

/// Concurrent handle -> match lookup. Each entry is replaced whole, so
/// readers never see a partially written record.
#[derive(Debug, Default)]
pub struct MatchIndex {
    records: DashMap<String, MatchRecord>,
}

impl MatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `record.original_handle`.
    pub fn put(&self, record: MatchRecord) -> Option<MatchRecord> {
        self.records.insert(record.original_handle.clone(), record)
    }

    pub fn get(&self, handle: &str) -> Option<MatchRecord> {
        self.records.get(handle).map(|r| r.value().clone())
    }

    pub fn delete(&self, handle: &str) -> Option<MatchRecord> {
        self.records.remove(handle).map(|(_, r)| r)
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.records.contains_key(handle)
    }

    /// Point `handle` at `session_id`. Returns the updated record.
    pub fn rebind_session(&self, handle: &str, session_id: &str) -> Option<MatchRecord> {
        let mut entry = self.records.get_mut(handle)?;
        entry.session_id = session_id.to_string();
        Some(entry.value().clone())
    }

    /// Records matched strictly before `cutoff`, oldest first.
    pub fn older_than(&self, cutoff: DateTime<Utc>) -> Vec<MatchRecord> {
        let mut stale: Vec<MatchRecord> = self
            .records
            .iter()
            .filter(|r| r.matched_at < cutoff)
            .map(|r| r.value().clone())
            .collect();
        stale.sort_by(|a, b| {
            a.matched_at
                .cmp(&b.matched_at)
                .then_with(|| a.original_handle.cmp(&b.original_handle))
        });
        stale
    }

    /// Remove every record matched before `cutoff`. Returns what was removed.
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Vec<MatchRecord> {
        let stale = self.older_than(cutoff);
        for record in &stale {
            self.records
                .remove_if(&record.original_handle, |_, r| r.matched_at < cutoff);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(handle: &str, session: &str, age_secs: i64) -> MatchRecord {
        MatchRecord {
            original_handle: handle.to_string(),
            participant_id: format!("user_{handle}"),
            session_id: session.to_string(),
            slot_index: 0,
            tag: Tag::from("A"),
            matched_at: DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(age_secs),
        }
    }

    #[test]
    fn reads_do_not_consume() {
        let index = MatchIndex::new();
        index.put(record("alice", "room_1", 0));
        assert_eq!(index.get("alice").unwrap().session_id, "room_1");
        assert_eq!(index.get("alice").unwrap().session_id, "room_1");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn rebind_updates_session_only() {
        let index = MatchIndex::new();
        index.put(record("alice", "room_1", 5));
        let rebound = index.rebind_session("alice", "room_2").unwrap();
        assert_eq!(rebound.session_id, "room_2");
        assert_eq!(rebound.matched_at, record("alice", "x", 5).matched_at);
        assert!(index.rebind_session("bob", "room_2").is_none());
    }

    #[test]
    fn evicts_only_entries_before_cutoff() {
        let index = MatchIndex::new();
        index.put(record("old", "room_1", 0));
        index.put(record("edge", "room_2", 100));
        index.put(record("new", "room_3", 200));

        let cutoff = DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(100);
        let evicted = index.evict_older_than(cutoff);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].original_handle, "old");
        assert!(index.contains("edge"));
        assert!(index.contains("new"));
    }

    #[test]
    fn delete_removes_entry() {
        let index = MatchIndex::new();
        index.put(record("alice", "room_1", 0));
        assert!(index.delete("alice").is_some());
        assert!(index.get("alice").is_none());
    }
}
