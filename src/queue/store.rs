//! Entry storage interface and implementations
//!
//! The queue keeps its entries behind `EntryStore` so that storage faults have
//! a single origin and can be caught at the operation boundary.

use crate::error::{MatchmakingError, Result};
use crate::types::{Entry, ParticipantId};
use std::collections::HashMap;

/// Keyed storage for waiting entries
///
/// Implementations are accessed exclusively through the queue lock, so the
/// mutating methods take `&mut self`.
pub trait EntryStore: Send {
    /// Get an entry by participant id
    fn get(&self, participant_id: &str) -> Result<Option<Entry>>;

    /// Insert or replace an entry, returning the previous value
    fn upsert(&mut self, entry: Entry) -> Result<Option<Entry>>;

    /// Remove an entry, returning it if it was present
    fn remove(&mut self, participant_id: &str) -> Result<Option<Entry>>;

    /// All entries, in no particular order
    fn all(&self) -> Result<Vec<Entry>>;

    /// Number of stored entries
    fn len(&self) -> Result<usize>;
}

/// In-memory entry storage with an upper bound on the number of entries
#[derive(Debug)]
pub struct InMemoryEntryStore {
    entries: HashMap<ParticipantId, Entry>,
    max_entries: usize,
}

impl InMemoryEntryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
        }
    }
}

impl EntryStore for InMemoryEntryStore {
    fn get(&self, participant_id: &str) -> Result<Option<Entry>> {
        Ok(self.entries.get(participant_id).cloned())
    }

    fn upsert(&mut self, entry: Entry) -> Result<Option<Entry>> {
        if !self.entries.contains_key(&entry.participant_id)
            && self.entries.len() >= self.max_entries
        {
            return Err(MatchmakingError::StorageUnavailable {
                message: format!("entry store is at capacity ({})", self.max_entries),
            }
            .into());
        }

        Ok(self.entries.insert(entry.participant_id.clone(), entry))
    }

    fn remove(&mut self, participant_id: &str) -> Result<Option<Entry>> {
        Ok(self.entries.remove(participant_id))
    }

    fn all(&self) -> Result<Vec<Entry>> {
        Ok(self.entries.values().cloned().collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, seq: u64) -> Entry {
        Entry::new(id.to_string(), "any".to_string(), Utc::now(), seq)
    }

    #[test]
    fn test_upsert_and_get() {
        let mut store = InMemoryEntryStore::new(10);

        assert!(store.upsert(entry("alice", 1)).unwrap().is_none());
        let previous = store.upsert(entry("alice", 2)).unwrap().unwrap();
        assert_eq!(previous.arrival_seq, 1);

        let current = store.get("alice").unwrap().unwrap();
        assert_eq!(current.arrival_seq, 2);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_remove() {
        let mut store = InMemoryEntryStore::new(10);
        store.upsert(entry("alice", 1)).unwrap();

        assert!(store.remove("alice").unwrap().is_some());
        assert!(store.remove("alice").unwrap().is_none());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_capacity_rejects_new_entries_only() {
        let mut store = InMemoryEntryStore::new(2);
        store.upsert(entry("alice", 1)).unwrap();
        store.upsert(entry("bob", 2)).unwrap();

        let err = store.upsert(entry("carol", 3)).unwrap_err();
        assert!(err.to_string().contains("capacity"));

        // Updating an existing key is still allowed at capacity
        assert!(store.upsert(entry("bob", 4)).is_ok());
        assert_eq!(store.all().unwrap().len(), 2);
    }
}
