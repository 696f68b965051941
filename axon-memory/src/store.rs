//! The arena that owns memory entries.

use axon_types::{EntryId, MemoryEntry, Tier};
use std::collections::HashMap;

/// Owns every live [`MemoryEntry`]; tiers reference entries by id.
///
/// Each id carries a reference count of the tiers holding it. When the
/// count drops to zero the entry is removed and its id reported back so
/// the caller can purge any vector-index registration. Without that purge
/// the index grows without bound.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: HashMap<EntryId, MemoryEntry>,
    refs: HashMap<EntryId, u32>,
}

impl EntryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry with one tier reference. Returns its id.
    pub fn insert(&mut self, entry: MemoryEntry) -> EntryId {
        let id = entry.entry_id.clone();
        self.refs.insert(id.clone(), 1);
        self.entries.insert(id.clone(), entry);
        id
    }

    /// Look up an entry.
    pub fn get(&self, id: &EntryId) -> Option<&MemoryEntry> {
        self.entries.get(id)
    }

    /// Record that another tier now references the entry.
    pub fn retain(&mut self, id: &EntryId) {
        if let Some(count) = self.refs.get_mut(id) {
            *count += 1;
        }
    }

    /// Record that a tier dropped its reference. Returns `true` when the
    /// entry was purged (no tier references it any more).
    pub fn release(&mut self, id: &EntryId) -> bool {
        let purge = match self.refs.get_mut(id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if purge {
            self.refs.remove(id);
            self.entries.remove(id);
        }
        purge
    }

    /// Update an entry's tier marker in place.
    pub fn set_tier(&mut self, id: &EntryId, tier: Tier) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.tier = tier;
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
