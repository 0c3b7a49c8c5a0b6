//! Persistent store of hanging relationships.
//!
//! A child that names a parent not yet indexed leaves an entry here keyed by the parent id.
//! Inserting the parent later consumes the entry.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use tagdex_document::HangingRelationship;

use crate::{
    IndexError,
    persist::{load_json, save_json},
};

/// Hanging relationships keyed by the missing parent id.
#[derive(Debug)]
pub struct HangingStore {
    /// Backing file, `None` for an in-memory store.
    path: Option<PathBuf>,
    /// Entries by parent id.
    entries: RwLock<BTreeMap<u64, HangingRelationship>>,
}

impl HangingStore {
    /// Creates an empty store that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Loads a store from `path`, starting empty when the file does not exist.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: RwLock::new(load_json(path)?),
        })
    }

    /// Writes the store to its backing file.
    pub fn save(&self) -> Result<(), IndexError> {
        match &self.path {
            Some(path) => save_json(path, &*self.entries.read()),
            None => Ok(()),
        }
    }

    /// Records that `child_id` waits for `parent_id`.
    pub fn add(&self, parent_id: u64, child_id: u64) {
        self.entries
            .write()
            .entry(parent_id)
            .and_modify(|h| h.add_child(child_id))
            .or_insert_with(|| HangingRelationship::new(parent_id, child_id));
    }

    /// Withdraws a waiting child, dropping the entry once it has none left.
    pub fn remove_child(&self, parent_id: u64, child_id: u64) {
        let mut entries = self.entries.write();
        if let Some(hanging) = entries.get_mut(&parent_id)
            && hanging.remove_child(child_id)
        {
            entries.remove(&parent_id);
        }
    }

    /// Removes and returns the entry waiting for `parent_id`.
    pub fn take(&self, parent_id: u64) -> Option<HangingRelationship> {
        self.entries.write().remove(&parent_id)
    }

    /// Counts a failed upstream lookup for each of `parent_ids`.
    ///
    /// Entries that reach `limit` misses are removed and returned.
    pub fn record_misses(&self, parent_ids: &[u64], limit: u32) -> Vec<HangingRelationship> {
        let mut entries = self.entries.write();
        let mut expired = Vec::new();
        for parent_id in parent_ids {
            let Some(hanging) = entries.get_mut(parent_id) else {
                continue;
            };
            hanging.misses += 1;
            if hanging.misses >= limit
                && let Some(hanging) = entries.remove(parent_id)
            {
                expired.push(hanging);
            }
        }
        expired
    }

    /// The entry waiting for `parent_id`.
    pub fn get(&self, parent_id: u64) -> Option<HangingRelationship> {
        self.entries.read().get(&parent_id).cloned()
    }

    /// Ids of every missing parent, ascending.
    pub fn parent_ids(&self) -> Vec<u64> {
        self.entries.read().keys().copied().collect()
    }

    /// Number of missing parents.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn children_accumulate_under_parent() {
        let store = HangingStore::in_memory();
        store.add(10, 11);
        store.add(10, 12);
        store.add(20, 21);
        assert_eq!(store.parent_ids(), vec![10, 20]);
        assert_eq!(store.get(10).unwrap().children, BTreeSet::from([11, 12]));

        let taken = store.take(10).unwrap();
        assert_eq!(taken.children.len(), 2);
        assert!(store.get(10).is_none());
    }

    #[test]
    fn last_child_removal_drops_entry() {
        let store = HangingStore::in_memory();
        store.add(10, 11);
        store.add(10, 12);
        store.remove_child(10, 11);
        assert_eq!(store.len(), 1);
        store.remove_child(10, 12);
        assert!(store.is_empty());
        store.remove_child(99, 1);
    }

    #[test]
    fn repeated_misses_expire_entry() {
        let store = HangingStore::in_memory();
        store.add(10, 11);
        store.add(20, 21);
        assert!(store.record_misses(&[10, 20, 30], 2).is_empty());
        assert_eq!(store.get(10).unwrap().misses, 1);

        let expired = store.record_misses(&[10], 2);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].children, BTreeSet::from([11]));
        assert_eq!(store.parent_ids(), vec![20]);
    }

    #[test]
    fn persists_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hanging.json");
        {
            let store = HangingStore::open(&path).unwrap();
            store.add(5, 6);
            store.record_misses(&[5], 3);
            store.save().unwrap();
        }
        let store = HangingStore::open(&path).unwrap();
        let hanging = store.get(5).unwrap();
        assert_eq!(hanging.children, BTreeSet::from([6]));
        assert_eq!(hanging.misses, 1);
    }
}
