//! Append-only arena of file entries keyed by normalized name.
//!
//! Entries are never removed during a run; an [`EntryId`] stays valid for the
//! lifetime of the table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entry::{EntryId, FileEntry};

#[derive(Default)]
struct Arena {
    entries: Vec<Arc<FileEntry>>,
    by_name: HashMap<String, EntryId>,
}

impl Arena {
    fn push(&mut self, name: &str, make: fn(EntryId, String) -> FileEntry) -> Arc<FileEntry> {
        let id = EntryId(self.entries.len());
        let entry = Arc::new(make(id, name.to_string()));
        self.entries.push(Arc::clone(&entry));
        self.by_name.insert(name.to_string(), id);
        entry
    }

    fn lookup(&self, name: &str) -> Option<Arc<FileEntry>> {
        self.by_name
            .get(name)
            .map(|id| Arc::clone(&self.entries[id.0]))
    }
}

/// Shared table of every virtual file seen in this run.
#[derive(Default)]
pub struct FileTable {
    inner: RwLock<Arena>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a pending entry for `name` unless one exists.
    ///
    /// Returns the entry and whether it was created by this call.
    pub fn insert_pending(&self, name: &str) -> (Arc<FileEntry>, bool) {
        let mut arena = self.write();
        match arena.lookup(name) {
            Some(existing) => (existing, false),
            None => (arena.push(name, FileEntry::pending), true),
        }
    }

    /// Existing entry for `name`, or a new empty `Ready` one.
    pub fn get_or_create_ready(&self, name: &str) -> Arc<FileEntry> {
        let mut arena = self.write();
        match arena.lookup(name) {
            Some(existing) => existing,
            None => arena.push(name, FileEntry::ready),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<FileEntry>> {
        self.read().lookup(name)
    }

    pub fn get_by_id(&self, id: EntryId) -> Option<Arc<FileEntry>> {
        self.read().entries.get(id.0).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry, in insertion order.
    pub fn entries(&self) -> Vec<Arc<FileEntry>> {
        self.read().entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Readiness;

    #[test]
    fn test_insert_pending_is_idempotent() {
        let table = FileTable::new();
        let (first, created) = table.insert_pending("a.cfg");
        assert!(created);
        let (second, created) = table.insert_pending("a.cfg");
        assert!(!created);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
        assert_eq!(first.readiness(), Readiness::Pending);
    }

    #[test]
    fn test_ids_are_stable_indices() {
        let table = FileTable::new();
        let (a, _) = table.insert_pending("a.cfg");
        let b = table.get_or_create_ready("b.sav");

        assert_eq!(a.id().index(), 0);
        assert_eq!(b.id().index(), 1);
        assert_eq!(table.get_by_id(b.id()).unwrap().name(), "b.sav");
        assert!(table.get_by_id(EntryId(7)).is_none());
    }

    #[test]
    fn test_create_ready_keeps_existing_pending() {
        let table = FileTable::new();
        let (pending, _) = table.insert_pending("save.sav");
        let found = table.get_or_create_ready("save.sav");

        assert!(Arc::ptr_eq(&pending, &found));
        assert_eq!(found.readiness(), Readiness::Pending);
    }

    #[test]
    fn test_concurrent_inserts_make_one_entry() {
        let table = Arc::new(FileTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || table.insert_pending("id1/pak0.pak").1)
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c)
            .count();
        assert_eq!(created, 1);
        assert_eq!(table.len(), 1);
    }
}
