//! Descriptor table.
//!
//! Descriptors start above the standard streams and are never reused within a
//! run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::entry::FileEntry;

/// First descriptor handed out; 0 to 2 belong to the standard streams.
pub const FIRST_DESCRIPTOR: i32 = 3;

/// One open reference to a file entry.
#[derive(Debug)]
pub struct OpenFile {
    pub entry: Arc<FileEntry>,
    /// Signed so that a seek before the start is representable until the next
    /// read or write rejects it.
    pub position: i64,
    pub dirty: bool,
}

pub type Handle = Arc<Mutex<OpenFile>>;

#[derive(Debug)]
pub struct FdTable {
    next: AtomicI32,
    handles: Mutex<HashMap<i32, Handle>>,
}

impl Default for FdTable {
    fn default() -> Self {
        Self {
            next: AtomicI32::new(FIRST_DESCRIPTOR),
            handles: Mutex::new(HashMap::new()),
        }
    }
}

impl FdTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<i32, Handle>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind a fresh descriptor to `entry` at position 0.
    pub fn insert(&self, entry: Arc<FileEntry>) -> i32 {
        let fd = self.next.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(Mutex::new(OpenFile {
            entry,
            position: 0,
            dirty: false,
        }));
        self.handles().insert(fd, handle);
        fd
    }

    pub fn get(&self, fd: i32) -> Option<Handle> {
        self.handles().get(&fd).cloned()
    }

    pub fn remove(&self, fd: i32) -> Option<Handle> {
        self.handles().remove(&fd)
    }

    pub fn contains(&self, fd: i32) -> bool {
        self.handles().contains_key(&fd)
    }

    /// Number of open descriptors.
    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock a handle, recovering from poisoning.
pub(crate) fn lock_handle(handle: &Handle) -> MutexGuard<'_, OpenFile> {
    handle
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
