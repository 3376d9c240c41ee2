//! One virtual file and its readiness gate.
//!
//! A [`FileEntry`] starts either `Pending` (a fetch will produce its bytes) or
//! `Ready` (created empty for writing). The control thread resolves a pending
//! entry exactly once; application threads block in [`FileEntry::wait`] until
//! that happens. Bytes are installed and the gate flipped in the same critical
//! section, so a reader never sees a half-filled buffer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Stable index of an entry in the file table arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Readiness of an entry's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A fetch is still producing the bytes.
    Pending,
    /// Bytes are available; the file exists.
    Ready,
    /// The file is absent locally and remotely (or could not be read).
    Failed,
}

/// Mutable state guarded by the entry's lock.
#[derive(Debug)]
pub struct EntryState {
    readiness: Readiness,
    pub(crate) data: Vec<u8>,
    pending_writes: VecDeque<Arc<[u8]>>,
    write_in_flight: bool,
}

impl EntryState {
    fn new(readiness: Readiness) -> Self {
        Self {
            readiness,
            data: Vec::new(),
            pending_writes: VecDeque::new(),
            write_in_flight: false,
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Turn a failed entry into an empty existing one, for open-for-write.
    pub(crate) fn revive(&mut self) {
        if self.readiness == Readiness::Failed {
            self.readiness = Readiness::Ready;
            self.data.clear();
        }
    }

    /// Queue a full copy of the current bytes for persistence.
    pub(crate) fn enqueue_snapshot(&mut self) -> usize {
        let snapshot: Arc<[u8]> = Arc::from(self.data.as_slice());
        self.pending_writes.push_back(snapshot);
        self.pending_writes.len()
    }
}

/// In-memory record of one virtual file.
pub struct FileEntry {
    id: EntryId,
    name: String,
    state: Mutex<EntryState>,
    gate: Condvar,
}

impl FileEntry {
    pub(crate) fn pending(id: EntryId, name: String) -> Self {
        Self::with_readiness(id, name, Readiness::Pending)
    }

    pub(crate) fn ready(id: EntryId, name: String) -> Self {
        Self::with_readiness(id, name, Readiness::Ready)
    }

    fn with_readiness(id: EntryId, name: String, readiness: Readiness) -> Self {
        Self {
            id,
            name,
            state: Mutex::new(EntryState::new(readiness)),
            gate: Condvar::new(),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current readiness, without waiting.
    pub fn readiness(&self) -> Readiness {
        self.lock().readiness
    }

    pub fn exists(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    /// Lock the entry without waiting for the gate.
    pub(crate) fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block until the entry is no longer pending and return its locked state.
    pub fn wait(&self) -> MutexGuard<'_, EntryState> {
        let mut state = self.lock();
        while state.readiness == Readiness::Pending {
            state = self
                .gate
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        state
    }

    /// Install the fetch result and open the gate.
    ///
    /// `Some(bytes)` makes the entry `Ready`, `None` makes it `Failed`.
    ///
    /// # Panics
    ///
    /// Panics if the entry was already resolved.
    pub(crate) fn resolve(&self, data: Option<Vec<u8>>) {
        let mut state = self.lock();
        assert!(
            state.readiness == Readiness::Pending,
            "entry {} ({}) resolved twice",
            self.id,
            self.name
        );
        match data {
            Some(bytes) => {
                state.data = bytes;
                state.readiness = Readiness::Ready;
            }
            None => state.readiness = Readiness::Failed,
        }
        drop(state);
        self.gate.notify_all();
    }

    /// Queue a snapshot of the current bytes. Returns the queue depth.
    pub(crate) fn enqueue_write(&self) -> usize {
        self.wait().enqueue_snapshot()
    }

    /// Claim the front snapshot for transport if no write is in flight.
    pub(crate) fn begin_write(&self) -> Option<Arc<[u8]>> {
        let mut state = self.lock();
        if state.write_in_flight {
            return None;
        }
        let front = state.pending_writes.front().cloned()?;
        state.write_in_flight = true;
        Some(front)
    }

    /// Retire the front snapshot after its transfer ended.
    ///
    /// Returns the next snapshot to transport, keeping the in-flight flag set,
    /// or `None` once the queue is empty.
    pub(crate) fn finish_write(&self) -> Option<Arc<[u8]>> {
        let mut state = self.lock();
        state.pending_writes.pop_front();
        match state.pending_writes.front().cloned() {
            Some(next) => Some(next),
            None => {
                state.write_in_flight = false;
                None
            }
        }
    }

    /// Drop every queued snapshot. Returns how many were discarded.
    pub(crate) fn discard_writes(&self) -> usize {
        let mut state = self.lock();
        state.write_in_flight = false;
        let dropped = state.pending_writes.len();
        state.pending_writes.clear();
        dropped
    }

    pub fn queued_writes(&self) -> usize {
        self.lock().pending_writes.len()
    }

    pub fn write_in_flight(&self) -> bool {
        self.lock().write_in_flight
    }
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("FileEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("readiness", &state.readiness)
            .field("len", &state.data.len())
            .field("queued_writes", &state.pending_writes.len())
            .field("write_in_flight", &state.write_in_flight)
            .finish()
    }
}
