//! In-process adapters.
//!
//! [`MemoryStore`] and [`MemoryNetwork`] behave like the real transports (every
//! operation yields to the scheduler before it completes) and record what was
//! asked of them, so orchestration can be tested without disk or sockets.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;

use crate::{FetchError, LocalStore, Progress, Result, StoreError, StoreFile};

/// One store-level operation, as recorded by [`MemoryStore::ops`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Open,
    MakeDir(String),
    OpenFile(String),
}

/// Operation counters for a [`MemoryStore`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStats {
    pub store_opens: usize,
    pub dir_creates: usize,
    pub file_opens: usize,
    pub queries: usize,
    pub read_chunks: usize,
    /// Completed write transfers (a transfer spans `set_length(0)` to `flush`).
    pub write_transfers: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    opened: bool,
    capacity: u64,
    files: HashMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    active_writers: HashMap<String, usize>,
    max_writers: HashMap<String, usize>,
    transfers: Vec<(String, Vec<u8>)>,
    ops: Vec<StoreOp>,
    stats: MemoryStats,
}

fn key(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

/// Instrumented in-memory [`LocalStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    fail_open: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `open` always fails.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Seed a file before the store is used.
    pub fn with_file(self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.lock().files.insert(key(path), bytes.into());
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(&key(path)).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(&key(path))
    }

    /// Store-level operations in the order they completed.
    pub fn ops(&self) -> Vec<StoreOp> {
        self.lock().ops.clone()
    }

    pub fn stats(&self) -> MemoryStats {
        self.lock().stats.clone()
    }

    /// Highest number of overlapping write transfers seen for `path`.
    pub fn max_concurrent_writes(&self, path: &str) -> usize {
        self.lock().max_writers.get(&key(path)).copied().unwrap_or(0)
    }

    /// Bytes persisted by each completed write transfer to `path`, in completion order.
    pub fn transfers(&self, path: &str) -> Vec<Vec<u8>> {
        let k = key(path);
        self.lock()
            .transfers
            .iter()
            .filter(|(p, _)| *p == k)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LocalStore for MemoryStore {
    type File = MemoryFile;

    async fn open(&self, capacity: u64) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.stats.store_opens += 1;
        state.ops.push(StoreOp::Open);
        if self.fail_open {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "quota refused",
            )));
        }
        state.opened = true;
        state.capacity = capacity;
        Ok(())
    }

    async fn make_dir_all(&self, path: &str) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if !state.opened {
            return Err(StoreError::NotOpen);
        }
        state.stats.dir_creates += 1;
        state.ops.push(StoreOp::MakeDir(key(path)));
        let mut prefix = String::new();
        for segment in key(path).split('/').filter(|s| !s.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            state.dirs.insert(prefix.clone());
        }
        Ok(())
    }

    async fn open_file(&self, path: &str) -> Result<MemoryFile> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if !state.opened {
            return Err(StoreError::NotOpen);
        }
        let k = key(path);
        if k.is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
            });
        }
        state.stats.file_opens += 1;
        state.ops.push(StoreOp::OpenFile(k.clone()));
        state.files.entry(k.clone()).or_default();
        Ok(MemoryFile {
            path: k,
            capacity: state.capacity,
            store: self.clone(),
        })
    }
}

/// Open file inside a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryFile {
    path: String,
    capacity: u64,
    store: MemoryStore,
}

impl StoreFile for MemoryFile {
    async fn query_length(&mut self) -> Result<u64> {
        tokio::task::yield_now().await;
        let mut state = self.store.lock();
        state.stats.queries += 1;
        Ok(state.files.get(&self.path).map_or(0, |f| f.len() as u64))
    }

    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        tokio::task::yield_now().await;
        let mut state = self.store.lock();
        state.stats.read_chunks += 1;
        let data = state.files.get(&self.path).map(Vec::as_slice).unwrap_or(&[]);
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    async fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        tokio::task::yield_now().await;
        let mut state = self.store.lock();
        let end = offset + buf.len() as u64;
        if end > self.capacity {
            return Err(StoreError::CapacityExceeded {
                requested: end,
                capacity: self.capacity,
            });
        }
        let data = state.files.entry(self.path.clone()).or_default();
        let (start, end) = (offset as usize, end as usize);
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    async fn set_length(&mut self, len: u64) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.store.lock();
        state
            .files
            .entry(self.path.clone())
            .or_default()
            .resize(len as usize, 0);
        if len == 0 {
            let active = state.active_writers.entry(self.path.clone()).or_default();
            *active += 1;
            let now = *active;
            let max = state.max_writers.entry(self.path.clone()).or_default();
            *max = (*max).max(now);
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        tokio::task::yield_now().await;
        let mut guard = self.store.lock();
        let state = &mut *guard;
        if let Some(active) = state.active_writers.get_mut(&self.path) {
            if *active > 0 {
                *active -= 1;
                let snapshot = state.files.get(&self.path).cloned().unwrap_or_default();
                state.transfers.push((self.path.clone(), snapshot));
                state.stats.write_transfers += 1;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    resources: HashMap<String, Vec<u8>>,
    requests: Vec<String>,
}

/// Instrumented in-memory [`crate::NetworkSource`].
///
/// Missing resources answer with status 404. A paused network holds every
/// request until [`MemoryNetwork::release`] hands out permits.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
    gate: Option<Arc<Semaphore>>,
    chunk_size: usize,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            gate: None,
            chunk_size: 1024,
        }
    }

    /// A network that blocks requests until released.
    pub fn paused() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    pub fn with_resource(self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.lock().resources.insert(key(path), bytes.into());
        self
    }

    /// Let `n` held or future requests proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Every requested path, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        let k = key(path);
        self.lock().requests.iter().filter(|p| **p == k).count()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl crate::NetworkSource for MemoryNetwork {
    async fn get(
        &self,
        path: &str,
        _size_hint: usize,
        progress: Progress<'_>,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        let k = key(path);
        self.lock().requests.push(k.clone());

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|e| FetchError::Malformed {
                url: k.clone(),
                reason: e.to_string(),
            })?;
            permit.forget();
        }
        tokio::task::yield_now().await;

        let body = self.lock().resources.get(&k).cloned();
        let body = body.ok_or_else(|| FetchError::Status {
            url: k.clone(),
            status: 404,
        })?;

        for chunk in body.chunks(self.chunk_size) {
            progress(chunk.len());
            tokio::task::yield_now().await;
        }
        Ok(body)
    }
}
