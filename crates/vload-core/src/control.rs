//! Control thread: fetch orchestration and the write-back queue.
//!
//! Every collaborator operation runs as a local task on a single-threaded
//! runtime and posts its completion (and its progress chunks) back to one
//! channel. The orchestrator handles those messages in arrival order, so all
//! bookkeeping lives on this one thread without locks; only the per-entry
//! gates are shared with application threads.
//!
//! ```text
//! Fetch ─► AwaitDirectory ─(barrier)─► AwaitQuery ─┬─► AwaitLocalRead ──────────────► Done
//!                                                   └─► AwaitNetworkFetch ─► AwaitWriteBack ─► Done
//! ```

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, LocalSet};
use vload_config::path::parent_dir;
use vload_config::{
    log_fetch_debug, log_fetch_error, log_fetch_info, log_fetch_warn, log_writeback_debug,
    log_writeback_info, log_writeback_warn,
};
use vload_store::{read_all, write_all, FetchError, LocalStore, NetworkSource, StoreError, StoreFile};

use crate::entry::{EntryId, FileEntry, Readiness};
use crate::state::{FetchState, Phase, Shared};
use crate::table::FileTable;

/// Tuning for the control thread.
#[derive(Debug, Clone)]
pub struct Options {
    /// Quota requested when opening the local store.
    pub capacity: u64,
    /// Chunk size for local reads and writes.
    pub chunk_size: usize,
    /// Default body pre-allocation for downloads.
    pub size_hint: usize,
    /// Preload batch, fetched before the store finishes opening.
    pub preload: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            capacity: 64 * 1024 * 1024,
            chunk_size: vload_store::DEFAULT_CHUNK_SIZE,
            size_hint: 1024,
            preload: Vec::new(),
        }
    }
}

impl From<&vload_config::Config> for Options {
    fn from(config: &vload_config::Config) -> Self {
        Self {
            capacity: config.store.capacity,
            chunk_size: config.transfer.chunk_size,
            size_hint: config.transfer.size_hint,
            preload: config.preload.paths.clone(),
        }
    }
}

type ReadyHook = Box<dyn FnOnce() + Send>;
type ProgressHook = Box<dyn FnMut(u64) + Send>;

/// Callbacks invoked on the control thread. They must not block.
#[derive(Default)]
pub struct Hooks {
    on_ready: Option<ReadyHook>,
    on_progress: Option<ProgressHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once, when every file of the preload batch has resolved.
    pub fn on_ready(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(hook));
        self
    }

    /// Called with the byte length of each chunk moved before "ready".
    pub fn on_progress(mut self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(hook));
        self
    }
}

pub(crate) type ControlTx = mpsc::UnboundedSender<ControlMsg>;

pub(crate) enum ControlMsg {
    // From application threads
    Fetch {
        id: EntryId,
        size_hint: usize,
    },
    QueueWrite {
        id: EntryId,
    },
    Inspect {
        name: String,
        reply: oneshot::Sender<Option<FetchState>>,
    },
    Shutdown,

    // From local tasks
    StoreOpened(Result<(), StoreError>),
    DirectoryCreated {
        dir: String,
        result: Result<(), StoreError>,
    },
    Queried {
        id: EntryId,
        result: Result<u64, StoreError>,
    },
    LocalRead {
        id: EntryId,
        late: bool,
        result: Result<Vec<u8>, StoreError>,
    },
    Downloaded {
        id: EntryId,
        result: Result<Vec<u8>, FetchError>,
    },
    WriteFinished {
        id: EntryId,
        bytes: usize,
        result: Result<(), StoreError>,
    },
    Progress(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreStatus {
    Opening,
    Open,
    Broken,
}

#[derive(Debug)]
struct FetchRecord {
    state: FetchState,
    size_hint: usize,
}

pub(crate) fn channel() -> (ControlTx, mpsc::UnboundedReceiver<ControlMsg>) {
    mpsc::unbounded_channel()
}

/// Start the control thread over a channel that may already hold requests.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn<S, N>(
    tx: ControlTx,
    rx: mpsc::UnboundedReceiver<ControlMsg>,
    store: S,
    network: N,
    table: Arc<FileTable>,
    shared: Arc<Shared>,
    options: Options,
    hooks: Hooks,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    S: LocalStore + Send + 'static,
    N: NetworkSource + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("vload-control".into())
        .spawn(move || {
            let _stop = StopOnExit(Arc::clone(&shared));
            let orchestrator = Orchestrator::new(store, network, table, shared, tx, options, hooks);
            let local = LocalSet::new();
            local.block_on(&runtime, orchestrator.run(rx));
        })
}

/// Marks the orchestrator stopped however the control thread exits.
struct StopOnExit(Arc<Shared>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.stop();
    }
}

struct Orchestrator<S, N> {
    store: Rc<S>,
    network: Rc<N>,
    table: Arc<FileTable>,
    shared: Arc<Shared>,
    tx: ControlTx,
    options: Options,
    hooks: Hooks,

    store_status: StoreStatus,
    fetches: HashMap<EntryId, FetchRecord>,
    /// Early fetches waiting for the directory barrier.
    barrier: Vec<EntryId>,
    dirs_in_flight: HashSet<String>,
    dirs_done: HashSet<String>,
    /// Early fetches not yet resolved.
    outstanding: usize,
    ready_fired: bool,
    /// Entries with write-backs queued before the store opened.
    deferred_writes: Vec<EntryId>,
    writes_in_flight: usize,
    draining: bool,
}

impl<S, N> Orchestrator<S, N>
where
    S: LocalStore + 'static,
    N: NetworkSource + 'static,
{
    fn new(
        store: S,
        network: N,
        table: Arc<FileTable>,
        shared: Arc<Shared>,
        tx: ControlTx,
        options: Options,
        hooks: Hooks,
    ) -> Self {
        Self {
            store: Rc::new(store),
            network: Rc::new(network),
            table,
            shared,
            tx,
            options,
            hooks,
            store_status: StoreStatus::Opening,
            fetches: HashMap::new(),
            barrier: Vec::new(),
            dirs_in_flight: HashSet::new(),
            dirs_done: HashSet::new(),
            outstanding: 0,
            ready_fired: false,
            deferred_writes: Vec::new(),
            writes_in_flight: 0,
            draining: false,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ControlMsg>) {
        self.open_store();

        while let Some(msg) = rx.recv().await {
            self.handle(msg);
            if self.draining && self.drained() {
                break;
            }
        }

        self.finish();
    }

    fn handle(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Fetch { id, size_hint } => self.on_fetch(id, size_hint),
            ControlMsg::QueueWrite { id } => {
                if let Some(entry) = self.entry(id) {
                    self.pump_writes(&entry);
                }
            }
            ControlMsg::Inspect { name, reply } => {
                let state = self
                    .table
                    .get(&name)
                    .and_then(|entry| self.fetches.get(&entry.id()))
                    .map(|record| record.state);
                let _ = reply.send(state);
            }
            ControlMsg::Shutdown => {
                self.draining = true;
                self.shared.transition(Phase::Draining);
                log_writeback_debug!(
                    "Draining write-backs",
                    in_flight = self.writes_in_flight
                );
            }
            ControlMsg::StoreOpened(result) => self.on_store_opened(result),
            ControlMsg::DirectoryCreated { dir, result } => {
                if let Err(e) = result {
                    log_fetch_warn!(
                        "Directory creation failed",
                        dir = dir.as_str(),
                        error = tracing::field::display(&e)
                    );
                }
                self.dirs_in_flight.remove(&dir);
                self.dirs_done.insert(dir);
                self.release_barrier();
            }
            ControlMsg::Queried { id, result } => self.on_queried(id, result),
            ControlMsg::LocalRead { id, late, result } => self.on_local_read(id, late, result),
            ControlMsg::Downloaded { id, result } => self.on_downloaded(id, result),
            ControlMsg::WriteFinished { id, bytes, result } => {
                self.on_write_finished(id, bytes, result)
            }
            ControlMsg::Progress(n) => {
                if !self.ready_fired {
                    if let Some(hook) = self.hooks.on_progress.as_mut() {
                        hook(n as u64);
                    }
                }
            }
        }
    }

    fn entry(&self, id: EntryId) -> Option<Arc<FileEntry>> {
        let entry = self.table.get_by_id(id);
        if entry.is_none() {
            log_fetch_error!("Unknown entry id", id = id.index());
        }
        entry
    }

    fn advance(&mut self, id: EntryId, next: FetchState) {
        if let Some(record) = self.fetches.get_mut(&id) {
            debug_assert!(
                record.state.can_advance(next),
                "illegal fetch transition {:?} -> {:?}",
                record.state,
                next
            );
            record.state = next;
        }
    }

    fn state_of(&self, id: EntryId) -> Option<FetchState> {
        self.fetches.get(&id).map(|record| record.state)
    }

    // === Store lifecycle ===

    fn open_store(&self) {
        let store = Rc::clone(&self.store);
        let tx = self.tx.clone();
        let capacity = self.options.capacity;
        task::spawn_local(async move {
            let result = store.open(capacity).await;
            let _ = tx.send(ControlMsg::StoreOpened(result));
        });
    }

    fn on_store_opened(&mut self, result: Result<(), StoreError>) {
        match result {
            Ok(()) => {
                self.store_status = StoreStatus::Open;
                self.shared.transition(Phase::CreatingDirectories);
                log_fetch_debug!("Local store open", pending = self.barrier.len());

                let dirs: Vec<String> = self
                    .barrier
                    .iter()
                    .filter_map(|id| self.table.get_by_id(*id))
                    .map(|entry| parent_dir(entry.name()).to_string())
                    .collect();
                for dir in dirs {
                    self.ensure_dir(dir);
                }

                for id in std::mem::take(&mut self.deferred_writes) {
                    if let Some(entry) = self.entry(id) {
                        self.pump_writes(&entry);
                    }
                }
                self.release_barrier();
            }
            Err(e) => {
                self.store_status = StoreStatus::Broken;
                log_fetch_error!(
                    "Local store failed to open, every pending file is missing",
                    error = tracing::field::display(&e),
                    pending = self.barrier.len()
                );
                for id in std::mem::take(&mut self.barrier) {
                    if let Some(entry) = self.entry(id) {
                        entry.resolve(None);
                    }
                    self.advance(id, FetchState::Done);
                    self.outstanding = self.outstanding.saturating_sub(1);
                }
                for id in std::mem::take(&mut self.deferred_writes) {
                    if let Some(entry) = self.entry(id) {
                        self.pump_writes(&entry);
                    }
                }
                self.check_ready();
            }
        }
    }

    // === Fetch ===

    fn on_fetch(&mut self, id: EntryId, size_hint: usize) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        self.fetches.insert(
            id,
            FetchRecord {
                state: FetchState::Init,
                size_hint,
            },
        );

        if self.ready_fired {
            self.start_late(&entry);
            return;
        }

        self.outstanding += 1;
        self.advance(id, FetchState::AwaitDirectory);
        self.barrier.push(id);
        if self.store_status == StoreStatus::Open {
            self.ensure_dir(parent_dir(entry.name()).to_string());
            self.release_barrier();
        }
    }

    fn ensure_dir(&mut self, dir: String) {
        if dir.is_empty() || self.dirs_done.contains(&dir) || self.dirs_in_flight.contains(&dir) {
            return;
        }
        self.dirs_in_flight.insert(dir.clone());

        let store = Rc::clone(&self.store);
        let tx = self.tx.clone();
        task::spawn_local(async move {
            let result = store.make_dir_all(&dir).await;
            let _ = tx.send(ControlMsg::DirectoryCreated { dir, result });
        });
    }

    /// Start every barrier-waiting fetch once no directory creation is in flight.
    fn release_barrier(&mut self) {
        if !self.dirs_in_flight.is_empty() || self.store_status != StoreStatus::Open {
            return;
        }
        if self.shared.phase() == Phase::CreatingDirectories {
            self.shared.transition(Phase::Preloading);
        }
        for id in std::mem::take(&mut self.barrier) {
            self.start_query(id);
        }
        self.check_ready();
    }

    fn start_query(&mut self, id: EntryId) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        self.advance(id, FetchState::AwaitQuery);

        let store = Rc::clone(&self.store);
        let tx = self.tx.clone();
        let name = entry.name().to_string();
        task::spawn_local(async move {
            let result = query_length(&*store, &name).await;
            let _ = tx.send(ControlMsg::Queried { id, result });
        });
    }

    fn on_queried(&mut self, id: EntryId, result: Result<u64, StoreError>) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        match result {
            Ok(len) if len > 0 => {
                self.advance(id, FetchState::AwaitLocalRead);
                self.spawn_local_read(&entry, false, len as usize);
            }
            Ok(_) => {
                log_fetch_debug!("Not in local store", path = entry.name());
                self.start_download(&entry);
            }
            Err(e) => {
                log_fetch_warn!(
                    "Local query failed, trying network",
                    path = entry.name(),
                    error = tracing::field::display(&e)
                );
                self.start_download(&entry);
            }
        }
    }

    fn spawn_local_read(&self, entry: &FileEntry, late: bool, expected: usize) {
        let store = Rc::clone(&self.store);
        let tx = self.tx.clone();
        let id = entry.id();
        let name = entry.name().to_string();
        let chunk_size = self.options.chunk_size;
        task::spawn_local(async move {
            let result = read_local(&*store, &name, late, chunk_size, expected, &tx).await;
            let _ = tx.send(ControlMsg::LocalRead { id, late, result });
        });
    }

    fn on_local_read(&mut self, id: EntryId, late: bool, result: Result<Vec<u8>, StoreError>) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        match result {
            Ok(bytes) if late || !bytes.is_empty() => {
                log_fetch_info!(
                    "Loaded from local store",
                    path = entry.name(),
                    bytes = bytes.len(),
                    late = late
                );
                entry.resolve(Some(bytes));
            }
            Ok(_) => {
                log_fetch_warn!("Local copy empty on read", path = entry.name());
                entry.resolve(None);
            }
            Err(e) => {
                log_fetch_warn!(
                    "Local read failed",
                    path = entry.name(),
                    error = tracing::field::display(&e)
                );
                entry.resolve(None);
            }
        }
        self.advance(id, FetchState::Done);
        if !late {
            self.complete_early();
        }
    }

    /// A fetch after "ready": read whatever is local, never fall back.
    fn start_late(&mut self, entry: &Arc<FileEntry>) {
        let id = entry.id();
        self.advance(id, FetchState::AwaitDirectory);
        if self.store_status == StoreStatus::Broken {
            log_fetch_warn!("Store unavailable for late fetch", path = entry.name());
            entry.resolve(None);
            self.advance(id, FetchState::Done);
            return;
        }
        self.advance(id, FetchState::AwaitLocalRead);
        self.spawn_local_read(entry, true, 0);
    }

    fn start_download(&mut self, entry: &FileEntry) {
        let id = entry.id();
        self.advance(id, FetchState::AwaitNetworkFetch);

        let network = Rc::clone(&self.network);
        let tx = self.tx.clone();
        let name = entry.name().to_string();
        let size_hint = self
            .fetches
            .get(&id)
            .map_or(self.options.size_hint, |record| record.size_hint);
        task::spawn_local(async move {
            let progress_tx = tx.clone();
            let result = network
                .get(&name, size_hint, &mut |n| {
                    let _ = progress_tx.send(ControlMsg::Progress(n));
                })
                .await;
            let _ = tx.send(ControlMsg::Downloaded { id, result });
        });
    }

    fn on_downloaded(&mut self, id: EntryId, result: Result<Vec<u8>, FetchError>) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        match result {
            Ok(bytes) => {
                log_fetch_info!("Downloaded", path = entry.name(), bytes = bytes.len());
                entry.resolve(Some(bytes));
                entry.enqueue_write();
                self.advance(id, FetchState::AwaitWriteBack);
                self.complete_early();
                self.pump_writes(&entry);
            }
            Err(e) => {
                log_fetch_warn!(
                    "File not found locally or remotely",
                    path = entry.name(),
                    error = tracing::field::display(&e)
                );
                entry.resolve(None);
                self.advance(id, FetchState::Done);
                self.complete_early();
            }
        }
    }

    fn complete_early(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.check_ready();
    }

    fn check_ready(&mut self) {
        if self.ready_fired
            || self.store_status == StoreStatus::Opening
            || self.outstanding > 0
            || !self.barrier.is_empty()
            || !self.dirs_in_flight.is_empty()
        {
            return;
        }

        self.ready_fired = true;
        self.shared.transition(Phase::Ready);
        log_fetch_info!("Preload batch resolved", files = self.fetches.len());
        if let Some(hook) = self.hooks.on_ready.take() {
            hook();
        }
        self.shared.mark_ready();
    }

    // === Write-back ===

    fn pump_writes(&mut self, entry: &Arc<FileEntry>) {
        let id = entry.id();
        match self.store_status {
            StoreStatus::Opening => {
                if !self.deferred_writes.contains(&id) {
                    self.deferred_writes.push(id);
                }
            }
            StoreStatus::Broken => {
                let dropped = entry.discard_writes();
                log_writeback_warn!(
                    "Store unavailable, write-back dropped",
                    path = entry.name(),
                    snapshots = dropped
                );
                self.settle_writeback(id);
            }
            StoreStatus::Open => {
                if let Some(snapshot) = entry.begin_write() {
                    self.spawn_write(entry, snapshot);
                }
            }
        }
    }

    fn spawn_write(&mut self, entry: &FileEntry, snapshot: Arc<[u8]>) {
        self.writes_in_flight += 1;

        let store = Rc::clone(&self.store);
        let tx = self.tx.clone();
        let id = entry.id();
        let name = entry.name().to_string();
        let chunk_size = self.options.chunk_size;
        task::spawn_local(async move {
            let bytes = snapshot.len();
            let result = write_back(&*store, &name, &snapshot, chunk_size, &tx).await;
            let _ = tx.send(ControlMsg::WriteFinished { id, bytes, result });
        });
    }

    fn on_write_finished(&mut self, id: EntryId, bytes: usize, result: Result<(), StoreError>) {
        self.writes_in_flight = self.writes_in_flight.saturating_sub(1);
        let Some(entry) = self.entry(id) else {
            return;
        };

        match result {
            Ok(()) => log_writeback_info!("Persisted", path = entry.name(), bytes = bytes),
            Err(e) => log_writeback_warn!(
                "Write-back failed",
                path = entry.name(),
                bytes = bytes,
                error = tracing::field::display(&e)
            ),
        }
        self.settle_writeback(id);

        if let Some(next) = entry.finish_write() {
            self.spawn_write(&entry, next);
        }
    }

    fn settle_writeback(&mut self, id: EntryId) {
        if self.state_of(id) == Some(FetchState::AwaitWriteBack) {
            self.advance(id, FetchState::Done);
        }
    }

    // === Shutdown ===

    fn drained(&self) -> bool {
        self.store_status != StoreStatus::Opening && self.writes_in_flight == 0
    }

    /// Fail every fetch still in progress so no reader waits forever.
    fn finish(&mut self) {
        let unfinished: Vec<EntryId> = self
            .fetches
            .iter()
            .filter(|(_, record)| record.state != FetchState::Done)
            .map(|(id, _)| *id)
            .collect();
        for id in unfinished {
            if let Some(entry) = self.table.get_by_id(id) {
                if entry.readiness() == Readiness::Pending {
                    entry.resolve(None);
                }
            }
            self.fetches.remove(&id);
        }
        self.shared.transition(Phase::Stopped);
        log_writeback_debug!("Control thread stopped");
    }
}

async fn query_length<S: LocalStore>(store: &S, name: &str) -> Result<u64, StoreError> {
    let mut file = store.open_file(name).await?;
    file.query_length().await
}

async fn read_local<S: LocalStore>(
    store: &S,
    name: &str,
    late: bool,
    chunk_size: usize,
    expected: usize,
    tx: &ControlTx,
) -> Result<Vec<u8>, StoreError> {
    if late {
        let parent = parent_dir(name);
        if !parent.is_empty() {
            if let Err(e) = store.make_dir_all(parent).await {
                log_fetch_warn!(
                    "Directory creation failed",
                    dir = parent,
                    error = tracing::field::display(&e)
                );
            }
        }
    }
    let mut file = store.open_file(name).await?;
    read_all(&mut file, chunk_size, expected, &mut |n| {
        let _ = tx.send(ControlMsg::Progress(n));
    })
    .await
}

async fn write_back<S: LocalStore>(
    store: &S,
    name: &str,
    bytes: &[u8],
    chunk_size: usize,
    tx: &ControlTx,
) -> Result<(), StoreError> {
    let parent = parent_dir(name);
    if !parent.is_empty() {
        store.make_dir_all(parent).await?;
    }
    let mut file = store.open_file(name).await?;
    write_all(&mut file, bytes, chunk_size, &mut |n| {
        let _ = tx.send(ControlMsg::Progress(n));
    })
    .await
}
