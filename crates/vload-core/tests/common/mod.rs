#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vload_core::{FetchState, FileSystem, Hooks, Options};
use vload_store::{MemoryNetwork, MemoryStore};

/// Counters fed by the ready and progress hooks.
#[derive(Clone, Default)]
pub struct Observed {
    pub ready_calls: Arc<AtomicUsize>,
    pub progress_bytes: Arc<AtomicU64>,
}

impl Observed {
    pub fn hooks(&self) -> Hooks {
        let ready = Arc::clone(&self.ready_calls);
        let progress = Arc::clone(&self.progress_bytes);
        Hooks::new()
            .on_ready(move || {
                ready.fetch_add(1, Ordering::SeqCst);
            })
            .on_progress(move |n| {
                progress.fetch_add(n, Ordering::SeqCst);
            })
    }

    pub fn ready_calls(&self) -> usize {
        self.ready_calls.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> u64 {
        self.progress_bytes.load(Ordering::SeqCst)
    }
}

pub fn start(store: &MemoryStore, network: &MemoryNetwork) -> (FileSystem, Observed) {
    start_with(store, network, &[])
}

/// Start with a preload batch.
pub fn start_with(
    store: &MemoryStore,
    network: &MemoryNetwork,
    preload: &[&str],
) -> (FileSystem, Observed) {
    let observed = Observed::default();
    let options = Options {
        preload: preload.iter().map(|p| p.to_string()).collect(),
        ..Options::default()
    };
    let fs = FileSystem::start(options, store.clone(), network.clone(), observed.hooks()).unwrap();
    (fs, observed)
}

/// Poll the control thread until `path` reaches `want`.
pub fn wait_for_state(fs: &FileSystem, path: &str, want: FetchState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let state = fs.fetch_state(path).unwrap();
        if state == Some(want) {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "{} stuck in {:?}, wanted {:?}",
            path,
            state,
            want
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub fn read_to_end(fs: &FileSystem, fd: i32) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 7];
    loop {
        let n = fs.read(fd, &mut buf).unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}
