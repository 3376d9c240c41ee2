//! Orchestrator phase and per-fetch state machines.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};

use tracing::info;

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Waiting for the local store to open
    OpeningStore = 0,
    /// Creating parent directories for the preload batch
    CreatingDirectories = 1,
    /// Directory barrier passed, fetches running
    Preloading = 2,
    /// "All ready" fired; later fetches take the late path
    Ready = 3,
    /// Finishing in-flight write-backs before shutdown
    Draining = 4,
    /// Control thread exited
    Stopped = 5,
}

impl From<u8> for Phase {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::OpeningStore,
            1 => Self::CreatingDirectories,
            2 => Self::Preloading,
            3 => Self::Ready,
            4 => Self::Draining,
            5 => Self::Stopped,
            _ => Self::OpeningStore,
        }
    }
}

/// Where one fetch currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Init,
    AwaitDirectory,
    AwaitQuery,
    AwaitLocalRead,
    AwaitNetworkFetch,
    AwaitWriteBack,
    Done,
}

impl FetchState {
    /// Whether `self -> next` is a legal step.
    pub fn can_advance(self, next: FetchState) -> bool {
        use FetchState::*;
        matches!(
            (self, next),
            (Init, AwaitDirectory)
                | (Init, Done)
                | (AwaitDirectory, AwaitQuery)
                | (AwaitDirectory, AwaitLocalRead)
                | (AwaitDirectory, Done)
                | (AwaitQuery, AwaitLocalRead)
                | (AwaitQuery, AwaitNetworkFetch)
                | (AwaitLocalRead, Done)
                | (AwaitNetworkFetch, AwaitWriteBack)
                | (AwaitNetworkFetch, Done)
                | (AwaitWriteBack, Done)
        )
    }
}

/// State shared between the control thread and application threads.
#[derive(Debug)]
pub(crate) struct Shared {
    phase: AtomicU8,
    ready: Mutex<bool>,
    ready_gate: Condvar,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(Phase::OpeningStore as u8),
            ready: Mutex::new(false),
            ready_gate: Condvar::new(),
        }
    }
}

impl Shared {
    pub fn phase(&self) -> Phase {
        Phase::from(self.phase.load(Ordering::Acquire))
    }

    /// Transition to a new phase (returns false if transition invalid)
    pub fn transition(&self, next: Phase) -> bool {
        let current = self.phase();

        let valid = matches!(
            (current, next),
            (Phase::OpeningStore, Phase::CreatingDirectories)
                | (Phase::OpeningStore, Phase::Ready)
                | (Phase::CreatingDirectories, Phase::Preloading)
                | (Phase::Preloading, Phase::Ready)
                | (Phase::Draining, Phase::Stopped)
        ) || (next == Phase::Draining
            && !matches!(current, Phase::Draining | Phase::Stopped));

        if valid {
            self.phase.store(next as u8, Ordering::Release);
            info!(?current, ?next, "Orchestrator phase transition");
        }
        valid
    }

    /// Force `Stopped`, used when the control thread exits on any path.
    pub fn stop(&self) {
        self.phase.store(Phase::Stopped as u8, Ordering::Release);
        self.mark_ready();
    }

    pub fn mark_ready(&self) {
        let mut ready = self.ready.lock().unwrap_or_else(|p| p.into_inner());
        *ready = true;
        drop(ready);
        self.ready_gate.notify_all();
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn wait_ready(&self) {
        let mut ready = self.ready.lock().unwrap_or_else(|p| p.into_inner());
        while !*ready {
            ready = self
                .ready_gate
                .wait(ready)
                .unwrap_or_else(|p| p.into_inner());
        }
    }
}
