//! # vload-core
//!
//! Synchronous file access over an asynchronous byte source.
//!
//! A legacy, blocking application reads and writes virtual files through
//! [`FileSystem`]; the bytes come from a [`vload_store::LocalStore`] and, when
//! missing there, from a [`vload_store::NetworkSource`]. Both are only driven
//! from a dedicated control thread.
//!
//! ```text
//! app thread(s)                         control thread ("vload-control")
//! ─────────────                         ────────────────────────────────
//! fetch(path) ── insert Pending ──────► Orchestrator
//! open/read ─── wait on entry gate        ├─ open store, create dirs (barrier)
//!                    ▲                    ├─ query ─► local read | download
//!                    └──── resolve ───────┤
//! close(dirty) ─ enqueue snapshot ────►   └─ write-back queue (one in flight per file)
//! ```
//!
//! Entries are never evicted; the table grows for the lifetime of the run.

mod control;
mod dump;
pub mod entry;
pub mod error;
pub mod fd_table;
mod fs;
mod state;
pub mod table;

pub use control::{Hooks, Options};
pub use dump::hex_dump;
pub use entry::{EntryId, FileEntry, Readiness};
pub use error::{Result, VfsError};
pub use fd_table::FIRST_DESCRIPTOR;
pub use fs::{Access, FileSystem};
pub use state::{FetchState, Phase};
pub use table::FileTable;
