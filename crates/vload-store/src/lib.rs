//! # vload-store
//!
//! Byte-store transports for vload.
//!
//! Two asynchronous collaborators feed the virtual file table:
//!
//! - a durable [`LocalStore`] (open with a quota, create directories, open files
//!   that support positional reads and writes), and
//! - a [`NetworkSource`] used as fallback when the local copy is missing.
//!
//! Both are driven from a single control thread. Every operation is `async` and
//! completes on that thread; none of them block it.
//!
//! ## Adapters
//!
//! ```text
//! LocalStore     -> DiskStore   (tokio::fs, rooted directory)
//!                -> MemoryStore (in-process, instrumented for tests)
//! NetworkSource  -> HttpSource  (reqwest, status 200 only)
//!                -> MemoryNetwork
//! ```
//!
//! [`transfer::read_all`] and [`transfer::write_all`] implement the chunked
//! whole-file transfers on top of any [`StoreFile`].

mod disk;
mod http;
pub mod memory;
pub mod transfer;

pub use disk::{DiskFile, DiskStore};
pub use http::HttpSource;
pub use memory::{MemoryNetwork, MemoryStats, MemoryStore, StoreOp};
pub use transfer::{read_all, write_all, DEFAULT_CHUNK_SIZE};

use std::io;

use thiserror::Error;

/// Errors raised by local store adapters
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Store is not open")]
    NotOpen,

    #[error("Invalid store path: {path}")]
    InvalidPath { path: String },

    #[error("Write up to {requested} bytes exceeds store capacity {capacity}")]
    CapacityExceeded { requested: u64, capacity: u64 },
}

/// Errors raised by network sources. Callers treat every variant as "not found".
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response for {url}: {reason}")]
    Malformed { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Per-chunk progress sink, called with the byte length of each chunk.
pub type Progress<'a> = &'a mut dyn FnMut(usize);

/// Durable local store.
///
/// Paths are virtual paths (`id1/gfx.wad`); adapters map them under their root.
#[allow(async_fn_in_trait)]
pub trait LocalStore {
    type File: StoreFile;

    /// Open the store with the requested quota. Must complete before any other call.
    async fn open(&self, capacity: u64) -> Result<()>;

    /// Create a directory and its ancestors. Succeeds if it already exists.
    async fn make_dir_all(&self, path: &str) -> Result<()>;

    /// Open a file for reading and writing, creating it empty if absent.
    async fn open_file(&self, path: &str) -> Result<Self::File>;
}

/// An open file inside a [`LocalStore`].
#[allow(async_fn_in_trait)]
pub trait StoreFile {
    async fn query_length(&mut self) -> Result<u64>;

    /// Read into `buf` at `offset`. Returns 0 at end of file.
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` at `offset`. Returns the number of bytes accepted.
    async fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize>;

    async fn set_length(&mut self, len: u64) -> Result<()>;

    /// Make previous writes durable.
    async fn flush(&mut self) -> Result<()>;
}

/// Remote origin for files that are not in the local store.
#[allow(async_fn_in_trait)]
pub trait NetworkSource {
    /// Download the whole resource behind `path`.
    ///
    /// `size_hint` pre-sizes the body buffer; `progress` sees every received chunk.
    async fn get(
        &self,
        path: &str,
        size_hint: usize,
        progress: Progress<'_>,
    ) -> std::result::Result<Vec<u8>, FetchError>;
}
