//! Local store backed by a directory on disk.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;
use vload_config::path::store_relative;
use vload_config::{log_store_debug, log_store_warn};

use crate::{LocalStore, Result, StoreError, StoreFile};

/// Durable store rooted at a directory.
///
/// Virtual paths are mapped below `root`; paths that would escape it are
/// rejected. The quota passed to [`LocalStore::open`] caps the end offset of
/// any single write.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    capacity: AtomicU64,
    opened: AtomicBool,
}

impl DiskStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            capacity: AtomicU64::new(0),
            opened: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_open(&self) -> Result<()> {
        if self.opened.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::NotOpen)
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        match store_relative(path) {
            Some(relative) => Ok(self.root.join(relative)),
            None => {
                log_store_warn!("Path escapes store root", path = path);
                Err(StoreError::InvalidPath {
                    path: path.to_string(),
                })
            }
        }
    }
}

impl LocalStore for DiskStore {
    type File = DiskFile;

    #[instrument(skip(self), level = "debug")]
    async fn open(&self, capacity: u64) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        self.capacity.store(capacity, Ordering::Release);
        self.opened.store(true, Ordering::Release);
        log_store_debug!(
            "Store opened",
            root = tracing::field::display(self.root.display()),
            capacity = capacity
        );
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn make_dir_all(&self, path: &str) -> Result<()> {
        self.ensure_open()?;
        if path.trim_matches('/').is_empty() {
            return Ok(());
        }
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn open_file(&self, path: &str) -> Result<DiskFile> {
        self.ensure_open()?;
        let full = self.resolve(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&full)
            .await?;
        Ok(DiskFile {
            file,
            capacity: self.capacity.load(Ordering::Acquire),
        })
    }
}

/// Open file inside a [`DiskStore`].
#[derive(Debug)]
pub struct DiskFile {
    file: File,
    capacity: u64,
}

impl StoreFile for DiskFile {
    async fn query_length(&mut self) -> Result<u64> {
        Ok(self.file.metadata().await?.len())
    }

    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        Ok(self.file.read(buf).await?)
    }

    async fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        let end = offset + buf.len() as u64;
        if end > self.capacity {
            log_store_warn!(
                "Write exceeds store capacity",
                requested = end,
                capacity = self.capacity
            );
            return Err(StoreError::CapacityExceeded {
                requested: end,
                capacity: self.capacity,
            });
        }
        self.file.seek(SeekFrom::Start(offset)).await?;
        Ok(self.file.write(buf).await?)
    }

    async fn set_length(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }
}
