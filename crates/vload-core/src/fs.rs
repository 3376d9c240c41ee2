//! Blocking file API used by application threads.

use std::io::SeekFrom;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tokio::sync::oneshot;
use vload_config::path::normalize_virtual;
use vload_config::{log_fetch_debug, log_writeback_debug};
use vload_store::{LocalStore, NetworkSource};

use crate::control::{self, ControlMsg, ControlTx, Hooks, Options};
use crate::dump::hex_dump;
use crate::entry::{FileEntry, Readiness};
use crate::error::{Result, VfsError};
use crate::fd_table::{lock_handle, FdTable};
use crate::state::{FetchState, Phase, Shared};
use crate::table::FileTable;

/// Requested access on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    /// Write or read-write. Creates the file if it does not exist.
    Write,
}

/// The virtual file system: file table, descriptors and the control thread.
///
/// Every method blocks the calling thread as needed and must not be called
/// from inside an async runtime.
pub struct FileSystem {
    table: Arc<FileTable>,
    fds: FdTable,
    shared: Arc<Shared>,
    tx: ControlTx,
    control: Mutex<Option<JoinHandle<()>>>,
    size_hint: usize,
    /// Largest size a file may grow to: the store quota.
    max_file_size: u64,
}

impl FileSystem {
    /// Start the control thread and begin opening the local store.
    ///
    /// The paths in `options.preload` form the preload batch: they are
    /// requested before the store can finish opening, and `hooks.on_ready`
    /// fires once all of them have resolved. An empty batch is ready as soon
    /// as the store opens.
    pub fn start<S, N>(options: Options, store: S, network: N, hooks: Hooks) -> Result<Self>
    where
        S: LocalStore + Send + 'static,
        N: NetworkSource + Send + 'static,
    {
        let table = Arc::new(FileTable::new());
        let shared = Arc::new(Shared::default());
        let (tx, rx) = control::channel();

        let fs = Self {
            table: Arc::clone(&table),
            fds: FdTable::new(),
            shared: Arc::clone(&shared),
            tx: tx.clone(),
            control: Mutex::new(None),
            size_hint: options.size_hint,
            max_file_size: options.capacity,
        };
        for path in &options.preload {
            fs.fetch(path, options.size_hint)?;
        }

        let handle = control::spawn(tx, rx, store, network, table, shared, options, hooks)?;
        *fs.control.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        Ok(fs)
    }

    /// Request a file. Idempotent per normalized path.
    ///
    /// The entry exists (pending) when this returns; its bytes arrive later.
    /// Requests made after the preload batch resolved read the local store
    /// only and never fall back to the network.
    pub fn fetch(&self, path: &str, size_hint: usize) -> Result<()> {
        let name = normalize_virtual(path);
        let (entry, created) = self.table.insert_pending(&name);
        if !created {
            log_fetch_debug!("Already requested", path = name.as_str());
            return Ok(());
        }

        let msg = ControlMsg::Fetch {
            id: entry.id(),
            size_hint,
        };
        if self.tx.send(msg).is_err() {
            entry.resolve(None);
            return Err(VfsError::ControlThreadGone);
        }
        Ok(())
    }

    /// [`FileSystem::fetch`] with the configured size hint.
    pub fn fetch_default(&self, path: &str) -> Result<()> {
        self.fetch(path, self.size_hint)
    }

    /// Open a virtual file and return its descriptor.
    ///
    /// Waits for a pending fetch to resolve. A missing file is created empty
    /// when `access` is [`Access::Write`], otherwise it is [`VfsError::NotFound`].
    pub fn open(&self, path: &str, access: Access) -> Result<i32> {
        let name = normalize_virtual(path);
        let entry = match access {
            Access::Write => self.table.get_or_create_ready(&name),
            Access::Read => self.table.get(&name).ok_or_else(|| VfsError::NotFound {
                path: name.clone(),
            })?,
        };

        {
            let mut state = entry.wait();
            if state.readiness() == Readiness::Failed {
                match access {
                    Access::Write => state.revive(),
                    Access::Read => return Err(VfsError::NotFound { path: name }),
                }
            }
        }

        Ok(self.fds.insert(entry))
    }

    /// Close a descriptor, queueing a write-back if it was written to.
    pub fn close(&self, fd: i32) -> Result<()> {
        let handle = self
            .fds
            .remove(fd)
            .ok_or(VfsError::BadDescriptor { fd })?;
        let handle = lock_handle(&handle);
        if handle.dirty {
            let entry = &handle.entry;
            let depth = entry.enqueue_write();
            log_writeback_debug!("Queued write-back", path = entry.name(), depth = depth);
            self.tx
                .send(ControlMsg::QueueWrite { id: entry.id() })
                .map_err(|_| VfsError::ControlThreadGone)?;
        }
        Ok(())
    }

    /// Read from the current position. Returns 0 at end of file.
    pub fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize> {
        let handle = self.fds.get(fd).ok_or(VfsError::BadDescriptor { fd })?;
        let mut handle = lock_handle(&handle);
        let entry = Arc::clone(&handle.entry);
        let state = entry.wait();

        let position = checked_position(fd, handle.position)?;
        let data = state.data();
        if position >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - position);
        buf[..n].copy_from_slice(&data[position..position + n]);
        handle.position += n as i64;
        Ok(n)
    }

    /// Write at the current position, growing the file and zero-filling any gap.
    pub fn write(&self, fd: i32, buf: &[u8]) -> Result<usize> {
        let handle = self.fds.get(fd).ok_or(VfsError::BadDescriptor { fd })?;
        let mut handle = lock_handle(&handle);
        let entry = Arc::clone(&handle.entry);
        let mut state = entry.wait();

        let position = checked_position(fd, handle.position)?;
        let end = position
            .checked_add(buf.len())
            .ok_or(VfsError::InvalidPosition {
                fd,
                position: handle.position,
            })?;
        if state.data.len() < end {
            self.grow(fd, &mut state.data, end)?;
        }
        state.data[position..end].copy_from_slice(buf);
        handle.position = end as i64;
        handle.dirty = true;
        Ok(buf.len())
    }

    /// Zero-extend `data` to `end` bytes without aborting on a huge target.
    fn grow(&self, fd: i32, data: &mut Vec<u8>, end: usize) -> Result<()> {
        let size = end as u64;
        if size > self.max_file_size {
            return Err(VfsError::FileTooLarge {
                fd,
                size,
                limit: self.max_file_size,
            });
        }
        data.try_reserve_exact(end - data.len())
            .map_err(|_| VfsError::OutOfMemory { fd, size })?;
        data.resize(end, 0);
        Ok(())
    }

    /// Move the cursor. No clamping: a position before the start or past the
    /// end is accepted here and judged by the next read or write.
    pub fn seek(&self, fd: i32, pos: SeekFrom) -> Result<i64> {
        let handle = self.fds.get(fd).ok_or(VfsError::BadDescriptor { fd })?;
        let mut handle = lock_handle(&handle);
        let entry = Arc::clone(&handle.entry);
        let len = entry.wait().data().len() as i64;

        let overflow = |position| VfsError::InvalidPosition { fd, position };
        let next = match pos {
            SeekFrom::Start(offset) => {
                i64::try_from(offset).map_err(|_| overflow(i64::MAX))?
            }
            SeekFrom::Current(offset) => handle
                .position
                .checked_add(offset)
                .ok_or_else(|| overflow(handle.position))?,
            SeekFrom::End(offset) => len.checked_add(offset).ok_or_else(|| overflow(len))?,
        };
        handle.position = next;
        Ok(next)
    }

    /// Current size of the file behind `fd`.
    pub fn length(&self, fd: i32) -> Result<u64> {
        let handle = self.fds.get(fd).ok_or(VfsError::BadDescriptor { fd })?;
        let entry = Arc::clone(&lock_handle(&handle).entry);
        let len = entry.wait().data().len() as u64;
        Ok(len)
    }

    /// Whether `fd` is an open virtual descriptor.
    pub fn is_open(&self, fd: i32) -> bool {
        self.fds.contains(fd)
    }

    /// Block until the preload batch has resolved (or the control thread stopped).
    pub fn wait_ready(&self) {
        self.shared.wait_ready();
    }

    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    /// Entry for `path`, if it was ever fetched or created.
    pub fn entry(&self, path: &str) -> Option<Arc<FileEntry>> {
        self.table.get(&normalize_virtual(path))
    }

    /// Readiness of `path` without waiting.
    pub fn readiness(&self, path: &str) -> Option<Readiness> {
        self.entry(path).map(|entry| entry.readiness())
    }

    /// Where the fetch for `path` stands, asked of the control thread.
    ///
    /// `None` for paths that were never fetched (for example created by open).
    pub fn fetch_state(&self, path: &str) -> Result<Option<FetchState>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlMsg::Inspect {
                name: normalize_virtual(path),
                reply,
            })
            .map_err(|_| VfsError::ControlThreadGone)?;
        rx.blocking_recv().map_err(|_| VfsError::ControlThreadGone)
    }

    /// Hex dump of a file's current bytes. Waits for a pending fetch.
    pub fn dump(&self, path: &str) -> Result<String> {
        let name = normalize_virtual(path);
        let entry = self
            .table
            .get(&name)
            .ok_or_else(|| VfsError::NotFound { path: name.clone() })?;
        let state = entry.wait();
        if state.readiness() == Readiness::Failed {
            return Err(VfsError::NotFound { path: name });
        }
        Ok(hex_dump(state.data()))
    }

    /// Number of entries in the file table.
    pub fn file_count(&self) -> usize {
        self.table.len()
    }

    /// Drain queued write-backs and stop the control thread.
    pub fn shutdown(&self) {
        let handle = self
            .control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };
        let _ = self.tx.send(ControlMsg::Shutdown);
        if handle.join().is_err() {
            tracing::error!("Control thread panicked");
        }
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn checked_position(fd: i32, position: i64) -> Result<usize> {
    usize::try_from(position).map_err(|_| VfsError::InvalidPosition { fd, position })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vload_store::{MemoryNetwork, MemoryStore};

    fn started() -> FileSystem {
        FileSystem::start(
            Options::default(),
            MemoryStore::new(),
            MemoryNetwork::new(),
            Hooks::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_missing_for_read_is_not_found() {
        let fs = started();
        let err = fs.open("nothing.cfg", Access::Read).unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }

    #[test]
    fn test_negative_position_is_rejected_on_read() {
        let fs = started();
        let fd = fs.open("x.sav", Access::Write).unwrap();
        assert_eq!(fs.seek(fd, SeekFrom::Current(-4)).unwrap(), -4);

        let mut buf = [0u8; 4];
        let err = fs.read(fd, &mut buf).unwrap_err();
        assert!(matches!(err, VfsError::InvalidPosition { position: -4, .. }));
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let fs = started();
        let fd = fs.open("gap.sav", Access::Write).unwrap();
        fs.seek(fd, SeekFrom::Start(3)).unwrap();
        fs.write(fd, b"hi").unwrap();

        assert_eq!(fs.length(fd).unwrap(), 5);
        fs.seek(fd, SeekFrom::Start(0)).unwrap();
        let mut buf = [0xffu8; 5];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"\0\0\0hi");
    }

    #[test]
    fn test_write_far_past_end_is_rejected() {
        let fs = started();
        let fd = fs.open("far.sav", Access::Write).unwrap();
        fs.write(fd, b"keep").unwrap();

        fs.seek(fd, SeekFrom::Start(i64::MAX as u64)).unwrap();
        let err = fs.write(fd, b"x").unwrap_err();
        assert!(matches!(err, VfsError::FileTooLarge { .. }));
        assert_eq!(err.errno(), libc::EFBIG);

        fs.seek(fd, SeekFrom::Start(u64::MAX >> 2)).unwrap();
        assert!(fs.write(fd, b"x").is_err());
        assert_eq!(fs.length(fd).unwrap(), 4);
    }

    #[test]
    fn test_write_beyond_store_capacity_is_rejected() {
        let options = Options {
            capacity: 8,
            ..Options::default()
        };
        let fs = FileSystem::start(options, MemoryStore::new(), MemoryNetwork::new(), Hooks::new())
            .unwrap();
        let fd = fs.open("small.sav", Access::Write).unwrap();

        assert_eq!(fs.write(fd, b"12345678").unwrap(), 8);
        let err = fs.write(fd, b"9").unwrap_err();
        assert!(matches!(
            err,
            VfsError::FileTooLarge {
                size: 9,
                limit: 8,
                ..
            }
        ));
        assert_eq!(fs.length(fd).unwrap(), 8);
    }

    #[test]
    fn test_unknown_descriptor() {
        let fs = started();
        assert!(matches!(
            fs.close(77),
            Err(VfsError::BadDescriptor { fd: 77 })
        ));
        let mut buf = [0u8; 1];
        assert!(matches!(
            fs.read(77, &mut buf),
            Err(VfsError::BadDescriptor { fd: 77 })
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let fs = started();
        fs.shutdown();
        fs.shutdown();
        assert_eq!(fs.phase(), Phase::Stopped);
        assert!(matches!(
            fs.fetch("late.cfg", 16),
            Err(VfsError::ControlThreadGone)
        ));
        assert_eq!(fs.readiness("late.cfg"), Some(Readiness::Failed));
    }
}
