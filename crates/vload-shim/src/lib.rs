//! # vload-shim
//!
//! POSIX-style file calls for a legacy application, served from a
//! [`vload_core::FileSystem`].
//!
//! Every call returns the C convention: a non-negative result on success, or
//! `-1` with `errno` set. Descriptors 0 to 2 are never intercepted and go to
//! the real OS calls.
//!
//! ```ignore
//! let shim = Shim::new(Arc::new(fs));
//! let fd = shim.open("id1/config.cfg", libc::O_RDONLY);
//! let n = shim.read(fd, &mut buf);
//! ```
//!
//! The [`ffi`] module exposes the same calls as `extern "C"` symbols over a
//! process-wide shim installed once.

#![allow(clippy::missing_safety_doc)]

pub mod ffi;

use std::io::SeekFrom;
use std::sync::Arc;

use libc::{c_int, off_t, ssize_t};
use vload_config::{log_shim_debug, log_shim_error, log_shim_trace};
use vload_core::{Access, FileSystem, VfsError};

// ============================================================================
// Platform-specific errno handling
// ============================================================================

#[cfg(target_os = "linux")]
fn set_errno(errno: c_int) {
    unsafe { *libc::__errno_location() = errno };
}

#[cfg(target_os = "macos")]
fn set_errno(errno: c_int) {
    unsafe { *libc::__error() = errno };
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn set_errno(_errno: c_int) {}

/// Highest descriptor that always belongs to the OS (stdin, stdout, stderr).
pub const LAST_STD_STREAM: c_int = 2;

fn is_std_stream(fd: c_int) -> bool {
    (0..=LAST_STD_STREAM).contains(&fd)
}

/// Map `open` flags to the access they request.
pub fn access_for(flags: c_int) -> Access {
    if flags & libc::O_ACCMODE == libc::O_RDONLY {
        Access::Read
    } else {
        Access::Write
    }
}

/// Syscall surface bound to one file system.
#[derive(Clone)]
pub struct Shim {
    fs: Arc<FileSystem>,
}

impl Shim {
    pub fn new(fs: Arc<FileSystem>) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    fn fail(&self, call: &'static str, fd: c_int, err: VfsError) -> c_int {
        match &err {
            VfsError::BadDescriptor { .. } => {
                log_shim_error!("Unknown descriptor", call = call, fd = fd);
            }
            _ => {
                log_shim_debug!(
                    "Call failed",
                    call = call,
                    fd = fd,
                    error = tracing::field::display(&err)
                );
            }
        }
        set_errno(err.errno());
        -1
    }

    pub fn open(&self, path: &str, flags: c_int) -> c_int {
        let access = access_for(flags);
        log_shim_trace!("open", path = path, flags = flags);
        match self.fs.open(path, access) {
            Ok(fd) => fd,
            Err(e) => {
                log_shim_debug!(
                    "open failed",
                    path = path,
                    error = tracing::field::display(&e)
                );
                set_errno(e.errno());
                -1
            }
        }
    }

    pub fn close(&self, fd: c_int) -> c_int {
        if is_std_stream(fd) {
            return unsafe { libc::close(fd) };
        }
        match self.fs.close(fd) {
            Ok(()) => 0,
            Err(e) => self.fail("close", fd, e),
        }
    }

    pub fn read(&self, fd: c_int, buf: &mut [u8]) -> ssize_t {
        if is_std_stream(fd) {
            return unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        }
        match self.fs.read(fd, buf) {
            Ok(n) => n as ssize_t,
            Err(e) => self.fail("read", fd, e) as ssize_t,
        }
    }

    pub fn write(&self, fd: c_int, buf: &[u8]) -> ssize_t {
        if is_std_stream(fd) {
            return unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        }
        match self.fs.write(fd, buf) {
            Ok(n) => n as ssize_t,
            Err(e) => self.fail("write", fd, e) as ssize_t,
        }
    }

    pub fn lseek(&self, fd: c_int, offset: off_t, whence: c_int) -> off_t {
        if is_std_stream(fd) {
            return unsafe { libc::lseek(fd, offset, whence) };
        }
        let offset = offset as i64;
        let pos = match whence {
            libc::SEEK_SET => match u64::try_from(offset) {
                Ok(start) => SeekFrom::Start(start),
                // SeekFrom::Start is unsigned; keep the negative target for the next read.
                Err(_) => return self.seek_negative(fd, offset),
            },
            libc::SEEK_CUR => SeekFrom::Current(offset),
            libc::SEEK_END => SeekFrom::End(offset),
            _ => {
                set_errno(libc::EINVAL);
                return -1;
            }
        };
        match self.fs.seek(fd, pos) {
            Ok(position) => position as off_t,
            Err(e) => self.fail("lseek", fd, e) as off_t,
        }
    }

    /// `SEEK_SET` to a negative offset, expressed relative to the current position.
    fn seek_negative(&self, fd: c_int, target: i64) -> off_t {
        let current = match self.fs.seek(fd, SeekFrom::Current(0)) {
            Ok(current) => current,
            Err(e) => return self.fail("lseek", fd, e) as off_t,
        };
        let Some(delta) = target.checked_sub(current) else {
            set_errno(libc::EINVAL);
            return -1;
        };
        match self.fs.seek(fd, SeekFrom::Current(delta)) {
            Ok(position) => position as off_t,
            Err(e) => self.fail("lseek", fd, e) as off_t,
        }
    }

    /// Size of the file behind `fd`.
    pub fn length(&self, fd: c_int) -> off_t {
        match self.fs.length(fd) {
            Ok(len) => len as off_t,
            Err(e) => self.fail("length", fd, e) as off_t,
        }
    }
}
