//! C ABI over a process-wide [`Shim`].
//!
//! The host installs one shim with [`install`] after starting its file
//! system; until then every call fails with `ENOENT`. Descriptors 0 to 2 go
//! to the OS whether or not a shim is installed.

use std::ffi::CStr;
use std::sync::OnceLock;

use libc::{c_char, c_int, c_void, off_t, size_t, ssize_t};

use crate::{is_std_stream, set_errno, Shim};

static SHIM: OnceLock<Shim> = OnceLock::new();

/// Install the process-wide shim. Returns it back if one is already installed.
pub fn install(shim: Shim) -> Result<(), Shim> {
    SHIM.set(shim)
}

/// The installed shim, if any.
pub fn installed() -> Option<&'static Shim> {
    SHIM.get()
}

fn with_shim<T>(fail: T, f: impl FnOnce(&Shim) -> T) -> T {
    match SHIM.get() {
        Some(shim) => f(shim),
        None => {
            set_errno(libc::ENOENT);
            fail
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn vload_open(path: *const c_char, flags: c_int) -> c_int {
    with_shim(-1, |shim| {
        if path.is_null() {
            set_errno(libc::EFAULT);
            return -1;
        }
        let path = CStr::from_ptr(path).to_string_lossy();
        shim.open(&path, flags)
    })
}

#[no_mangle]
pub unsafe extern "C" fn vload_close(fd: c_int) -> c_int {
    if is_std_stream(fd) {
        return libc::close(fd);
    }
    with_shim(-1, |shim| shim.close(fd))
}

#[no_mangle]
pub unsafe extern "C" fn vload_read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    if is_std_stream(fd) {
        return libc::read(fd, buf, count);
    }
    with_shim(-1, |shim| {
        if count == 0 {
            return shim.read(fd, &mut []);
        }
        if buf.is_null() {
            set_errno(libc::EFAULT);
            return -1;
        }
        let buf = std::slice::from_raw_parts_mut(buf.cast::<u8>(), count);
        shim.read(fd, buf)
    })
}

#[no_mangle]
pub unsafe extern "C" fn vload_write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
    if is_std_stream(fd) {
        return libc::write(fd, buf, count);
    }
    with_shim(-1, |shim| {
        if count == 0 {
            return shim.write(fd, &[]);
        }
        if buf.is_null() {
            set_errno(libc::EFAULT);
            return -1;
        }
        let buf = std::slice::from_raw_parts(buf.cast::<u8>(), count);
        shim.write(fd, buf)
    })
}

#[no_mangle]
pub unsafe extern "C" fn vload_lseek(fd: c_int, offset: off_t, whence: c_int) -> off_t {
    if is_std_stream(fd) {
        return libc::lseek(fd, offset, whence);
    }
    with_shim(-1, |shim| shim.lseek(fd, offset, whence))
}

#[no_mangle]
pub unsafe extern "C" fn vload_length(fd: c_int) -> off_t {
    with_shim(-1, |shim| shim.length(fd))
}
