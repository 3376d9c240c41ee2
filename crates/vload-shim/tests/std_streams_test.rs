//! Descriptors 0 to 2 reach the OS. No shim is ever installed in this process.

use std::sync::Arc;

use libc::c_int;
use vload_core::{FileSystem, Hooks, Options};
use vload_shim::ffi::{vload_lseek, vload_write};
use vload_shim::Shim;
use vload_store::{MemoryNetwork, MemoryStore};

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Run `f` with stderr redirected into a pipe; return its result and the bytes written.
fn capture_stderr<T>(f: impl FnOnce() -> T) -> (T, Vec<u8>) {
    unsafe {
        let mut fds: [c_int; 2] = [0; 2];
        assert_eq!(libc::pipe(fds.as_mut_ptr()), 0);
        let saved = libc::dup(2);
        assert!(saved >= 0);
        assert_eq!(libc::dup2(fds[1], 2), 2);

        let result = f();

        assert_eq!(libc::dup2(saved, 2), 2);
        libc::close(saved);
        libc::close(fds[1]);

        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = libc::read(fds[0], buf.as_mut_ptr().cast(), buf.len());
            if n <= 0 {
                break;
            }
            out.extend_from_slice(&buf[..n as usize]);
        }
        libc::close(fds[0]);
        (result, out)
    }
}

#[test]
fn test_std_streams_pass_through_with_and_without_shim() {
    let (results, written) = capture_stderr(|| unsafe {
        let n = vload_write(2, b"abi\n".as_ptr().cast(), 4);
        // A pipe cannot seek: the real lseek answers, not the virtual table.
        let pos = vload_lseek(2, 0, libc::SEEK_CUR);
        (n, pos, errno())
    });
    assert_eq!(results, (4, -1, libc::ESPIPE));
    assert_eq!(written, b"abi\n");

    // Virtual descriptors still fail until a shim is installed.
    unsafe {
        assert_eq!(vload_write(3, b"x".as_ptr().cast(), 1), -1);
    }
    assert_eq!(errno(), libc::ENOENT);

    let fs = FileSystem::start(
        Options::default(),
        MemoryStore::new(),
        MemoryNetwork::new(),
        Hooks::new(),
    )
    .unwrap();
    fs.wait_ready();
    let shim = Shim::new(Arc::new(fs));

    let (n, written) = capture_stderr(|| shim.write(2, b"shim\n"));
    assert_eq!(n, 5);
    assert_eq!(written, b"shim\n");
    assert_eq!(shim.fs().file_count(), 0);
}
