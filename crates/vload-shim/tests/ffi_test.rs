//! C ABI. One test per process: the shim can only be installed once.

use std::ffi::CString;
use std::sync::Arc;

use vload_core::{FileSystem, Hooks, Options};
use vload_shim::ffi::{
    install, installed, vload_close, vload_length, vload_lseek, vload_open, vload_read,
    vload_write,
};
use vload_shim::Shim;
use vload_store::{MemoryNetwork, MemoryStore};

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[test]
fn test_c_abi_before_and_after_install() {
    let path = CString::new("id1/config.cfg").unwrap();

    unsafe {
        assert_eq!(vload_open(path.as_ptr(), libc::O_RDONLY), -1);
        assert_eq!(errno(), libc::ENOENT);
        assert_eq!(vload_length(3), -1);
    }

    let store = MemoryStore::new().with_file("id1/config.cfg", b"bind w +forward".to_vec());
    let options = Options {
        preload: vec!["id1/config.cfg".into()],
        ..Options::default()
    };
    let fs = FileSystem::start(options, store, MemoryNetwork::new(), Hooks::new()).unwrap();
    fs.wait_ready();
    assert!(install(Shim::new(Arc::new(fs))).is_ok());
    assert!(installed().is_some());

    unsafe {
        let fd = vload_open(path.as_ptr(), libc::O_RDWR);
        assert!(fd > 2);
        assert_eq!(vload_length(fd), 15);

        let mut buf = [0u8; 4];
        assert_eq!(vload_read(fd, buf.as_mut_ptr().cast(), buf.len()), 4);
        assert_eq!(&buf, b"bind");

        assert_eq!(vload_lseek(fd, 5, libc::SEEK_SET), 5);
        let patch = b"s";
        assert_eq!(vload_write(fd, patch.as_ptr().cast(), patch.len()), 1);
        assert_eq!(vload_lseek(fd, 0, libc::SEEK_SET), 0);

        let mut all = [0u8; 15];
        assert_eq!(vload_read(fd, all.as_mut_ptr().cast(), all.len()), 15);
        assert_eq!(&all, b"bind s +forward");
        assert_eq!(vload_close(fd), 0);

        assert_eq!(vload_open(std::ptr::null(), libc::O_RDONLY), -1);
        assert_eq!(errno(), libc::EFAULT);
        assert_eq!(vload_read(fd, std::ptr::null_mut(), 0), -1);
        assert_eq!(errno(), libc::ENOENT);
    }
}
