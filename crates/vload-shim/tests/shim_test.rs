use std::sync::Arc;

use vload_core::{FileSystem, Hooks, Options};
use vload_shim::Shim;
use vload_store::{MemoryNetwork, MemoryStore};

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn shim_with(store: &MemoryStore, network: &MemoryNetwork, preload: &[&str]) -> Shim {
    let options = Options {
        preload: preload.iter().map(|p| p.to_string()).collect(),
        ..Options::default()
    };
    let fs = FileSystem::start(options, store.clone(), network.clone(), Hooks::new()).unwrap();
    fs.wait_ready();
    Shim::new(Arc::new(fs))
}

#[test]
fn test_open_read_existing_and_missing() {
    let store = MemoryStore::new().with_file("a.cfg", b"0123456789".to_vec());
    let network = MemoryNetwork::new();
    let shim = shim_with(&store, &network, &["a.cfg", "b.dat"]);

    let fd = shim.open("./a.cfg", libc::O_RDONLY);
    assert!(fd > 2);
    assert_eq!(shim.length(fd), 10);

    let mut buf = [0u8; 16];
    assert_eq!(shim.read(fd, &mut buf), 10);
    assert_eq!(&buf[..10], b"0123456789");
    assert_eq!(shim.read(fd, &mut buf), 0);
    assert_eq!(shim.close(fd), 0);

    assert_eq!(shim.open("b.dat", libc::O_RDONLY), -1);
    assert_eq!(errno(), libc::ENOENT);
    assert_eq!(shim.open("never.cfg", libc::O_RDONLY), -1);
    assert_eq!(errno(), libc::ENOENT);
}

#[test]
fn test_create_write_seek_read() {
    let store = MemoryStore::new();
    let network = MemoryNetwork::new();
    let shim = shim_with(&store, &network, &[]);

    let fd = shim.open("new.sav", libc::O_WRONLY | libc::O_CREAT);
    assert!(fd > 2);
    assert_eq!(shim.write(fd, b"hi"), 2);
    assert_eq!(shim.lseek(fd, 0, libc::SEEK_SET), 0);

    let mut buf = [0u8; 2];
    assert_eq!(shim.read(fd, &mut buf), 2);
    assert_eq!(&buf, b"hi");

    assert_eq!(shim.lseek(fd, 0, libc::SEEK_END), 2);
    assert_eq!(shim.lseek(fd, -1, libc::SEEK_CUR), 1);
    assert_eq!(shim.close(fd), 0);

    let fd = shim.open("new.sav", libc::O_RDONLY);
    assert_eq!(shim.length(fd), 2);
    shim.fs().shutdown();
    assert_eq!(store.contents("new.sav").unwrap(), b"hi");
}

#[test]
fn test_errors_set_errno() {
    let store = MemoryStore::new();
    let network = MemoryNetwork::new();
    let shim = shim_with(&store, &network, &[]);

    let mut buf = [0u8; 4];
    assert_eq!(shim.read(42, &mut buf), -1);
    assert_eq!(errno(), libc::ENOENT);
    assert_eq!(shim.close(42), -1);
    assert_eq!(errno(), libc::ENOENT);
    assert_eq!(shim.length(42), -1);
    assert_eq!(errno(), libc::ENOENT);

    let fd = shim.open("x.sav", libc::O_RDWR);
    assert_eq!(shim.lseek(fd, 0, 99), -1);
    assert_eq!(errno(), libc::EINVAL);

    // Negative positions are accepted by lseek and rejected by the next read.
    assert_eq!(shim.lseek(fd, -5, libc::SEEK_SET), -5);
    assert_eq!(shim.read(fd, &mut buf), -1);
    assert_eq!(errno(), libc::EINVAL);
    assert_eq!(shim.write(fd, b"x"), -1);
    assert_eq!(errno(), libc::EINVAL);

    // Growing past the store quota is refused instead of allocating.
    assert_eq!(shim.lseek(fd, i64::MAX, libc::SEEK_SET), i64::MAX);
    assert_eq!(shim.write(fd, b"x"), -1);
    assert_eq!(errno(), libc::EFBIG);
    assert_eq!(shim.length(fd), 0);
}

#[test]
fn test_std_streams_pass_through() {
    let store = MemoryStore::new();
    let network = MemoryNetwork::new();
    let shim = shim_with(&store, &network, &[]);

    assert_eq!(shim.write(2, b""), 0);
    assert_eq!(shim.fs().file_count(), 0);
}
