//! End-to-end tests for the vload binary against a disk store.

use std::path::Path;
use std::process::{Command, Output};

use vload_config::testing::TestEnvironment;

/// Nothing listens on the discard port.
const UNREACHABLE: &str = "http://127.0.0.1:9";

fn vload(env: &TestEnvironment, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vload"))
        .arg("--store-root")
        .arg(&env.store_root)
        .args(["--base-url", UNREACHABLE])
        .args(args)
        .current_dir(&env.work_dir)
        .env("HOME", &env.work_dir)
        .env_remove("VLOAD_STORE_ROOT")
        .env_remove("VLOAD_BASE_URL")
        .env_remove("VLOAD_CHUNK_SIZE")
        .env_remove("VLOAD_STORE_CAPACITY")
        .output()
        .expect("Failed to execute vload")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_config_prints_defaults() {
    let env = TestEnvironment::new().unwrap();
    let output = vload(&env, &["config"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("[store]"));
    assert!(out.contains("[network]"));
    assert!(out.contains("chunk_size = 4096"));
}

#[test]
fn test_cat_reads_local_file() {
    let env = TestEnvironment::new().unwrap();
    env.seed_file("id1/config.cfg", b"bind w +forward\n").unwrap();

    let output = vload(&env, &["cat", "./id1/config.cfg"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "bind w +forward\n");
}

#[test]
fn test_cat_hex_dump() {
    let env = TestEnvironment::new().unwrap();
    env.seed_file("a.cfg", b"abc").unwrap();

    let output = vload(&env, &["cat", "a.cfg", "--hex"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "00 6162 63\n");
}

#[test]
fn test_cat_missing_file_fails() {
    let env = TestEnvironment::new().unwrap();
    let output = vload(&env, &["cat", "gone.cfg"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("gone.cfg"));
}

#[test]
fn test_preload_reports_each_file() {
    let env = TestEnvironment::new().unwrap();
    env.seed_file("id1/pak0.pak", &[7u8; 5000]).unwrap();
    let list = env
        .write_list("batch.txt", &["id1/pak0.pak", "id1/missing.wad"])
        .unwrap();

    let output = vload(&env, &["preload", "--list", path_str(&list)]);
    let out = stdout(&output);

    assert!(!output.status.success());
    assert!(out.contains("ok") && out.contains("5000  id1/pak0.pak"));
    assert!(out.contains("failed") && out.contains("id1/missing.wad"));
    assert!(out.contains("1 of 2 files ready"));
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}
