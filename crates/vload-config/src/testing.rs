//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary local store root
//! - Seeding files into that store
//! - Writing preload list files
//!
//! # Usage
//!
//! ```ignore
//! use vload_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new()?;
//! env.seed_file("id1/config.cfg", b"bind w +forward")?;
//! let config = env.config();
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::path::store_relative;
use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Local store root for this test
    pub store_root: PathBuf,
    /// Scratch directory for list files and other inputs
    pub work_dir: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let store_root = root.join("store");
        let work_dir = root.join("work");

        std::fs::create_dir_all(&store_root)?;
        std::fs::create_dir_all(&work_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            store_root,
            work_dir,
            test_id,
        })
    }

    /// Place a file directly in the local store, bypassing vload.
    pub fn seed_file(&self, virtual_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let relative = store_relative(virtual_path)
            .ok_or_else(|| anyhow::anyhow!("invalid virtual path: {}", virtual_path))?;
        let path = self.store_root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Read a file straight from the local store.
    pub fn stored(&self, virtual_path: &str) -> Option<Vec<u8>> {
        let relative = store_relative(virtual_path)?;
        std::fs::read(self.store_root.join(relative)).ok()
    }

    /// Write a preload list file with one path per line.
    pub fn write_list(&self, name: &str, paths: &[&str]) -> anyhow::Result<PathBuf> {
        let path = self.work_dir.join(name);
        let mut body = paths.join("\n");
        body.push('\n');
        std::fs::write(&path, body)?;
        Ok(path)
    }

    /// Config pointing at this environment's store.
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.store.root = self.store_root.clone();
        cfg
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
