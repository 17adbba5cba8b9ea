//! Shared harness for dispatcher tests.
//!
//! Builds an [`HdfsOps`] over a [`MemoryStore`] rooted at `/user/alice`, with
//! `alice:hadoop` mapped to uid 1000 / gid 100.

#![allow(dead_code)]

use hdfs_mount_core::{MemoryStore, Permission};
use hdfs_mount_fuse::HdfsOps;
use hdfs_mount_staging::{Ownership, PathResolver, StagingMode};

/// Remote directory the mount is rooted at.
pub const ROOT: &str = "/user/alice";

pub const UID: u32 = 1000;
pub const GID: u32 = 100;

pub type TestOps = HdfsOps<MemoryStore>;

/// Routes dispatcher logs to the test output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("hdfs_mount_fuse=trace,hdfs_mount_staging=debug")
        .with_test_writer()
        .try_init();
}

/// Dispatcher with in-memory staging over a store whose entries belong to alice.
pub fn ops() -> TestOps {
    ops_with(MemoryStore::with_owner("alice", "hadoop"), StagingMode::Memory)
}

/// Dispatcher over `store` using the given staging mode.
pub fn ops_with(store: MemoryStore, mode: StagingMode) -> TestOps {
    init_tracing();
    store.put_dir(ROOT, Permission::new(0o755));
    HdfsOps::new(
        store,
        PathResolver::new(ROOT),
        Ownership::new("alice", "hadoop", UID, GID),
        mode,
    )
}

/// Remote path of a mount-relative path.
pub fn remote(path: &str) -> String {
    format!("{ROOT}{path}")
}

/// Seeds a remote file under the mount root and clears the call log.
pub fn seed_file(ops: &TestOps, path: &str, data: &[u8], mode: u16) {
    ops.store().put_file(&remote(path), data, Permission::new(mode));
    ops.store().reset_log();
}

/// Remote content of a mount-relative path.
pub fn remote_contents(ops: &TestOps, path: &str) -> Option<Vec<u8>> {
    ops.store().contents(&remote(path))
}

/// Permission bits of the last whole-object write.
pub fn last_write_permission(ops: &TestOps) -> Option<u16> {
    ops.store().writes().last().map(|w| w.permission.bits())
}
