//! Dispatcher tests against an in-memory remote store.
//!
//! These drive `HdfsOps` the way the kernel bridge does (open, write, flush,
//! release, and so on) and check both what callers see and which remote calls
//! were made.

mod common;

use common::*;
use hdfs_mount_core::{ErrorCategory, MemoryStore, Permission, RemoteError, StoreOp};
use hdfs_mount_staging::{EntryKind, FIRST_HANDLE_ID, StagingMode};
use std::time::{Duration, UNIX_EPOCH};

// ============================================================================
// Write path
// ============================================================================

#[test]
fn test_create_write_flush_uploads_once() {
    let mut ops = ops();

    let fh = ops.create("/new.txt", 0o644).unwrap();
    let created = ops.store().peek(&remote("/new.txt")).unwrap();
    assert_eq!(created.length, 0);
    assert_eq!(created.permission.bits(), 0o644);

    assert_eq!(ops.write(fh, 0, b"hello").unwrap(), 5);
    // Nothing leaves the mount before flush
    assert_eq!(remote_contents(&ops, "/new.txt").unwrap(), b"");
    assert_eq!(ops.store().writes().len(), 1);

    ops.flush(fh).unwrap();
    assert_eq!(remote_contents(&ops, "/new.txt").unwrap(), b"hello");
    assert_eq!(ops.store().writes().len(), 2);
    assert_eq!(last_write_permission(&ops), Some(0o644));
    // A new file has no remote bytes worth fetching
    assert!(ops.store().reads().is_empty());

    ops.release(fh).unwrap();
    assert!(ops.handles().is_empty());
}

#[test]
fn test_partial_overwrite_fetches_only_gaps() {
    let mut ops = ops();
    seed_file(&ops, "/data.bin", b"0123456789", 0o600);

    let fh = ops.open("/data.bin").unwrap();
    ops.write(fh, 5, b"xyz").unwrap();
    ops.flush(fh).unwrap();

    let path = remote("/data.bin");
    assert_eq!(
        ops.store().reads(),
        vec![(path.clone(), 0, 5), (path.clone(), 8, 2)]
    );
    let writes = ops.store().writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].path, path);
    assert_eq!(writes[0].data, b"01234xyz89");
    assert_eq!(writes[0].permission.bits(), 0o600);
}

#[test]
fn test_partial_overwrite_with_disk_staging() {
    let mut ops = ops_with(MemoryStore::with_owner("alice", "hadoop"), StagingMode::Disk);
    seed_file(&ops, "/data.bin", b"0123456789", 0o600);

    let fh = ops.open("/data.bin").unwrap();
    ops.write(fh, 5, b"xyz").unwrap();
    ops.write(fh, 12, b"!").unwrap();
    ops.flush(fh).unwrap();

    // Bytes 10 and 11 were never remote and never written
    assert_eq!(
        remote_contents(&ops, "/data.bin").unwrap(),
        b"01234xyz89\0\0!"
    );
    let path = remote("/data.bin");
    assert_eq!(ops.store().reads(), vec![(path.clone(), 0, 5), (path, 8, 2)]);
    ops.release(fh).unwrap();
}

#[test]
fn test_writes_apply_in_order() {
    let mut ops = ops();
    let fh = ops.create("/ordered", 0o644).unwrap();

    ops.write(fh, 0, b"aaaa").unwrap();
    ops.write(fh, 2, b"bb").unwrap();
    ops.write(fh, 3, b"c").unwrap();
    ops.flush(fh).unwrap();

    assert_eq!(remote_contents(&ops, "/ordered").unwrap(), b"aabc");
}

#[test]
fn test_flush_without_changes_is_noop() {
    let mut ops = ops();
    seed_file(&ops, "/quiet", b"abc", 0o644);

    let fh = ops.open("/quiet").unwrap();
    ops.flush(fh).unwrap();
    ops.fsync(fh).unwrap();
    assert_eq!(ops.store().calls(StoreOp::WriteWhole), 0);

    ops.write(fh, 0, b"A").unwrap();
    ops.flush(fh).unwrap();
    ops.flush(fh).unwrap();
    assert_eq!(ops.store().calls(StoreOp::WriteWhole), 1);
    assert_eq!(remote_contents(&ops, "/quiet").unwrap(), b"Abc");
}

#[test]
fn test_permission_stable_across_flushes() {
    let mut ops = ops();
    let fh = ops.create("/report.csv", 0o640).unwrap();

    for round in 0..3u8 {
        ops.write(fh, u64::from(round), &[b'a' + round]).unwrap();
        ops.flush(fh).unwrap();
    }

    let writes = ops.store().writes();
    assert_eq!(writes.len(), 4);
    assert!(writes.iter().all(|w| w.permission.bits() == 0o640));
    assert_eq!(remote_contents(&ops, "/report.csv").unwrap(), b"abc");
}

#[test]
fn test_chmod_while_open_applies_to_next_rewrite() {
    let mut ops = ops();
    seed_file(&ops, "/script.sh", b"echo", 0o600);

    let fh = ops.open("/script.sh").unwrap();
    ops.chmod("/script.sh", 0o100755).unwrap();
    ops.write(fh, 4, b" hi").unwrap();
    ops.flush(fh).unwrap();

    assert_eq!(last_write_permission(&ops), Some(0o755));
    let stat = ops.store().peek(&remote("/script.sh")).unwrap();
    assert_eq!(stat.permission.bits(), 0o755);
}

#[test]
fn test_failed_sync_stays_dirty_and_retries() {
    let mut ops = ops();
    seed_file(&ops, "/flaky", b"0123456789", 0o644);

    let fh = ops.open("/flaky").unwrap();
    ops.write(fh, 0, b"AB").unwrap();
    ops.store()
        .fail_next(StoreOp::WriteWhole, RemoteError::Io("pipeline broken".to_string()));

    let err = ops.flush(fh).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::IoFault);
    assert_eq!(err.to_errno(), libc::EIO);
    assert!(ops.handles().staging(&remote("/flaky")).unwrap().is_dirty());
    assert_eq!(remote_contents(&ops, "/flaky").unwrap(), b"0123456789");

    // Nothing new is queued, but the path is still dirty
    ops.fsync(fh).unwrap();
    assert_eq!(remote_contents(&ops, "/flaky").unwrap(), b"AB23456789");
    assert!(!ops.handles().staging(&remote("/flaky")).unwrap().is_dirty());
}

#[test]
fn test_release_drops_unflushed_writes() {
    let mut ops = ops();
    seed_file(&ops, "/drop", b"keep", 0o644);

    let fh = ops.open("/drop").unwrap();
    ops.write(fh, 0, b"lost").unwrap();
    ops.release(fh).unwrap();

    assert_eq!(remote_contents(&ops, "/drop").unwrap(), b"keep");
    assert_eq!(ops.store().calls(StoreOp::WriteWhole), 0);
}

// ============================================================================
// Read path
// ============================================================================

#[test]
fn test_read_without_writes_fetches_remote() {
    let mut ops = ops();
    seed_file(&ops, "/r", b"0123456789", 0o644);
    let fh = ops.open("/r").unwrap();

    assert_eq!(ops.read(fh, 2, 4).unwrap(), b"2345");
    assert_eq!(ops.store().reads(), vec![(remote("/r"), 2, 4)]);
}

#[test]
fn test_read_clamps_at_end_of_file() {
    let mut ops = ops();
    seed_file(&ops, "/r", b"0123456789", 0o644);
    let fh = ops.open("/r").unwrap();

    assert_eq!(ops.read(fh, 8, 100).unwrap(), b"89");
    assert!(ops.read(fh, 10, 4).unwrap().is_empty());
    assert!(ops.read(fh, 20, 4).unwrap().is_empty());
    assert_eq!(ops.store().reads(), vec![(remote("/r"), 8, 2)]);
}

#[test]
fn test_read_after_flush_is_local() {
    let mut ops = ops();
    seed_file(&ops, "/r", b"0123456789", 0o644);
    let fh = ops.open("/r").unwrap();
    ops.write(fh, 5, b"xyz").unwrap();
    ops.flush(fh).unwrap();
    ops.store().reset_log();

    assert_eq!(ops.read(fh, 0, 10).unwrap(), b"01234xyz89");
    assert!(ops.store().reads().is_empty());
}

#[test]
fn test_read_after_growing_truncate_is_local() {
    let mut ops = ops();
    seed_file(&ops, "/r", b"0123456789", 0o644);
    let fh = ops.open("/r").unwrap();
    ops.truncate("/r", 12, Some(fh)).unwrap();
    ops.store().reset_log();

    assert_eq!(ops.read(fh, 6, 6).unwrap(), b"6789\0\0");
    assert!(ops.store().reads().is_empty());
}

#[test]
fn test_read_ignores_queued_writes() {
    let mut ops = ops();
    seed_file(&ops, "/r", b"0123", 0o644);
    let fh = ops.open("/r").unwrap();
    ops.write(fh, 0, b"ZZ").unwrap();

    assert_eq!(ops.read(fh, 0, 4).unwrap(), b"0123");
}

#[test]
fn test_short_remote_read_is_io_fault() {
    let mut ops = ops();
    seed_file(&ops, "/shrinking", b"0123456789", 0o644);
    let fh = ops.open("/shrinking").unwrap();

    // Someone else truncates the object behind our back
    ops.store()
        .put_file(&remote("/shrinking"), b"0123", Permission::new(0o644));

    let err = ops.read(fh, 0, 10).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::IoFault);
    assert_eq!(err.to_errno(), libc::EIO);
}

// ============================================================================
// Handles
// ============================================================================

#[test]
fn test_handle_ids_start_at_42_and_reuse_lowest() {
    let mut ops = ops();
    seed_file(&ops, "/h", b"x", 0o644);

    let a = ops.open("/h").unwrap();
    let b = ops.open("/h").unwrap();
    let c = ops.create("/other", 0o644).unwrap();
    assert_eq!((a, b, c), (FIRST_HANDLE_ID, 43, 44));

    ops.release(b).unwrap();
    assert_eq!(ops.open("/h").unwrap(), 43);
    assert!(ops.handles().is_consistent());
}

#[test]
fn test_handles_share_path_buffer() {
    let mut ops = ops();
    seed_file(&ops, "/shared", b"0123456789", 0o644);

    let a = ops.open("/shared").unwrap();
    let b = ops.open("/shared").unwrap();
    assert_ne!(a, b);
    // The second open reuses the staging state without a remote stat
    assert_eq!(ops.store().calls(StoreOp::Status), 1);

    ops.write(a, 0, b"AB").unwrap();
    ops.flush(a).unwrap();
    ops.store().reset_log();

    assert_eq!(ops.read(b, 0, 4).unwrap(), b"AB23");
    assert!(ops.store().reads().is_empty());
}

#[test]
fn test_release_last_handle_drops_staging() {
    let mut ops = ops();
    seed_file(&ops, "/shared", b"abc", 0o644);
    let path = remote("/shared");

    let a = ops.open("/shared").unwrap();
    let b = ops.open("/shared").unwrap();
    ops.write(a, 0, b"A").unwrap();
    ops.flush(a).unwrap();

    ops.release(a).unwrap();
    let staging = ops.handles().staging(&path).unwrap();
    assert!(!staging.staged().is_empty());
    assert_eq!(staging.handle_ids().len(), 1);

    ops.release(b).unwrap();
    assert!(ops.handles().staging(&path).is_none());
    assert_eq!(ops.handles().path_count(), 0);
}

#[test]
fn test_unknown_handle_is_ebadf() {
    let mut ops = ops();

    for err in [
        ops.read(7, 0, 1).unwrap_err(),
        ops.write(7, 0, b"x").unwrap_err(),
        ops.flush(7).unwrap_err(),
        ops.fsync(7).unwrap_err(),
        ops.release(7).unwrap_err(),
    ] {
        assert_eq!(err.category(), ErrorCategory::NotOpen);
        assert_eq!(err.to_errno(), libc::EBADF);
    }
}

#[test]
fn test_double_release_is_ebadf() {
    let mut ops = ops();
    let fh = ops.create("/once", 0o644).unwrap();
    ops.release(fh).unwrap();
    assert_eq!(ops.release(fh).unwrap_err().to_errno(), libc::EBADF);
}

// ============================================================================
// Truncate
// ============================================================================

#[test]
fn test_truncate_without_handle() {
    let mut ops = ops();
    seed_file(&ops, "/t", b"hello world", 0o640);

    ops.truncate("/t", 5, None).unwrap();
    assert_eq!(remote_contents(&ops, "/t").unwrap(), b"hello");
    assert_eq!(last_write_permission(&ops), Some(0o640));
    assert!(ops.handles().is_empty());

    ops.truncate("/t", 8, None).unwrap();
    assert_eq!(remote_contents(&ops, "/t").unwrap(), b"hello\0\0\0");
    assert_eq!(ops.handles().path_count(), 0);
}

#[test]
fn test_truncate_to_zero_fetches_nothing() {
    let mut ops = ops();
    seed_file(&ops, "/t", b"hello", 0o644);

    ops.truncate("/t", 0, None).unwrap();
    assert_eq!(remote_contents(&ops, "/t").unwrap(), b"");
    assert!(ops.store().reads().is_empty());
}

#[test]
fn test_truncate_through_handle_applies_queued_writes() {
    let mut ops = ops();
    seed_file(&ops, "/t", b"hello", 0o644);

    let fh = ops.open("/t").unwrap();
    ops.write(fh, 0, b"HE").unwrap();
    ops.truncate("/t", 3, Some(fh)).unwrap();

    assert_eq!(remote_contents(&ops, "/t").unwrap(), b"HEl");
    assert_eq!(ops.store().reads(), vec![(remote("/t"), 2, 1)]);
    assert!(!ops.handles().get(fh).unwrap().has_pending());
    assert_eq!(ops.getattr("/t").unwrap().size, 3);
}

#[test]
fn test_truncate_missing_file() {
    let mut ops = ops();
    let err = ops.truncate("/missing", 0, None).unwrap_err();
    assert_eq!(err.to_errno(), libc::ENOENT);
    assert!(ops.handles().is_empty());
}

// ============================================================================
// Attributes and directory cache
// ============================================================================

fn seed_listing(ops: &TestOps) {
    ops.store().put_file(&remote("/d/a"), b"aa", Permission::new(0o644));
    ops.store().put_file(&remote("/d/b"), b"bbb", Permission::new(0o600));
    ops.store().reset_log();
}

#[test]
fn test_readdir_primes_getattr() {
    let mut ops = ops();
    seed_listing(&ops);

    let mut names: Vec<String> = ops.readdir("/d").unwrap().into_iter().map(|(n, _)| n).collect();
    names.sort();
    assert_eq!(names, ["a", "b"]);

    assert_eq!(ops.getattr("/d/a").unwrap().size, 2);
    let b = ops.getattr("/d/b").unwrap();
    assert_eq!(b.size, 3);
    assert_eq!(b.perm(), 0o600);
    assert_eq!(ops.store().calls(StoreOp::Status), 0);
    assert_eq!(ops.dir_cache().consumed_count(), 2);

    // Missing from the listing: answered without a remote call
    let err = ops.getattr("/d/zzz").unwrap_err();
    assert_eq!(err.to_errno(), libc::ENOENT);
    assert_eq!(ops.store().calls(StoreOp::Status), 0);
}

#[test]
fn test_getattr_outside_listing_invalidates() {
    let mut ops = ops();
    seed_listing(&ops);
    ops.readdir("/d").unwrap();

    assert_eq!(ops.getattr("/other/x").unwrap_err().to_errno(), libc::ENOENT);
    assert_eq!(ops.store().calls(StoreOp::Status), 1);
    assert!(ops.dir_cache().subject().is_none());

    ops.getattr("/d/a").unwrap();
    assert_eq!(ops.store().calls(StoreOp::Status), 2);
}

#[test]
fn test_other_operations_invalidate_listing() {
    let mut ops = ops();
    seed_listing(&ops);
    ops.readdir("/d").unwrap();

    ops.access("/d/a", libc::R_OK).unwrap();
    assert_eq!(ops.store().calls(StoreOp::Status), 1);

    ops.getattr("/d/a").unwrap();
    assert_eq!(ops.store().calls(StoreOp::Status), 2);
}

#[test]
fn test_getattr_reports_queued_size() {
    let mut ops = ops();
    let fh = ops.create("/growing", 0o644).unwrap();
    ops.write(fh, 0, b"hello").unwrap();

    let attrs = ops.getattr("/growing").unwrap();
    assert_eq!(attrs.size, 5);
    assert_eq!(attrs.kind, EntryKind::File);
    assert_eq!(ops.store().peek(&remote("/growing")).unwrap().length, 0);
}

#[test]
fn test_getattr_maps_ownership() {
    let mut ops = ops();
    seed_file(&ops, "/mine", b"", 0o644);
    let attrs = ops.getattr("/mine").unwrap();
    assert_eq!((attrs.uid, attrs.gid), (UID, GID));
    assert_eq!(attrs.nlink, 1);

    let mut foreign = ops_with(MemoryStore::with_owner("bob", "staff"), StagingMode::Memory);
    seed_file(&foreign, "/theirs", b"", 0o644);
    let attrs = foreign.getattr("/theirs").unwrap();
    assert_eq!((attrs.uid, attrs.gid), (0, 0));
}

#[test]
fn test_root_is_directory() {
    let mut ops = ops();
    let attrs = ops.getattr("/").unwrap();
    assert_eq!(attrs.kind, EntryKind::Directory);
    assert_eq!(attrs.mode & u32::from(libc::S_IFMT), u32::from(libc::S_IFDIR));
    assert_eq!(attrs.nlink, 2);
}

#[test]
fn test_utimens_sets_times() {
    let mut ops = ops();
    seed_file(&ops, "/stamp", b"", 0o644);
    let before = ops.getattr("/stamp").unwrap();

    let atime = UNIX_EPOCH + Duration::from_millis(1_600_000_000_123);
    ops.utimens("/stamp", Some(atime), None).unwrap();

    let after = ops.getattr("/stamp").unwrap();
    assert_eq!(after.atime, atime);
    assert_eq!(after.mtime, before.mtime);
}

// ============================================================================
// Namespace operations
// ============================================================================

#[test]
fn test_mkdir_rmdir() {
    let mut ops = ops();

    ops.mkdir("/x/y", 0o40750).unwrap();
    let stat = ops.store().peek(&remote("/x/y")).unwrap();
    assert!(stat.is_dir());
    assert_eq!(stat.permission.bits(), 0o750);

    ops.rmdir("/x").unwrap();
    assert!(ops.store().peek(&remote("/x")).is_none());
    assert!(ops.store().peek(&remote("/x/y")).is_none());
}

#[test]
fn test_unlink_file() {
    let mut ops = ops();
    seed_file(&ops, "/doomed", b"x", 0o644);

    ops.unlink("/doomed").unwrap();
    assert!(remote_contents(&ops, "/doomed").is_none());
    assert_eq!(ops.unlink("/doomed").unwrap_err().to_errno(), libc::ENOENT);
}

#[test]
fn test_create_existing_is_eexist() {
    let mut ops = ops();
    seed_file(&ops, "/taken", b"x", 0o644);

    let err = ops.create("/taken", 0o644).unwrap_err();
    assert_eq!(err.to_errno(), libc::EEXIST);
    assert!(ops.handles().is_empty());
    assert_eq!(remote_contents(&ops, "/taken").unwrap(), b"x");
}

#[test]
fn test_open_missing_is_enoent() {
    let mut ops = ops();
    assert_eq!(ops.open("/nope").unwrap_err().to_errno(), libc::ENOENT);
    assert!(ops.handles().is_empty());
}

#[test]
fn test_rename_while_open() {
    let mut ops = ops();
    seed_file(&ops, "/a", b"0123", 0o644);

    let fh = ops.open("/a").unwrap();
    ops.write(fh, 0, b"X").unwrap();
    ops.rename("/a", "/b").unwrap();
    ops.flush(fh).unwrap();

    assert!(remote_contents(&ops, "/a").is_none());
    assert_eq!(remote_contents(&ops, "/b").unwrap(), b"X123");
    assert_eq!(ops.handles().get(fh).unwrap().path(), remote("/b"));
    assert!(ops.handles().is_consistent());
}

#[test]
fn test_rename_access_denied_is_eacces() {
    let mut ops = ops();
    seed_file(&ops, "/a", b"x", 0o644);
    ops.store().fail_next(
        StoreOp::Rename,
        RemoteError::from_exception(
            "org.apache.hadoop.security.AccessControlException",
            "Permission denied: user=alice, access=WRITE".to_string(),
        ),
    );

    let err = ops.rename("/a", "/b").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::AccessDenied);
    assert_eq!(err.to_errno(), libc::EACCES);
    assert!(remote_contents(&ops, "/a").is_some());
}

#[test]
fn test_unmapped_remote_failure_is_enotsup() {
    let mut ops = ops();
    seed_file(&ops, "/a", b"x", 0o644);
    ops.store().fail_next(
        StoreOp::Rename,
        RemoteError::from_exception("SafeModeException", "Name node is in safe mode".to_string()),
    );

    let err = ops.rename("/a", "/b").unwrap_err();
    assert_eq!(err.to_errno(), libc::ENOTSUP);
    assert!(err.to_string().contains("safe mode"));
    assert_eq!(err.reply_errno("rename"), libc::ENOTSUP);
}

#[test]
fn test_unsupported_operations_are_enosys() {
    let mut ops = ops();
    seed_file(&ops, "/f", b"x", 0o644);

    for err in [
        ops.readlink("/f").unwrap_err(),
        ops.symlink("/f", "/l").unwrap_err(),
        ops.link("/f", "/l").unwrap_err(),
        ops.statfs("/").unwrap_err(),
        ops.chown("/f", Some(0), None).unwrap_err(),
    ] {
        assert_eq!(err.category(), ErrorCategory::NotImplemented);
        assert_eq!(err.to_errno(), libc::ENOSYS);
    }
    assert!(ops.store().peek(&remote("/l")).is_none());
}

#[test]
fn test_mknod_is_accepted_and_ignored() {
    let mut ops = ops();
    ops.mknod("/fifo", 0o10644).unwrap();
    assert_eq!(ops.store().calls(StoreOp::WriteWhole), 0);
    assert!(ops.store().peek(&remote("/fifo")).is_none());
}

#[test]
fn test_access_checks_existence_only() {
    let mut ops = ops();
    seed_file(&ops, "/locked", b"", 0o000);

    ops.access("/locked", libc::W_OK).unwrap();
    assert_eq!(ops.access("/absent", libc::F_OK).unwrap_err().to_errno(), libc::ENOENT);
}
