//! Filesystem operation dispatcher.
//!
//! [`HdfsOps`] implements the POSIX operation surface on top of a
//! [`RemoteStore`]. Paths are mount-relative (`/docs/a.txt`) and are resolved
//! under the configured remote root before any remote call.
//!
//! Writes are queued on their handle and only reach the shared staging buffer
//! on `flush`/`fsync`, which then reconcile the buffer against the remote
//! object and replace it wholesale. Metadata operations are one remote call
//! each. Operations run one at a time, so none of the state here is locked.

use crate::error::{FsError, FsResult};
use bytes::Bytes;
use hdfs_mount_core::{Permission, RemoteError, RemoteStat, RemoteStore};
use hdfs_mount_staging::{
    ByteRange, CacheLookup, DirCache, HandleTable, Ownership, PathResolver, PathStaging,
    PosixAttrs, StagingError, StagingMode, to_posix,
};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

/// Dispatcher owning the handle table and directory cache for one mount.
#[derive(Debug)]
pub struct HdfsOps<S> {
    store: S,
    resolver: PathResolver,
    ownership: Ownership,
    handles: HandleTable,
    dir_cache: DirCache,
}

impl<S: RemoteStore> HdfsOps<S> {
    /// Creates a dispatcher with no open handles and an empty cache.
    pub fn new(store: S, resolver: PathResolver, ownership: Ownership, mode: StagingMode) -> Self {
        Self {
            store,
            resolver,
            ownership,
            handles: HandleTable::new(mode),
            dir_cache: DirCache::new(),
        }
    }

    /// The remote store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Open handles and their staging state.
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// The directory listing cache.
    pub fn dir_cache(&self) -> &DirCache {
        &self.dir_cache
    }

    /// Mount-relative to remote path mapping.
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Ownership remapping policy.
    pub fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    /// Attributes for a remote status, sized through any open handles.
    fn attrs_for(&self, remote: &str, stat: &RemoteStat) -> FsResult<PosixAttrs> {
        let mut attrs = to_posix(stat, &self.ownership)?;
        if let Some(len) = self.handles.effective_len(remote) {
            attrs.size = len;
        }
        Ok(attrs)
    }

    /// Status of a remote path, answered from the last listing when possible.
    fn stat_path(&mut self, remote: &str) -> FsResult<RemoteStat> {
        match self.dir_cache.try_get_cached(remote) {
            CacheLookup::Hit(stat) => Ok(stat),
            CacheLookup::Absent => Err(RemoteError::NotFound(remote.to_string()).into()),
            CacheLookup::Miss => {
                self.dir_cache.invalidate();
                Ok(self.store.status(remote)?)
            }
        }
    }

    /// Checks that `path` exists. No permission check is made locally.
    pub fn access(&mut self, path: &str, mask: i32) -> FsResult<()> {
        trace!(path, mask, "access");
        self.dir_cache.invalidate();
        self.store.status(&self.resolver.resolve(path))?;
        Ok(())
    }

    /// Sets the permission bits of `path`.
    ///
    /// An open path also keeps the new bits for its next rewrite.
    pub fn chmod(&mut self, path: &str, mode: u32) -> FsResult<()> {
        trace!(path, mode, "chmod");
        self.dir_cache.invalidate();
        let remote = self.resolver.resolve(path);
        let permission = Permission::from_mode(mode);
        self.store.set_permission(&remote, permission)?;
        if let Some(staging) = self.handles.staging_mut(&remote) {
            staging.set_permission(permission);
        }
        Ok(())
    }

    /// Ownership changes are not supported.
    pub fn chown(&mut self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        trace!(path, ?uid, ?gid, "chown");
        self.dir_cache.invalidate();
        Err(FsError::NotImplemented("chown"))
    }

    /// Attributes of `path`.
    pub fn getattr(&mut self, path: &str) -> FsResult<PosixAttrs> {
        trace!(path, "getattr");
        let remote = self.resolver.resolve(path);
        let stat = self.stat_path(&remote)?;
        self.attrs_for(&remote, &stat)
    }

    /// Lists `path` and primes the directory cache with the result.
    ///
    /// Entries of a type that cannot be mounted are skipped.
    pub fn readdir(&mut self, path: &str) -> FsResult<Vec<(String, PosixAttrs)>> {
        trace!(path, "readdir");
        self.dir_cache.invalidate();
        let remote = self.resolver.resolve(path);
        let entries = self.store.list(&remote)?;

        let mut out = Vec::with_capacity(entries.len());
        for (name, stat) in &entries {
            let child = hdfs_mount_staging::join(&remote, name);
            match self.attrs_for(&child, stat) {
                Ok(attrs) => out.push((name.clone(), attrs)),
                Err(FsError::Staging(StagingError::UnsupportedType(kind))) => {
                    debug!(path = child.as_str(), %kind, "Skipping unsupported entry");
                }
                Err(e) => return Err(e),
            }
        }
        self.dir_cache.on_readdir(&remote, entries);
        Ok(out)
    }

    /// Symbolic links are not supported.
    pub fn readlink(&mut self, path: &str) -> FsResult<String> {
        trace!(path, "readlink");
        self.dir_cache.invalidate();
        Err(FsError::NotImplemented("readlink"))
    }

    /// Accepted and ignored; regular files are created through [`create`](Self::create).
    pub fn mknod(&mut self, path: &str, mode: u32) -> FsResult<()> {
        trace!(path, mode, "mknod");
        self.dir_cache.invalidate();
        Ok(())
    }

    /// Removes a directory and everything below it.
    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        trace!(path, "rmdir");
        self.dir_cache.invalidate();
        self.store.delete(&self.resolver.resolve(path), true)?;
        Ok(())
    }

    /// Creates a directory (and any missing parents).
    pub fn mkdir(&mut self, path: &str, mode: u32) -> FsResult<()> {
        trace!(path, mode, "mkdir");
        self.dir_cache.invalidate();
        self.store
            .make_dirs(&self.resolver.resolve(path), Permission::from_mode(mode))?;
        Ok(())
    }

    /// Filesystem statistics are not supported.
    pub fn statfs(&mut self, path: &str) -> FsResult<()> {
        trace!(path, "statfs");
        self.dir_cache.invalidate();
        Err(FsError::NotImplemented("statfs"))
    }

    /// Removes a file.
    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        trace!(path, "unlink");
        self.dir_cache.invalidate();
        self.store.delete(&self.resolver.resolve(path), false)?;
        Ok(())
    }

    /// Symbolic links are not supported.
    pub fn symlink(&mut self, target: &str, link: &str) -> FsResult<()> {
        trace!(target, link, "symlink");
        self.dir_cache.invalidate();
        Err(FsError::NotImplemented("symlink"))
    }

    /// Renames `old` to `new`, carrying any open staging state along.
    pub fn rename(&mut self, old: &str, new: &str) -> FsResult<()> {
        trace!(old, new, "rename");
        self.dir_cache.invalidate();
        let from = self.resolver.resolve(old);
        let to = self.resolver.resolve(new);
        self.store.rename(&from, &to)?;
        self.handles.rekey(&from, &to);
        Ok(())
    }

    /// Hard links are not supported.
    pub fn link(&mut self, target: &str, link: &str) -> FsResult<()> {
        trace!(target, link, "link");
        self.dir_cache.invalidate();
        Err(FsError::NotImplemented("link"))
    }

    /// Sets access and modification times; `None` leaves a time unchanged.
    pub fn utimens(
        &mut self,
        path: &str,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        trace!(path, ?atime, ?mtime, "utimens");
        self.dir_cache.invalidate();
        self.store.set_times(
            &self.resolver.resolve(path),
            atime.map(to_millis),
            mtime.map(to_millis),
        )?;
        Ok(())
    }

    /// Opens an existing file and returns its handle id.
    pub fn open(&mut self, path: &str) -> FsResult<u64> {
        trace!(path, "open");
        let remote = self.resolver.resolve(path);
        // Later handles share the open state and ignore size and permission
        let fh = if self.handles.staging(&remote).is_some() {
            self.handles
                .open_handle(&remote, 0, false, Permission::new(0))?
        } else {
            let stat = self.stat_path(&remote)?;
            self.handles
                .open_handle(&remote, stat.length, false, stat.permission)?
        };
        self.dir_cache.invalidate();
        Ok(fh)
    }

    /// Creates an empty file with the given mode and opens it.
    pub fn create(&mut self, path: &str, mode: u32) -> FsResult<u64> {
        trace!(path, mode, "create");
        self.dir_cache.invalidate();
        let remote = self.resolver.resolve(path);
        let permission = Permission::from_mode(mode);
        self.store.create_empty(&remote, permission, false)?;
        Ok(self.handles.open_handle(&remote, 0, true, permission)?)
    }

    /// Reads up to `size` bytes at `offset` through an open handle.
    ///
    /// Staged bytes come from the buffer; the rest is fetched remotely, or
    /// reads as zeros past the remote object's end. Queued writes that have
    /// not been flushed are not visible.
    pub fn read(&mut self, fh: u64, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        trace!(fh, offset, size, "read");
        self.dir_cache.invalidate();
        let handle = self.handles.get(fh).ok_or(StagingError::NotOpen(fh))?;
        let path = handle.path();
        let staging = self
            .handles
            .staging(path)
            .ok_or(StagingError::NotOpen(fh))?;

        let end = offset.saturating_add(u64::from(size)).min(staging.len());
        if offset >= end {
            return Ok(Vec::new());
        }
        let window = ByteRange::new(offset, end);
        let plan = staging.plan(window);
        let mut out = vec![0u8; to_usize(window.len())?];

        for range in &plan.covered {
            let bytes = staging.read_local(*range)?;
            place(&mut out, offset, range.start, &bytes);
        }
        for gap in &plan.gaps {
            if let Some(range) = staging.fetchable(*gap) {
                let bytes = fetch_range(&self.store, path, range)?;
                place(&mut out, offset, range.start, &bytes);
            }
        }
        Ok(out)
    }

    /// Queues a write on the handle. Always accepts the full length.
    pub fn write(&mut self, fh: u64, offset: u64, data: &[u8]) -> FsResult<usize> {
        trace!(fh, offset, size = data.len(), "write");
        self.dir_cache.invalidate();
        let handle = self
            .handles
            .get_mut(fh)
            .ok_or(StagingError::NotOpen(fh))?;
        handle.queue_write(offset, Bytes::copy_from_slice(data));
        Ok(data.len())
    }

    /// Resizes `path`, zero-extending when growing, and syncs the result.
    ///
    /// Without a handle, a temporary one is opened and released around the call.
    pub fn truncate(&mut self, path: &str, len: u64, fh: Option<u64>) -> FsResult<()> {
        trace!(path, len, ?fh, "truncate");
        self.dir_cache.invalidate();
        if let Some(fh) = fh {
            return self.truncate_open(fh, len);
        }

        let fh = self.open(path)?;
        let result = self.truncate_open(fh, len);
        let released = self.release(fh);
        result.and(released)
    }

    fn truncate_open(&mut self, fh: u64, len: u64) -> FsResult<()> {
        let (handle, staging) = self.handles.entry(fh)?;
        for write in handle.take_pending() {
            staging.apply_write(write.offset, &write.data)?;
        }
        staging.truncate(len)?;
        sync_staging(&self.store, handle.path(), staging)
    }

    /// Applies the handle's queued writes and syncs the path if it changed.
    ///
    /// A no-op when nothing is queued and the path is clean.
    pub fn flush(&mut self, fh: u64) -> FsResult<()> {
        trace!(fh, "flush");
        self.commit(fh)
    }

    /// Same as [`flush`](Self::flush); a path left dirty by a failed sync is retried.
    pub fn fsync(&mut self, fh: u64) -> FsResult<()> {
        trace!(fh, "fsync");
        self.commit(fh)
    }

    fn commit(&mut self, fh: u64) -> FsResult<()> {
        self.dir_cache.invalidate();
        let (handle, staging) = self.handles.entry(fh)?;
        let pending = handle.take_pending();
        for write in &pending {
            staging.apply_write(write.offset, &write.data)?;
        }
        if !staging.is_dirty() {
            return Ok(());
        }
        sync_staging(&self.store, handle.path(), staging)
    }

    /// Closes a handle. The last close on a path drops its staging state.
    ///
    /// Writes still queued on the handle are discarded.
    pub fn release(&mut self, fh: u64) -> FsResult<()> {
        trace!(fh, "release");
        self.dir_cache.invalidate();
        let handle = self.handles.close_handle(fh)?;
        if handle.has_pending() {
            warn!(
                fh,
                path = handle.path(),
                writes = handle.pending().len(),
                "Released handle with unflushed writes"
            );
        }
        Ok(())
    }
}

/// Reconciles the whole buffer and replaces the remote object with it.
///
/// On failure the staging state keeps its buffer and stays dirty.
fn sync_staging<S: RemoteStore>(store: &S, path: &str, staging: &mut PathStaging) -> FsResult<()> {
    let plan = staging.plan(ByteRange::new(0, staging.len()));
    for gap in plan.gaps {
        if let Some(range) = staging.fetchable(gap) {
            let bytes = fetch_range(store, path, range)?;
            staging.fill(range.start, &bytes)?;
        }
    }
    let contents = staging.contents()?;
    store.write_whole(path, &contents, staging.permission(), true)?;
    staging.mark_synced();
    debug!(path, size = contents.len(), permission = %staging.permission(), "Rewrote remote object");
    Ok(())
}

/// Reads exactly `range` from the remote object.
fn fetch_range<S: RemoteStore>(store: &S, path: &str, range: ByteRange) -> FsResult<Bytes> {
    debug!(path, %range, "Fetching gap");
    let bytes = store.read_range(path, range.start, range.len())?;
    let actual = bytes.len() as u64;
    if actual != range.len() {
        return Err(FsError::ShortRead {
            path: path.to_string(),
            expected: range.len(),
            actual,
        });
    }
    Ok(bytes)
}

/// Copies `bytes` (which start at absolute offset `at`) into a window starting at `base`.
fn place(out: &mut [u8], base: u64, at: u64, bytes: &[u8]) {
    let Ok(start) = usize::try_from(at - base) else {
        return;
    };
    let end = (start + bytes.len()).min(out.len());
    if start < end {
        out[start..end].copy_from_slice(&bytes[..end - start]);
    }
}

fn to_usize(len: u64) -> FsResult<usize> {
    usize::try_from(len).map_err(|_| {
        FsError::from(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "read too large",
        ))
    })
}

/// Milliseconds since the epoch; times before it clamp to zero.
fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
