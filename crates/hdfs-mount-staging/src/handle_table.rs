//! Open handles and per-path staging state.
//!
//! Many handles may be open on one remote path. They share one
//! [`PathStaging`], so a write flushed through one handle is visible to reads
//! through every other. [`HandleTable`] owns both directions of the
//! handle/path association and updates them together.
//!
//! # Handle Lifecycle
//!
//! 1. **Open**: allocate the smallest free id >= [`FIRST_HANDLE_ID`], creating
//!    the path's staging state on first open
//! 2. **Write**: queue [`PendingWrite`]s on the handle
//! 3. **Flush**: apply the queue to the shared buffer
//! 4. **Close**: drop the id; the last close discards the staging state

use crate::buffer::{StagingBuffer, StagingMode};
use crate::error::{StagingError, StagingResult};
use crate::interval::{ByteRange, IntervalSet, Reconciliation};
use bytes::Bytes;
use hdfs_mount_core::Permission;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use tracing::debug;

/// Lowest handle id handed out.
pub const FIRST_HANDLE_ID: u64 = 42;

/// A write accepted by `write` but not yet applied to the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    /// Offset of the first byte.
    pub offset: u64,
    /// Bytes to write.
    pub data: Bytes,
}

/// An open file handle.
#[derive(Debug)]
pub struct Handle {
    id: u64,
    path: String,
    pending: Vec<PendingWrite>,
}

impl Handle {
    /// Handle id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote path the handle is open on.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Writes queued on this handle, in arrival order.
    pub fn pending(&self) -> &[PendingWrite] {
        &self.pending
    }

    /// True if writes are queued.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Queues a write.
    pub fn queue_write(&mut self, offset: u64, data: Bytes) {
        self.pending.push(PendingWrite { offset, data });
    }

    /// Removes and returns the queued writes.
    pub fn take_pending(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.pending)
    }
}

/// Staging state for one remote path with at least one open handle.
#[derive(Debug)]
pub struct PathStaging {
    buffer: StagingBuffer,
    staged: IntervalSet,
    handles: BTreeSet<u64>,
    is_new_file: bool,
    permission: Permission,
    /// Leading bytes that exist remotely; nothing past it is ever fetched.
    remote_extent: u64,
    dirty: bool,
}

impl PathStaging {
    fn new(
        mode: StagingMode,
        size: u64,
        is_new_file: bool,
        permission: Permission,
    ) -> io::Result<Self> {
        Ok(Self {
            buffer: StagingBuffer::new(mode, size)?,
            staged: IntervalSet::new(),
            handles: BTreeSet::new(),
            is_new_file,
            permission,
            remote_extent: if is_new_file { 0 } else { size },
            dirty: false,
        })
    }

    /// Current buffer length.
    #[inline]
    pub fn len(&self) -> u64 {
        self.buffer.len()
    }

    /// True if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Ids of the handles open on this path.
    pub fn handle_ids(&self) -> &BTreeSet<u64> {
        &self.handles
    }

    /// Ranges already present in the buffer.
    pub fn staged(&self) -> &IntervalSet {
        &self.staged
    }

    /// True if the path was created by this mount and never synced.
    pub fn is_new_file(&self) -> bool {
        self.is_new_file
    }

    /// Permission to send with the next rewrite.
    pub fn permission(&self) -> Permission {
        self.permission
    }

    /// Replaces the permission sent with the next rewrite.
    pub fn set_permission(&mut self, permission: Permission) {
        self.permission = permission;
    }

    /// Number of leading bytes that exist remotely.
    pub fn remote_extent(&self) -> u64 {
        self.remote_extent
    }

    /// True if the buffer holds changes the remote has not seen.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes into the buffer and records the range as staged.
    pub fn apply_write(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.buffer.write_at(offset, data)?;
        self.staged.insert(ByteRange::at(offset, data.len() as u64));
        self.dirty = true;
        Ok(())
    }

    /// Copies fetched remote bytes into the buffer and records them as staged.
    ///
    /// Does not mark the path dirty.
    pub fn fill(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.buffer.write_at(offset, data)?;
        self.staged.insert(ByteRange::at(offset, data.len() as u64));
        Ok(())
    }

    /// Splits `window`, clipped to the buffer, into local and remote ranges.
    pub fn plan(&self, window: ByteRange) -> Reconciliation {
        let clipped = window
            .intersect(&ByteRange::new(0, self.len()))
            .unwrap_or(ByteRange::new(window.start, window.start));
        self.staged.reconcile(clipped)
    }

    /// Part of a gap that can be fetched remotely; the rest reads as zeros.
    pub fn fetchable(&self, gap: ByteRange) -> Option<ByteRange> {
        gap.intersect(&ByteRange::new(0, self.remote_extent))
    }

    /// Reads bytes from the buffer.
    pub fn read_local(&self, range: ByteRange) -> io::Result<Vec<u8>> {
        let size = usize::try_from(range.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "read too large"))?;
        self.buffer.read_at(range.start, size)
    }

    /// Resizes the buffer, dropping staged ranges and remote bytes past `len`.
    pub fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.buffer.set_len(len)?;
        self.staged.clip(len);
        self.remote_extent = self.remote_extent.min(len);
        self.dirty = true;
        Ok(())
    }

    /// Copies the whole buffer out.
    pub fn contents(&self) -> io::Result<Vec<u8>> {
        self.buffer.contents()
    }

    /// Records a successful whole-object rewrite of the current buffer.
    pub fn mark_synced(&mut self) {
        let len = self.len();
        self.staged.cover_all(len);
        self.remote_extent = len;
        self.is_new_file = false;
        self.dirty = false;
    }
}

/// Bidirectional table of open handles and the paths they stage.
#[derive(Debug, Default)]
pub struct HandleTable {
    mode: StagingMode,
    handles: BTreeMap<u64, Handle>,
    paths: HashMap<String, PathStaging>,
}

impl HandleTable {
    /// Creates an empty table whose buffers use `mode`.
    pub fn new(mode: StagingMode) -> Self {
        Self {
            mode,
            handles: BTreeMap::new(),
            paths: HashMap::new(),
        }
    }

    /// Smallest id >= [`FIRST_HANDLE_ID`] not currently open.
    fn next_id(&self) -> u64 {
        let mut candidate = FIRST_HANDLE_ID;
        for &id in self.handles.keys() {
            if id > candidate {
                break;
            }
            if id == candidate {
                candidate += 1;
            }
        }
        candidate
    }

    /// Opens a handle on `path`.
    ///
    /// The first handle on a path creates its staging state with a buffer of
    /// `initial_size` bytes; later handles share the existing one and ignore
    /// the other arguments.
    pub fn open_handle(
        &mut self,
        path: &str,
        initial_size: u64,
        is_new_file: bool,
        permission: Permission,
    ) -> StagingResult<u64> {
        let id = self.next_id();
        if !self.paths.contains_key(path) {
            let staging = PathStaging::new(self.mode, initial_size, is_new_file, permission)?;
            self.paths.insert(path.to_string(), staging);
        }
        if let Some(staging) = self.paths.get_mut(path) {
            staging.handles.insert(id);
        }
        self.handles.insert(
            id,
            Handle {
                id,
                path: path.to_string(),
                pending: Vec::new(),
            },
        );
        debug!(fh = id, path, "Opened handle");
        Ok(id)
    }

    /// Closes a handle and returns it.
    ///
    /// Closing the last handle on a path discards its staging state.
    pub fn close_handle(&mut self, id: u64) -> StagingResult<Handle> {
        let handle = self.handles.remove(&id).ok_or(StagingError::NotOpen(id))?;
        let now_unused = match self.paths.get_mut(&handle.path) {
            Some(staging) => {
                staging.handles.remove(&id);
                staging.handles.is_empty()
            }
            None => false,
        };
        if now_unused {
            self.paths.remove(&handle.path);
            debug!(path = handle.path.as_str(), "Discarded staging state");
        }
        Ok(handle)
    }

    /// Looks up an open handle.
    pub fn get(&self, id: u64) -> Option<&Handle> {
        self.handles.get(&id)
    }

    /// Looks up an open handle for mutation.
    pub fn get_mut(&mut self, id: u64) -> Option<&mut Handle> {
        self.handles.get_mut(&id)
    }

    /// Returns an open handle together with its path's staging state.
    pub fn entry(&mut self, id: u64) -> StagingResult<(&mut Handle, &mut PathStaging)> {
        let handle = self.handles.get_mut(&id).ok_or(StagingError::NotOpen(id))?;
        let staging = self
            .paths
            .get_mut(&handle.path)
            .ok_or(StagingError::NotOpen(id))?;
        Ok((handle, staging))
    }

    /// Staging state of a path, if any handle is open on it.
    pub fn staging(&self, path: &str) -> Option<&PathStaging> {
        self.paths.get(path)
    }

    /// Mutable staging state of a path.
    pub fn staging_mut(&mut self, path: &str) -> Option<&mut PathStaging> {
        self.paths.get_mut(path)
    }

    /// Length of a path as seen through its open handles, counting queued writes.
    ///
    /// `None` if no handle is open on the path.
    pub fn effective_len(&self, path: &str) -> Option<u64> {
        let staging = self.paths.get(path)?;
        let pending_end = staging
            .handles
            .iter()
            .filter_map(|id| self.handles.get(id))
            .flat_map(|h| h.pending.iter())
            .map(|w| w.offset.saturating_add(w.data.len() as u64))
            .max()
            .unwrap_or(0);
        Some(staging.len().max(pending_end))
    }

    /// Moves the staging state of `from` and everything below it to `to`.
    ///
    /// Returns the number of paths re-keyed. If `to` already had staging
    /// state, its handles join the moved state.
    pub fn rekey(&mut self, from: &str, to: &str) -> usize {
        let prefix = format!("{}/", from.trim_end_matches('/'));
        let moved: Vec<String> = self
            .paths
            .keys()
            .filter(|path| path.as_str() == from || path.starts_with(&prefix))
            .cloned()
            .collect();

        for old in &moved {
            let new = format!("{to}{}", &old[from.len()..]);
            let Some(mut staging) = self.paths.remove(old) else {
                continue;
            };
            for id in &staging.handles {
                if let Some(handle) = self.handles.get_mut(id) {
                    handle.path.clone_from(&new);
                }
            }
            if let Some(displaced) = self.paths.remove(&new) {
                staging.handles.extend(displaced.handles);
            }
            debug!(from = old.as_str(), to = new.as_str(), "Re-keyed staging state");
            self.paths.insert(new, staging);
        }
        moved.len()
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True if no handle is open.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of paths with staging state.
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// True if both directions of the handle/path association agree.
    pub fn is_consistent(&self) -> bool {
        let forward = self.handles.values().all(|h| {
            h.id >= FIRST_HANDLE_ID
                && self
                    .paths
                    .get(&h.path)
                    .is_some_and(|s| s.handles.contains(&h.id))
        });
        let backward = self.paths.iter().all(|(path, staging)| {
            !staging.handles.is_empty()
                && staging
                    .handles
                    .iter()
                    .all(|id| self.handles.get(id).is_some_and(|h| h.path == *path))
        });
        forward && backward
    }
}
