//! FUSE filesystem implementation for HDFS.
//!
//! [`HdfsFs`] implements the fuser `Filesystem` trait by translating inode
//! numbers to mount-relative paths and delegating to [`HdfsOps`]. Errors are
//! converted to errno values here and nowhere else.
//!
//! | Operation | Notes |
//! |-----------|-------|
//! | lookup/getattr | Served from the last directory listing when possible |
//! | setattr | Split into chmod, chown, truncate and utimens |
//! | opendir/readdir | One remote listing per `opendir`, offsets served from a snapshot |
//! | create/open/read/write | Writes are queued until flush |
//! | flush/fsync | Reconcile the staging buffer and rewrite the remote object |
//! | rename | `RENAME_EXCHANGE` is rejected |
//! | readlink/symlink/link/statfs | ENOSYS |

use crate::error::{FsError, FsResult};
use crate::inode::{InodeTable, ROOT_INODE};
use crate::ops::HdfsOps;
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use hdfs_mount_core::RemoteStore;
use hdfs_mount_staging::{EntryKind, PosixAttrs, parent_of};
use libc::c_int;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace};

/// How long the kernel may cache attributes and entries.
///
/// Kept short since the remote namespace can change underneath the mount.
pub const ATTR_TTL: Duration = Duration::from_secs(1);

/// Block size reported in attributes.
const BLOCK_SIZE: u32 = 4096;

/// One entry of a directory snapshot taken at `opendir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number.
    pub ino: u64,
    /// Entry type.
    pub kind: FileType,
    /// Name within the directory.
    pub name: String,
}

/// FUSE filesystem backed by a [`RemoteStore`].
pub struct HdfsFs<S> {
    ops: HdfsOps<S>,
    inodes: InodeTable,
    dirs: HashMap<u64, Vec<DirEntry>>,
    next_dir_handle: u64,
}

impl<S: RemoteStore> HdfsFs<S> {
    /// Wraps a dispatcher.
    pub fn new(ops: HdfsOps<S>) -> Self {
        Self {
            ops,
            inodes: InodeTable::new(),
            dirs: HashMap::new(),
            next_dir_handle: 1,
        }
    }

    /// The underlying dispatcher.
    pub fn ops(&self) -> &HdfsOps<S> {
        &self.ops
    }

    /// The inode table.
    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    fn path_of(&self, ino: u64) -> Result<String, c_int> {
        self.inodes
            .path(ino)
            .map(str::to_string)
            .ok_or_else(|| FsError::InvalidInode(ino).reply_errno("resolve"))
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let name = name.to_str().ok_or(libc::EINVAL)?;
        self.inodes
            .child_path(parent, name)
            .ok_or_else(|| FsError::InvalidInode(parent).reply_errno("resolve"))
    }

    /// Stats `path` and registers a kernel reference to it.
    fn entry(&mut self, path: &str, op: &str) -> Result<FileAttr, c_int> {
        let attrs = self.ops.getattr(path).map_err(|e| e.reply_errno(op))?;
        let ino = self.inodes.get_or_insert(path);
        Ok(file_attr(ino, &attrs))
    }

    /// Lists `path` once and builds the snapshot served by `readdir`.
    fn snapshot(&mut self, ino: u64, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let listing = self.ops.readdir(path)?;
        let parent_ino = self
            .inodes
            .get_inode(parent_of(path))
            .unwrap_or(ROOT_INODE);

        let mut entries = Vec::with_capacity(listing.len() + 2);
        entries.push(DirEntry {
            ino,
            kind: FileType::Directory,
            name: ".".to_string(),
        });
        entries.push(DirEntry {
            ino: parent_ino,
            kind: FileType::Directory,
            name: "..".to_string(),
        });
        for (name, attrs) in listing {
            let child = hdfs_mount_staging::join(path, &name);
            entries.push(DirEntry {
                ino: self.inodes.get_or_insert_no_lookup(&child),
                kind: file_type(attrs.kind),
                name,
            });
        }
        Ok(entries)
    }
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::File => FileType::RegularFile,
    }
}

/// Converts translated attributes to the kernel's representation.
pub fn file_attr(ino: u64, attrs: &PosixAttrs) -> FileAttr {
    FileAttr {
        ino,
        size: attrs.size,
        blocks: attrs.size.div_ceil(u64::from(BLOCK_SIZE)),
        atime: attrs.atime,
        mtime: attrs.mtime,
        ctime: attrs.ctime,
        crtime: attrs.mtime,
        kind: file_type(attrs.kind),
        perm: attrs.perm(),
        nlink: attrs.nlink,
        uid: attrs.uid,
        gid: attrs.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn resolve_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

fn to_offset(offset: i64) -> Result<u64, c_int> {
    u64::try_from(offset).map_err(|_| libc::EINVAL)
}

impl<S: RemoteStore> Filesystem for HdfsFs<S> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(root = self.ops.resolver().root(), "FUSE filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        let open = self.ops.handles().len();
        if open > 0 {
            debug!(open, "Unmounting with open handles");
        }
        info!("FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        trace!(parent, path = path.as_str(), "lookup");
        match self.entry(&path, "lookup") {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(inode = ino, nlookup, "forget");
        self.inodes.forget(ino, nlookup);
    }

    fn batch_forget(&mut self, _req: &Request<'_>, nodes: &[fuser::fuse_forget_one]) {
        trace!(count = nodes.len(), "batch_forget");
        for node in nodes {
            self.inodes.forget(node.nodeid, node.nlookup);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.ops.getattr(&path) {
            Ok(attrs) => reply.attr(&ATTR_TTL, &file_attr(ino, &attrs)),
            Err(e) => reply.error(e.reply_errno("getattr")),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        trace!(inode = ino, ?mode, ?uid, ?gid, ?size, ?fh, "setattr");

        let result = (|| -> FsResult<PosixAttrs> {
            if let Some(mode) = mode {
                self.ops.chmod(&path, mode)?;
            }
            if uid.is_some() || gid.is_some() {
                self.ops.chown(&path, uid, gid)?;
            }
            if let Some(size) = size {
                self.ops.truncate(&path, size, fh)?;
            }
            if atime.is_some() || mtime.is_some() {
                self.ops
                    .utimens(&path, atime.map(resolve_time), mtime.map(resolve_time))?;
            }
            self.ops.getattr(&path)
        })();

        match result {
            Ok(attrs) => reply.attr(&ATTR_TTL, &file_attr(ino, &attrs)),
            Err(e) => reply.error(e.reply_errno("setattr")),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.ops.readlink(&path) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(e.reply_errno("readlink")),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        if let Err(e) = self.ops.mknod(&path, mode & !umask) {
            return reply.error(e.reply_errno("mknod"));
        }
        match self.entry(&path, "mknod") {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        if let Err(e) = self.ops.mkdir(&path, mode & !umask) {
            return reply.error(e.reply_errno("mkdir"));
        }
        match self.entry(&path, "mkdir") {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.ops.unlink(&path) {
            Ok(()) => {
                self.inodes.invalidate_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.reply_errno("unlink")),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.ops.rmdir(&path) {
            Ok(()) => {
                self.inodes.invalidate_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.reply_errno("rmdir")),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let path = match self.child_of(parent, link_name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let target = target.to_string_lossy();
        match self.ops.symlink(&target, &path) {
            Ok(()) => reply.error(libc::ENOSYS),
            Err(e) => reply.error(e.reply_errno("symlink")),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        #[cfg(target_os = "linux")]
        if flags & libc::RENAME_EXCHANGE != 0 {
            return reply.error(libc::EINVAL);
        }
        #[cfg(not(target_os = "linux"))]
        let _ = flags;

        let (old, new) = match (self.child_of(parent, name), self.child_of(newparent, newname)) {
            (Ok(old), Ok(new)) => (old, new),
            (Err(errno), _) | (_, Err(errno)) => return reply.error(errno),
        };
        match self.ops.rename(&old, &new) {
            Ok(()) => {
                self.inodes.rename(&old, &new);
                reply.ok();
            }
            Err(e) => reply.error(e.reply_errno("rename")),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let (target, path) = match (self.path_of(ino), self.child_of(newparent, newname)) {
            (Ok(target), Ok(path)) => (target, path),
            (Err(errno), _) | (_, Err(errno)) => return reply.error(errno),
        };
        match self.ops.link(&target, &path) {
            Ok(()) => reply.error(libc::ENOSYS),
            Err(e) => reply.error(e.reply_errno("link")),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        trace!(inode = ino, flags, "open");
        match self.ops.open(&path) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.reply_errno("open")),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let offset = match to_offset(offset) {
            Ok(offset) => offset,
            Err(errno) => return reply.error(errno),
        };
        match self.ops.read(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.reply_errno("read")),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let offset = match to_offset(offset) {
            Ok(offset) => offset,
            Err(errno) => return reply.error(errno),
        };
        match self.ops.write(fh, offset, data) {
            Ok(written) => reply.written(u32::try_from(written).unwrap_or(u32::MAX)),
            Err(e) => reply.error(e.reply_errno("write")),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.ops.flush(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.reply_errno("flush")),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.ops.release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.reply_errno("release")),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.ops.fsync(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.reply_errno("fsync")),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        trace!(inode = ino, path = path.as_str(), "opendir");
        match self.snapshot(ino, &path) {
            Ok(entries) => {
                let dh = self.next_dir_handle;
                self.next_dir_handle += 1;
                self.dirs.insert(dh, entries);
                reply.opened(dh, 0);
            }
            Err(e) => reply.error(e.reply_errno("opendir")),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, fh, offset, "readdir");
        let Some(entries) = self.dirs.get(&fh) else {
            return reply.error(libc::EBADF);
        };
        let start = match to_offset(offset).map(usize::try_from) {
            Ok(Ok(start)) => start,
            _ => return reply.error(libc::EINVAL),
        };
        for (idx, entry) in entries.iter().enumerate().skip(start) {
            let next = i64::try_from(idx + 1).unwrap_or(i64::MAX);
            if reply.add(entry.ino, next, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.dirs.remove(&fh);
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = self.path_of(ino).unwrap_or_else(|_| "/".to_string());
        match self.ops.statfs(&path) {
            Ok(()) => reply.error(libc::ENOSYS),
            Err(e) => reply.error(e.reply_errno("statfs")),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.ops.access(&path, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.reply_errno("access")),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let fh = match self.ops.create(&path, mode & !umask) {
            Ok(fh) => fh,
            Err(e) => return reply.error(e.reply_errno("create")),
        };
        match self.entry(&path, "create") {
            Ok(attr) => reply.created(&ATTR_TTL, &attr, 0, fh, 0),
            Err(errno) => {
                // The kernel never learns about the handle
                let _ = self.ops.release(fh);
                reply.error(errno);
            }
        }
    }
}
