//! Remote status to POSIX attribute translation.

use crate::error::{StagingError, StagingResult};
use hdfs_mount_core::{RemoteFileType, RemoteStat};
use nix::unistd::{Gid, Uid};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Kind of a mounted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory.
    Directory,
    /// Regular file.
    File,
}

/// Ownership remapping policy.
///
/// Remote entries owned by `owner` are reported as belonging to the local
/// process; everything else is reported as root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    owner: String,
    group: String,
    uid: u32,
    gid: u32,
}

impl Ownership {
    /// Policy for the configured owner/group, reporting the process's real uid/gid.
    pub fn for_process(owner: &str, group: &str) -> Self {
        Self::new(owner, group, Uid::current().as_raw(), Gid::current().as_raw())
    }

    /// Policy with explicit local ids.
    pub fn new(owner: &str, group: &str, uid: u32, gid: u32) -> Self {
        Self {
            owner: owner.to_string(),
            group: group.to_string(),
            uid,
            gid,
        }
    }

    /// Configured remote owner.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Configured remote group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Local `(uid, gid)` reported for a remote `owner:group` pair.
    pub fn map(&self, owner: &str, group: &str) -> (u32, u32) {
        if owner != self.owner {
            return (0, 0);
        }
        let gid = if group == self.owner || group == self.group {
            self.gid
        } else {
            0
        };
        (self.uid, gid)
    }
}

/// POSIX attributes derived from a [`RemoteStat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixAttrs {
    /// Entry kind.
    pub kind: EntryKind,
    /// Type bit OR permission bits.
    pub mode: u32,
    /// Link count (2 for directories, 1 for files).
    pub nlink: u32,
    /// Owner id after remapping.
    pub uid: u32,
    /// Group id after remapping.
    pub gid: u32,
    /// Size in bytes.
    pub size: u64,
    /// Last access.
    pub atime: SystemTime,
    /// Last modification.
    pub mtime: SystemTime,
    /// Last status change (HDFS does not track one; mirrors `mtime`).
    pub ctime: SystemTime,
}

impl PosixAttrs {
    /// Permission bits without the type bits.
    #[allow(clippy::cast_possible_truncation)]
    pub fn perm(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }
}

fn millis_to_time(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

/// Translates a remote status into POSIX attributes.
#[allow(clippy::useless_conversion)]
pub fn to_posix(stat: &RemoteStat, ownership: &Ownership) -> StagingResult<PosixAttrs> {
    let (kind, type_bits, nlink) = match stat.kind {
        RemoteFileType::Directory => (EntryKind::Directory, u32::from(libc::S_IFDIR), 2),
        RemoteFileType::File => (EntryKind::File, u32::from(libc::S_IFREG), 1),
        other => return Err(StagingError::UnsupportedType(other)),
    };
    let (uid, gid) = ownership.map(&stat.owner, &stat.group);
    let mtime = millis_to_time(stat.modification_time);

    Ok(PosixAttrs {
        kind,
        mode: type_bits | u32::from(stat.permission.bits()),
        nlink,
        uid,
        gid,
        size: stat.length,
        atime: millis_to_time(stat.access_time),
        mtime,
        ctime: mtime,
    })
}
