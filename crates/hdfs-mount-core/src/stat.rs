//! Remote file status records.
//!
//! [`RemoteStat`] mirrors the WebHDFS `FileStatus` JSON object. Only the
//! fields the mount adapter consumes are decoded; everything else the
//! NameNode sends (block size, replication, file id, ...) is ignored.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of a remote namespace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteFileType {
    /// A directory.
    Directory,
    /// A regular file.
    File,
    /// A symbolic link (reported by HDFS, never mounted).
    Symlink,
    /// Any type this adapter does not know about.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RemoteFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteFileType::Directory => "DIRECTORY",
            RemoteFileType::File => "FILE",
            RemoteFileType::Symlink => "SYMLINK",
            RemoteFileType::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Permission bits of a remote entry.
///
/// On the wire this is an octal string such as `"644"` or `"1777"`.
/// [`Display`](fmt::Display) renders the zero-padded three-digit form used by
/// `permission=` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission(u16);

impl Permission {
    /// Creates a permission from raw bits (masked to `0o7777`).
    pub const fn new(bits: u16) -> Self {
        Self(bits & 0o7777)
    }

    /// Keeps only the `rwx` bits of a POSIX mode, as passed to `create`/`mkdir`/`chmod`.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_mode(mode: u32) -> Self {
        Self((mode & 0o777) as u16)
    }

    /// Returns the permission bits.
    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03o}", self.0)
    }
}

/// Error returned when a permission string is not valid octal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid octal permission: {0:?}")]
pub struct PermissionParseError(pub String);

impl FromStr for Permission {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 4 {
            return Err(PermissionParseError(s.to_string()));
        }
        u16::from_str_radix(s, 8)
            .map(Self::new)
            .map_err(|_| PermissionParseError(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Snapshot of a remote entry's status.
///
/// Times are milliseconds since the Unix epoch, as reported by HDFS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStat {
    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: RemoteFileType,
    /// Permission bits.
    pub permission: Permission,
    /// Owning user name.
    pub owner: String,
    /// Owning group name.
    pub group: String,
    /// Length in bytes (0 for directories).
    pub length: u64,
    /// Last access time (ms since epoch).
    pub access_time: u64,
    /// Last modification time (ms since epoch).
    pub modification_time: u64,
    /// Entry name relative to the listed directory (empty for `status`).
    #[serde(default)]
    pub path_suffix: String,
}

impl RemoteStat {
    /// Returns true if this entry is a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == RemoteFileType::Directory
    }
}
