use crate::error::RemoteResult;
use crate::stat::{Permission, RemoteStat};
use bytes::Bytes;

/// Capability set the mount adapter needs from the remote filesystem.
///
/// All paths are absolute remote paths (already resolved under the mount
/// root). Every call is a blocking round trip; implementations must not retry
/// on their own.
pub trait RemoteStore {
    /// Returns the status of a single entry.
    fn status(&self, path: &str) -> RemoteResult<RemoteStat>;

    /// Lists a directory as `(name, status)` pairs in the order the store returns them.
    fn list(&self, path: &str) -> RemoteResult<Vec<(String, RemoteStat)>>;

    /// Creates a directory and any missing parents.
    fn make_dirs(&self, path: &str, permission: Permission) -> RemoteResult<()>;

    /// Deletes an entry, recursing into directories when asked.
    fn delete(&self, path: &str, recursive: bool) -> RemoteResult<()>;

    /// Renames an entry.
    fn rename(&self, from: &str, to: &str) -> RemoteResult<()>;

    /// Replaces the permission bits of an entry.
    fn set_permission(&self, path: &str, permission: Permission) -> RemoteResult<()>;

    /// Sets access and modification times in milliseconds; `None` leaves a time unchanged.
    fn set_times(
        &self,
        path: &str,
        access_time_ms: Option<u64>,
        mod_time_ms: Option<u64>,
    ) -> RemoteResult<()>;

    /// Creates a zero-length object.
    fn create_empty(&self, path: &str, permission: Permission, overwrite: bool) -> RemoteResult<()> {
        self.write_whole(path, &[], permission, overwrite)
    }

    /// Replaces the entire content of an object.
    fn write_whole(
        &self,
        path: &str,
        data: &[u8],
        permission: Permission,
        overwrite: bool,
    ) -> RemoteResult<()>;

    /// Reads up to `length` bytes starting at `offset`.
    fn read_range(&self, path: &str, offset: u64, length: u64) -> RemoteResult<Bytes>;
}
