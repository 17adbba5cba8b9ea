//! Single-listing directory cache.
//!
//! `ls -l` issues one directory listing followed by one attribute lookup per
//! entry. The listing already carries every entry's status, so the cache
//! answers those lookups locally. It is only valid while the last operation
//! was a listing of the lookup's parent; any other operation invalidates it.

use crate::resolver::{file_name, parent_of};
use hdfs_mount_core::RemoteStat;
use std::collections::HashMap;
use tracing::debug;

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// The parent was just listed and contains the entry.
    Hit(RemoteStat),
    /// The parent was just listed and does not contain the entry.
    Absent,
    /// The cache does not apply; ask the remote store.
    Miss,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum LastOp {
    #[default]
    Other,
    Readdir(String),
}

/// Cache of the most recent directory listing.
#[derive(Debug, Default)]
pub struct DirCache {
    last_op: LastOp,
    entries: HashMap<String, RemoteStat>,
    consumed: usize,
}

impl DirCache {
    /// Creates an empty, invalid cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fresh listing of `parent` and makes it the cache subject.
    pub fn on_readdir(&mut self, parent: &str, entries: impl IntoIterator<Item = (String, RemoteStat)>) {
        self.entries = entries.into_iter().collect();
        self.consumed = 0;
        self.last_op = LastOp::Readdir(parent.to_string());
    }

    /// Marks a non-listing operation as the last one.
    pub fn invalidate(&mut self) {
        if self.last_op != LastOp::Other {
            debug!("Directory cache invalidated");
        }
        self.last_op = LastOp::Other;
        self.entries.clear();
    }

    /// Looks up `path` in the last listing of its parent.
    pub fn try_get_cached(&mut self, path: &str) -> CacheLookup {
        let parent = parent_of(path);
        let LastOp::Readdir(listed) = &self.last_op else {
            return CacheLookup::Miss;
        };
        if path == parent || listed != parent {
            return CacheLookup::Miss;
        }
        match self.entries.get(file_name(path)) {
            Some(stat) => {
                self.consumed += 1;
                debug!(path, consumed = self.consumed, "Directory cache hit");
                CacheLookup::Hit(stat.clone())
            }
            None => CacheLookup::Absent,
        }
    }

    /// Number of hits served from the current listing.
    pub fn consumed_count(&self) -> usize {
        self.consumed
    }

    /// Directory the cache currently describes, if any.
    pub fn subject(&self) -> Option<&str> {
        match &self.last_op {
            LastOp::Readdir(parent) => Some(parent),
            LastOp::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdfs_mount_core::{Permission, RemoteFileType};

    fn stat(len: u64) -> RemoteStat {
        RemoteStat {
            kind: RemoteFileType::File,
            permission: Permission::new(0o644),
            owner: "o".into(),
            group: "g".into(),
            length: len,
            access_time: 0,
            modification_time: 0,
            path_suffix: String::new(),
        }
    }

    fn listed() -> DirCache {
        let mut cache = DirCache::new();
        cache.on_readdir("/d", [("a".to_string(), stat(1)), ("b".to_string(), stat(2))]);
        cache
    }

    #[test]
    fn test_hits_after_listing() {
        let mut cache = listed();
        assert_eq!(cache.try_get_cached("/d/a"), CacheLookup::Hit(stat(1)));
        assert_eq!(cache.try_get_cached("/d/b"), CacheLookup::Hit(stat(2)));
        assert_eq!(cache.consumed_count(), 2);
        assert_eq!(cache.subject(), Some("/d"));
    }

    #[test]
    fn test_missing_child_is_absent() {
        let mut cache = listed();
        assert_eq!(cache.try_get_cached("/d/zzz"), CacheLookup::Absent);
        assert_eq!(cache.consumed_count(), 0);
    }

    #[test]
    fn test_other_parent_misses() {
        let mut cache = listed();
        assert_eq!(cache.try_get_cached("/other/a"), CacheLookup::Miss);
        assert_eq!(cache.try_get_cached("/d/a/deeper"), CacheLookup::Miss);
        // A miss alone does not invalidate; the caller decides
        assert_eq!(cache.try_get_cached("/d/a"), CacheLookup::Hit(stat(1)));
    }

    #[test]
    fn test_invalidate_stops_hits() {
        let mut cache = listed();
        cache.invalidate();
        assert_eq!(cache.try_get_cached("/d/a"), CacheLookup::Miss);
        assert_eq!(cache.subject(), None);
    }

    #[test]
    fn test_root_listing_never_answers_for_root() {
        let mut cache = DirCache::new();
        cache.on_readdir("/", [("a".to_string(), stat(1))]);
        assert_eq!(cache.try_get_cached("/"), CacheLookup::Miss);
        assert_eq!(cache.try_get_cached("/a"), CacheLookup::Hit(stat(1)));
    }

    #[test]
    fn test_new_listing_resets_count() {
        let mut cache = listed();
        cache.try_get_cached("/d/a");
        cache.on_readdir("/e", [("c".to_string(), stat(3))]);
        assert_eq!(cache.consumed_count(), 0);
        assert_eq!(cache.try_get_cached("/d/a"), CacheLookup::Miss);
        assert_eq!(cache.try_get_cached("/e/c"), CacheLookup::Hit(stat(3)));
    }
}
