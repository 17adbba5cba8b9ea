//! Inode management for the FUSE filesystem.
//!
//! The kernel addresses entries by inode number; the dispatcher works on
//! mount-relative paths. [`InodeTable`] maps between the two, tracking the
//! kernel's lookup count so `forget` can evict entries.

use hdfs_mount_staging::join;
use std::collections::HashMap;
use tracing::debug;

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// An entry in the inode table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeEntry {
    /// Mount-relative path.
    pub path: String,
    /// Lookup count for proper `forget()` handling.
    nlookup: u64,
}

impl InodeEntry {
    /// Returns the current lookup count.
    pub fn nlookup(&self) -> u64 {
        self.nlookup
    }
}

/// Table mapping between inodes and mount-relative paths.
#[derive(Debug)]
pub struct InodeTable {
    entries: HashMap<u64, InodeEntry>,
    by_path: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    /// Creates a new inode table with the root directory pre-allocated.
    pub fn new() -> Self {
        let mut table = Self {
            entries: HashMap::new(),
            by_path: HashMap::new(),
            next: ROOT_INODE + 1,
        };
        table.entries.insert(
            ROOT_INODE,
            InodeEntry {
                path: "/".to_string(),
                nlookup: 1,
            },
        );
        table.by_path.insert("/".to_string(), ROOT_INODE);
        table
    }

    /// Returns the inode for `path`, allocating one if needed, and counts a lookup.
    pub fn get_or_insert(&mut self, path: &str) -> u64 {
        let ino = self.get_or_insert_no_lookup(path);
        if let Some(entry) = self.entries.get_mut(&ino) {
            entry.nlookup += 1;
        }
        ino
    }

    /// Returns the inode for `path` without touching the lookup count.
    ///
    /// Entries returned from `readdir()` must not affect it.
    pub fn get_or_insert_no_lookup(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.entries.insert(
            ino,
            InodeEntry {
                path: path.to_string(),
                nlookup: 0,
            },
        );
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    /// Looks up an entry by inode number.
    pub fn get(&self, ino: u64) -> Option<&InodeEntry> {
        self.entries.get(&ino)
    }

    /// Path of an inode.
    pub fn path(&self, ino: u64) -> Option<&str> {
        self.entries.get(&ino).map(|e| e.path.as_str())
    }

    /// Path of the child `name` of directory `parent`.
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        self.path(parent).map(|p| join(p, name))
    }

    /// Looks up an inode by path.
    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.by_path.get(path).copied()
    }

    /// Decrements the lookup count for an inode.
    ///
    /// Returns `true` if the count reached zero and the inode was evicted.
    /// The root is never evicted.
    pub fn forget(&mut self, ino: u64, nlookup: u64) -> bool {
        if ino == ROOT_INODE {
            return false;
        }
        let Some(entry) = self.entries.get_mut(&ino) else {
            return false;
        };
        entry.nlookup = entry.nlookup.saturating_sub(nlookup);
        if entry.nlookup > 0 {
            return false;
        }
        if let Some(entry) = self.entries.remove(&ino)
            && self.by_path.get(&entry.path) == Some(&ino)
        {
            self.by_path.remove(&entry.path);
        }
        true
    }

    /// Removes the path mapping after a delete.
    ///
    /// The inode entry stays until the kernel forgets it.
    pub fn invalidate_path(&mut self, path: &str) {
        self.by_path.remove(path);
    }

    /// Moves `old` and every path below it to `new`.
    pub fn rename(&mut self, old: &str, new: &str) {
        if let Some(displaced) = self.by_path.remove(new) {
            debug!(inode = displaced, path = new, "Rename replaced existing entry");
        }
        let prefix = format!("{}/", old.trim_end_matches('/'));
        let moved: Vec<(String, u64)> = self
            .by_path
            .iter()
            .filter(|(path, _)| path.as_str() == old || path.starts_with(&prefix))
            .map(|(path, &ino)| (path.clone(), ino))
            .collect();

        for (path, ino) in moved {
            let renamed = format!("{new}{}", &path[old.len()..]);
            self.by_path.remove(&path);
            if let Some(entry) = self.entries.get_mut(&ino) {
                entry.path.clone_from(&renamed);
            }
            self.by_path.insert(renamed, ino);
        }
    }

    /// Returns the number of inodes currently in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table only contains the root inode.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
