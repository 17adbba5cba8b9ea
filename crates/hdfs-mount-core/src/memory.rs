//! In-memory remote store.
//!
//! [`MemoryStore`] keeps a flat map of absolute paths to entries and behaves
//! like a small HDFS namespace: parents are created on write, deletes can
//! recurse, renames move whole subtrees. It records every call it receives so
//! tests can assert exactly which remote round trips an operation made, and
//! it can be told to fail the next call of a given kind.

use crate::error::{RemoteError, RemoteResult};
use crate::stat::{Permission, RemoteFileType, RemoteStat};
use crate::store::RemoteStore;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

/// Remote operations, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`RemoteStore::status`]
    Status,
    /// [`RemoteStore::list`]
    List,
    /// [`RemoteStore::make_dirs`]
    MakeDirs,
    /// [`RemoteStore::delete`]
    Delete,
    /// [`RemoteStore::rename`]
    Rename,
    /// [`RemoteStore::set_permission`]
    SetPermission,
    /// [`RemoteStore::set_times`]
    SetTimes,
    /// [`RemoteStore::write_whole`] and [`RemoteStore::create_empty`]
    WriteWhole,
    /// [`RemoteStore::read_range`]
    ReadRange,
}

/// One whole-object write observed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Remote path written.
    pub path: String,
    /// Content sent.
    pub data: Vec<u8>,
    /// Permission sent with the write.
    pub permission: Permission,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: RemoteFileType,
    permission: Permission,
    owner: String,
    group: String,
    access_time: u64,
    modification_time: u64,
    data: Vec<u8>,
}

impl Entry {
    fn stat(&self, name: &str) -> RemoteStat {
        RemoteStat {
            kind: self.kind,
            permission: self.permission,
            owner: self.owner.clone(),
            group: self.group.clone(),
            length: self.data.len() as u64,
            access_time: self.access_time,
            modification_time: self.modification_time,
            path_suffix: name.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    calls: HashMap<StoreOp, usize>,
    failures: HashMap<StoreOp, VecDeque<RemoteError>>,
    writes: Vec<WriteRecord>,
    reads: Vec<(String, u64, u64)>,
}

/// In-process [`RemoteStore`] backed by a path map.
#[derive(Debug)]
pub struct MemoryStore {
    owner: String,
    group: String,
    inner: Mutex<Inner>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_descendant(candidate: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return candidate != "/";
    }
    candidate
        .strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Records a call and pops an injected failure, if one is queued.
fn enter(inner: &mut Inner, op: StoreOp) -> RemoteResult<()> {
    *inner.calls.entry(op).or_insert(0) += 1;
    match inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store containing only `/`, owned by `hdfs:supergroup`.
    pub fn new() -> Self {
        Self::with_owner("hdfs", "supergroup")
    }

    /// Creates a store whose new entries are owned by `owner:group`.
    pub fn with_owner(owner: &str, group: &str) -> Self {
        let store = Self {
            owner: owner.to_string(),
            group: group.to_string(),
            inner: Mutex::new(Inner::default()),
        };
        let root = store.new_entry(RemoteFileType::Directory, Permission::new(0o755), Vec::new());
        store.inner.lock().entries.insert("/".to_string(), root);
        store
    }

    fn new_entry(&self, kind: RemoteFileType, permission: Permission, data: Vec<u8>) -> Entry {
        let now = now_millis();
        Entry {
            kind,
            permission,
            owner: self.owner.clone(),
            group: self.group.clone(),
            access_time: now,
            modification_time: now,
            data,
        }
    }

    fn ensure_dirs(&self, inner: &mut Inner, path: &str, permission: Permission) -> RemoteResult<()> {
        let mut missing = Vec::new();
        let mut cursor = Some(path);
        while let Some(current) = cursor {
            match inner.entries.get(current) {
                Some(entry) if entry.kind == RemoteFileType::Directory => break,
                Some(_) => {
                    return Err(RemoteError::AlreadyExists(format!(
                        "{current} exists and is not a directory"
                    )));
                }
                None => missing.push(current.to_string()),
            }
            cursor = parent_of(current);
        }
        for dir in missing.into_iter().rev() {
            let entry = self.new_entry(RemoteFileType::Directory, permission, Vec::new());
            inner.entries.insert(dir, entry);
        }
        Ok(())
    }

    /// Seeds a file with the given content and permission (not counted as a call).
    pub fn put_file(&self, path: &str, data: &[u8], permission: Permission) {
        let path = normalize(path);
        let mut inner = self.inner.lock();
        if let Some(parent) = parent_of(&path) {
            // Seeding helpers never see an existing file in the parent chain.
            let _ = self.ensure_dirs(&mut inner, parent, Permission::new(0o755));
        }
        let entry = self.new_entry(RemoteFileType::File, permission, data.to_vec());
        inner.entries.insert(path, entry);
    }

    /// Seeds a directory (and its parents).
    pub fn put_dir(&self, path: &str, permission: Permission) {
        let path = normalize(path);
        let mut inner = self.inner.lock();
        let _ = self.ensure_dirs(&mut inner, &path, permission);
    }

    /// Returns the current content of a file.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock();
        inner
            .entries
            .get(&normalize(path))
            .filter(|e| e.kind == RemoteFileType::File)
            .map(|e| e.data.clone())
    }

    /// Returns the status of an entry without counting a call.
    pub fn peek(&self, path: &str) -> Option<RemoteStat> {
        let path = normalize(path);
        let inner = self.inner.lock();
        inner.entries.get(&path).map(|e| e.stat(name_of(&path)))
    }

    /// Returns how many times an operation has been called.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.inner.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Returns every whole-object write seen so far.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.inner.lock().writes.clone()
    }

    /// Returns every `(path, offset, length)` range read so far.
    pub fn reads(&self) -> Vec<(String, u64, u64)> {
        self.inner.lock().reads.clone()
    }

    /// Forgets recorded calls, writes and reads.
    pub fn reset_log(&self) {
        let mut inner = self.inner.lock();
        inner.calls.clear();
        inner.writes.clear();
        inner.reads.clear();
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: StoreOp, error: RemoteError) {
        self.inner
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }
}

impl RemoteStore for MemoryStore {
    fn status(&self, path: &str) -> RemoteResult<RemoteStat> {
        let path = normalize(path);
        let mut inner = self.inner.lock();
        enter(&mut inner, StoreOp::Status)?;
        inner
            .entries
            .get(&path)
            .map(|e| e.stat(name_of(&path)))
            .ok_or_else(|| RemoteError::NotFound(format!("File does not exist: {path}")))
    }

    fn list(&self, path: &str) -> RemoteResult<Vec<(String, RemoteStat)>> {
        let path = normalize(path);
        let mut inner = self.inner.lock();
        enter(&mut inner, StoreOp::List)?;
        match inner.entries.get(&path) {
            None => return Err(RemoteError::NotFound(format!("File {path} does not exist."))),
            Some(entry) if entry.kind != RemoteFileType::Directory => {
                let name = name_of(&path).to_string();
                let stat = entry.stat("");
                return Ok(vec![(name, stat)]);
            }
            Some(_) => {}
        }
        Ok(inner
            .entries
            .iter()
            .filter(|(candidate, _)| parent_of(candidate) == Some(path.as_str()))
            .map(|(candidate, entry)| {
                let name = name_of(candidate);
                (name.to_string(), entry.stat(name))
            })
            .collect())
    }

    fn make_dirs(&self, path: &str, permission: Permission) -> RemoteResult<()> {
        let path = normalize(path);
        let mut inner = self.inner.lock();
        enter(&mut inner, StoreOp::MakeDirs)?;
        self.ensure_dirs(&mut inner, &path, permission)
    }

    fn delete(&self, path: &str, recursive: bool) -> RemoteResult<()> {
        let path = normalize(path);
        let mut inner = self.inner.lock();
        enter(&mut inner, StoreOp::Delete)?;
        if path == "/" || !inner.entries.contains_key(&path) {
            return Err(RemoteError::NotFound(path));
        }
        let children: Vec<String> = inner
            .entries
            .keys()
            .filter(|candidate| is_descendant(candidate, &path))
            .cloned()
            .collect();
        if !children.is_empty() && !recursive {
            return Err(RemoteError::Remote {
                exception: "PathIsNotEmptyDirectoryException".to_string(),
                message: format!("`{path} is non empty': Directory is not empty"),
            });
        }
        for child in children {
            inner.entries.remove(&child);
        }
        inner.entries.remove(&path);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> RemoteResult<()> {
        let from = normalize(from);
        let to = normalize(to);
        let mut inner = self.inner.lock();
        enter(&mut inner, StoreOp::Rename)?;
        let target_parent_is_dir = parent_of(&to)
            .and_then(|p| inner.entries.get(p))
            .is_some_and(|e| e.kind == RemoteFileType::Directory);
        if !inner.entries.contains_key(&from)
            || inner.entries.contains_key(&to)
            || !target_parent_is_dir
            || is_descendant(&to, &from)
        {
            return Err(RemoteError::Remote {
                exception: "RenameFailed".to_string(),
                message: format!("unable to rename {from} to {to}"),
            });
        }
        let moved: Vec<String> = inner
            .entries
            .keys()
            .filter(|candidate| **candidate == from || is_descendant(candidate, &from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(entry) = inner.entries.remove(&old) {
                let new = format!("{to}{}", &old[from.len()..]);
                inner.entries.insert(new, entry);
            }
        }
        Ok(())
    }

    fn set_permission(&self, path: &str, permission: Permission) -> RemoteResult<()> {
        let path = normalize(path);
        let mut inner = self.inner.lock();
        enter(&mut inner, StoreOp::SetPermission)?;
        let entry = inner
            .entries
            .get_mut(&path)
            .ok_or_else(|| RemoteError::NotFound(path.clone()))?;
        entry.permission = permission;
        Ok(())
    }

    fn set_times(
        &self,
        path: &str,
        access_time_ms: Option<u64>,
        mod_time_ms: Option<u64>,
    ) -> RemoteResult<()> {
        let path = normalize(path);
        let mut inner = self.inner.lock();
        enter(&mut inner, StoreOp::SetTimes)?;
        let entry = inner
            .entries
            .get_mut(&path)
            .ok_or_else(|| RemoteError::NotFound(path.clone()))?;
        if let Some(atime) = access_time_ms {
            entry.access_time = atime;
        }
        if let Some(mtime) = mod_time_ms {
            entry.modification_time = mtime;
        }
        Ok(())
    }

    fn write_whole(
        &self,
        path: &str,
        data: &[u8],
        permission: Permission,
        overwrite: bool,
    ) -> RemoteResult<()> {
        let path = normalize(path);
        let mut inner = self.inner.lock();
        enter(&mut inner, StoreOp::WriteWhole)?;
        match inner.entries.get(&path) {
            Some(existing) if existing.kind == RemoteFileType::Directory => {
                return Err(RemoteError::AlreadyExists(format!("{path} is a directory")));
            }
            Some(_) if !overwrite => {
                return Err(RemoteError::AlreadyExists(format!("{path} already exists")));
            }
            _ => {}
        }
        if let Some(parent) = parent_of(&path) {
            self.ensure_dirs(&mut inner, parent, Permission::new(0o755))?;
        }
        let entry = self.new_entry(RemoteFileType::File, permission, data.to_vec());
        inner.entries.insert(path.clone(), entry);
        inner.writes.push(WriteRecord {
            path,
            data: data.to_vec(),
            permission,
        });
        Ok(())
    }

    fn read_range(&self, path: &str, offset: u64, length: u64) -> RemoteResult<Bytes> {
        let path = normalize(path);
        let mut inner = self.inner.lock();
        enter(&mut inner, StoreOp::ReadRange)?;
        inner.reads.push((path.clone(), offset, length));
        let entry = inner
            .entries
            .get(&path)
            .ok_or_else(|| RemoteError::NotFound(format!("File does not exist: {path}")))?;
        if entry.kind != RemoteFileType::File {
            return Err(RemoteError::Io(format!("{path} is not a file")));
        }
        let len = entry.data.len() as u64;
        if offset > len {
            return Err(RemoteError::Io(format!(
                "Cannot seek after EOF: offset {offset} > length {len}"
            )));
        }
        let end = offset.saturating_add(length).min(len);
        #[allow(clippy::cast_possible_truncation)]
        let slice = &entry.data[offset as usize..end as usize];
        Ok(Bytes::copy_from_slice(slice))
    }
}
