//! Mount-relative to remote path mapping.

/// Maps mount-relative paths into the remote namespace under a fixed root.
///
/// ```
/// use hdfs_mount_staging::PathResolver;
///
/// let resolver = PathResolver::new("/user/alice/");
/// assert_eq!(resolver.resolve("/docs/a.txt"), "/user/alice/docs/a.txt");
/// assert_eq!(resolver.resolve("/"), "/user/alice");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: String,
}

impl PathResolver {
    /// Creates a resolver rooted at `root` (trailing separators are ignored).
    pub fn new(root: &str) -> Self {
        let trimmed = root.trim_end_matches('/');
        let root = if trimmed.is_empty() {
            "/".to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self { root }
    }

    /// The remote root prefix.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Strips leading separators from `relative` and joins it to the root.
    pub fn resolve(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else if self.root == "/" {
            format!("/{relative}")
        } else {
            format!("{}/{relative}", self.root)
        }
    }
}

/// Parent of an absolute path. The parent of `/` is `/`.
pub fn parent_of(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Final component of an absolute path (empty for `/`).
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Joins a child name onto a directory path.
pub fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}
