//! Remote store boundary for mounting HDFS as a local filesystem.
//!
//! The mount adapter only needs a handful of remote primitives: stat, list,
//! whole-object read-range, whole-object overwrite, and a few metadata
//! mutations. This crate defines that capability set as the [`RemoteStore`]
//! trait and ships two implementations:
//!
//! - [`WebHdfsClient`] - talks to a NameNode over the WebHDFS REST API
//! - [`MemoryStore`] - an in-process tree used by tests and dry runs
//!
//! # Error Taxonomy
//!
//! Every remote failure is a [`RemoteError`]. Its [`ErrorCategory`] is the
//! POSIX-facing classification (not found, exists, access denied, I/O fault,
//! unsupported) that mount frontends translate into errno values.
//!
//! # Example
//!
//! ```
//! use hdfs_mount_core::{MemoryStore, Permission, RemoteStore};
//!
//! let store = MemoryStore::new();
//! store.write_whole("/data/a.txt", b"hello", Permission::new(0o644), false).unwrap();
//!
//! let stat = store.status("/data/a.txt").unwrap();
//! assert_eq!(stat.length, 5);
//! assert_eq!(&store.read_range("/data/a.txt", 1, 3).unwrap()[..], b"ell");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod memory;
mod stat;
mod store;
pub mod webhdfs;

pub use error::{ErrorCategory, RemoteError, RemoteResult};
pub use memory::{MemoryStore, StoreOp, WriteRecord};
pub use stat::{Permission, PermissionParseError, RemoteFileType, RemoteStat};
pub use store::RemoteStore;
pub use webhdfs::{Auth, WebHdfsClient};
