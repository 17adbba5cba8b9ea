//! Write staging for mounting a whole-object remote store as a POSIX filesystem.
//!
//! The remote store can stat, list, read a byte range, and replace an object
//! wholesale. POSIX callers expect random-access reads and writes. This crate
//! holds the pieces that bridge the two without talking to either side:
//!
//! - [`HandleTable`] - open handles and the per-path [`PathStaging`] they share
//! - [`StagingBuffer`] - in-memory or spill-to-disk reconciliation buffer
//! - [`IntervalSet`] / [`reconcile`] - which bytes are local and which must be fetched
//! - [`DirCache`] - answers attribute lookups right after a listing
//! - [`PathResolver`] - maps mount-relative paths under the remote root
//! - [`to_posix`] / [`Ownership`] - remote status to POSIX attributes
//!
//! # Example
//!
//! ```
//! use hdfs_mount_core::Permission;
//! use hdfs_mount_staging::{ByteRange, HandleTable, StagingMode};
//!
//! let mut table = HandleTable::new(StagingMode::Memory);
//! let fh = table.open_handle("/data/a.txt", 10, false, Permission::new(0o644)).unwrap();
//! assert_eq!(fh, 42);
//!
//! let (_, staging) = table.entry(fh).unwrap();
//! staging.apply_write(5, b"xyz").unwrap();
//!
//! // Bytes [0,5) and [8,10) still have to come from the remote store
//! let plan = staging.plan(ByteRange::new(0, 10));
//! assert_eq!(plan.gaps, vec![ByteRange::new(0, 5), ByteRange::new(8, 10)]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attrs;
mod buffer;
pub mod dir_cache;
mod error;
pub mod handle_table;
pub mod interval;
pub mod resolver;

pub use attrs::{EntryKind, Ownership, PosixAttrs, to_posix};
pub use buffer::{StagingBuffer, StagingMode};
pub use dir_cache::{CacheLookup, DirCache};
pub use error::{StagingError, StagingResult};
pub use handle_table::{FIRST_HANDLE_ID, Handle, HandleTable, PathStaging, PendingWrite};
pub use interval::{ByteRange, IntervalSet, Reconciliation, merge, reconcile};
pub use resolver::{PathResolver, file_name, join, parent_of};
