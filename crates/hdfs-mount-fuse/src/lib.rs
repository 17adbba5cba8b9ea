//! FUSE filesystem for HDFS.
//!
//! This crate mounts a directory of an HDFS namespace as a local filesystem,
//! talking to the NameNode over WebHDFS.
//!
//! HDFS objects can only be replaced wholesale, so writes are staged locally
//! per path and pushed as one whole-object rewrite on `flush`/`fsync`. See
//! [`HdfsOps`] for the operation semantics and [`hdfs_mount_staging`] for the
//! buffering and reconciliation machinery.
//!
//! # Usage
//!
//! ```ignore
//! use hdfs_mount_fuse::{Config, HdfsFs, HdfsOps, mount, mount_options};
//!
//! let config = Config::load(path)?;
//! let ops = HdfsOps::new(client, resolver, ownership, config.mount.staging);
//! let handle = mount(HdfsFs::new(ops), &config.mount.dest_dir, &options)?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod inode;
pub mod ops;

pub use backend::{MountError, MountHandle, mount, mount_options};
pub use config::{Config, ConfigError, HdfsSection, MountSection};
pub use error::{FsError, FsResult};
pub use filesystem::{ATTR_TTL, DirEntry, HdfsFs, file_attr};
pub use inode::{InodeEntry, InodeTable, ROOT_INODE};
pub use ops::HdfsOps;
