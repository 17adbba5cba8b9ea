//! Mount configuration.
//!
//! The mount is configured from a YAML file with an `hdfs` section (where the
//! namespace lives and how to authenticate) and a `mount` section (where it
//! appears locally and who owns it):
//!
//! ```yaml
//! hdfs:
//!   server: http://namenode:9870
//!   mount_root: /user/alice
//!   kerberos: false
//! mount:
//!   dest_dir: /mnt/hdfs
//! ```

use hdfs_mount_core::Auth;
use hdfs_mount_core::webhdfs::DEFAULT_TIMEOUT;
use hdfs_mount_staging::StagingMode;
use nix::unistd::{Gid, Group, Uid, User};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config from {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid YAML for this schema.
    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// `mount.dest_dir` is not an existing directory.
    #[error("directory {} does not exist, please specify an existing directory", .0.display())]
    MissingMountDir(PathBuf),

    /// `hdfs.kerberos` is set but no delegation token was given.
    #[error("hdfs.kerberos requires hdfs.delegation_token")]
    MissingDelegationToken,

    /// The local user running the process could not be resolved.
    #[error("cannot resolve local user or group for uid {0}")]
    UnknownLocalUser(u32),
}

/// Remote side of the mount.
#[derive(Debug, Clone, Deserialize)]
pub struct HdfsSection {
    /// WebHDFS endpoint, e.g. `http://namenode:9870`.
    pub server: String,
    /// Remote directory that appears as the mount root.
    pub mount_root: String,
    /// Kerberos-secured cluster.
    #[serde(default)]
    pub kerberos: bool,
    /// Simple-auth user name. Defaults to the local user.
    #[serde(default)]
    pub user: Option<String>,
    /// Delegation token used when `kerberos` is set.
    #[serde(default)]
    pub delegation_token: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Local side of the mount.
#[derive(Debug, Clone, Deserialize)]
pub struct MountSection {
    /// Local mountpoint. Must exist.
    pub dest_dir: PathBuf,
    /// Remote owner reported as the local user. Defaults to the local user.
    #[serde(default)]
    pub owner: Option<String>,
    /// Remote group reported as the local group. Defaults to the local primary group.
    #[serde(default)]
    pub group: Option<String>,
    /// Where staging buffers live.
    #[serde(default)]
    pub staging: StagingMode,
    /// Let other users access the mount.
    #[serde(default)]
    pub allow_other: bool,
}

/// Complete mount configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Remote settings.
    pub hdfs: HdfsSection,
    /// Local settings.
    pub mount: MountSection,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Config {
    /// Parses a configuration and fills in defaults from the local user.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(text)?;
        config.fill_defaults()?;
        Ok(config)
    }

    /// Reads and parses a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks settings that depend on the environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mount.dest_dir.is_dir() {
            return Err(ConfigError::MissingMountDir(self.mount.dest_dir.clone()));
        }
        if self.hdfs.kerberos && self.hdfs.delegation_token.is_none() {
            return Err(ConfigError::MissingDelegationToken);
        }
        Ok(())
    }

    /// Replaces the mountpoint (command-line override).
    #[must_use]
    pub fn with_mountpoint(mut self, dest_dir: PathBuf) -> Self {
        self.mount.dest_dir = dest_dir;
        self
    }

    /// Authentication for WebHDFS requests.
    pub fn auth(&self) -> Auth {
        match (&self.hdfs.delegation_token, self.hdfs.kerberos) {
            (Some(token), true) => Auth::Delegation {
                token: token.clone(),
            },
            _ => Auth::Simple {
                user: self.hdfs.user.clone(),
            },
        }
    }

    /// Remote owner mapped to the local user.
    pub fn owner(&self) -> &str {
        self.mount.owner.as_deref().unwrap_or_default()
    }

    /// Remote group mapped to the local group.
    pub fn group(&self) -> &str {
        self.mount.group.as_deref().unwrap_or_default()
    }

    fn fill_defaults(&mut self) -> Result<(), ConfigError> {
        if self.mount.owner.is_none() || self.hdfs.user.is_none() {
            let name = local_user_name()?;
            self.mount.owner.get_or_insert_with(|| name.clone());
            self.hdfs.user.get_or_insert(name);
        }
        if self.mount.group.is_none() {
            self.mount.group = Some(local_group_name()?);
        }
        Ok(())
    }
}

fn local_user_name() -> Result<String, ConfigError> {
    let uid = Uid::current();
    match User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.name),
        _ => Err(ConfigError::UnknownLocalUser(uid.as_raw())),
    }
}

fn local_group_name() -> Result<String, ConfigError> {
    match Group::from_gid(Gid::current()) {
        Ok(Some(group)) => Ok(group.name),
        _ => Err(ConfigError::UnknownLocalUser(Uid::current().as_raw())),
    }
}
