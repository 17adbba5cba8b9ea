//! Mount lifecycle for the FUSE filesystem.
//!
//! [`mount`] hands an [`HdfsFs`] to a fuser background session. The session
//! runs one dispatch thread, so filesystem operations stay serialized.
//! Dropping the returned [`MountHandle`] unmounts.

use crate::filesystem::HdfsFs;
use crossbeam_channel::bounded;
use fuser::{BackgroundSession, MountOption};
use hdfs_mount_core::RemoteStore;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Timeout for graceful session.join() before forcing unmount.
/// Thread may leak on timeout, but this is acceptable vs blocking forever.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from mounting.
#[derive(Debug, Error)]
pub enum MountError {
    /// FUSE is not installed or the kernel module is missing.
    #[error("FUSE is not available: {0}")]
    Unavailable(&'static str),

    /// The mount call failed.
    #[error("failed to mount at {path}: {source}")]
    Mount {
        /// Mountpoint.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

/// Mount options for an HDFS mount.
///
/// The filesystem name shows up in `mount` output as `hdfs:<server><root>`.
pub fn mount_options(server: &str, root: &str, allow_other: bool) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName(format!("hdfs:{}{root}", server.trim_end_matches('/'))),
        MountOption::Subtype("hdfs".to_string()),
        MountOption::RW,
    ];
    if allow_other {
        options.push(MountOption::AllowOther);
    }
    options
}

/// Returns why FUSE cannot be used on this machine, if it cannot.
pub fn unavailable_reason() -> Option<&'static str> {
    #[cfg(target_os = "macos")]
    {
        if !Path::new("/Library/Filesystems/macfuse.fs").exists() {
            return Some("macFUSE is not installed. Download it from https://osxfuse.github.io/");
        }
        None
    }
    #[cfg(target_os = "linux")]
    {
        if !Path::new("/dev/fuse").exists() {
            return Some("Ensure the fuse kernel module is loaded.");
        }
        None
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Some("FUSE is not supported on this platform.")
    }
}

/// Mounts `fs` at `mountpoint` in a background session.
pub fn mount<S>(
    fs: HdfsFs<S>,
    mountpoint: &Path,
    options: &[MountOption],
) -> Result<MountHandle, MountError>
where
    S: RemoteStore + Send + 'static,
{
    if let Some(reason) = unavailable_reason() {
        return Err(MountError::Unavailable(reason));
    }
    info!(mountpoint = %mountpoint.display(), "Mounting FUSE filesystem");
    let session = fuser::spawn_mount2(fs, mountpoint, options).map_err(|source| MountError::Mount {
        path: mountpoint.to_path_buf(),
        source,
    })?;
    Ok(MountHandle {
        session: Some(session),
        mountpoint: mountpoint.to_path_buf(),
    })
}

/// Handle to a mounted filesystem.
///
/// Wraps the fuser `BackgroundSession`. Dropping this handle triggers unmount.
pub struct MountHandle {
    session: Option<BackgroundSession>,
    mountpoint: PathBuf,
}

impl MountHandle {
    /// The mountpoint.
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Unmounts and waits for the session to finish.
    pub fn unmount(mut self) {
        info!(mountpoint = %self.mountpoint.display(), "Unmounting FUSE filesystem");
        if let Some(session) = self.session.take() {
            // This may block if files are open
            session.join();
        }
        info!(mountpoint = %self.mountpoint.display(), "FUSE unmount successful");
    }

    /// Force unmount the filesystem using system tools.
    /// This is a fallback when the normal unmount is blocked.
    fn force_unmount(&self) {
        #[cfg(target_os = "macos")]
        {
            let result = std::process::Command::new("diskutil")
                .args(["unmount", "force"])
                .arg(&self.mountpoint)
                .output();
            if matches!(result, Ok(ref output) if output.status.success()) {
                debug!("Force unmount via diskutil succeeded");
                return;
            }
            debug!("diskutil unmount failed, trying umount");
            let _ = std::process::Command::new("umount")
                .arg("-f")
                .arg(&self.mountpoint)
                .output();
        }

        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("fusermount")
                .args(["-uz"])
                .arg(&self.mountpoint)
                .output();
        }
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        debug!(mountpoint = %self.mountpoint.display(), "Unmounting FUSE filesystem on drop");

        // Join on a separate thread so a stuck unmount cannot hang the process
        let (tx, rx) = bounded(1);
        std::thread::spawn(move || {
            session.join();
            let _ = tx.send(());
        });

        if rx.recv_timeout(JOIN_TIMEOUT).is_err() {
            warn!(
                mountpoint = %self.mountpoint.display(),
                timeout = ?JOIN_TIMEOUT,
                "session.join() timed out, forcing unmount"
            );
            self.force_unmount();
        }
    }
}
