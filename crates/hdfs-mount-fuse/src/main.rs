//! Command-line entry point: mount an HDFS directory as a local filesystem.

use anyhow::{Context, Result};
use clap::Parser;
use hdfs_mount_core::WebHdfsClient;
use hdfs_mount_fuse::{Config, HdfsFs, HdfsOps, mount, mount_options};
use hdfs_mount_staging::{Ownership, PathResolver};
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hdfs-mount")]
#[command(author, version)]
#[command(about = "Mount an HDFS directory as a local filesystem over WebHDFS")]
#[command(after_help = "EXAMPLES:
    # Mount using a config file
    hdfs-mount hdfs-mount.yaml

    # Override the mountpoint and enable debug logging
    hdfs-mount --log-level debug --mountpoint /mnt/hdfs hdfs-mount.yaml

Unmount with Ctrl-C or `fusermount -u <mountpoint>`.")]
struct Cli {
    /// YAML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Mount here instead of `mount.dest_dir`
    #[arg(long, value_name = "DIR")]
    mountpoint: Option<PathBuf>,
}

fn setup_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(&cli.log_level);

    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if let Some(dir) = cli.mountpoint {
        config = config.with_mountpoint(dir);
    }
    config.validate().context("Invalid configuration")?;

    let client = WebHdfsClient::new(&config.hdfs.server, config.auth(), config.hdfs.timeout)
        .context("Failed to create WebHDFS client")?;
    let resolver = PathResolver::new(&config.hdfs.mount_root);
    let ownership = Ownership::for_process(config.owner(), config.group());
    let options = mount_options(&config.hdfs.server, resolver.root(), config.mount.allow_other);
    let ops = HdfsOps::new(client, resolver, ownership, config.mount.staging);

    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("Failed to set signal handler")?;

    let handle = mount(HdfsFs::new(ops), &config.mount.dest_dir, &options)
        .context("Failed to mount filesystem")?;
    info!(
        server = config.hdfs.server.as_str(),
        root = config.hdfs.mount_root.as_str(),
        mountpoint = %handle.mountpoint().display(),
        "Mounted; press Ctrl-C to unmount"
    );

    rx.recv().context("Signal channel closed")?;
    handle.unmount();
    Ok(())
}
