// SPDX-License-Identifier: GPL-3.0-only

//! COSMIC Ext Storage Watch - follow UDisks2 drive, block device and mount
//! changes from the command line.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use storage_watch::{DeviceEvent, DiskManager};

mod config;
mod logging;

use config::{Config, LoggingLevel};

#[derive(Debug, Parser)]
#[command(name = "cosmic-ext-storage-watch", version, about)]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/cosmic-ext-storage-watch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true, value_enum)]
    log_level: Option<LoggingLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List drive object paths
    Drives,
    /// List block device object paths
    Blocks,
    /// Print the current mount points of every filesystem
    Mounts,
    /// Print the UDisks2 daemon version
    Version,
    /// Follow device changes until interrupted
    Watch {
        /// One JSON object per event
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init(cli.log_level.unwrap_or(config.log_level), config.log_to_disk);

    tracing::debug!("Configuration: {config:?}");

    let mut manager = DiskManager::with_config(config.watch).await?;

    match cli.command {
        Command::Drives => print_paths(manager.enumerate_drive_paths().await, &manager)?,
        Command::Blocks => print_paths(manager.enumerate_block_device_paths().await, &manager)?,
        Command::Mounts => {
            manager.update_block_device_mount_points_map().await?;
            for block in manager.enumerate_block_device_paths().await {
                let points = manager.mount_points(&block);
                if points.is_empty() {
                    continue;
                }
                let joined: Vec<String> = points.iter().map(ToString::to_string).collect();
                println!("{block}\t{}", joined.join(","));
            }
        }
        Command::Version => {
            use storage_watch::DeviceBus;
            println!("{}", manager.bus().service_version().await?);
        }
        Command::Watch { json } => watch(&mut manager, json).await?,
    }

    Ok(())
}

fn print_paths(paths: Vec<String>, manager: &DiskManager) -> Result<()> {
    if paths.is_empty()
        && let Some(e) = manager.last_error()
    {
        anyhow::bail!("{e}");
    }

    for path in paths {
        println!("{path}");
    }
    Ok(())
}

async fn watch(manager: &mut DiskManager, json: bool) -> Result<()> {
    manager.subscribe(move |event| {
        if json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!("Failed to serialize event: {e}"),
            }
        } else {
            println!("{}", describe(event));
        }
    });

    manager.set_watching(true).await?;
    tracing::info!("Watching for device changes, press Ctrl+C to stop");

    let stream_ended = tokio::select! {
        _ = manager.run() => true,
        _ = tokio::signal::ctrl_c() => false,
    };

    if stream_ended {
        if let Some(e) = manager.last_error() {
            anyhow::bail!("stopped watching: {e}");
        }
    } else {
        tracing::info!("Interrupted");
    }

    manager.set_watching(false).await?;
    Ok(())
}

fn describe(event: &DeviceEvent) -> String {
    match event {
        DeviceEvent::DiskAdded { drive } => format!("disk added         {drive}"),
        DeviceEvent::DiskRemoved { drive } => format!("disk removed       {drive}"),
        DeviceEvent::BlockDeviceAdded { block } => format!("block added        {block}"),
        DeviceEvent::BlockDeviceRemoved { block } => format!("block removed      {block}"),
        DeviceEvent::FileSystemAdded { block } => format!("filesystem added   {block}"),
        DeviceEvent::FileSystemRemoved { block } => format!("filesystem removed {block}"),
        DeviceEvent::MountAdded { block, mount_point } => {
            format!("mounted            {block} at {mount_point}")
        }
        DeviceEvent::MountRemoved { block, mount_point } => {
            format!("unmounted          {block} from {mount_point}")
        }
        DeviceEvent::MountPointsChanged { block, old, new } => {
            let list = |points: &[storage_watch::MountPoint]| {
                points
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            };
            format!("mounts changed     {block} [{}] -> [{}]", list(old), list(new))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage_watch::MountPoint;

    #[test]
    fn describes_mount_changes() {
        let line = describe(&DeviceEvent::MountPointsChanged {
            block: "/org/freedesktop/UDisks2/block_devices/sdb1".into(),
            old: vec![MountPoint::from("/a")],
            new: vec![MountPoint::from("/b"), MountPoint::from("/c")],
        });

        assert_eq!(
            line,
            "mounts changed     /org/freedesktop/UDisks2/block_devices/sdb1 [/a] -> [/b,/c]"
        );
    }

    #[test]
    fn cli_parses_watch_flags() {
        let cli = Cli::try_parse_from([
            "cosmic-ext-storage-watch",
            "--log-level",
            "debug",
            "watch",
            "--json",
        ])
        .expect("parse args");

        assert_eq!(cli.log_level, Some(LoggingLevel::Debug));
        assert!(matches!(cli.command, Command::Watch { json: true }));
    }
}
