// SPDX-License-Identifier: GPL-3.0-only

//! UDisks2 device topology watcher.
//!
//! Tracks drive, block device and filesystem hotplug through the UDisks2
//! ObjectManager and keeps an advisory map of block device → mount points.

mod dbus;

pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod manager;

// Re-export commonly used zbus types
pub use zbus::zvariant::{OwnedObjectPath, OwnedValue};

pub use bus::{DeviceBus, ManagedObjects, Notification, NotificationStream, UDisks2Bus};
pub use config::{QuirkMode, WatchConfig};
pub use dbus::bytestring::{MountPoint, decode_c_string_bytes, decode_mount_points};
pub use dbus::introspect::child_node_paths;
pub use device::{BlockDevice, BlockPartition, DiskDevice};
pub use error::DiskError;
pub use manager::{
    DeviceEvent, DeviceEventStream, DiskManager, ObserverId, compare_versions,
    is_affected_version,
};

/// Well-known bus name of the UDisks2 daemon.
pub const UDISKS2_SERVICE: &str = "org.freedesktop.UDisks2";
/// Root object path of the UDisks2 object tree.
pub const UDISKS2_ROOT: &str = "/org/freedesktop/UDisks2";

pub const DRIVE_IFACE: &str = "org.freedesktop.UDisks2.Drive";
pub const BLOCK_IFACE: &str = "org.freedesktop.UDisks2.Block";
pub const FILESYSTEM_IFACE: &str = "org.freedesktop.UDisks2.Filesystem";

/// Sub-tree holding drive objects.
pub const DRIVES_PATH: &str = "/org/freedesktop/UDisks2/drives";
/// Sub-tree holding block device objects.
pub const BLOCK_DEVICES_PATH: &str = "/org/freedesktop/UDisks2/block_devices";

/// Returns true if `path` lies inside `tree` (any depth below it).
pub(crate) fn is_under(path: &str, tree: &str) -> bool {
    path.strip_prefix(tree)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|name| !name.is_empty())
}
