// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zbus::Connection;
use zbus::zvariant::OwnedValue;

use super::event::{DeviceEvent, DeviceEventStream, ObserverId, Observers};
use super::pending::PendingDriveFlags;
use super::version::is_affected_version;
use crate::bus::{DeviceBus, Notification, NotificationStream, UDisks2Bus};
use crate::config::{QuirkMode, WatchConfig};
use crate::dbus::bytestring::{MountPoint, decode_mount_points};
use crate::dbus::introspect::child_node_paths;
use crate::device::{BlockDevice, BlockPartition, DiskDevice};
use crate::error::DiskError;
use crate::{
    BLOCK_DEVICES_PATH, BLOCK_IFACE, DRIVE_IFACE, DRIVES_PATH, FILESYSTEM_IFACE, is_under,
};

/// Watches the UDisks2 object tree and turns its notifications into
/// [`DeviceEvent`]s.
///
/// The manager is inert until [`set_watching`](Self::set_watching) is called
/// with `true`. While watching, the owner drives it with
/// [`process_next`](Self::process_next) (or [`run`](Self::run)); every
/// handler runs on that caller's task and events reach observers
/// synchronously, in registration order.
///
/// Some UDisks2 releases never announce a hot-plugged drive, only its block
/// devices. On those, the first block device of a drive synthesizes the
/// missing [`DeviceEvent::DiskAdded`]; a short-lived per-drive flag keeps the
/// native announcement (if it does arrive) from doubling it.
pub struct DiskManager<B: DeviceBus = UDisks2Bus> {
    bus: B,
    config: WatchConfig,
    subscription: Option<NotificationStream>,
    mount_points: HashMap<String, Vec<MountPoint>>,
    pending_drive_flags: PendingDriveFlags,
    quirk_cache: Option<bool>,
    observers: Observers,
    last_error: Option<DiskError>,
}

impl DiskManager<UDisks2Bus> {
    pub async fn new() -> Result<Self, DiskError> {
        Self::with_config(WatchConfig::default()).await
    }

    pub async fn with_config(config: WatchConfig) -> Result<Self, DiskError> {
        let bus = UDisks2Bus::system().await?;
        Ok(Self::with_bus(bus, config))
    }

    /// Get a reference to the D-Bus connection
    pub fn connection(&self) -> &Connection {
        self.bus.connection()
    }

    pub async fn create_block_device(&self, path: &str) -> Result<BlockDevice, DiskError> {
        BlockDevice::new(self.connection(), path).await
    }

    pub async fn create_block_partition(&self, path: &str) -> Result<BlockPartition, DiskError> {
        BlockPartition::new(self.connection(), path).await
    }

    pub async fn create_disk_device(&self, path: &str) -> Result<DiskDevice, DiskError> {
        DiskDevice::new(self.connection(), path).await
    }
}

impl<B: DeviceBus> DiskManager<B> {
    pub fn with_bus(bus: B, config: WatchConfig) -> Self {
        let pending_drive_flags = PendingDriveFlags::new(config.drive_flag_ttl());
        Self {
            bus,
            config,
            subscription: None,
            mount_points: HashMap::new(),
            pending_drive_flags,
            quirk_cache: None,
            observers: Observers::default(),
            last_error: None,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn is_watching(&self) -> bool {
        self.subscription.is_some()
    }

    /// The most recent bus failure, if any.
    pub fn last_error(&self) -> Option<&DiskError> {
        self.last_error.as_ref()
    }

    /// Last known mount points of a block device; empty if not cached.
    pub fn mount_points(&self, block: &str) -> &[MountPoint] {
        self.mount_points
            .get(block)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Register an observer. Observers are called in registration order.
    pub fn subscribe<F>(&mut self, mut observer: F) -> ObserverId
    where
        F: FnMut(&DeviceEvent) + Send + 'static,
    {
        self.observers.add(Box::new(move |event: &DeviceEvent| {
            observer(event);
            true
        }))
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// A stream that yields every event emitted from now on.
    ///
    /// Dropping the stream detaches it on the next emitted event.
    pub fn event_stream(&mut self) -> DeviceEventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.observers.add(Box::new(move |event: &DeviceEvent| {
            sender.send(event.clone()).is_ok()
        }));
        DeviceEventStream { receiver }
    }

    /// Start or stop watching. Calling with the current state does nothing.
    ///
    /// Enabling subscribes to the three notification classes and rebuilds
    /// the mount point cache. Disabling drops the subscription and clears
    /// the cache.
    pub async fn set_watching(&mut self, enabled: bool) -> Result<(), DiskError> {
        if self.is_watching() == enabled {
            return Ok(());
        }

        if enabled {
            let stream = match self.bus.subscribe().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to subscribe to UDisks2 notifications: {e}");
                    self.record_error(e.clone());
                    return Err(e);
                }
            };
            self.subscription = Some(stream);
            info!("Watching UDisks2 for device changes");

            if let Err(e) = self.update_block_device_mount_points_map().await {
                warn!("Initial mount point scan failed: {e}");
            }
        } else {
            self.subscription = None;
            self.mount_points.clear();
            info!("Stopped watching UDisks2 for device changes");
        }

        Ok(())
    }

    /// Rebuild the mount point cache from `GetManagedObjects`.
    ///
    /// On failure the cache is left empty.
    pub async fn update_block_device_mount_points_map(&mut self) -> Result<(), DiskError> {
        self.mount_points.clear();

        let objects = match self.bus.managed_objects().await {
            Ok(objects) => objects,
            Err(e) => {
                self.record_error(e.clone());
                return Err(e);
            }
        };

        for (path, interfaces) in objects {
            if !is_under(&path, BLOCK_DEVICES_PATH) {
                continue;
            }

            let Some(filesystem) = interfaces.get(FILESYSTEM_IFACE) else {
                continue;
            };

            let points = filesystem
                .get("MountPoints")
                .map(decode_mount_points)
                .unwrap_or_default();
            self.mount_points.insert(path, points);
        }

        debug!(
            "Mount point cache rebuilt with {} filesystems",
            self.mount_points.len()
        );
        Ok(())
    }

    pub async fn enumerate_block_device_paths(&mut self) -> Vec<String> {
        self.child_nodes(BLOCK_DEVICES_PATH).await
    }

    pub async fn enumerate_drive_paths(&mut self) -> Vec<String> {
        self.child_nodes(DRIVES_PATH).await
    }

    async fn child_nodes(&mut self, tree: &str) -> Vec<String> {
        match self.bus.introspect(tree).await {
            Ok(xml) => child_node_paths(tree, &xml),
            Err(e) => {
                warn!("Failed to introspect {tree}: {e}");
                self.record_error(e);
                Vec::new()
            }
        }
    }

    /// Wait for the next notification and handle it.
    ///
    /// Returns `false` when not watching or when the notification stream has
    /// ended; in the latter case the manager stops watching.
    pub async fn process_next(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return false;
        };

        let next = subscription.next().await;
        match next {
            Some(notification) => {
                self.dispatch(notification).await;
                true
            }
            None => {
                warn!("UDisks2 notification stream closed");
                self.record_error(DiskError::OperationFailed(
                    "notification stream closed".to_string(),
                ));
                self.subscription = None;
                self.mount_points.clear();
                false
            }
        }
    }

    /// Handle notifications until watching stops.
    pub async fn run(&mut self) {
        while self.process_next().await {}
    }

    pub async fn dispatch(&mut self, notification: Notification) {
        match notification {
            Notification::InterfacesAdded { path, interfaces } => {
                self.on_interfaces_added(&path, &interfaces).await
            }
            Notification::InterfacesRemoved { path, interfaces } => {
                self.on_interfaces_removed(&path, &interfaces)
            }
            Notification::PropertiesChanged {
                path,
                interface,
                changed,
            } => self.on_properties_changed(&path, &interface, &changed),
        }
    }

    pub async fn on_interfaces_added(&mut self, path: &str, interfaces: &[String]) {
        let has = |iface: &str| interfaces.iter().any(|i| i == iface);
        debug!("InterfacesAdded {path}: {interfaces:?}");

        if is_under(path, DRIVES_PATH) {
            if !has(DRIVE_IFACE) {
                return;
            }

            if !self.quirk_active().await {
                self.emit(DeviceEvent::DiskAdded {
                    drive: path.to_string(),
                });
            } else if self.pending_drive_flags.try_claim(path, Instant::now()) {
                self.emit(DeviceEvent::DiskAdded {
                    drive: path.to_string(),
                });
            } else {
                debug!("Drive {path} already announced");
            }
        } else if is_under(path, BLOCK_DEVICES_PATH) {
            if has(BLOCK_IFACE) {
                if self.quirk_active().await {
                    self.synthesize_disk_added(path).await;
                }

                self.emit(DeviceEvent::BlockDeviceAdded {
                    block: path.to_string(),
                });
            }

            if has(FILESYSTEM_IFACE) {
                // New filesystem starts from an empty baseline.
                self.mount_points.remove(path);
                self.emit(DeviceEvent::FileSystemAdded {
                    block: path.to_string(),
                });
            }
        }
    }

    async fn synthesize_disk_added(&mut self, block: &str) {
        let drive = match self.bus.block_drive(block).await {
            Ok(drive) => drive,
            Err(e) => {
                warn!("Could not resolve drive of {block}: {e}");
                self.record_error(e);
                return;
            }
        };

        if drive.is_empty() || drive == "/" {
            return;
        }

        if self.pending_drive_flags.try_claim(&drive, Instant::now()) {
            debug!("Synthesizing drive added for {drive} from {block}");
            self.emit(DeviceEvent::DiskAdded { drive });
        }
    }

    pub fn on_interfaces_removed(&mut self, path: &str, interfaces: &[String]) {
        debug!("InterfacesRemoved {path}: {interfaces:?}");

        for iface in interfaces {
            match iface.as_str() {
                DRIVE_IFACE => {
                    self.pending_drive_flags.clear(path);
                    self.emit(DeviceEvent::DiskRemoved {
                        drive: path.to_string(),
                    });
                }
                FILESYSTEM_IFACE => {
                    self.mount_points.remove(path);
                    self.emit(DeviceEvent::FileSystemRemoved {
                        block: path.to_string(),
                    });
                }
                BLOCK_IFACE => self.emit(DeviceEvent::BlockDeviceRemoved {
                    block: path.to_string(),
                }),
                _ => {}
            }
        }
    }

    pub fn on_properties_changed(
        &mut self,
        path: &str,
        interface: &str,
        changed: &HashMap<String, OwnedValue>,
    ) {
        if interface != FILESYSTEM_IFACE {
            return;
        }

        let Some(value) = changed.get("MountPoints") else {
            return;
        };

        let new = decode_mount_points(value);
        let old = self
            .mount_points
            .insert(path.to_string(), new.clone())
            .unwrap_or_default();

        let added = match (old.first(), new.first()) {
            (None, Some(mp)) => Some(DeviceEvent::MountAdded {
                block: path.to_string(),
                mount_point: mp.clone(),
            }),
            (Some(mp), None) => Some(DeviceEvent::MountRemoved {
                block: path.to_string(),
                mount_point: mp.clone(),
            }),
            _ => None,
        };

        self.emit(DeviceEvent::MountPointsChanged {
            block: path.to_string(),
            old,
            new,
        });
        if let Some(event) = added {
            self.emit(event);
        }
    }

    async fn quirk_active(&mut self) -> bool {
        match self.config.quirk {
            QuirkMode::Always => true,
            QuirkMode::Never => false,
            QuirkMode::Auto => {
                if let Some(affected) = self.quirk_cache {
                    return affected;
                }

                match self.bus.service_version().await {
                    Ok(version) => {
                        let affected =
                            is_affected_version(&version, &self.config.quirk_version_threshold);
                        info!(
                            "UDisks2 {version}: drive-added compensation {}",
                            if affected { "enabled" } else { "disabled" }
                        );
                        self.quirk_cache = Some(affected);
                        affected
                    }
                    Err(e) => {
                        warn!("Could not read UDisks2 version, assuming it needs compensation: {e}");
                        self.record_error(e);
                        true
                    }
                }
            }
        }
    }

    fn record_error(&mut self, err: DiskError) {
        self.last_error = Some(err);
    }

    fn emit(&mut self, event: DeviceEvent) {
        debug!("Device event: {event:?}");
        self.observers.emit(&event);
    }
}
