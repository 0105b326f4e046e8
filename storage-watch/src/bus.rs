// SPDX-License-Identifier: GPL-3.0-only

//! The seam between the watcher and the UDisks2 daemon.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tracing::warn;
use udisks2::block::BlockProxy;
use zbus::names::BusName;
use zbus::{Connection, MatchRule, MessageStream, message, zvariant};
use zbus_macros::proxy;

use crate::error::DiskError;
use crate::{UDISKS2_ROOT, UDISKS2_SERVICE};

/// object path → interface → property → value
pub type ManagedObjects = HashMap<String, HashMap<String, HashMap<String, zvariant::OwnedValue>>>;

/// Merged notification feed; dropping it unsubscribes.
pub type NotificationStream = BoxStream<'static, Notification>;

/// A device-topology notification from the object tree.
#[derive(Debug)]
pub enum Notification {
    InterfacesAdded {
        path: String,
        interfaces: Vec<String>,
    },
    InterfacesRemoved {
        path: String,
        interfaces: Vec<String>,
    },
    PropertiesChanged {
        path: String,
        interface: String,
        changed: HashMap<String, zvariant::OwnedValue>,
    },
}

/// Everything the watcher needs from the device service.
#[async_trait]
pub trait DeviceBus: Send + Sync {
    /// Subscribe to InterfacesAdded, InterfacesRemoved and PropertiesChanged.
    async fn subscribe(&self) -> Result<NotificationStream, DiskError>;

    async fn managed_objects(&self) -> Result<ManagedObjects, DiskError>;

    /// Raw introspection XML for `path`.
    async fn introspect(&self, path: &str) -> Result<String, DiskError>;

    async fn service_version(&self) -> Result<String, DiskError>;

    /// The `Drive` property of the block device at `block_path`.
    async fn block_drive(&self, block_path: &str) -> Result<String, DiskError>;
}

#[proxy(
    default_service = "org.freedesktop.UDisks2",
    default_path = "/org/freedesktop/UDisks2/Manager",
    interface = "org.freedesktop.UDisks2.Manager"
)]
pub trait UDisks2Manager {
    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;
}

#[proxy(
    default_service = "org.freedesktop.UDisks2",
    default_path = "/org/freedesktop/UDisks2",
    interface = "org.freedesktop.DBus.ObjectManager"
)]
pub trait UDisks2ObjectManager {
    fn get_managed_objects(
        &self,
    ) -> zbus::Result<
        HashMap<
            zvariant::OwnedObjectPath,
            HashMap<String, HashMap<String, zvariant::OwnedValue>>,
        >,
    >;

    #[zbus(signal)]
    fn interfaces_added(
        &self,
        object_path: zvariant::OwnedObjectPath,
        interfaces_and_properties: HashMap<String, HashMap<String, zvariant::OwnedValue>>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    fn interfaces_removed(
        &self,
        object_path: zvariant::OwnedObjectPath,
        interfaces: Vec<String>,
    ) -> zbus::Result<()>;
}

/// `DeviceBus` backed by the real UDisks2 daemon on the system bus.
#[derive(Clone)]
pub struct UDisks2Bus {
    connection: Connection,
}

impl UDisks2Bus {
    pub async fn system() -> Result<Self, DiskError> {
        let connection = Connection::system()
            .await
            .map_err(|e| DiskError::ConnectionFailed(e.to_string()))?;
        Ok(Self { connection })
    }

    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Get a reference to the D-Bus connection
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// PropertiesChanged from the daemon's current unique name only; other
    /// peers can emit signals on UDisks2 paths too.
    async fn properties_changed_stream(&self) -> Result<MessageStream, DiskError> {
        let dbus = zbus::fdo::DBusProxy::new(&self.connection).await?;
        let service = BusName::from_static_str(UDISKS2_SERVICE).map_err(zbus::Error::from)?;
        let owner = dbus.get_name_owner(service).await?;
        let rule = properties_changed_rule(BusName::from(&owner))?;

        Ok(MessageStream::for_match_rule(rule, &self.connection, None).await?)
    }
}

fn properties_changed_rule(owner: BusName<'_>) -> Result<MatchRule<'_>, DiskError> {
    Ok(MatchRule::builder()
        .msg_type(message::Type::Signal)
        .sender(owner)?
        .interface("org.freedesktop.DBus.Properties")?
        .member("PropertiesChanged")?
        .path_namespace(UDISKS2_ROOT)?
        .build())
}

#[async_trait]
impl DeviceBus for UDisks2Bus {
    async fn subscribe(&self) -> Result<NotificationStream, DiskError> {
        let object_manager = UDisks2ObjectManagerProxy::new(&self.connection).await?;
        let added_stream = object_manager.receive_interfaces_added().await?;
        let removed_stream = object_manager.receive_interfaces_removed().await?;
        let changed_stream = self.properties_changed_stream().await?;

        let added = added_stream.filter_map(|signal| async move {
            match signal.args() {
                Ok(args) => Some(Notification::InterfacesAdded {
                    path: args.object_path.to_string(),
                    interfaces: args.interfaces_and_properties.keys().cloned().collect(),
                }),
                Err(e) => {
                    warn!("Failed to parse InterfacesAdded signal args: {e}");
                    None
                }
            }
        });

        let removed = removed_stream.filter_map(|signal| async move {
            match signal.args() {
                Ok(args) => Some(Notification::InterfacesRemoved {
                    path: args.object_path.to_string(),
                    interfaces: args.interfaces,
                }),
                Err(e) => {
                    warn!("Failed to parse InterfacesRemoved signal args: {e}");
                    None
                }
            }
        });

        let changed = changed_stream.filter_map(|msg| async move {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("PropertiesChanged stream error: {e}");
                    return None;
                }
            };
            let path = msg.header().path()?.to_string();

            match msg
                .body()
                .deserialize::<(String, HashMap<String, zvariant::OwnedValue>, Vec<String>)>()
            {
                Ok((interface, changed, _invalidated)) => Some(Notification::PropertiesChanged {
                    path,
                    interface,
                    changed,
                }),
                Err(e) => {
                    warn!("Failed to parse PropertiesChanged signal for {path}: {e}");
                    None
                }
            }
        });

        Ok(stream::select_all([added.boxed(), removed.boxed(), changed.boxed()]).boxed())
    }

    async fn managed_objects(&self) -> Result<ManagedObjects, DiskError> {
        let object_manager = UDisks2ObjectManagerProxy::new(&self.connection).await?;
        let objects = object_manager.get_managed_objects().await?;

        Ok(objects
            .into_iter()
            .map(|(path, interfaces)| (path.to_string(), interfaces))
            .collect())
    }

    async fn introspect(&self, path: &str) -> Result<String, DiskError> {
        let proxy = zbus::fdo::IntrospectableProxy::builder(&self.connection)
            .destination(UDISKS2_SERVICE)?
            .path(path.to_owned())?
            .build()
            .await?;

        Ok(proxy.introspect().await?)
    }

    async fn service_version(&self) -> Result<String, DiskError> {
        let manager = UDisks2ManagerProxy::new(&self.connection).await?;
        Ok(manager.version().await?)
    }

    async fn block_drive(&self, block_path: &str) -> Result<String, DiskError> {
        let block = BlockProxy::builder(&self.connection)
            .path(block_path.to_owned())?
            .build()
            .await?;

        Ok(block.drive().await?.to_string())
    }
}
