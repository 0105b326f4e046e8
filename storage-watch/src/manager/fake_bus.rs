// SPDX-License-Identifier: GPL-3.0-only

//! In-memory `DeviceBus` for exercising the manager without a system bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;

use crate::bus::{DeviceBus, ManagedObjects, Notification, NotificationStream};
use crate::dbus::bytestring::mount_points_value;
use crate::error::DiskError;
use crate::{BLOCK_IFACE, FILESYSTEM_IFACE};

#[derive(Default)]
struct State {
    version: Option<String>,
    block_drives: HashMap<String, String>,
    introspection: HashMap<String, String>,
    objects: Vec<(String, Vec<String>, Option<Vec<String>>)>,
    subscriber: Option<mpsc::UnboundedSender<Notification>>,
    fail_subscribe: bool,
    fail_managed_objects: bool,
    subscribe_calls: usize,
    managed_objects_calls: usize,
    version_calls: usize,
    block_drive_calls: usize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBus {
    state: Arc<Mutex<State>>,
}

impl FakeBus {
    pub(crate) fn with_version(version: &str) -> Self {
        let bus = Self::default();
        bus.state.lock().unwrap().version = Some(version.to_string());
        bus
    }

    pub(crate) fn set_block_drive(&self, block: &str, drive: &str) {
        self.state
            .lock()
            .unwrap()
            .block_drives
            .insert(block.to_string(), drive.to_string());
    }

    pub(crate) fn set_introspection(&self, path: &str, xml: &str) {
        self.state
            .lock()
            .unwrap()
            .introspection
            .insert(path.to_string(), xml.to_string());
    }

    /// Block device object with a Filesystem interface.
    pub(crate) fn add_filesystem(&self, path: &str, mount_points: &[&str]) {
        self.state.lock().unwrap().objects.push((
            path.to_string(),
            vec![BLOCK_IFACE.to_string()],
            Some(mount_points.iter().map(|s| s.to_string()).collect()),
        ));
    }

    pub(crate) fn add_object(&self, path: &str, interfaces: &[&str]) {
        self.state.lock().unwrap().objects.push((
            path.to_string(),
            interfaces.iter().map(|s| s.to_string()).collect(),
            None,
        ));
    }

    pub(crate) fn fail_subscribe(&self) {
        self.state.lock().unwrap().fail_subscribe = true;
    }

    pub(crate) fn fail_managed_objects(&self) {
        self.state.lock().unwrap().fail_managed_objects = true;
    }

    pub(crate) fn push(&self, notification: Notification) {
        let state = self.state.lock().unwrap();
        let sender = state.subscriber.as_ref().expect("no subscriber");
        sender
            .unbounded_send(notification)
            .expect("subscriber dropped");
    }

    /// End the notification stream, as a lost bus connection would.
    pub(crate) fn close(&self) {
        self.state.lock().unwrap().subscriber = None;
    }

    pub(crate) fn has_subscriber(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .subscriber
            .as_ref()
            .is_some_and(|s| !s.is_closed())
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.state.lock().unwrap().subscribe_calls
    }

    pub(crate) fn managed_objects_calls(&self) -> usize {
        self.state.lock().unwrap().managed_objects_calls
    }

    pub(crate) fn version_calls(&self) -> usize {
        self.state.lock().unwrap().version_calls
    }

    pub(crate) fn block_drive_calls(&self) -> usize {
        self.state.lock().unwrap().block_drive_calls
    }
}

#[async_trait]
impl DeviceBus for FakeBus {
    async fn subscribe(&self) -> Result<NotificationStream, DiskError> {
        let mut state = self.state.lock().unwrap();
        state.subscribe_calls += 1;
        if state.fail_subscribe {
            return Err(DiskError::ConnectionFailed("bus unavailable".to_string()));
        }

        let (sender, receiver) = mpsc::unbounded();
        state.subscriber = Some(sender);
        Ok(receiver.boxed())
    }

    async fn managed_objects(&self) -> Result<ManagedObjects, DiskError> {
        let mut state = self.state.lock().unwrap();
        state.managed_objects_calls += 1;
        if state.fail_managed_objects {
            return Err(DiskError::DBusError("GetManagedObjects timed out".to_string()));
        }

        let mut objects = ManagedObjects::new();
        for (path, interfaces, mount_points) in &state.objects {
            let entry = objects.entry(path.clone()).or_default();
            for iface in interfaces {
                entry.insert(iface.clone(), HashMap::new());
            }
            if let Some(points) = mount_points {
                let points: Vec<&str> = points.iter().map(String::as_str).collect();
                entry.insert(
                    FILESYSTEM_IFACE.to_string(),
                    HashMap::from([("MountPoints".to_string(), mount_points_value(&points))]),
                );
            }
        }
        Ok(objects)
    }

    async fn introspect(&self, path: &str) -> Result<String, DiskError> {
        self.state
            .lock()
            .unwrap()
            .introspection
            .get(path)
            .cloned()
            .ok_or_else(|| DiskError::DBusError(format!("no such object: {path}")))
    }

    async fn service_version(&self) -> Result<String, DiskError> {
        let mut state = self.state.lock().unwrap();
        state.version_calls += 1;
        state
            .version
            .clone()
            .ok_or_else(|| DiskError::DBusError("Version property unavailable".to_string()))
    }

    async fn block_drive(&self, block_path: &str) -> Result<String, DiskError> {
        let mut state = self.state.lock().unwrap();
        state.block_drive_calls += 1;
        state
            .block_drives
            .get(block_path)
            .cloned()
            .ok_or_else(|| DiskError::DBusError(format!("no such object: {block_path}")))
    }
}
