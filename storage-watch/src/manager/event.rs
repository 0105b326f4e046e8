// SPDX-License-Identifier: GPL-3.0-only

use std::pin::Pin;

use futures::stream::Stream;
use futures::task::{Context, Poll};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::dbus::bytestring::MountPoint;

/// A change in the device topology, derived from UDisks2 notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    DiskAdded {
        drive: String,
    },
    DiskRemoved {
        drive: String,
    },
    BlockDeviceAdded {
        block: String,
    },
    BlockDeviceRemoved {
        block: String,
    },
    FileSystemAdded {
        block: String,
    },
    FileSystemRemoved {
        block: String,
    },
    MountAdded {
        block: String,
        mount_point: MountPoint,
    },
    MountRemoved {
        block: String,
        mount_point: MountPoint,
    },
    MountPointsChanged {
        block: String,
        old: Vec<MountPoint>,
        new: Vec<MountPoint>,
    },
}

impl DeviceEvent {
    /// The drive or block device object path the event refers to.
    pub fn object_path(&self) -> &str {
        match self {
            DeviceEvent::DiskAdded { drive } | DeviceEvent::DiskRemoved { drive } => drive,
            DeviceEvent::BlockDeviceAdded { block }
            | DeviceEvent::BlockDeviceRemoved { block }
            | DeviceEvent::FileSystemAdded { block }
            | DeviceEvent::FileSystemRemoved { block }
            | DeviceEvent::MountAdded { block, .. }
            | DeviceEvent::MountRemoved { block, .. }
            | DeviceEvent::MountPointsChanged { block, .. } => block,
        }
    }
}

/// Handle returned by `DiskManager::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Returns `false` once it wants no further events.
type Observer = Box<dyn FnMut(&DeviceEvent) -> bool + Send>;

/// Observers, called synchronously in registration order.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    entries: Vec<(ObserverId, Observer)>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Deliver `event`, dropping observers that have hung up.
    pub(crate) fn emit(&mut self, event: &DeviceEvent) {
        self.entries.retain_mut(|(_, observer)| observer(event));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Stream of device events fed by an observer registered on the manager.
pub struct DeviceEventStream {
    pub(crate) receiver: mpsc::UnboundedReceiver<DeviceEvent>,
}

impl Stream for DeviceEventStream {
    type Item = DeviceEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn observers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut observers = Observers::default();

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            observers.add(Box::new(move |_| {
                log.lock().unwrap().push(tag);
                true
            }));
        }

        observers.emit(&DeviceEvent::DiskAdded {
            drive: "/org/freedesktop/UDisks2/drives/x".into(),
        });

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn removed_observer_is_not_called() {
        let hits = Arc::new(Mutex::new(0));
        let mut observers = Observers::default();

        let counter = Arc::clone(&hits);
        let id = observers.add(Box::new(move |_| {
            *counter.lock().unwrap() += 1;
            true
        }));

        assert!(observers.remove(id));
        assert!(!observers.remove(id));
        observers.emit(&DeviceEvent::BlockDeviceAdded {
            block: "/org/freedesktop/UDisks2/block_devices/sdb".into(),
        });

        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn observer_that_hangs_up_is_dropped_after_delivery() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut observers = Observers::default();

        let once = Arc::clone(&seen);
        observers.add(Box::new(move |_| {
            once.lock().unwrap().push("once");
            false
        }));
        let always = Arc::clone(&seen);
        observers.add(Box::new(move |_| {
            always.lock().unwrap().push("always");
            true
        }));

        let event = DeviceEvent::DiskRemoved {
            drive: "/org/freedesktop/UDisks2/drives/x".into(),
        };
        observers.emit(&event);
        observers.emit(&event);

        assert_eq!(observers.len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["once", "always", "always"]);
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = DeviceEvent::MountAdded {
            block: "/org/freedesktop/UDisks2/block_devices/sdb1".into(),
            mount_point: MountPoint::from("/run/media/user/USB"),
        };

        let json = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(json["event"], "mount_added");
        assert_eq!(json["mount_point"], "/run/media/user/USB");
        assert_eq!(event.object_path(), "/org/freedesktop/UDisks2/block_devices/sdb1");
    }
}
