// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Errors surfaced by the watcher and its bus adapter.
///
/// Cloneable so the manager can keep the most recent one around for
/// `DiskManager::last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiskError {
    #[error("Failed to connect to system bus: {0}")]
    ConnectionFailed(String),

    #[error("D-Bus error: {0}")]
    DBusError(String),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl From<zbus::Error> for DiskError {
    fn from(err: zbus::Error) -> Self {
        DiskError::DBusError(err.to_string())
    }
}

impl From<udisks2::Error> for DiskError {
    fn from(err: udisks2::Error) -> Self {
        DiskError::DBusError(err.to_string())
    }
}

impl From<zbus::fdo::Error> for DiskError {
    fn from(err: zbus::fdo::Error) -> Self {
        DiskError::DBusError(err.to_string())
    }
}

impl From<zbus::zvariant::Error> for DiskError {
    fn from(err: zbus::zvariant::Error) -> Self {
        DiskError::InvalidPath(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property_read(fail: bool) -> udisks2::Result<u64> {
        if fail {
            Err(udisks2::Error::Zbus(zbus::Error::Failure("no such object".into())))
        } else {
            Ok(512)
        }
    }

    fn size(fail: bool) -> Result<u64, DiskError> {
        Ok(property_read(fail)?)
    }

    #[test]
    fn udisks_errors_become_dbus_errors() {
        assert_eq!(size(false), Ok(512));
        match size(true) {
            Err(DiskError::DBusError(msg)) => assert!(msg.contains("no such object"), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn udisks_status_errors_keep_their_message() {
        let err = DiskError::from(udisks2::Error::NotMounted);
        assert_eq!(err, DiskError::DBusError("The device is not mounted.".into()));
    }
}
