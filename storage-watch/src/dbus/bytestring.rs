// SPDX-License-Identifier: GPL-3.0-only

//! UDisks2 byte string helpers.
//!
//! UDisks2 transports paths as `ay` (NUL-terminated byte arrays) and mount
//! point lists as `aay`.

use std::ffi::OsStr;
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use serde::{Serialize, Serializer};
use zbus::zvariant::{OwnedValue, Value};

/// A filesystem mount point as reported by UDisks2, without its trailing NUL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountPoint(Vec<u8>);

impl MountPoint {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let mut bytes = bytes.into();
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(OsStr::from_bytes(&self.0))
    }
}

impl From<&str> for MountPoint {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for MountPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Decode a C string byte array, stopping at the first NUL.
pub fn decode_c_string_bytes(bytes: &[u8]) -> String {
    let raw = bytes.split(|b| *b == 0).next().unwrap_or(bytes);
    String::from_utf8_lossy(raw).to_string()
}

fn value_bytes(value: &Value<'_>) -> Option<Vec<u8>> {
    match value {
        Value::Array(arr) => Some(
            arr.iter()
                .filter_map(|b| match b {
                    Value::U8(byte) => Some(*byte),
                    _ => None,
                })
                .collect(),
        ),
        Value::Value(inner) => value_bytes(inner),
        _ => None,
    }
}

fn value_mount_points(value: &Value<'_>) -> Vec<MountPoint> {
    match value {
        Value::Array(arr) => arr
            .iter()
            .filter_map(value_bytes)
            .map(MountPoint::new)
            .collect(),
        Value::Value(inner) => value_mount_points(inner),
        _ => Vec::new(),
    }
}

/// Decode a `MountPoints` property (`aay`).
///
/// Anything that is not an array of byte arrays decodes as no mount points.
pub fn decode_mount_points(value: &OwnedValue) -> Vec<MountPoint> {
    value_mount_points(value)
}

#[cfg(test)]
pub(crate) fn mount_points_value(points: &[&str]) -> OwnedValue {
    let raw: Vec<Vec<u8>> = points
        .iter()
        .map(|p| {
            let mut bytes = p.as_bytes().to_vec();
            bytes.push(0);
            bytes
        })
        .collect();
    Value::from(raw)
        .try_to_owned()
        .expect("mount points value")
}
