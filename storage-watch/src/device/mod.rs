// SPDX-License-Identifier: GPL-3.0-only

//! Device handles
//!
//! Owned proxies bound to one UDisks2 object path:
//! - BlockDevice for `block_devices/*`
//! - BlockPartition for partition block devices
//! - DiskDevice for `drives/*`

use udisks2::{block::BlockProxy, drive::DriveProxy, partition::PartitionProxy};
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use crate::dbus::bytestring as bs;
use crate::error::DiskError;

fn object_path(path: &str) -> Result<OwnedObjectPath, DiskError> {
    OwnedObjectPath::try_from(path.to_owned())
        .map_err(|e| DiskError::InvalidPath(format!("{path}: {e}")))
}

fn non_root(path: OwnedObjectPath) -> Option<String> {
    if path.as_str() == "/" {
        None
    } else {
        Some(path.to_string())
    }
}

pub struct BlockDevice {
    path: OwnedObjectPath,
    proxy: BlockProxy<'static>,
}

impl BlockDevice {
    pub async fn new(connection: &Connection, path: &str) -> Result<Self, DiskError> {
        let path = object_path(path)?;
        let proxy = BlockProxy::builder(connection)
            .path(path.clone())?
            .build()
            .await?;
        Ok(Self { path, proxy })
    }

    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Object path of the owning drive, `None` for drive-less devices such
    /// as loop devices.
    pub async fn drive(&self) -> Result<Option<String>, DiskError> {
        Ok(non_root(self.proxy.drive().await?))
    }

    /// Preferred device node, falling back to the kernel name.
    pub async fn device(&self) -> Result<String, DiskError> {
        let preferred = bs::decode_c_string_bytes(&self.proxy.preferred_device().await?);
        if !preferred.is_empty() {
            return Ok(preferred);
        }
        Ok(bs::decode_c_string_bytes(&self.proxy.device().await?))
    }

    pub async fn id_type(&self) -> Result<String, DiskError> {
        Ok(self.proxy.id_type().await?)
    }

    pub async fn id_label(&self) -> Result<String, DiskError> {
        Ok(self.proxy.id_label().await?)
    }

    pub async fn size(&self) -> Result<u64, DiskError> {
        Ok(self.proxy.size().await?)
    }

    pub async fn read_only(&self) -> Result<bool, DiskError> {
        Ok(self.proxy.read_only().await?)
    }
}

pub struct BlockPartition {
    block: BlockDevice,
    proxy: PartitionProxy<'static>,
}

impl BlockPartition {
    pub async fn new(connection: &Connection, path: &str) -> Result<Self, DiskError> {
        let block = BlockDevice::new(connection, path).await?;
        let proxy = PartitionProxy::builder(connection)
            .path(block.path.clone())?
            .build()
            .await?;
        Ok(Self { block, proxy })
    }

    /// The block device this partition is exposed as.
    pub fn block(&self) -> &BlockDevice {
        &self.block
    }

    pub fn path(&self) -> &str {
        self.block.path()
    }

    pub async fn number(&self) -> Result<u32, DiskError> {
        Ok(self.proxy.number().await?)
    }

    /// Object path of the partition table block device.
    pub async fn table(&self) -> Result<String, DiskError> {
        Ok(self.proxy.table().await?.to_string())
    }

    pub async fn offset(&self) -> Result<u64, DiskError> {
        Ok(self.proxy.offset().await?)
    }

    pub async fn size(&self) -> Result<u64, DiskError> {
        Ok(self.proxy.size().await?)
    }

    pub async fn name(&self) -> Result<String, DiskError> {
        Ok(self.proxy.name().await?)
    }
}

pub struct DiskDevice {
    path: OwnedObjectPath,
    proxy: DriveProxy<'static>,
}

impl DiskDevice {
    pub async fn new(connection: &Connection, path: &str) -> Result<Self, DiskError> {
        let path = object_path(path)?;
        let proxy = DriveProxy::builder(connection)
            .path(path.clone())?
            .build()
            .await?;
        Ok(Self { path, proxy })
    }

    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    pub async fn model(&self) -> Result<String, DiskError> {
        Ok(self.proxy.model().await?)
    }

    pub async fn vendor(&self) -> Result<String, DiskError> {
        Ok(self.proxy.vendor().await?)
    }

    pub async fn serial(&self) -> Result<String, DiskError> {
        Ok(self.proxy.serial().await?)
    }

    pub async fn size(&self) -> Result<u64, DiskError> {
        Ok(self.proxy.size().await?)
    }

    pub async fn removable(&self) -> Result<bool, DiskError> {
        Ok(self.proxy.removable().await?)
    }

    pub async fn ejectable(&self) -> Result<bool, DiskError> {
        Ok(self.proxy.ejectable().await?)
    }

    pub async fn connection_bus(&self) -> Result<String, DiskError> {
        Ok(self.proxy.connection_bus().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_drive_means_no_drive() {
        let root = OwnedObjectPath::try_from("/").unwrap();
        assert_eq!(non_root(root), None);

        let drive =
            OwnedObjectPath::try_from("/org/freedesktop/UDisks2/drives/VBOX_HARDDISK").unwrap();
        assert_eq!(
            non_root(drive).as_deref(),
            Some("/org/freedesktop/UDisks2/drives/VBOX_HARDDISK")
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(matches!(
            object_path("not/a/path"),
            Err(DiskError::InvalidPath(_))
        ));
        assert!(object_path("/org/freedesktop/UDisks2/block_devices/sda1").is_ok());
    }
}
