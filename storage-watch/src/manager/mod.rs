// SPDX-License-Identifier: GPL-3.0-only

//! Device event monitoring
//!
//! This module provides device event monitoring:
//! - DiskManager for watching UDisks2 topology changes
//! - Device events, observers and event streams
//! - Compensation for releases that never announce new drives

pub mod disk_manager;
pub mod event;
mod pending;
mod version;

#[cfg(test)]
mod fake_bus;

pub use disk_manager::DiskManager;
pub use event::{DeviceEvent, DeviceEventStream, ObserverId};
pub use version::{compare_versions, is_affected_version};
