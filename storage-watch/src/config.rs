// SPDX-License-Identifier: GPL-3.0-only

//! Watcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// First UDisks2 release that reliably emits `InterfacesAdded` for drives.
pub const DEFAULT_QUIRK_VERSION_THRESHOLD: &str = "2.1.7.1";

/// How long a synthesized "drive added" suppresses further ones.
pub const DEFAULT_DRIVE_FLAG_TTL_MS: u64 = 1000;

/// Whether to compensate for the missing drive-added signal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuirkMode {
    /// Decide from the running service version.
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Lifetime of a pending drive-added flag, in milliseconds.
    ///
    /// Too short and a late native drive-added doubles the event; too long
    /// and a quick re-plug of the same drive goes unreported.
    pub drive_flag_ttl_ms: u64,
    /// Service versions strictly below this get the compensation.
    pub quirk_version_threshold: String,
    pub quirk: QuirkMode,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            drive_flag_ttl_ms: DEFAULT_DRIVE_FLAG_TTL_MS,
            quirk_version_threshold: DEFAULT_QUIRK_VERSION_THRESHOLD.to_string(),
            quirk: QuirkMode::Auto,
        }
    }
}

impl WatchConfig {
    pub fn drive_flag_ttl(&self) -> Duration {
        Duration::from_millis(self.drive_flag_ttl_ms)
    }
}
