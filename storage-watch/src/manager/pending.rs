// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Drives for which a "drive added" event was synthesized and the native one
/// has not been seen yet.
///
/// Entries expire after `ttl`; expired entries are dropped whenever the set
/// is touched.
#[derive(Debug)]
pub(crate) struct PendingDriveFlags {
    ttl: Duration,
    entries: HashMap<String, Instant>,
}

impl PendingDriveFlags {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, inserted| now.saturating_duration_since(*inserted) < ttl);
    }

    /// Insert `drive` unless a live flag already exists. Returns whether the
    /// caller should emit the drive-added event.
    pub(crate) fn try_claim(&mut self, drive: &str, now: Instant) -> bool {
        self.prune(now);
        if self.entries.contains_key(drive) {
            return false;
        }
        self.entries.insert(drive.to_string(), now);
        true
    }

    pub(crate) fn clear(&mut self, drive: &str) {
        self.entries.remove(drive);
    }

    #[cfg(test)]
    pub(crate) fn contains(&mut self, drive: &str, now: Instant) -> bool {
        self.prune(now);
        self.entries.contains_key(drive)
    }
}
