//! Per-tag sync cursors.
//!
//! The cursor lives in the resource status, not in the accounting store, so
//! it advances only after the store write it follows has succeeded.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use traffic_accounting::Tag;

/// Controller-owned status of a tracked resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// When each tag was last synchronized.
    #[serde(default)]
    pub last_sync_time: BTreeMap<Tag, DateTime<Utc>>,
}

impl SyncStatus {
    /// Returns true if `tag` has never synced or `period` has elapsed since.
    pub fn is_due(&self, tag: &Tag, now: DateTime<Utc>, period: Duration) -> bool {
        let Some(last) = self.last_sync_time.get(tag) else {
            return true;
        };
        let Ok(period) = TimeDelta::from_std(period) else {
            return false;
        };
        match last.checked_add_signed(period) {
            Some(next) => now >= next,
            None => false,
        }
    }

    /// Records a successful sync of `tag` at `now`.
    pub fn mark_synced(&mut self, tag: Tag, now: DateTime<Utc>) {
        self.last_sync_time.insert(tag, now);
    }

    /// Returns the last sync time of `tag`.
    pub fn last_synced(&self, tag: &Tag) -> Option<DateTime<Utc>> {
        self.last_sync_time.get(tag).copied()
    }
}
