//! Counter delta engine.
//!
//! Converts a freshly sampled cumulative counter into an increment relative to
//! the last recorded mark. The engine is stateless and serves both tiers: for
//! accounts the raw value is a device counter, for feeds it is the account's
//! running total.
//!
//! A sample below the recorded mark is classified as stale (counter reset or
//! out-of-order delivery). Callers must leave both `total` and
//! `last_raw_mark` untouched for a stale key; the next cycle retries against
//! the same mark.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of one sample against its mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    /// The counter moved forward; the delta should be applied.
    Advanced,
    /// The counter equals the mark; applying would be a no-op.
    Unchanged,
    /// The counter is below the mark; nothing may be written.
    Stale,
}

impl DeltaKind {
    /// Returns true if the sample should be written to the store.
    pub fn should_apply(&self) -> bool {
        matches!(self, DeltaKind::Advanced)
    }

    /// Returns the kind name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaKind::Advanced => "advanced",
            DeltaKind::Unchanged => "unchanged",
            DeltaKind::Stale => "stale",
        }
    }
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of comparing a raw sample with the last mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    /// Non-negative increment to add to the total (0 when stale).
    pub delta: u64,
    /// True if the sample was below the mark.
    pub stale: bool,
}

impl Delta {
    /// Returns the classification of this delta.
    pub fn kind(&self) -> DeltaKind {
        if self.stale {
            DeltaKind::Stale
        } else if self.delta == 0 {
            DeltaKind::Unchanged
        } else {
            DeltaKind::Advanced
        }
    }
}

/// Computes the safe delta between the last mark and a new raw sample.
#[inline]
pub fn compute_delta(last_mark: u64, raw_value: u64) -> Delta {
    match raw_value.checked_sub(last_mark) {
        Some(delta) => Delta {
            delta,
            stale: false,
        },
        None => Delta {
            delta: 0,
            stale: true,
        },
    }
}
