//! Per-key exponential retry backoff.
//!
//! Tracks consecutive failures per key. The n-th consecutive failure waits
//! `base * 2^(n-1)`, capped at `max`. A success clears the key.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Failure counters keyed by `K`.
#[derive(Debug)]
pub struct Backoff<K> {
    base: Duration,
    max: Duration,
    failures: HashMap<K, u32>,
}

impl<K> Backoff<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty tracker.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: HashMap::new(),
        }
    }

    /// Records a failure and returns how long to wait before retrying.
    pub fn next_delay(&mut self, key: &K) -> Duration {
        let failures = self.failures.entry(key.clone()).or_insert(0);
        *failures = failures.saturating_add(1);
        let exponent = (*failures - 1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Clears the failure count for `key`.
    pub fn reset(&mut self, key: &K) {
        self.failures.remove(key);
    }

    /// Returns consecutive failures recorded for `key`.
    pub fn failures(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Returns the number of keys currently backing off.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if no key is backing off.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}
