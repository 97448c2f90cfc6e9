//! Per-pool adaptive backoff
//!
//! Tracks pools whose claim requests recently failed for lack of tokens so
//! callers can skip reloading candidates from durable storage while a pool is
//! contended. Entries live only in process memory.
//!
//! Each failure doubles the pool's interval up to the configured maximum. An
//! entry that has seen no failure for longer than the maximum interval is
//! evicted the next time it is checked.

use crate::clock::Clock;
use dashmap::DashMap;
use selection_config::BackoffSettings;
use selection_types::PoolKey;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BackoffEntry {
    last_update_ms: u64,
    current_interval_ms: u64,
}

/// Cooperative throttle keyed by pool
pub struct BackoffManager {
    entries: DashMap<PoolKey, BackoffEntry>,
    initial_interval_ms: u64,
    max_interval_ms: u64,
    clock: Arc<dyn Clock>,
}

impl BackoffManager {
    pub fn new(settings: &BackoffSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            initial_interval_ms: settings.initial_interval_ms,
            max_interval_ms: settings.max_interval_ms.max(settings.initial_interval_ms),
            clock,
        }
    }

    /// Record a failure for `key`
    pub fn update(&self, key: &PoolKey) {
        let now = self.clock.now_ms();
        let initial = self.initial_interval_ms;
        let max = self.max_interval_ms;

        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert(BackoffEntry {
                last_update_ms: now,
                current_interval_ms: 0,
            });

        let stale = now.saturating_sub(entry.last_update_ms) > max;
        entry.current_interval_ms = if entry.current_interval_ms == 0 || stale {
            initial
        } else {
            entry.current_interval_ms.saturating_mul(2).min(max)
        };
        entry.last_update_ms = now;

        debug!(
            "Backoff for pool {} set to {}ms",
            key, entry.current_interval_ms
        );
    }

    /// True while `key` is inside its current backoff window
    pub fn backoff(&self, key: &PoolKey) -> bool {
        let now = self.clock.now_ms();
        let Some(entry) = self.entries.get(key).map(|e| *e) else {
            return false;
        };

        let elapsed = now.saturating_sub(entry.last_update_ms);
        if elapsed > self.max_interval_ms {
            // Only evict if no update raced in since the read
            self.entries
                .remove_if(key, |_, current| current.last_update_ms == entry.last_update_ms);
            debug!("Backoff for pool {} expired after {}ms", key, elapsed);
            return false;
        }

        elapsed < entry.current_interval_ms
    }

    /// Current interval for `key`, if tracked
    pub fn current_interval_ms(&self, key: &PoolKey) -> Option<u64> {
        self.entries.get(key).map(|e| e.current_interval_ms)
    }

    pub fn tracked_pools(&self) -> usize {
        self.entries.len()
    }
}
