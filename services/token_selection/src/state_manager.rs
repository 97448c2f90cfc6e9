//! Versioned key/value backing store
//!
//! Claim state is persisted through a [`StateManager`]: a store of versioned
//! entries that only accepts an update made against the version it currently
//! holds. Replicas never lock; they write and learn from the response whether
//! they were current.

use crate::error::StateManagerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One stored value with its optimistic-concurrency version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub version: u64,
    pub metadata: HashMap<String, String>,
    pub modified_time: DateTime<Utc>,
}

impl StateEntry {
    pub fn new(key: impl Into<String>, value: Vec<u8>, version: u64) -> Self {
        Self {
            key: key.into(),
            value,
            version,
            metadata: HashMap::new(),
            modified_time: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Durable versioned store shared by all replicas
#[async_trait]
pub trait StateManager: Send + Sync {
    /// Insert new entries; returns the keys that already existed and were left untouched
    async fn create(&self, entries: Vec<StateEntry>) -> Result<HashSet<String>, StateManagerError>;

    /// Fetch entries; absent keys are missing from the map
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, StateEntry>, StateManagerError>;

    /// Conditionally replace entries
    ///
    /// An entry is accepted only if its version equals the stored version; the
    /// stored version then increments. The result maps each rejected key to the
    /// currently stored entry, or to `None` if the key does not exist. An empty
    /// map means every entry was accepted.
    async fn update(
        &self,
        entries: Vec<StateEntry>,
    ) -> Result<HashMap<String, Option<StateEntry>>, StateManagerError>;
}

/// Write counters of an [`InMemoryStateManager`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateManagerStats {
    pub accepted_updates: u64,
    pub rejected_updates: u64,
}

/// Process-local state manager with optional injected latency
#[derive(Debug, Default)]
pub struct InMemoryStateManager {
    entries: Mutex<HashMap<String, StateEntry>>,
    latency: Duration,
    accepted_updates: AtomicU64,
    rejected_updates: AtomicU64,
}

impl InMemoryStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it touches the map
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Current stored entry for `key`
    pub fn entry(&self, key: &str) -> Option<StateEntry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn stats(&self) -> StateManagerStats {
        StateManagerStats {
            accepted_updates: self.accepted_updates.load(Ordering::Relaxed),
            rejected_updates: self.rejected_updates.load(Ordering::Relaxed),
        }
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl StateManager for InMemoryStateManager {
    async fn create(&self, entries: Vec<StateEntry>) -> Result<HashSet<String>, StateManagerError> {
        self.simulate_latency().await;

        let mut stored = self.entries.lock();
        let mut existing = HashSet::new();
        for entry in entries {
            if stored.contains_key(&entry.key) {
                existing.insert(entry.key);
            } else {
                stored.insert(entry.key.clone(), entry);
            }
        }
        Ok(existing)
    }

    async fn get(&self, keys: &[String]) -> Result<HashMap<String, StateEntry>, StateManagerError> {
        self.simulate_latency().await;

        let stored = self.entries.lock();
        Ok(keys
            .iter()
            .filter_map(|k| stored.get(k).map(|e| (k.clone(), e.clone())))
            .collect())
    }

    async fn update(
        &self,
        entries: Vec<StateEntry>,
    ) -> Result<HashMap<String, Option<StateEntry>>, StateManagerError> {
        self.simulate_latency().await;

        let mut stored = self.entries.lock();
        let mut rejected = HashMap::new();
        for mut entry in entries {
            match stored.get(&entry.key) {
                None => {
                    rejected.insert(entry.key.clone(), None);
                }
                Some(current) if current.version != entry.version => {
                    rejected.insert(entry.key.clone(), Some(current.clone()));
                }
                Some(_) => {
                    entry.version += 1;
                    entry.modified_time = Utc::now();
                    stored.insert(entry.key.clone(), entry);
                }
            }
        }

        if rejected.is_empty() {
            self.accepted_updates.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected_updates.fetch_add(1, Ordering::Relaxed);
        }
        Ok(rejected)
    }
}
