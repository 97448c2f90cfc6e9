//! Per-pool store registry
//!
//! Exactly one claim state store exists per pool key in a process. The first
//! caller for a key hydrates the store from the backing state manager; every
//! concurrent caller for the same key waits on the same initialization.

use super::{decode_entry, BasicClaimStateStore, ClaimStateStore, PerformanceClaimStateStore, StoreContext};
use crate::error::StoreError;
use crate::state_manager::StateEntry;
use dashmap::DashMap;
use selection_config::{StoreSettings, StoreStrategy};
use selection_types::{PoolKey, PoolState, StoredPoolState};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Builds hydrated stores of the configured strategy
pub struct ClaimStateStoreFactory {
    context: StoreContext,
    settings: StoreSettings,
}

impl ClaimStateStoreFactory {
    pub fn new(context: StoreContext, settings: StoreSettings) -> Self {
        Self { context, settings }
    }

    pub fn strategy(&self) -> StoreStrategy {
        self.settings.strategy
    }

    /// Load the pool's stored state, creating an empty entry if there is none
    pub async fn hydrate(&self, key: &PoolKey) -> Result<StoredPoolState, StoreError> {
        let state_key = key.state_key();
        let keys = [state_key.clone()];

        if let Some(entry) = self.context.state_manager.get(&keys).await?.remove(&state_key) {
            let stored = decode_entry(&self.context, key, &entry)?;
            info!(
                "Hydrated claim state for pool {} at version {} with {} claims",
                key,
                stored.version,
                stored.state.claims.len()
            );
            return Ok(stored);
        }

        let empty = PoolState::new();
        let value = self
            .context
            .serializer
            .serialize(&empty)
            .map_err(|reason| StoreError::Serialization {
                key: state_key.clone(),
                reason,
            })?;

        let existing = self
            .context
            .state_manager
            .create(vec![StateEntry::new(state_key.clone(), value, 0)])
            .await?;

        if !existing.contains(&state_key) {
            info!("Created empty claim state for pool {}", key);
            return Ok(StoredPoolState::new(0, key.clone(), empty));
        }

        // Another replica created the entry between our get and create
        debug!("Lost create race for pool {}, re-reading", key);
        match self.context.state_manager.get(&keys).await?.remove(&state_key) {
            Some(entry) => decode_entry(&self.context, key, &entry),
            None => Err(StoreError::MissingState { key: state_key }),
        }
    }

    /// Hydrate and wrap the pool's state in a store of the configured strategy
    pub async fn create(&self, key: &PoolKey) -> Result<Arc<dyn ClaimStateStore>, StoreError> {
        let baseline = self.hydrate(key).await?;
        let store: Arc<dyn ClaimStateStore> = match self.settings.strategy {
            StoreStrategy::Basic => Arc::new(BasicClaimStateStore::new(baseline, self.context.clone())),
            StoreStrategy::Performance => Arc::new(PerformanceClaimStateStore::new(
                baseline,
                self.context.clone(),
                &self.settings,
            )),
        };
        Ok(store)
    }
}

type StoreSlot = Arc<OnceCell<Arc<dyn ClaimStateStore>>>;

/// Lazily populated map of pool key to store
pub struct ClaimStateStoreCache {
    factory: ClaimStateStoreFactory,
    stores: DashMap<PoolKey, StoreSlot>,
}

impl ClaimStateStoreCache {
    pub fn new(factory: ClaimStateStoreFactory) -> Self {
        Self {
            factory,
            stores: DashMap::new(),
        }
    }

    /// The store for `key`, hydrating it on first access
    ///
    /// A failed hydration leaves the slot empty so the next call retries.
    pub async fn get(&self, key: &PoolKey) -> Result<Arc<dyn ClaimStateStore>, StoreError> {
        let slot = self.stores.entry(key.clone()).or_default().clone();
        let store = slot.get_or_try_init(|| self.factory.create(key)).await?;
        Ok(store.clone())
    }

    /// Forget `store` if it is still the one cached for `key`
    ///
    /// The next `get` for the pool hydrates a fresh store.
    pub fn evict(&self, key: &PoolKey, store: &Arc<dyn ClaimStateStore>) -> bool {
        let evicted = self
            .stores
            .remove_if(key, |_, slot| slot.get().is_some_and(|cached| Arc::ptr_eq(cached, store)))
            .is_some();
        if evicted {
            warn!("Evicted claim state store for pool {}", key);
        }
        evicted
    }

    /// Number of pools with a slot
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Drop every cached store
    pub fn shutdown(&self) {
        let count = self.stores.len();
        self.stores.clear();
        info!("Claim state store cache shut down, released {} pools", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BincodePoolStateSerializer, PoolStateSerializer};
    use crate::state_manager::{InMemoryStateManager, StateManager};
    use crate::store::test_support::{context, pool_key};
    use futures::future::join_all;
    use selection_types::Claim;

    fn cache(manager: Arc<InMemoryStateManager>, strategy: StoreStrategy) -> ClaimStateStoreCache {
        let settings = StoreSettings {
            strategy,
            ..StoreSettings::default()
        };
        ClaimStateStoreCache::new(ClaimStateStoreFactory::new(context(manager), settings))
    }

    #[tokio::test]
    async fn test_concurrent_first_access_yields_one_store() {
        let manager = Arc::new(InMemoryStateManager::with_latency(
            std::time::Duration::from_millis(2),
        ));
        let stores = cache(manager.clone(), StoreStrategy::Performance);
        let key = pool_key();

        let resolved = join_all((0..16).map(|_| stores.get(&key))).await;
        let first = resolved[0].as_ref().unwrap().clone();
        for store in &resolved {
            assert!(Arc::ptr_eq(&first, store.as_ref().unwrap()));
        }
        assert_eq!(stores.len(), 1);
        assert_eq!(manager.entry(&key.state_key()).unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_hydrates_existing_state() {
        let manager = Arc::new(InMemoryStateManager::new());
        let key = pool_key();
        let existing = PoolState::new().with_claim(Claim {
            claim_id: "c1".to_string(),
            flow_id: "flow".to_string(),
            claimed_at_ms: 10,
            claimed_tokens: vec![],
        });
        manager
            .create(vec![StateEntry::new(
                key.state_key(),
                BincodePoolStateSerializer.serialize(&existing).unwrap(),
                0,
            )])
            .await
            .unwrap();
        manager
            .update(vec![StateEntry::new(
                key.state_key(),
                BincodePoolStateSerializer.serialize(&existing).unwrap(),
                0,
            )])
            .await
            .unwrap();

        let stores = cache(manager, StoreStrategy::Basic);
        let snapshot = stores.get(&key).await.unwrap().snapshot().await;
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.state, existing);
    }

    #[tokio::test]
    async fn test_evicted_store_is_rehydrated() {
        let manager = Arc::new(InMemoryStateManager::new());
        let stores = cache(manager, StoreStrategy::Performance);
        let key = pool_key();

        let dead = stores.get(&key).await.unwrap();
        assert!(stores.evict(&key, &dead));

        let fresh = stores.get(&key).await.unwrap();
        assert!(!Arc::ptr_eq(&dead, &fresh));
        // A stale handle no longer removes the live store
        assert!(!stores.evict(&key, &dead));
        assert!(Arc::ptr_eq(&fresh, &stores.get(&key).await.unwrap()));
    }

    #[tokio::test]
    async fn test_shutdown_releases_stores() {
        let manager = Arc::new(InMemoryStateManager::new());
        let stores = cache(manager, StoreStrategy::Basic);
        let key = pool_key();

        let before = stores.get(&key).await.unwrap();
        stores.shutdown();
        assert!(stores.is_empty());

        let after = stores.get(&key).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
