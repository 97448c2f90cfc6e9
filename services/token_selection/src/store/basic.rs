//! Sequential claim state store
//!
//! Every request runs its transform and its conditional write while holding
//! the baseline lock, so requests against one instance never interleave.

use super::{apply_transform, commit, ClaimStateStore, PoolStateTransform, StoreContext, StoreStats, StoreStatsSnapshot};
use crate::error::StoreError;
use async_trait::async_trait;
use selection_types::{PoolKey, StoredPoolState};
use tokio::sync::Mutex;

pub struct BasicClaimStateStore {
    pool_key: PoolKey,
    baseline: Mutex<StoredPoolState>,
    context: StoreContext,
    stats: StoreStats,
}

impl BasicClaimStateStore {
    pub fn new(baseline: StoredPoolState, context: StoreContext) -> Self {
        Self {
            pool_key: baseline.pool_key.clone(),
            baseline: Mutex::new(baseline),
            context,
            stats: StoreStats::default(),
        }
    }
}

#[async_trait]
impl ClaimStateStore for BasicClaimStateStore {
    fn pool_key(&self) -> &PoolKey {
        &self.pool_key
    }

    async fn enqueue_request(&self, transform: PoolStateTransform) -> Result<bool, StoreError> {
        let mut baseline = self.baseline.lock().await;
        self.stats.record_requests(1);

        let next = apply_transform(&self.pool_key, transform, &baseline.state)?;
        commit(&self.context, &mut baseline, next, &self.stats).await
    }

    async fn snapshot(&self) -> StoredPoolState {
        self.baseline.lock().await.clone()
    }

    fn stats(&self) -> StoreStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BincodePoolStateSerializer, PoolStateSerializer};
    use crate::state_manager::{InMemoryStateManager, StateEntry, StateManager};
    use crate::store::test_support::{context, pool_key, ScriptedStateManager};
    use parking_lot::Mutex as SyncMutex;
    use rust_decimal_macros::dec;
    use selection_types::{Claim, PoolState, StateRef, Token};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn claim(id: &str) -> Claim {
        Claim {
            claim_id: id.to_string(),
            flow_id: "flow".to_string(),
            claimed_at_ms: 0,
            claimed_tokens: vec![Token::new(StateRef::new(id, 0), dec!(1))],
        }
    }

    fn add_claim(id: &'static str) -> PoolStateTransform {
        Box::new(move |state: &PoolState| state.with_claim(claim(id)))
    }

    #[tokio::test]
    async fn test_commit_advances_version() {
        let manager = Arc::new(InMemoryStateManager::new());
        let key = pool_key();
        let empty = BincodePoolStateSerializer.serialize(&PoolState::new()).unwrap();
        manager
            .create(vec![StateEntry::new(key.state_key(), empty, 0)])
            .await
            .unwrap();

        let store = BasicClaimStateStore::new(
            StoredPoolState::new(0, key.clone(), PoolState::new()),
            context(manager.clone()),
        );

        assert!(store.enqueue_request(add_claim("c1")).await.unwrap());
        assert!(store.enqueue_request(add_claim("c2")).await.unwrap());

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.state.claims.len(), 2);
        assert_eq!(manager.entry(&key.state_key()).unwrap().version, 2);
        assert_eq!(store.stats().commits, 2);
    }

    #[tokio::test]
    async fn test_conflict_refreshes_baseline_from_stored_entry() {
        let key = pool_key();
        let remote_state = PoolState::new().with_claim(claim("remote"));
        let remote_entry = StateEntry::new(
            key.state_key(),
            BincodePoolStateSerializer.serialize(&remote_state).unwrap(),
            4,
        );

        let scripted = Arc::new(ScriptedStateManager::default());
        scripted
            .update_responses
            .lock()
            .push_back(HashMap::from([(key.state_key(), Some(remote_entry))]));

        let ctx = context(scripted.clone());
        let token_cache = ctx.token_cache.clone();
        let store = BasicClaimStateStore::new(StoredPoolState::new(1, key.clone(), PoolState::new()), ctx);

        assert!(!store.enqueue_request(add_claim("local")).await.unwrap());
        assert_eq!(token_cache.stats().invalidations, 1);

        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let observed = seen.clone();
        let committed = store
            .enqueue_request(Box::new(move |state: &PoolState| {
                observed
                    .lock()
                    .extend(state.claims.iter().map(|c| c.claim_id.clone()));
                state.with_claim(claim("local"))
            }))
            .await
            .unwrap();

        assert!(committed);
        assert_eq!(*seen.lock(), vec!["remote".to_string()]);

        let updates = scripted.updates_seen.lock();
        assert_eq!(updates[0].version, 1);
        assert_eq!(updates[1].version, 4);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.version, 5);
        assert_eq!(store.stats().conflicts, 1);
    }

    #[tokio::test]
    async fn test_panicking_transform_leaves_store_usable() {
        let manager = Arc::new(InMemoryStateManager::new());
        let key = pool_key();
        let empty = BincodePoolStateSerializer.serialize(&PoolState::new()).unwrap();
        manager
            .create(vec![StateEntry::new(key.state_key(), empty, 0)])
            .await
            .unwrap();
        let store = BasicClaimStateStore::new(
            StoredPoolState::new(0, key.clone(), PoolState::new()),
            context(manager),
        );

        let err = store
            .enqueue_request(Box::new(|_: &PoolState| -> PoolState { panic!("amount overflow") }))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::TransformFailed {
                key: key.state_key(),
                reason: "amount overflow".to_string(),
            }
        );

        assert!(store.enqueue_request(add_claim("c1")).await.unwrap());
        assert_eq!(store.snapshot().await.version, 1);
    }

    #[tokio::test]
    async fn test_missing_entry_is_fatal() {
        let manager = Arc::new(InMemoryStateManager::new());
        let store = BasicClaimStateStore::new(
            StoredPoolState::new(0, pool_key(), PoolState::new()),
            context(manager),
        );

        let err = store.enqueue_request(add_claim("c1")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingState { .. }));
    }
}
