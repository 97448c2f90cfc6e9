//! Claim State Stores
//!
//! A claim state store owns one pool's [`StoredPoolState`] baseline and
//! commits changes to the shared [`StateManager`] with optimistic
//! concurrency. Callers never write state directly: they enqueue a transform
//! from the current [`PoolState`] to the next one and learn whether it was
//! committed.
//!
//! ## Outcomes of `enqueue_request`
//!
//! - `Ok(true)`: the new state is durable and is now the baseline
//! - `Ok(false)`: another writer got there first. The baseline has been
//!   replaced with the authoritative stored value and the pool's available
//!   token cache invalidated. The caller should re-drive its request.
//! - `Err(StoreError::MissingState)`: the pool has no stored entry at all,
//!   which is a wiring error rather than a race
//!
//! ## Strategies
//!
//! ```text
//! Basic:        request ─► transform ─► serialize ─► conditional write
//! Performance:  requests ─► queue ─► [flush task] ─► t1 ∘ t2 ∘ … ∘ tn ─► one conditional write
//! ```

pub mod basic;
pub mod cache;
pub mod performance;

pub use basic::BasicClaimStateStore;
pub use cache::{ClaimStateStoreCache, ClaimStateStoreFactory};
pub use performance::PerformanceClaimStateStore;

use crate::available_tokens::AvailableTokenCache;
use crate::codec::PoolStateSerializer;
use crate::error::StoreError;
use crate::state_manager::{StateEntry, StateManager};
use async_trait::async_trait;
use selection_types::{PoolKey, PoolState, StoredPoolState};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Pure function from the current pool state to the desired next state
pub type PoolStateTransform = Box<dyn FnOnce(&PoolState) -> PoolState + Send>;

/// Versioned owner of one pool's claim state
#[async_trait]
pub trait ClaimStateStore: Send + Sync {
    fn pool_key(&self) -> &PoolKey;

    /// Apply `transform` to the baseline and try to commit the result
    async fn enqueue_request(&self, transform: PoolStateTransform) -> Result<bool, StoreError>;

    /// Copy of the current baseline
    async fn snapshot(&self) -> StoredPoolState;

    fn stats(&self) -> StoreStatsSnapshot;
}

/// Collaborators shared by every store of a process
#[derive(Clone)]
pub struct StoreContext {
    pub state_manager: Arc<dyn StateManager>,
    pub serializer: Arc<dyn PoolStateSerializer>,
    pub token_cache: Arc<AvailableTokenCache>,
}

/// Store counters
#[derive(Debug, Default)]
pub struct StoreStats {
    requests: AtomicU64,
    write_attempts: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    pub requests: u64,
    pub write_attempts: u64,
    pub commits: u64,
    pub conflicts: u64,
}

impl StoreStats {
    pub(crate) fn record_requests(&self, count: u64) {
        self.requests.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            write_attempts: self.write_attempts.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

/// Run `transform` against `state`; a panic fails only this transform
pub(crate) fn apply_transform(
    pool_key: &PoolKey,
    transform: PoolStateTransform,
    state: &PoolState,
) -> Result<PoolState, StoreError> {
    panic::catch_unwind(AssertUnwindSafe(move || transform(state))).map_err(|payload| {
        let reason = panic_reason(payload.as_ref());
        error!("Claim state transform for pool {} panicked: {}", pool_key, reason);
        StoreError::TransformFailed {
            key: pool_key.state_key(),
            reason,
        }
    })
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic without message".to_string()
    }
}

/// Decode a stored entry into a baseline for `pool_key`
pub(crate) fn decode_entry(
    context: &StoreContext,
    pool_key: &PoolKey,
    entry: &StateEntry,
) -> Result<StoredPoolState, StoreError> {
    let state = context
        .serializer
        .deserialize(&entry.value)
        .map_err(|reason| StoreError::Deserialization {
            key: entry.key.clone(),
            reason,
        })?;
    Ok(StoredPoolState::new(entry.version, pool_key.clone(), state))
}

/// One conditional write of `next` against `baseline`
///
/// On success the baseline advances to `next`; on conflict it is replaced by
/// the stored value and the pool's token cache is invalidated.
pub(crate) async fn commit(
    context: &StoreContext,
    baseline: &mut StoredPoolState,
    next: PoolState,
    stats: &StoreStats,
) -> Result<bool, StoreError> {
    let key = baseline.pool_key.state_key();
    let value = context
        .serializer
        .serialize(&next)
        .map_err(|reason| StoreError::Serialization {
            key: key.clone(),
            reason,
        })?;

    let entry = StateEntry::new(key.clone(), value, baseline.version)
        .with_metadata("claims", next.claims.len().to_string());

    stats.write_attempts.fetch_add(1, Ordering::Relaxed);
    let mut rejected = context.state_manager.update(vec![entry]).await?;

    match rejected.remove(&key) {
        None => {
            baseline.version += 1;
            baseline.state = next;
            stats.commits.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Committed claim state for pool {} at version {}",
                baseline.pool_key, baseline.version
            );
            Ok(true)
        }
        Some(Some(current)) => {
            let refreshed = decode_entry(context, &baseline.pool_key, &current)?;
            warn!(
                "Claim state conflict for pool {}: local version {}, stored version {}",
                baseline.pool_key, baseline.version, refreshed.version
            );
            *baseline = refreshed;
            context.token_cache.invalidate(&baseline.pool_key);
            stats.conflicts.fetch_add(1, Ordering::Relaxed);
            Ok(false)
        }
        Some(None) => {
            error!("No stored claim state for pool {}", baseline.pool_key);
            Err(StoreError::MissingState { key })
        }
    }
}
