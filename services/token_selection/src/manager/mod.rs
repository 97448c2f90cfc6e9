//! Pool Event Dispatch
//!
//! [`TokenPoolCacheManager`] turns one pool event and the pool's current
//! claim state into the next claim state plus a response. It runs inside a
//! store transform, so it never touches the backing store itself.
//!
//! ## Order of work
//!
//! 1. Drop claims owned by flows known to have terminated
//! 2. Drop claims older than the claim TTL
//! 3. Hand the cleaned state to the handler for the event variant

pub mod handlers;

pub use handlers::{BalanceQueryHandler, ClaimQueryHandler, ClaimReleaseHandler, LedgerChangeHandler};

use crate::available_tokens::{AvailableTokenCache, AvailableTokenService};
use crate::backoff::BackoffManager;
use crate::clock::Clock;
use crate::error::TokenSelectionError;
use crate::repository::{BalanceRepository, FlowStatusChecker, TokenRepository};
use selection_types::{PoolEvent, PoolKey, PoolState, TokenSelectionResponse};
use std::sync::Arc;
use tracing::{debug, info};

/// Next state and response, or the reason the event could not be handled
pub type HandlerResult = Result<(PoolState, TokenSelectionResponse), TokenSelectionError>;

/// Facts shared by every handler invocation of one event
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub pool_key: PoolKey,
    /// Epoch milliseconds at dispatch
    pub now_ms: u64,
}

/// Handles one [`PoolEvent`] variant
pub trait TokenEventHandler<E>: Send + Sync {
    fn handle(&self, ctx: &HandlerContext, state: PoolState, event: &E) -> HandlerResult;
}

pub struct TokenPoolCacheManager {
    claim_query: ClaimQueryHandler,
    claim_release: ClaimReleaseHandler,
    balance_query: BalanceQueryHandler,
    ledger_change: LedgerChangeHandler,
    flow_status: Arc<dyn FlowStatusChecker>,
    claim_ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl TokenPoolCacheManager {
    pub fn new(
        token_cache: Arc<AvailableTokenCache>,
        token_repository: Arc<dyn TokenRepository>,
        balance_repository: Arc<dyn BalanceRepository>,
        flow_status: Arc<dyn FlowStatusChecker>,
        backoff: Arc<BackoffManager>,
        claim_ttl_ms: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            claim_query: ClaimQueryHandler::new(token_cache.clone(), token_repository, backoff),
            claim_release: ClaimReleaseHandler::new(token_cache.clone()),
            balance_query: BalanceQueryHandler::new(AvailableTokenService::new(balance_repository)),
            ledger_change: LedgerChangeHandler::new(token_cache),
            flow_status,
            claim_ttl_ms,
            clock,
        }
    }

    /// Housekeep `state` and dispatch `event` to its handler
    pub fn process_event(&self, pool_key: &PoolKey, state: &PoolState, event: &PoolEvent) -> HandlerResult {
        let ctx = HandlerContext {
            pool_key: pool_key.clone(),
            now_ms: self.clock.now_ms(),
        };

        let (state, invalid) =
            state.remove_invalid_claims(|claim| self.flow_status.is_terminated(&claim.flow_id));
        for claim in &invalid {
            info!(
                "Removed claim {} of terminated flow {} from pool {}",
                claim.claim_id, claim.flow_id, pool_key
            );
        }

        let (state, expired) = state.remove_expired_claims(ctx.now_ms, self.claim_ttl_ms);
        for claim in &expired {
            info!(
                "Removed expired claim {} of flow {} from pool {}",
                claim.claim_id, claim.flow_id, pool_key
            );
        }

        debug!("Dispatching {} for pool {}", event.kind(), pool_key);
        match event {
            PoolEvent::ClaimQuery(query) => self.claim_query.handle(&ctx, state, query),
            PoolEvent::ClaimRelease(release) => self.claim_release.handle(&ctx, state, release),
            PoolEvent::BalanceQuery(query) => self.balance_query.handle(&ctx, state, query),
            PoolEvent::LedgerChange(change) => self.ledger_change.handle(&ctx, state, change),
        }
    }
}
