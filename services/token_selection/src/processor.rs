//! Event processor
//!
//! Entry point for pool events. Each event is validated, routed to its
//! pool's claim state store and executed as a store transform; the store's
//! verdict decides which kind of response the caller receives.

use crate::available_tokens::AvailableTokenCache;
use crate::backoff::BackoffManager;
use crate::clock::Clock;
use crate::codec::{BincodePoolStateSerializer, PoolStateSerializer};
use crate::error::{StoreError, TokenSelectionError};
use crate::manager::TokenPoolCacheManager;
use crate::repository::{BalanceRepository, FlowStatusChecker, TokenRepository};
use crate::state_manager::StateManager;
use crate::store::{ClaimStateStoreCache, ClaimStateStoreFactory, StoreContext};
use parking_lot::Mutex;
use selection_config::TokenSelectionConfig;
use selection_types::{
    PlatformErrorInfo, PoolCacheEvent, PoolState, ProcessorResponse, RoutingMetadata,
    TokenSelectionResponse,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

type HandlerOutcome = Result<TokenSelectionResponse, TokenSelectionError>;

/// External collaborators of a processor
pub struct ProcessorDependencies {
    pub state_manager: Arc<dyn StateManager>,
    pub token_repository: Arc<dyn TokenRepository>,
    pub balance_repository: Arc<dyn BalanceRepository>,
    pub flow_status: Arc<dyn FlowStatusChecker>,
    pub clock: Arc<dyn Clock>,
}

pub struct TokenSelectionProcessor {
    store_cache: Arc<ClaimStateStoreCache>,
    manager: Arc<TokenPoolCacheManager>,
}

impl TokenSelectionProcessor {
    pub fn new(store_cache: Arc<ClaimStateStoreCache>, manager: Arc<TokenPoolCacheManager>) -> Self {
        Self { store_cache, manager }
    }

    /// Wire a processor and its caches from configuration
    pub fn from_config(config: &TokenSelectionConfig, deps: ProcessorDependencies) -> Self {
        let token_cache = Arc::new(AvailableTokenCache::new());
        let serializer: Arc<dyn PoolStateSerializer> = Arc::new(BincodePoolStateSerializer);

        let context = StoreContext {
            state_manager: deps.state_manager,
            serializer,
            token_cache: token_cache.clone(),
        };
        let store_cache = Arc::new(ClaimStateStoreCache::new(ClaimStateStoreFactory::new(
            context,
            config.store.clone(),
        )));

        let backoff = Arc::new(BackoffManager::new(&config.backoff, deps.clock.clone()));
        let manager = Arc::new(TokenPoolCacheManager::new(
            token_cache,
            deps.token_repository,
            deps.balance_repository,
            deps.flow_status,
            backoff,
            config.claims.ttl_ms(),
            deps.clock,
        ));

        info!(
            "Token selection processor ready: {:?} store, claim TTL {}s",
            config.store.strategy, config.claims.ttl_secs
        );
        Self::new(store_cache, manager)
    }

    pub fn store_cache(&self) -> &Arc<ClaimStateStoreCache> {
        &self.store_cache
    }

    /// Process one event to completion
    pub async fn process(&self, event: PoolCacheEvent) -> ProcessorResponse {
        if let Err(e) = event.validate() {
            warn!("Rejected {} for pool {}: {}", event.event.kind(), event.pool_key, e);
            return platform_error(event.routing, &TokenSelectionError::from(e));
        }

        let PoolCacheEvent {
            pool_key,
            routing,
            event,
        } = event;

        let store = match self.store_cache.get(&pool_key).await {
            Ok(store) => store,
            Err(e) => return platform_error(routing, &TokenSelectionError::from(e)),
        };

        let slot: Arc<Mutex<Option<HandlerOutcome>>> = Arc::new(Mutex::new(None));
        let captured = slot.clone();
        let manager = self.manager.clone();
        let transform_key = pool_key.clone();
        let kind = event.kind();

        // Read-only outcomes are written too, so every answer is checked against the current version
        let committed = store
            .enqueue_request(Box::new(move |state: &PoolState| {
                match manager.process_event(&transform_key, state, &event) {
                    Ok((next, response)) => {
                        *captured.lock() = Some(Ok(response));
                        next
                    }
                    Err(e) => {
                        *captured.lock() = Some(Err(e));
                        state.clone()
                    }
                }
            }))
            .await;

        let outcome = slot.lock().take();
        match committed {
            Ok(true) => match outcome {
                Some(Ok(payload)) => {
                    debug!("Processed {} for pool {}", kind, pool_key);
                    ProcessorResponse::Success { routing, payload }
                }
                Some(Err(e)) => platform_error(routing, &e),
                None => platform_error(
                    routing,
                    &TokenSelectionError::Handler("transform did not run".to_string()),
                ),
            },
            Ok(false) => {
                debug!("Conflict processing {} for pool {}", kind, pool_key);
                ProcessorResponse::TransientError {
                    routing,
                    reason: format!("Claim state of pool {} changed concurrently", pool_key),
                }
            }
            Err(e) => {
                if matches!(e, StoreError::Closed { .. }) {
                    self.store_cache.evict(&pool_key, &store);
                }
                platform_error(routing, &TokenSelectionError::from(e))
            }
        }
    }

    /// Process events from `events` concurrently until the channel closes
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<PoolCacheEvent>,
        responses: mpsc::Sender<ProcessorResponse>,
    ) {
        info!("Token selection processor started");
        while let Some(event) = events.recv().await {
            let processor = self.clone();
            let responses = responses.clone();
            tokio::spawn(async move {
                let response = processor.process(event).await;
                if responses.send(response).await.is_err() {
                    warn!("Response channel closed, dropping response");
                }
            });
        }
        info!("Token selection processor stopped");
    }
}

fn platform_error(routing: RoutingMetadata, e: &TokenSelectionError) -> ProcessorResponse {
    error!(
        "Platform error for request {}: {}",
        routing.external_event_request_id, e
    );
    ProcessorResponse::PlatformError {
        routing,
        error: PlatformErrorInfo {
            error_type: e.error_type().to_string(),
            message: e.to_string(),
        },
    }
}
