//! Contended Claim Tests
//!
//! A Basic and a Performance replica share one slow state manager and race
//! for a pool that holds fewer tokens than there are requests. Every request
//! is re-driven until it gets a final answer. Exactly as many claims as
//! tokens may succeed, and no token may appear in two claims.

use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use selection_config::{StoreStrategy, TokenSelectionConfig};
use selection_types::{
    ClaimQuery, PoolCacheEvent, PoolEvent, PoolKey, ProcessorResponse, RoutingMetadata,
    SelectionStrategy, StateRef, Token, TokenSelectionResponse,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use token_selection::{
    BincodePoolStateSerializer, InMemoryStateManager, InMemoryTokenRepository, ManualClock,
    PoolStateSerializer, ProcessorDependencies, TerminatedFlowRegistry, TokenSelectionProcessor,
};

const TOKENS: u32 = 10;
const REQUESTS: usize = 30;

fn pool_key() -> PoolKey {
    PoolKey::new("holder", "cash", "issuer", "notary", "CHF")
}

fn replica(
    strategy: StoreStrategy,
    manager: Arc<InMemoryStateManager>,
    repo: Arc<InMemoryTokenRepository>,
) -> Arc<TokenSelectionProcessor> {
    let mut config = TokenSelectionConfig::default();
    config.store.strategy = strategy;
    Arc::new(TokenSelectionProcessor::from_config(
        &config,
        ProcessorDependencies {
            state_manager: manager,
            token_repository: repo.clone(),
            balance_repository: repo,
            flow_status: Arc::new(TerminatedFlowRegistry::new()),
            clock: Arc::new(ManualClock::new(1_700_000_000_000)),
        },
    ))
}

fn claim(request_id: &str) -> PoolCacheEvent {
    PoolCacheEvent::new(
        pool_key(),
        RoutingMetadata::new(request_id, "flow"),
        PoolEvent::ClaimQuery(ClaimQuery {
            request_id: request_id.to_string(),
            flow_id: "flow".to_string(),
            target_amount: dec!(1),
            tag_regex: None,
            owner_hash: None,
            pool_key: pool_key(),
            strategy: SelectionStrategy::Simple,
        }),
    )
}

/// Re-drive `request_id` until the answer is no longer transient
async fn claim_until_final(processor: Arc<TokenSelectionProcessor>, request_id: String) -> ProcessorResponse {
    loop {
        let response = processor.process(claim(&request_id)).await;
        if !response.is_transient() {
            return response;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contended_claims_never_exceed_supply() {
    let manager = Arc::new(InMemoryStateManager::with_latency(Duration::from_millis(1)));
    let repo = Arc::new(InMemoryTokenRepository::new());
    repo.add_tokens(
        &pool_key(),
        (0..TOKENS).map(|i| Token::new(StateRef::new("tx", i), dec!(1))),
    );

    let basic = replica(StoreStrategy::Basic, manager.clone(), repo.clone());
    let batching = replica(StoreStrategy::Performance, manager.clone(), repo);

    let requests = (0..REQUESTS).map(|i| {
        let processor = if i % 2 == 0 { basic.clone() } else { batching.clone() };
        tokio::spawn(claim_until_final(processor, format!("r{i}")))
    });
    let responses: Vec<ProcessorResponse> = join_all(requests)
        .await
        .into_iter()
        .map(|joined| joined.expect("request task"))
        .collect();

    let mut granted = Vec::new();
    let mut refused = 0;
    for response in &responses {
        match response.payload() {
            Some(TokenSelectionResponse::Claimed(result)) => {
                assert_eq!(result.claimed_tokens.len(), 1);
                granted.push(result.claimed_tokens[0].state_ref.clone());
            }
            Some(TokenSelectionResponse::InsufficientTokens { available_amount, .. }) => {
                assert_eq!(*available_amount, Decimal::ZERO);
                refused += 1;
            }
            other => panic!("unexpected answer {:?}", other),
        }
    }
    assert_eq!(granted.len(), TOKENS as usize);
    assert_eq!(refused, REQUESTS - TOKENS as usize);

    let granted_refs: HashSet<&StateRef> = granted.iter().collect();
    assert_eq!(granted_refs.len(), granted.len(), "a token was granted twice");

    let stored = manager.entry(&pool_key().state_key()).expect("stored entry");
    let state = BincodePoolStateSerializer.deserialize(&stored.value).unwrap();
    assert_eq!(state.claims.len(), TOKENS as usize);

    let stored_refs: Vec<&StateRef> = state.claimed_tokens().map(|t| &t.state_ref).collect();
    let unique: HashSet<&StateRef> = stored_refs.iter().copied().collect();
    assert_eq!(stored_refs.len(), TOKENS as usize);
    assert_eq!(unique, granted_refs);
}
