//! Per-variant pool event handlers

use super::{HandlerContext, HandlerResult, TokenEventHandler};
use crate::available_tokens::{AvailableTokenCache, AvailableTokenService};
use crate::backoff::BackoffManager;
use crate::filter::strategy_for;
use crate::repository::TokenRepository;
use rust_decimal::Decimal;
use selection_types::{
    BalanceQuery, Claim, ClaimQuery, ClaimRelease, ClaimResult, LedgerChange, PoolState, Token,
    TokenFilter, TokenSelectionResponse,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Tokens picked for a claim and their sum
#[derive(Debug, Default)]
struct Selection {
    tokens: Vec<Token>,
    total: Decimal,
}

/// Greedy pick in candidate order, skipping claimed tokens, until `target` is covered
fn select(candidates: &[Token], state: &PoolState, query: &ClaimQuery, filter: &TokenFilter) -> Selection {
    let claimed = state.claimed_state_refs();
    let mut selection = Selection::default();

    for token in strategy_for(query.strategy).filter_tokens(candidates, filter) {
        if selection.total >= query.target_amount {
            break;
        }
        if claimed.contains(&token.state_ref) {
            continue;
        }
        let next_total = selection.total.checked_add(token.amount);
        selection.tokens.push(token);
        match next_total {
            Some(total) => selection.total = total,
            None => {
                // Past the largest representable amount, so past any target
                selection.total = Decimal::MAX;
                break;
            }
        }
    }
    selection
}

/// Claims tokens covering a target amount
pub struct ClaimQueryHandler {
    token_cache: Arc<AvailableTokenCache>,
    repository: Arc<dyn TokenRepository>,
    backoff: Arc<BackoffManager>,
}

impl ClaimQueryHandler {
    pub fn new(
        token_cache: Arc<AvailableTokenCache>,
        repository: Arc<dyn TokenRepository>,
        backoff: Arc<BackoffManager>,
    ) -> Self {
        Self {
            token_cache,
            repository,
            backoff,
        }
    }
}

impl TokenEventHandler<ClaimQuery> for ClaimQueryHandler {
    fn handle(&self, ctx: &HandlerContext, state: PoolState, query: &ClaimQuery) -> HandlerResult {
        // A re-driven request must not claim twice
        if let Some(existing) = state.claim(&query.request_id) {
            debug!("Claim {} already granted in pool {}", query.request_id, ctx.pool_key);
            let response = TokenSelectionResponse::Claimed(ClaimResult {
                claim_id: existing.claim_id.clone(),
                claimed_tokens: existing.claimed_tokens.clone(),
            });
            return Ok((state, response));
        }

        let filter = query.filter()?;
        let candidates = self
            .token_cache
            .get_or_load(&ctx.pool_key, self.repository.as_ref())?;
        let mut selection = select(&candidates, &state, query, &filter);

        if selection.total < query.target_amount && !self.backoff.backoff(&ctx.pool_key) {
            let reloaded = self.token_cache.reload(&ctx.pool_key, self.repository.as_ref())?;
            selection = select(&reloaded, &state, query, &filter);
        }

        if selection.total < query.target_amount {
            self.backoff.update(&ctx.pool_key);
            info!(
                "Insufficient tokens in pool {} for claim {}: wanted {}, available {}",
                ctx.pool_key, query.request_id, query.target_amount, selection.total
            );
            let response = TokenSelectionResponse::InsufficientTokens {
                request_id: query.request_id.clone(),
                available_amount: selection.total,
            };
            return Ok((state, response));
        }

        let claim = Claim {
            claim_id: query.request_id.clone(),
            flow_id: query.flow_id.clone(),
            claimed_at_ms: ctx.now_ms,
            claimed_tokens: selection.tokens,
        };
        debug!(
            "Claim {} in pool {} holds {} tokens worth {}",
            claim.claim_id,
            ctx.pool_key,
            claim.claimed_tokens.len(),
            selection.total
        );

        let response = TokenSelectionResponse::Claimed(ClaimResult {
            claim_id: claim.claim_id.clone(),
            claimed_tokens: claim.claimed_tokens.clone(),
        });
        Ok((state.with_claim(claim), response))
    }
}

/// Releases a claim and forgets the tokens it spent
pub struct ClaimReleaseHandler {
    token_cache: Arc<AvailableTokenCache>,
}

impl ClaimReleaseHandler {
    pub fn new(token_cache: Arc<AvailableTokenCache>) -> Self {
        Self { token_cache }
    }
}

impl TokenEventHandler<ClaimRelease> for ClaimReleaseHandler {
    fn handle(&self, ctx: &HandlerContext, state: PoolState, release: &ClaimRelease) -> HandlerResult {
        let (next, removed) = state.without_claim(&release.claim_id);
        self.token_cache
            .remove_tokens(&ctx.pool_key, &release.used_token_refs);

        if removed.is_none() {
            debug!("Release of unknown claim {} in pool {}", release.claim_id, ctx.pool_key);
        }

        let response = TokenSelectionResponse::Released {
            claim_id: release.claim_id.clone(),
            found: removed.is_some(),
        };
        Ok((next, response))
    }
}

pub struct BalanceQueryHandler {
    service: AvailableTokenService,
}

impl BalanceQueryHandler {
    pub fn new(service: AvailableTokenService) -> Self {
        Self { service }
    }
}

impl TokenEventHandler<BalanceQuery> for BalanceQueryHandler {
    fn handle(&self, ctx: &HandlerContext, state: PoolState, query: &BalanceQuery) -> HandlerResult {
        let filter = query.filter()?;
        let claimed: Vec<Token> = state
            .claimed_tokens()
            .filter(|token| filter.matches(token))
            .cloned()
            .collect();

        let balance = self.service.query_balance(&ctx.pool_key, &filter, &claimed)?;
        Ok((state, TokenSelectionResponse::Balance(balance)))
    }
}

/// Applies ledger commits to the available token cache
pub struct LedgerChangeHandler {
    token_cache: Arc<AvailableTokenCache>,
}

impl LedgerChangeHandler {
    pub fn new(token_cache: Arc<AvailableTokenCache>) -> Self {
        Self { token_cache }
    }
}

impl TokenEventHandler<LedgerChange> for LedgerChangeHandler {
    fn handle(&self, ctx: &HandlerContext, state: PoolState, change: &LedgerChange) -> HandlerResult {
        self.token_cache.remove_tokens(&ctx.pool_key, &change.consumed);
        if !change.produced.is_empty() && !self.token_cache.add_tokens(&ctx.pool_key, &change.produced) {
            debug!(
                "Pool {} not cached, {} produced tokens left for next load",
                ctx.pool_key,
                change.produced.len()
            );
        }

        let response = TokenSelectionResponse::LedgerChangeApplied {
            consumed: change.consumed.clone(),
            produced: change.produced.len(),
        };
        Ok((state, response))
    }
}
