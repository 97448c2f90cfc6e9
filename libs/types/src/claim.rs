//! Claims and per-pool claim state
//!
//! [`PoolState`] is an immutable value: every operation that changes the set
//! of claims returns a new state and leaves the receiver untouched. Stores
//! hand a borrowed state to their transform and keep whatever it returns.

use crate::pool_key::PoolKey;
use crate::token::{StateRef, Token};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Exclusive, temporary reservation of tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Id of the request that created the claim, unique within a pool
    pub claim_id: String,
    /// Flow that owns the claim
    pub flow_id: String,
    /// Creation time in epoch milliseconds
    pub claimed_at_ms: u64,
    pub claimed_tokens: Vec<Token>,
}

impl Claim {
    pub fn is_expired(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.claimed_at_ms) > ttl_ms
    }
}

/// Live claims of one pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub claims: Vec<Claim>,
}

impl PoolState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, claim_id: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_id == claim_id)
    }

    /// State with `claim` appended
    pub fn with_claim(&self, claim: Claim) -> Self {
        let mut claims = self.claims.clone();
        claims.push(claim);
        Self { claims }
    }

    /// State without the claim named `claim_id`, plus the removed claim if any
    pub fn without_claim(&self, claim_id: &str) -> (Self, Option<Claim>) {
        let mut removed = None;
        let claims = self
            .claims
            .iter()
            .filter(|c| {
                if c.claim_id == claim_id && removed.is_none() {
                    removed = Some((*c).clone());
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();
        (Self { claims }, removed)
    }

    /// Drop claims older than `ttl_ms`
    pub fn remove_expired_claims(&self, now_ms: u64, ttl_ms: u64) -> (Self, Vec<Claim>) {
        self.partition(|c| c.is_expired(now_ms, ttl_ms))
    }

    /// Drop claims the predicate reports as invalid
    pub fn remove_invalid_claims(&self, is_invalid: impl Fn(&Claim) -> bool) -> (Self, Vec<Claim>) {
        self.partition(is_invalid)
    }

    fn partition(&self, remove: impl Fn(&Claim) -> bool) -> (Self, Vec<Claim>) {
        let (removed, kept): (Vec<Claim>, Vec<Claim>) =
            self.claims.iter().cloned().partition(|c| remove(c));
        (Self { claims: kept }, removed)
    }

    /// All tokens held by live claims, in claim order
    pub fn claimed_tokens(&self) -> impl Iterator<Item = &Token> {
        self.claims.iter().flat_map(|c| c.claimed_tokens.iter())
    }

    pub fn claimed_state_refs(&self) -> HashSet<&StateRef> {
        self.claimed_tokens().map(|t| &t.state_ref).collect()
    }

    pub fn is_claimed(&self, state_ref: &StateRef) -> bool {
        self.claimed_tokens().any(|t| &t.state_ref == state_ref)
    }
}

/// Last accepted state of a pool together with its backing-store version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPoolState {
    pub version: u64,
    pub pool_key: PoolKey,
    pub state: PoolState,
}

impl StoredPoolState {
    pub fn new(version: u64, pool_key: PoolKey, state: PoolState) -> Self {
        Self {
            version,
            pool_key,
            state,
        }
    }
}
