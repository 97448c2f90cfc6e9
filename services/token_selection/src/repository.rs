//! Collaborators backed by durable ledger storage
//!
//! The engine never owns the ledger vault. It reads candidate tokens and
//! aggregate balances through these traits and asks a [`FlowStatusChecker`]
//! which claim owners are gone. In-memory implementations are provided for
//! embedding and tests.

use crate::error::RepositoryError;
use dashmap::{DashMap, DashSet};
use rust_decimal::Decimal;
use selection_types::{total_amount, PoolKey, StateRef, Token, TokenFilter};

/// Source of unspent tokens for a pool
pub trait TokenRepository: Send + Sync {
    fn find_available_tokens(&self, key: &PoolKey) -> Result<Vec<Token>, RepositoryError>;
}

/// Aggregate balance of unspent tokens, ignoring in-flight claims
pub trait BalanceRepository: Send + Sync {
    fn query_balance(&self, key: &PoolKey, filter: &TokenFilter) -> Result<Decimal, RepositoryError>;
}

/// Knows which flows have terminated
pub trait FlowStatusChecker: Send + Sync {
    fn is_terminated(&self, flow_id: &str) -> bool;
}

/// Vault contents held in memory
#[derive(Debug, Default)]
pub struct InMemoryTokenRepository {
    pools: DashMap<PoolKey, Vec<Token>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tokens(&self, key: &PoolKey, tokens: impl IntoIterator<Item = Token>) {
        self.pools.entry(key.clone()).or_default().extend(tokens);
    }

    /// Mark tokens as spent
    pub fn consume(&self, key: &PoolKey, refs: &[StateRef]) {
        if let Some(mut tokens) = self.pools.get_mut(key) {
            tokens.retain(|t| !refs.contains(&t.state_ref));
        }
    }
}

impl TokenRepository for InMemoryTokenRepository {
    fn find_available_tokens(&self, key: &PoolKey) -> Result<Vec<Token>, RepositoryError> {
        Ok(self
            .pools
            .get(key)
            .map(|tokens| tokens.clone())
            .unwrap_or_default())
    }
}

impl BalanceRepository for InMemoryTokenRepository {
    fn query_balance(&self, key: &PoolKey, filter: &TokenFilter) -> Result<Decimal, RepositoryError> {
        let Some(tokens) = self.pools.get(key) else {
            return Ok(Decimal::ZERO);
        };
        total_amount(tokens.iter().filter(|t| filter.matches(t)))
            .ok_or_else(|| RepositoryError::Overflow(format!("balance of pool {} out of range", key)))
    }
}

/// Flow ids reported as terminated
#[derive(Debug, Default)]
pub struct TerminatedFlowRegistry {
    terminated: DashSet<String>,
}

impl TerminatedFlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_terminated(&self, flow_id: impl Into<String>) {
        self.terminated.insert(flow_id.into());
    }
}

impl FlowStatusChecker for TerminatedFlowRegistry {
    fn is_terminated(&self, flow_id: &str) -> bool {
        self.terminated.contains(flow_id)
    }
}
