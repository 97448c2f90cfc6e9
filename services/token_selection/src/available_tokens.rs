//! Available token cache and balance computation
//!
//! The cache holds each pool's unspent candidates as last read from the token
//! repository. It is process-local and derived from a view of claim state
//! that may be stale: stores invalidate a pool's entry whenever a commit
//! conflict proves another replica changed that pool.

use crate::error::RepositoryError;
use crate::repository::{BalanceRepository, TokenRepository};
use dashmap::DashMap;
use selection_types::{total_amount, PoolKey, StateRef, Token, TokenBalance, TokenFilter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailableTokenCacheStats {
    pub cached_pools: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// Per-pool candidate tokens
#[derive(Debug, Default)]
pub struct AvailableTokenCache {
    entries: DashMap<PoolKey, Arc<Vec<Token>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl AvailableTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached candidates for `key`, loading them from `repository` on a miss
    pub fn get_or_load(
        &self,
        key: &PoolKey,
        repository: &dyn TokenRepository,
    ) -> Result<Arc<Vec<Token>>, RepositoryError> {
        if let Some(tokens) = self.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(tokens.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.reload(key, repository)
    }

    /// Replace the cached candidates for `key` with a fresh repository read
    pub fn reload(
        &self,
        key: &PoolKey,
        repository: &dyn TokenRepository,
    ) -> Result<Arc<Vec<Token>>, RepositoryError> {
        let tokens = Arc::new(repository.find_available_tokens(key)?);
        debug!("Loaded {} available tokens for pool {}", tokens.len(), key);
        self.entries.insert(key.clone(), tokens.clone());
        Ok(tokens)
    }

    /// Drop the cached candidates for `key`
    pub fn invalidate(&self, key: &PoolKey) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        if self.entries.remove(key).is_some() {
            debug!("Invalidated available token cache for pool {}", key);
        }
    }

    /// Remove spent tokens from a loaded entry
    pub fn remove_tokens(&self, key: &PoolKey, refs: &[StateRef]) {
        if refs.is_empty() {
            return;
        }
        if let Some(mut entry) = self.entries.get_mut(key) {
            let remaining: Vec<Token> = entry
                .iter()
                .filter(|t| !refs.contains(&t.state_ref))
                .cloned()
                .collect();
            *entry = Arc::new(remaining);
        }
    }

    /// Append new tokens to a loaded entry; returns false if `key` is not loaded
    pub fn add_tokens(&self, key: &PoolKey, tokens: &[Token]) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                let mut updated: Vec<Token> = (**entry).clone();
                for token in tokens {
                    if !updated.iter().any(|e| e.state_ref == token.state_ref) {
                        updated.push(token.clone());
                    }
                }
                *entry = Arc::new(updated);
                true
            }
            None => false,
        }
    }

    pub fn is_loaded(&self, key: &PoolKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn stats(&self) -> AvailableTokenCacheStats {
        AvailableTokenCacheStats {
            cached_pools: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Computes spendable balance from durable balances and in-flight claims
pub struct AvailableTokenService {
    balances: Arc<dyn BalanceRepository>,
}

impl AvailableTokenService {
    pub fn new(balances: Arc<dyn BalanceRepository>) -> Self {
        Self { balances }
    }

    /// Total balance for `filter`, and what remains once `claimed_tokens` are set aside
    ///
    /// Claims are only visible to the claim state store until the tokens are
    /// spent on-ledger, so they are subtracted here rather than queried.
    pub fn query_balance(
        &self,
        key: &PoolKey,
        filter: &TokenFilter,
        claimed_tokens: &[Token],
    ) -> Result<TokenBalance, RepositoryError> {
        let total_balance = self.balances.query_balance(key, filter)?;
        let available_balance = total_amount(claimed_tokens)
            .and_then(|claimed| total_balance.checked_sub(claimed))
            .ok_or_else(|| {
                RepositoryError::Overflow(format!("claimed amount of pool {} out of range", key))
            })?;

        Ok(TokenBalance {
            total_balance,
            available_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryTokenRepository;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn key() -> PoolKey {
        PoolKey::new("h1", "cash", "issuer", "notary", "USD")
    }

    fn tokens(amounts: &[Decimal]) -> Vec<Token> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| Token::new(StateRef::new("tx", i as u32), *a))
            .collect()
    }

    #[test]
    fn test_cache_hit_miss_and_invalidate() {
        let repo = InMemoryTokenRepository::new();
        repo.add_tokens(&key(), tokens(&[dec!(1), dec!(2)]));
        let cache = AvailableTokenCache::new();

        assert_eq!(cache.get_or_load(&key(), &repo).unwrap().len(), 2);
        assert_eq!(cache.get_or_load(&key(), &repo).unwrap().len(), 2);
        cache.invalidate(&key());
        assert!(!cache.is_loaded(&key()));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.invalidations), (1, 1, 1));
    }

    #[test]
    fn test_remove_and_add_tokens() {
        let repo = InMemoryTokenRepository::new();
        repo.add_tokens(&key(), tokens(&[dec!(1), dec!(2)]));
        let cache = AvailableTokenCache::new();

        assert!(!cache.add_tokens(&key(), &tokens(&[dec!(9)])));

        cache.get_or_load(&key(), &repo).unwrap();
        cache.remove_tokens(&key(), &[StateRef::new("tx", 0)]);
        let added = Token::new(StateRef::new("new", 0), dec!(3));
        assert!(cache.add_tokens(&key(), &[added.clone(), added]));

        let cached = cache.get_or_load(&key(), &repo).unwrap();
        let amounts: Vec<Decimal> = cached.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![dec!(2), dec!(3)]);
    }

    #[test]
    fn test_available_balance_subtracts_claims() {
        let repo = Arc::new(InMemoryTokenRepository::new());
        let all = tokens(&[dec!(10), dec!(20), dec!(30)]);
        repo.add_tokens(&key(), all.clone());

        let service = AvailableTokenService::new(repo);
        let balance = service
            .query_balance(&key(), &TokenFilter::any(), &all[..2])
            .unwrap();

        assert_eq!(balance.total_balance, dec!(60));
        assert_eq!(balance.available_balance, dec!(30));
    }

    #[test]
    fn test_claimed_overflow_is_an_error() {
        let repo = Arc::new(InMemoryTokenRepository::new());
        repo.add_tokens(&key(), tokens(&[dec!(1)]));
        let half = Decimal::MAX / dec!(2) + dec!(1);
        let claimed = tokens(&[half, half]);

        let service = AvailableTokenService::new(repo);
        let err = service
            .query_balance(&key(), &TokenFilter::any(), &claimed)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Overflow(_)));
    }

    proptest! {
        #[test]
        fn prop_balance_identity(amounts in proptest::collection::vec(1u32..10_000, 1..30), split in 0usize..30) {
            let amounts: Vec<Decimal> = amounts.into_iter().map(|a| Decimal::new(a as i64, 2)).collect();
            let all = tokens(&amounts);
            let claimed = &all[..split.min(all.len())];

            let repo = Arc::new(InMemoryTokenRepository::new());
            repo.add_tokens(&key(), all.clone());
            let service = AvailableTokenService::new(repo);

            let balance = service.query_balance(&key(), &TokenFilter::any(), claimed).unwrap();
            prop_assert_eq!(Some(balance.total_balance), total_amount(&all));
            prop_assert_eq!(Some(balance.total_balance - balance.available_balance), total_amount(claimed));
        }
    }
}
