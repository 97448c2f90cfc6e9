//! Inbound pool events
//!
//! Every request against a pool arrives as a [`PoolCacheEvent`]: the routed
//! pool key, correlation metadata and one [`PoolEvent`] variant. Variants are
//! dispatched exhaustively by the pool cache manager.

use crate::errors::ValidationError;
use crate::pool_key::PoolKey;
use crate::token::{StateRef, Token, TokenFilter};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Correlation data echoed on every response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingMetadata {
    pub external_event_request_id: String,
    pub flow_id: String,
}

impl RoutingMetadata {
    pub fn new(external_event_request_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        Self {
            external_event_request_id: external_event_request_id.into(),
            flow_id: flow_id.into(),
        }
    }
}

/// How candidate tokens are narrowed down before selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStrategy {
    /// Tag regex and owner hash predicates
    #[default]
    Simple,
}

/// Request to claim tokens covering `target_amount`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimQuery {
    pub request_id: String,
    pub flow_id: String,
    pub target_amount: Decimal,
    pub tag_regex: Option<String>,
    pub owner_hash: Option<String>,
    pub pool_key: PoolKey,
    pub strategy: SelectionStrategy,
}

impl ClaimQuery {
    pub fn filter(&self) -> Result<TokenFilter, ValidationError> {
        TokenFilter::new(self.tag_regex.as_deref(), self.owner_hash.as_deref())
    }
}

/// Release of a previously granted claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRelease {
    pub request_id: String,
    pub flow_id: String,
    pub claim_id: String,
    /// Tokens of the claim that were spent on-ledger
    pub used_token_refs: Vec<StateRef>,
}

/// Request for total and unclaimed balance of a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceQuery {
    pub request_id: String,
    pub flow_id: String,
    pub tag_regex: Option<String>,
    pub owner_hash: Option<String>,
}

impl BalanceQuery {
    pub fn filter(&self) -> Result<TokenFilter, ValidationError> {
        TokenFilter::new(self.tag_regex.as_deref(), self.owner_hash.as_deref())
    }
}

/// Tokens consumed and produced by a committed ledger transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerChange {
    pub consumed: Vec<StateRef>,
    pub produced: Vec<Token>,
}

/// Event variants a pool can process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolEvent {
    ClaimQuery(ClaimQuery),
    ClaimRelease(ClaimRelease),
    BalanceQuery(BalanceQuery),
    LedgerChange(LedgerChange),
}

impl PoolEvent {
    /// Stable discriminant used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            PoolEvent::ClaimQuery(_) => "claim_query",
            PoolEvent::ClaimRelease(_) => "claim_release",
            PoolEvent::BalanceQuery(_) => "balance_query",
            PoolEvent::LedgerChange(_) => "ledger_change",
        }
    }
}

/// A pool event with its routing envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolCacheEvent {
    pub pool_key: PoolKey,
    pub routing: RoutingMetadata,
    pub event: PoolEvent,
}

impl PoolCacheEvent {
    pub fn new(pool_key: PoolKey, routing: RoutingMetadata, event: PoolEvent) -> Self {
        Self {
            pool_key,
            routing,
            event,
        }
    }

    /// Structural checks run before any store interaction
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pool_key.validate()?;

        match &self.event {
            PoolEvent::ClaimQuery(query) => {
                require("request_id", &query.request_id)?;
                require("flow_id", &query.flow_id)?;
                if query.target_amount <= Decimal::ZERO {
                    return Err(ValidationError::NonPositiveAmount {
                        amount: query.target_amount.to_string(),
                    });
                }
                if query.pool_key != self.pool_key {
                    return Err(ValidationError::PoolKeyMismatch {
                        routed: self.pool_key.to_string(),
                        event: query.pool_key.to_string(),
                    });
                }
                query.filter()?;
            }
            PoolEvent::ClaimRelease(release) => {
                require("request_id", &release.request_id)?;
                require("claim_id", &release.claim_id)?;
            }
            PoolEvent::BalanceQuery(query) => {
                require("request_id", &query.request_id)?;
                query.filter()?;
            }
            PoolEvent::LedgerChange(_) => {}
        }
        Ok(())
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField { field })
    } else {
        Ok(())
    }
}
