//! Outbound responses

use crate::events::RoutingMetadata;
use crate::token::{StateRef, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tokens granted to a claim request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResult {
    pub claim_id: String,
    pub claimed_tokens: Vec<Token>,
}

/// Balance figures of a pool for one filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub total_balance: Decimal,
    pub available_balance: Decimal,
}

/// Payload produced by a pool event handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenSelectionResponse {
    Claimed(ClaimResult),
    /// Not enough unclaimed tokens match the query
    InsufficientTokens {
        request_id: String,
        available_amount: Decimal,
    },
    Released {
        claim_id: String,
        /// False when no live claim had this id
        found: bool,
    },
    Balance(TokenBalance),
    LedgerChangeApplied {
        consumed: Vec<StateRef>,
        produced: usize,
    },
}

/// Error detail carried by a platform-error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformErrorInfo {
    pub error_type: String,
    pub message: String,
}

/// Response emitted by the processor for one inbound event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessorResponse {
    Success {
        routing: RoutingMetadata,
        payload: TokenSelectionResponse,
    },
    /// The pool state moved underneath this request; re-drive the same event
    TransientError {
        routing: RoutingMetadata,
        reason: String,
    },
    PlatformError {
        routing: RoutingMetadata,
        error: PlatformErrorInfo,
    },
}

impl ProcessorResponse {
    pub fn routing(&self) -> &RoutingMetadata {
        match self {
            ProcessorResponse::Success { routing, .. }
            | ProcessorResponse::TransientError { routing, .. }
            | ProcessorResponse::PlatformError { routing, .. } => routing,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessorResponse::TransientError { .. })
    }

    pub fn payload(&self) -> Option<&TokenSelectionResponse> {
        match self {
            ProcessorResponse::Success { payload, .. } => Some(payload),
            _ => None,
        }
    }
}
