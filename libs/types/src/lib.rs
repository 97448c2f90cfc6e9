//! # Token Selection Types
//!
//! Shared data model for the token selection engine.
//!
//! ## Contents
//!
//! - **Pool identity**: [`PoolKey`], the partition a request targets
//! - **Tokens**: [`Token`], [`StateRef`] and the [`TokenFilter`] criteria
//! - **Claim state**: [`Claim`], the immutable [`PoolState`] value and the
//!   versioned [`StoredPoolState`] baseline
//! - **Events**: [`PoolCacheEvent`] envelopes around [`PoolEvent`] variants
//! - **Responses**: handler payloads and the processor's success, transient
//!   and platform-error responses
//!
//! ```text
//! PoolCacheEvent ──► [Processor] ──► ClaimStateStore ──► ProcessorResponse
//!   pool_key            validate       PoolState → PoolState   Success
//!   routing             dispatch       versioned commit        TransientError
//!   PoolEvent                                                  PlatformError
//! ```

pub mod claim;
pub mod errors;
pub mod events;
pub mod pool_key;
pub mod responses;
pub mod token;

pub use claim::{Claim, PoolState, StoredPoolState};
pub use errors::ValidationError;
pub use events::{
    BalanceQuery, ClaimQuery, ClaimRelease, LedgerChange, PoolCacheEvent, PoolEvent,
    RoutingMetadata, SelectionStrategy,
};
pub use pool_key::PoolKey;
pub use responses::{
    ClaimResult, PlatformErrorInfo, ProcessorResponse, TokenBalance, TokenSelectionResponse,
};
pub use token::{total_amount, StateRef, Token, TokenFilter};
