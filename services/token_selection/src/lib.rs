//! # Token Selection Service
//!
//! Claims fungible ledger tokens for flows without double-spending, while any
//! number of replicas serve the same pools.
//!
//! ## Architecture
//!
//! ```text
//! PoolCacheEvent
//!      │
//!      ▼
//! TokenSelectionProcessor ── validate ──► PlatformError
//!      │
//!      ▼
//! ClaimStateStoreCache ──► ClaimStateStore (one per pool, Basic | Performance)
//!      │                        │
//!      │                        ├── transform: TokenPoolCacheManager::process_event
//!      │                        │      housekeeping, then claim / release / balance / ledger handler
//!      │                        │
//!      │                        └── conditional write ──► StateManager (versioned, shared)
//!      ▼
//! Success | TransientError (conflict, re-drive) | PlatformError
//! ```
//!
//! ## Consistency
//!
//! Claim state lives in the [`StateManager`] and is only ever replaced by a
//! write made against the version it currently holds. A replica that loses a
//! race adopts the stored state, invalidates its [`AvailableTokenCache`] for
//! the pool and reports a transient error so the caller re-drives the event.
//! Tokens therefore belong to at most one live claim at any time.

pub mod available_tokens;
pub mod backoff;
pub mod clock;
pub mod codec;
pub mod error;
pub mod filter;
pub mod logging;
pub mod manager;
pub mod processor;
pub mod repository;
pub mod state_manager;
pub mod store;

pub use available_tokens::{AvailableTokenCache, AvailableTokenCacheStats, AvailableTokenService};
pub use backoff::BackoffManager;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{BincodePoolStateSerializer, PoolStateSerializer};
pub use error::{RepositoryError, StateManagerError, StoreError, TokenSelectionError};
pub use filter::{strategy_for, SimpleTokenFilterStrategy, TokenFilterStrategy};
pub use logging::{init_logging, level_filter};
pub use manager::{HandlerContext, TokenEventHandler, TokenPoolCacheManager};
pub use processor::{ProcessorDependencies, TokenSelectionProcessor};
pub use repository::{
    BalanceRepository, FlowStatusChecker, InMemoryTokenRepository, TerminatedFlowRegistry,
    TokenRepository,
};
pub use state_manager::{InMemoryStateManager, StateEntry, StateManager, StateManagerStats};
pub use store::{
    BasicClaimStateStore, ClaimStateStore, ClaimStateStoreCache, ClaimStateStoreFactory,
    PerformanceClaimStateStore, PoolStateTransform, StoreContext, StoreStatsSnapshot,
};
