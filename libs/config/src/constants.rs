//! Default values for the token selection service
//!
//! Every configuration field falls back to one of these when absent from the
//! config file and the environment.

/// Claim state store defaults
pub mod store {
    /// Time the batching store waits for more requests after the first (milliseconds)
    pub const BATCH_LINGER_MS: u64 = 5;

    /// Maximum number of transforms committed in one backing-store write
    pub const MAX_BATCH_SIZE: usize = 64;
}

/// Backoff defaults
pub mod backoff {
    /// First interval after a failure (milliseconds)
    pub const INITIAL_INTERVAL_MS: u64 = 1_000;

    /// Interval cap, also the idle time after which an entry is evicted (milliseconds)
    pub const MAX_INTERVAL_MS: u64 = 4_000;
}

/// Claim lifecycle defaults
pub mod claims {
    /// Claims older than this are dropped on the next event for their pool
    pub const CLAIM_TTL_SECS: u64 = 300;
}

/// Logging defaults
pub mod logging {
    pub const LEVEL: &str = "info";
}

/// Environment variable prefix for overrides, e.g. `TOKEN_SELECTION_BACKOFF__MAX_INTERVAL_MS`
pub const ENV_PREFIX: &str = "TOKEN_SELECTION";
