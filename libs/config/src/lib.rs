//! # Token Selection Configuration
//!
//! Centralized configuration and defaults for the token selection service.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use selection_config::{load_config, StoreStrategy};
//!
//! let config = load_config(Some(std::path::Path::new("config/token_selection.toml")))?;
//! if config.store.strategy == StoreStrategy::Performance {
//!     println!("batching up to {} requests", config.store.max_batch_size);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod constants;
pub mod selection_config;

pub use selection_config::{
    load_config, BackoffSettings, ClaimSettings, LoggingSettings, StoreSettings, StoreStrategy,
    TokenSelectionConfig,
};
