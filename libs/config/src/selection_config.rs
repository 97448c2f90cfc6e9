//! Token Selection Configuration
//!
//! Loads service configuration from a TOML file with environment variable
//! overrides. Missing sections and fields take their defaults from
//! [`crate::constants`].

use crate::constants;
use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TokenSelectionConfig {
    pub store: StoreSettings,
    pub backoff: BackoffSettings,
    pub claims: ClaimSettings,
    pub logging: LoggingSettings,
}

/// Which claim state store implementation backs each pool
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreStrategy {
    /// One conditional write per request
    Basic,
    /// Concurrent requests coalesced into one conditional write
    #[default]
    Performance,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    pub strategy: StoreStrategy,
    pub batch_linger_ms: u64,
    pub max_batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BackoffSettings {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClaimSettings {
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            strategy: StoreStrategy::default(),
            batch_linger_ms: constants::store::BATCH_LINGER_MS,
            max_batch_size: constants::store::MAX_BATCH_SIZE,
        }
    }
}

impl StoreSettings {
    pub fn batch_linger(&self) -> Duration {
        Duration::from_millis(self.batch_linger_ms)
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: constants::backoff::INITIAL_INTERVAL_MS,
            max_interval_ms: constants::backoff::MAX_INTERVAL_MS,
        }
    }
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            ttl_secs: constants::claims::CLAIM_TTL_SECS,
        }
    }
}

impl ClaimSettings {
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_secs.saturating_mul(1_000)
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: constants::logging::LEVEL.to_string(),
        }
    }
}

impl TokenSelectionConfig {
    /// Load configuration from a file with `TOKEN_SELECTION_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading token selection config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        } else {
            debug!("No config file given, using defaults and environment");
        }

        // Nested keys use a double underscore: TOKEN_SELECTION_STORE__STRATEGY
        builder = builder.add_source(
            Environment::with_prefix(constants::ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let loaded: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let parsed: Self = toml::from_str(content).context("Failed to parse TOML configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.backoff.initial_interval_ms == 0 {
            anyhow::bail!("backoff.initial_interval_ms must be positive");
        }
        if self.backoff.max_interval_ms < self.backoff.initial_interval_ms {
            anyhow::bail!(
                "backoff.max_interval_ms ({}) is below backoff.initial_interval_ms ({})",
                self.backoff.max_interval_ms,
                self.backoff.initial_interval_ms
            );
        }
        if self.store.max_batch_size == 0 {
            anyhow::bail!("store.max_batch_size must be positive");
        }
        Ok(())
    }
}

/// Convenience function to load configuration with defaults
pub fn load_config(path: Option<&Path>) -> Result<TokenSelectionConfig> {
    TokenSelectionConfig::load(path)
}
