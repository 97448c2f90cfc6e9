//! Pool identification
//!
//! A [`PoolKey`] names one independent partition of the token universe. It is
//! the unit of sharding, of backoff tracking and the key under which a pool's
//! claim state is persisted.

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one token pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    /// Short identifier of the holding identity
    pub short_holder_id: String,
    /// Token type name
    pub token_type: String,
    /// Hash of the issuing party
    pub issuer_hash: String,
    /// Notary the tokens are bound to
    pub notary: String,
    /// Currency or asset symbol
    pub symbol: String,
}

impl PoolKey {
    pub fn new(
        short_holder_id: impl Into<String>,
        token_type: impl Into<String>,
        issuer_hash: impl Into<String>,
        notary: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            short_holder_id: short_holder_id.into(),
            token_type: token_type.into(),
            issuer_hash: issuer_hash.into(),
            notary: notary.into(),
            symbol: symbol.into(),
        }
    }

    /// Reject keys with missing components
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("short_holder_id", &self.short_holder_id),
            ("token_type", &self.token_type),
            ("issuer_hash", &self.issuer_hash),
            ("notary", &self.notary),
            ("symbol", &self.symbol),
        ];

        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyPoolKeyField { field });
            }
        }
        Ok(())
    }

    /// Key used for this pool's entry in the backing state store
    pub fn state_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.short_holder_id, self.token_type, self.issuer_hash, self.notary, self.symbol
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_key_joins_all_components() {
        let key = PoolKey::new("h1", "cash", "issuer", "notary", "USD");
        assert_eq!(key.state_key(), "h1:cash:issuer:notary:USD");
    }

    #[test]
    fn test_validate_rejects_blank_field() {
        let key = PoolKey::new("h1", "cash", " ", "notary", "USD");
        assert_eq!(
            key.validate(),
            Err(ValidationError::EmptyPoolKeyField { field: "issuer_hash" })
        );
        assert!(PoolKey::new("h1", "cash", "i", "n", "USD").validate().is_ok());
    }
}
