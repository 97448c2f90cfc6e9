//! Claimable tokens and the criteria used to select them

use crate::errors::ValidationError;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique reference to the ledger output backing a token
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    pub transaction_id: String,
    pub index: u32,
}

impl StateRef {
    pub fn new(transaction_id: impl Into<String>, index: u32) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            index,
        }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.index)
    }
}

/// Immutable snapshot of a claimable resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub state_ref: StateRef,
    pub tag: Option<String>,
    pub owner_hash: Option<String>,
    pub amount: Decimal,
}

impl Token {
    pub fn new(state_ref: StateRef, amount: Decimal) -> Self {
        Self {
            state_ref,
            tag: None,
            owner_hash: None,
            amount,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_owner_hash(mut self, owner_hash: impl Into<String>) -> Self {
        self.owner_hash = Some(owner_hash.into());
        self
    }
}

/// Sum of token amounts, `None` if it does not fit in a `Decimal`
pub fn total_amount<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> Option<Decimal> {
    tokens
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, t| sum.checked_add(t.amount))
}

/// Compiled tag/owner criteria; `None` fields are wildcards
#[derive(Debug, Clone, Default)]
pub struct TokenFilter {
    tag_pattern: Option<String>,
    tag_regex: Option<Regex>,
    owner_hash: Option<String>,
}

impl TokenFilter {
    /// Build a filter. The tag regex must match the whole tag.
    pub fn new(tag_regex: Option<&str>, owner_hash: Option<&str>) -> Result<Self, ValidationError> {
        let compiled = match tag_regex {
            Some(pattern) => Some(Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                ValidationError::InvalidTagRegex {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            tag_pattern: tag_regex.map(str::to_string),
            tag_regex: compiled,
            owner_hash: owner_hash.map(str::to_string),
        })
    }

    /// Filter that accepts every token
    pub fn any() -> Self {
        Self::default()
    }

    pub fn tag_pattern(&self) -> Option<&str> {
        self.tag_pattern.as_deref()
    }

    pub fn owner_hash(&self) -> Option<&str> {
        self.owner_hash.as_deref()
    }

    pub fn matches(&self, token: &Token) -> bool {
        let tag_ok = match &self.tag_regex {
            None => true,
            Some(regex) => token.tag.as_deref().is_some_and(|tag| regex.is_match(tag)),
        };
        let owner_ok = match &self.owner_hash {
            None => true,
            Some(owner) => token.owner_hash.as_deref() == Some(owner.as_str()),
        };
        tag_ok && owner_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn token(index: u32, tag: Option<&str>, owner: Option<&str>) -> Token {
        Token {
            state_ref: StateRef::new("tx", index),
            tag: tag.map(str::to_string),
            owner_hash: owner.map(str::to_string),
            amount: dec!(1),
        }
    }

    #[test]
    fn test_tag_regex_is_full_match() {
        let filter = TokenFilter::new(Some("(t1)"), None).unwrap();
        assert!(filter.matches(&token(0, Some("t1"), None)));
        assert!(!filter.matches(&token(1, Some("t10"), None)));
        assert!(!filter.matches(&token(2, None, None)));
    }

    #[test]
    fn test_owner_hash_is_exact() {
        let filter = TokenFilter::new(None, Some("h1")).unwrap();
        assert!(filter.matches(&token(0, None, Some("h1"))));
        assert!(!filter.matches(&token(1, None, Some("h12"))));
        assert!(!filter.matches(&token(2, None, None)));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = TokenFilter::new(Some("(unclosed"), None).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTagRegex { .. }));
    }

    #[test]
    fn test_total_amount() {
        let tokens = vec![
            Token::new(StateRef::new("a", 0), dec!(1.5)),
            Token::new(StateRef::new("a", 1), dec!(2.25)),
        ];
        assert_eq!(total_amount(&tokens), Some(dec!(3.75)));
    }

    #[test]
    fn test_total_amount_overflow() {
        let half = Decimal::MAX / dec!(2) + dec!(1);
        let tokens = vec![
            Token::new(StateRef::new("a", 0), half),
            Token::new(StateRef::new("a", 1), half),
        ];
        assert_eq!(total_amount(&tokens), None);
    }
}
