//! Candidate token filtering

use selection_types::{SelectionStrategy, Token, TokenFilter};

/// Narrows a candidate list to the tokens a request may claim
pub trait TokenFilterStrategy: Send + Sync {
    /// Matching tokens in candidate order
    fn filter_tokens(&self, candidates: &[Token], filter: &TokenFilter) -> Vec<Token>;
}

/// Tag regex and owner hash predicates, both optional
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleTokenFilterStrategy;

impl TokenFilterStrategy for SimpleTokenFilterStrategy {
    fn filter_tokens(&self, candidates: &[Token], filter: &TokenFilter) -> Vec<Token> {
        candidates
            .iter()
            .filter(|token| filter.matches(token))
            .cloned()
            .collect()
    }
}

/// Strategy implementing `strategy`
pub fn strategy_for(strategy: SelectionStrategy) -> &'static dyn TokenFilterStrategy {
    match strategy {
        SelectionStrategy::Simple => &SimpleTokenFilterStrategy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use selection_types::StateRef;

    fn token(index: u32, tag: Option<&str>, owner: Option<&str>) -> Token {
        Token {
            state_ref: StateRef::new("tx", index),
            tag: tag.map(str::to_string),
            owner_hash: owner.map(str::to_string),
            amount: Decimal::from(index + 1),
        }
    }

    fn candidates() -> Vec<Token> {
        vec![
            token(0, Some("t1"), Some("h1")),
            token(1, Some("t2"), Some("h1")),
            token(2, Some("t1"), Some("h2")),
            token(3, None, None),
            token(4, Some("t10"), Some("h1")),
        ]
    }

    fn indices(tokens: &[Token]) -> Vec<u32> {
        tokens.iter().map(|t| t.state_ref.index).collect()
    }

    #[test]
    fn test_wildcards_return_all_in_order() {
        let result = SimpleTokenFilterStrategy.filter_tokens(&candidates(), &TokenFilter::any());
        assert_eq!(result, candidates());
    }

    #[test]
    fn test_tag_regex() {
        let filter = TokenFilter::new(Some("(t1)"), None).unwrap();
        let result = SimpleTokenFilterStrategy.filter_tokens(&candidates(), &filter);
        assert_eq!(indices(&result), vec![0, 2]);
    }

    #[test]
    fn test_owner_hash() {
        let filter = TokenFilter::new(None, Some("h1")).unwrap();
        let result = SimpleTokenFilterStrategy.filter_tokens(&candidates(), &filter);
        assert_eq!(indices(&result), vec![0, 1, 4]);
    }

    #[test]
    fn test_combined_criteria() {
        let filter = TokenFilter::new(Some("t1.*"), Some("h1")).unwrap();
        let result = strategy_for(SelectionStrategy::Simple).filter_tokens(&candidates(), &filter);
        assert_eq!(indices(&result), vec![0, 4]);
    }

    fn arb_token() -> impl Strategy<Value = Token> {
        (
            0u32..1000,
            proptest::option::of(prop_oneof!["t1", "t2", "t10"]),
            proptest::option::of(prop_oneof!["h1", "h2"]),
        )
            .prop_map(|(index, tag, owner)| Token {
                state_ref: StateRef::new("tx", index),
                tag,
                owner_hash: owner,
                amount: Decimal::ONE,
            })
    }

    proptest! {
        #[test]
        fn prop_combined_filter_is_intersection(tokens in proptest::collection::vec(arb_token(), 0..40)) {
            let by_tag = TokenFilter::new(Some("t1"), None).unwrap();
            let by_owner = TokenFilter::new(None, Some("h1")).unwrap();
            let both = TokenFilter::new(Some("t1"), Some("h1")).unwrap();

            let tag_then_owner = SimpleTokenFilterStrategy.filter_tokens(
                &SimpleTokenFilterStrategy.filter_tokens(&tokens, &by_tag),
                &by_owner,
            );
            let combined = SimpleTokenFilterStrategy.filter_tokens(&tokens, &both);

            prop_assert_eq!(combined.clone(), tag_then_owner);
            prop_assert!(combined.iter().all(|t| t.tag.as_deref() == Some("t1")
                && t.owner_hash.as_deref() == Some("h1")));
        }
    }
}
