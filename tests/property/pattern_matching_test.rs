//! Property-based tests for wildcard pattern matching.
//!
//! These tests check the matcher against the rules it promises: literal
//! text matches itself, `*` absorbs any run, and matching ignores case.

use proptest::prelude::*;

use tabkeeper::services::pattern_matcher::matches_pattern;

/// URL-ish text without `*` or line breaks.
fn arb_literal() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9:/._?=&%+()\\[\\]$^|{}-]{1,40}"
}

proptest! {
    /// A pattern without wildcards matches exactly itself.
    #[test]
    fn literal_pattern_matches_itself(text in arb_literal()) {
        prop_assert!(matches_pattern(&text, &text));
    }

    /// Wrapping a literal in `*` matches any subject containing it.
    #[test]
    fn surrounded_literal_matches_any_container(
        prefix in "[a-z0-9./]{0,20}",
        needle in arb_literal(),
        suffix in "[a-z0-9./]{0,20}",
    ) {
        let pattern = format!("*{}*", needle);
        let subject = format!("{}{}{}", prefix, needle, suffix);
        prop_assert!(matches_pattern(&pattern, &subject));
    }

    /// Matching is anchored: extra trailing text breaks a literal match.
    #[test]
    fn literal_pattern_is_anchored(text in arb_literal(), extra in "[a-z]{1,10}") {
        let subject = format!("{}{}", text, extra);
        prop_assert!(!matches_pattern(&text, &subject));
    }

    /// Case never affects the outcome.
    #[test]
    fn matching_ignores_case(text in "[a-zA-Z./:]{1,30}") {
        let pattern = format!("*{}*", text.to_lowercase());
        prop_assert!(matches_pattern(&pattern, &text.to_uppercase()));
    }

    /// A lone `*` matches every non-empty subject.
    #[test]
    fn star_matches_everything(subject in arb_literal()) {
        prop_assert!(matches_pattern("*", &subject));
    }
}
