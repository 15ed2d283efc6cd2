//! Property-based tests for URL normalization.
//!
//! Normalization drops the fragment and nothing else that matters for
//! duplicate detection.

use proptest::prelude::*;

use tabkeeper::managers::url_registry::normalize_url;

fn arb_url() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("http"), Just("https")],
        "[a-z]{1,10}(\\.[a-z]{2,5}){1,2}",
        "(/[a-zA-Z0-9_-]{1,8}){0,4}",
        proptest::option::of("[a-z]{1,5}=[a-z0-9]{1,5}"),
    )
        .prop_map(|(scheme, host, path, query)| match query {
            Some(q) => format!("{}://{}{}?{}", scheme, host, path, q),
            None => format!("{}://{}{}", scheme, host, path),
        })
}

proptest! {
    #[test]
    fn normalized_url_has_no_fragment(url in arb_url(), fragment in "[a-zA-Z0-9_-]{0,12}") {
        let with_fragment = format!("{}#{}", url, fragment);
        prop_assert!(!normalize_url(&with_fragment).contains('#'));
    }

    #[test]
    fn fragment_does_not_change_identity(url in arb_url(), fragment in "[a-zA-Z0-9_-]{1,12}") {
        let with_fragment = format!("{}#{}", url, fragment);
        prop_assert_eq!(normalize_url(&with_fragment), normalize_url(&url));
    }

    #[test]
    fn normalization_is_idempotent(url in arb_url()) {
        let once = normalize_url(&url);
        prop_assert_eq!(normalize_url(&once), once.clone());
    }

    #[test]
    fn distinct_paths_stay_distinct(url in arb_url(), segment in "[a-z]{3,8}") {
        let base = url.split('?').next().unwrap_or(&url).to_string();
        let a = format!("{}/{}-a", base, segment);
        let b = format!("{}/{}-b", base, segment);
        prop_assert_ne!(normalize_url(&a), normalize_url(&b));
    }

    #[test]
    fn unparseable_input_is_cut_at_first_hash(text in "[a-z ]{1,20}", rest in "[a-z#]{0,10}") {
        let raw = format!("{}#{}", text, rest);
        prop_assert_eq!(normalize_url(&raw), text);
    }
}
