/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use proptest::prelude::*;
use rust_leadops_api::fingerprint::derive_fingerprint;
use rust_leadops_api::models::{EnrichmentResult, ExtractedLead};
use serde_json::{Map, Value};

const IDENTITY_ALIASES: &[&str] = &["email", "phone", "mobile", "tel"];

fn is_identity_key(key: &str) -> bool {
    IDENTITY_ALIASES.iter().any(|a| key.eq_ignore_ascii_case(a))
}

fn string_map(entries: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in entries {
        map.insert(k, Value::String(v));
    }
    map
}

// Property: fingerprint derivation should never panic
proptest! {
    #[test]
    fn derive_never_panics(entries in prop::collection::vec(("\\PC{0,12}", "\\PC{0,16}"), 0..8)) {
        let _ = derive_fingerprint(&string_map(entries));
    }
}

// Property: fingerprint shape
proptest! {
    #[test]
    fn fingerprints_are_fixed_length_lowercase_hex(
        email in "[a-z]{1,10}@[a-z]{1,8}\\.com",
        phone in "[0-9]{8,11}"
    ) {
        let map = string_map(vec![
            ("email".to_string(), email),
            ("phone".to_string(), phone),
        ]);
        let fp = derive_fingerprint(&map).expect("identity fields present");

        prop_assert_eq!(fp.len(), 64);
        prop_assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}

// Property: only identity fields feed the fingerprint
proptest! {
    #[test]
    fn unrelated_fields_never_change_the_fingerprint(
        email in "[a-z]{1,10}@x\\.com",
        extra_key in "[a-z]{1,8}",
        extra_val in "\\PC{0,16}"
    ) {
        prop_assume!(!is_identity_key(&extra_key));

        let base = string_map(vec![("email".to_string(), email.clone())]);
        let extended = string_map(vec![
            ("email".to_string(), email),
            (extra_key, extra_val),
        ]);

        prop_assert_eq!(derive_fingerprint(&base), derive_fingerprint(&extended));
    }
}

// Property: key casing is irrelevant
proptest! {
    #[test]
    fn key_casing_never_changes_the_fingerprint(
        email in "[a-z]{1,10}@x\\.com",
        mask in prop::collection::vec(any::<bool>(), 5)
    ) {
        let cased_key: String = "email"
            .chars()
            .zip(mask)
            .map(|(c, upper)| if upper { c.to_ascii_uppercase() } else { c })
            .collect();

        let lower = string_map(vec![("email".to_string(), email.clone())]);
        let cased = string_map(vec![(cased_key, email)]);

        prop_assert_eq!(derive_fingerprint(&lower), derive_fingerprint(&cased));
    }
}

// Property: surrounding whitespace is irrelevant
proptest! {
    #[test]
    fn value_whitespace_never_changes_the_fingerprint(
        email in "[a-z]{1,10}@x\\.com",
        left in " {0,4}",
        right in " {0,4}"
    ) {
        let clean = string_map(vec![("email".to_string(), email.clone())]);
        let padded = string_map(vec![(
            "email".to_string(),
            format!("{}{}{}", left, email, right),
        )]);

        prop_assert_eq!(derive_fingerprint(&clean), derive_fingerprint(&padded));
    }
}

// Property: result validation matches the documented bounds
proptest! {
    #[test]
    fn score_validation_matches_range(score in -1000i32..1000) {
        let result = EnrichmentResult {
            qualified: true,
            score,
            reasons: vec![],
            lead: ExtractedLead::default(),
        };
        prop_assert_eq!(result.validate().is_ok(), (0..=100).contains(&score));
    }

    #[test]
    fn reasons_validation_matches_bound(count in 0usize..10) {
        let result = EnrichmentResult {
            qualified: false,
            score: 50,
            reasons: (0..count).map(|i| format!("reason {}", i)).collect(),
            lead: ExtractedLead::default(),
        };
        prop_assert_eq!(result.validate().is_ok(), count <= 5);
    }
}
