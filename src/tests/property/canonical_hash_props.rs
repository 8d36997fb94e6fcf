//! Property-based tests for request canonicalization
//!
//! Tests invariants:
//! - Hash is invariant under object key order, including nested objects
//! - Canonical text always reparses to the same value
//! - Changing any value changes the hash

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::core::cache::CanonicalParams;

// ============================================================================
// Strategies
// ============================================================================

fn arb_fields() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::btree_map("[a-z_]{1,8}", any::<i64>(), 1..8)
        .prop_map(|m: BTreeMap<String, i64>| m.into_iter().collect::<Vec<_>>())
}

/// Same fields in two independent orders
fn arb_reordered() -> impl Strategy<Value = (Vec<(String, i64)>, Vec<(String, i64)>)> {
    arb_fields().prop_flat_map(|fields| (Just(fields.clone()).prop_shuffle(), Just(fields).prop_shuffle()))
}

fn object_text(fields: &[(String, i64)], nested: &str) -> String {
    let mut parts: Vec<String> = fields.iter().map(|(k, v)| format!("\"{k}\":{v}")).collect();
    parts.push(format!("\"Nested\":{nested}"));
    format!("{{{}}}", parts.join(","))
}

fn params(text: &str) -> CanonicalParams {
    CanonicalParams::from_value(serde_json::from_str(text).unwrap())
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: key order never changes the hash, at any depth
    #[test]
    fn prop_hash_ignores_key_order(
        (outer_a, outer_b) in arb_reordered(),
        (inner_a, inner_b) in arb_reordered(),
    ) {
        let a = object_text(&outer_a, &object_text(&inner_a, "null"));
        let b = object_text(&outer_b, &object_text(&inner_b, "null"));

        let (pa, pb) = (params(&a), params(&b));
        prop_assert_eq!(pa.hash(), pb.hash());
    }

    /// Property: canonical text is valid JSON for the same value
    #[test]
    fn prop_canonical_text_round_trips(fields in arb_fields()) {
        let original = params(&object_text(&fields, "[1,\"two\",{\"z\":true,\"a\":false}]"));
        let reparsed: serde_json::Value = serde_json::from_str(original.canonical()).unwrap();

        prop_assert_eq!(&reparsed, original.value());
        let rehashed = CanonicalParams::from_value(reparsed);
        prop_assert_eq!(rehashed.hash(), original.hash());
    }

    /// Property: any changed value changes the hash
    #[test]
    fn prop_changed_value_changes_hash(fields in arb_fields(), index in any::<prop::sample::Index>()) {
        let mut changed = fields.clone();
        let i = index.index(changed.len());
        changed[i].1 = changed[i].1.wrapping_add(1);

        let before = params(&object_text(&fields, "null"));
        let after = params(&object_text(&changed, "null"));
        prop_assert_ne!(before.hash(), after.hash());
    }
}
