//! Property-based tests for merging and cache-key normalization.
//!
//! These tests verify that provenance and key invariants hold across random
//! provider payloads and subject spellings, using `proptest`.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use groupscape_resolution::{
    DedupByIdentity, FillMissing, MergeStrategy, Payload, ProviderResult, RequestDescriptor,
    ResolvedRecord,
};
use proptest::prelude::*;
use serde_json::{json, Value};

const SOURCES: [&str; 4] = ["plugin", "aggregation", "wiki", "fallback"];

// =============================================================================
// Generators
// =============================================================================

/// Generates a flat field map drawn from a small name pool so providers overlap.
fn arb_fields() -> impl Strategy<Value = BTreeMap<String, i64>> {
    proptest::collection::btree_map("(username|exp|ehp|price|rank|role)", any::<i64>(), 0..6)
}

/// Generates list items whose ids collide often across providers.
fn arb_item_ids() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(0u8..12, 0..10)
}

/// Generates an ordered chain of provider payloads, one per source.
fn arb_chain() -> impl Strategy<Value = Vec<(BTreeMap<String, i64>, Vec<u8>)>> {
    proptest::collection::vec((arb_fields(), arb_item_ids()), 1..=SOURCES.len())
}

/// Generates `key=value` pairs with distinct keys.
fn arb_params() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{1,8}", 1..5)
        .prop_map(|m| m.into_iter().collect())
}

fn payload(fields: &BTreeMap<String, i64>, ids: &[u8]) -> Payload {
    let base = fields
        .iter()
        .fold(Payload::new(), |p, (k, v)| p.with_field(k.clone(), *v));
    base.with_items(ids.iter().map(|id| json!({ "id": id })).collect())
}

fn merge_chain(
    strategy: &dyn MergeStrategy,
    chain: &[(BTreeMap<String, i64>, Vec<u8>)],
) -> ResolvedRecord {
    let at = DateTime::<Utc>::default();
    chain
        .iter()
        .zip(SOURCES)
        .fold(ResolvedRecord::empty("test:key", at), |record, ((fields, ids), source)| {
            strategy.merge(record, &ProviderResult::at(source, payload(fields, ids), at))
        })
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every field is owned by the first provider in the chain that had it.
    #[test]
    fn prop_fill_missing_never_overwrites(chain in arb_chain()) {
        let record = merge_chain(&FillMissing, &chain);

        for (name, field) in record.fields() {
            let owner = chain
                .iter()
                .zip(SOURCES)
                .find(|((fields, _), _)| fields.contains_key(name))
                .map(|((fields, _), source)| (fields[name], source));

            prop_assert!(owner.is_some(), "field {} came from nowhere", name);
            let (value, source) = owner.unwrap();
            prop_assert_eq!(&field.value, &Value::from(value));
            prop_assert_eq!(field.source_id.as_ref(), source);
        }

        let expected: HashSet<&String> = chain.iter().flat_map(|(f, _)| f.keys()).collect();
        prop_assert_eq!(record.fields().len(), expected.len());
    }

    /// Each identity appears once, attributed to the first provider reporting it.
    #[test]
    fn prop_dedup_keeps_unique_identities(chain in arb_chain()) {
        let record = merge_chain(&DedupByIdentity::default(), &chain);

        let mut seen = HashSet::new();
        for item in record.items() {
            prop_assert!(seen.insert(item.identity.clone()), "duplicate identity {}", item.identity);

            let first = chain
                .iter()
                .zip(SOURCES)
                .find(|((_, ids), _)| ids.iter().any(|id| id.to_string() == item.identity))
                .map(|(_, source)| source);
            prop_assert_eq!(Some(item.source_id.as_ref()), first);
        }

        let expected: HashSet<u8> = chain.iter().flat_map(|(_, ids)| ids.iter().copied()).collect();
        prop_assert_eq!(record.items().len(), expected.len());
    }

    /// FillMissing takes the item list whole from the first provider that has one.
    #[test]
    fn prop_fill_missing_takes_one_list(chain in arb_chain()) {
        let record = merge_chain(&FillMissing, &chain);

        let first_list = chain
            .iter()
            .zip(SOURCES)
            .find(|((_, ids), _)| !ids.is_empty());

        match first_list {
            Some(((_, ids), source)) => {
                let unique: HashSet<&u8> = ids.iter().collect();
                prop_assert_eq!(record.items().len(), unique.len());
                prop_assert!(record.items().iter().all(|i| i.source_id == source));
            }
            None => prop_assert!(record.items().is_empty()),
        }
    }

    /// The cache key ignores parameter order and letter case.
    #[test]
    fn prop_cache_key_ignores_param_order_and_case(
        params in arb_params(),
        shuffle in any::<prop::sample::Index>(),
    ) {
        let joined = |pairs: &[(String, String)]| {
            pairs
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",")
        };

        let mut reordered = params.clone();
        let len = reordered.len();
        reordered.rotate_left(shuffle.index(len));
        let shouted: Vec<(String, String)> = reordered
            .iter()
            .map(|(k, v)| (k.to_uppercase(), v.to_uppercase()))
            .collect();

        let a = RequestDescriptor::new("collection-log-item", joined(&params)).unwrap();
        let b = RequestDescriptor::new(" Collection-Log-Item ", format!(" {} ", joined(&shouted))).unwrap();

        prop_assert_eq!(a.cache_key(), b.cache_key());
    }
}
