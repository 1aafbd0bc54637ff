use std::borrow::Cow;

use crate::models::{identity_of, ProviderResult, ResolvedRecord};

/// Identity field used when a list domain doesn't name one.
const DEFAULT_IDENTITY_FIELD: &str = "id";

/// Combines one provider's result into the record accumulated so far.
///
/// Providers are merged in priority order, so `accumulated` always holds data
/// from higher-priority providers than `incoming`.
pub trait MergeStrategy: Send + Sync {
    fn merge(&self, accumulated: ResolvedRecord, incoming: &ProviderResult) -> ResolvedRecord;
}

/// Default strategy: fill only the gaps.
///
/// Every incoming field that is not yet populated is taken. The item list is
/// treated as a single value: it is taken whole only if the record has no
/// items yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct FillMissing;

impl MergeStrategy for FillMissing {
    fn merge(&self, mut accumulated: ResolvedRecord, incoming: &ProviderResult) -> ResolvedRecord {
        fill_fields(&mut accumulated, incoming);

        if accumulated.items().is_empty() {
            for item in &incoming.payload.items {
                accumulated.push_item(
                    identity_of(item, DEFAULT_IDENTITY_FIELD),
                    item.clone(),
                    &incoming.source_id,
                    incoming.fetched_at,
                );
            }
        }
        accumulated
    }
}

/// List strategy: append items whose identity isn't present yet.
///
/// Fields are merged like [`FillMissing`]. An incoming item is appended only
/// if no existing item shares its identity key, so an item reported by two
/// providers stays attributed to the higher-priority one.
#[derive(Clone, Debug)]
pub struct DedupByIdentity {
    identity_field: Cow<'static, str>,
}

impl DedupByIdentity {
    pub fn new(identity_field: impl Into<Cow<'static, str>>) -> Self {
        Self {
            identity_field: identity_field.into(),
        }
    }

    pub fn identity_field(&self) -> &str {
        &self.identity_field
    }
}

impl Default for DedupByIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_FIELD)
    }
}

impl MergeStrategy for DedupByIdentity {
    fn merge(&self, mut accumulated: ResolvedRecord, incoming: &ProviderResult) -> ResolvedRecord {
        fill_fields(&mut accumulated, incoming);

        for item in &incoming.payload.items {
            accumulated.push_item(
                identity_of(item, &self.identity_field),
                item.clone(),
                &incoming.source_id,
                incoming.fetched_at,
            );
        }
        accumulated
    }
}

fn fill_fields(record: &mut ResolvedRecord, incoming: &ProviderResult) {
    for (name, value) in &incoming.payload.fields {
        record.fill_field(name, value, &incoming.source_id, incoming.fetched_at);
    }
}
