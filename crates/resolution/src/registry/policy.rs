//! Per-domain resolution rules.

use std::sync::Arc;
use std::time::Duration;

use crate::bus::{CALENDAR_UPDATED, GROUP_DATA_UPDATED, PLUGIN_DATA_UPDATED};
use crate::merge::{
    Completeness, DedupByIdentity, FillMissing, MergeStrategy, NonEmptyItems, RequiredFields,
    WalkAll,
};
use crate::models::{domains, ResolvedRecord};
use crate::provider::aggregation::AGGREGATION_TTL;
use crate::provider::wiki::WIKI_METADATA_TTL;

/// How one domain is merged, when its walk may stop, how long results live,
/// and which bus topics make them stale.
///
/// Domains without a registered policy use [`DomainPolicy::new`]'s defaults:
/// fill-missing merge, complete as soon as anything was found, and the
/// engine's default TTL.
#[derive(Clone)]
pub struct DomainPolicy {
    domain: String,
    ttl: Option<Duration>,
    merge: Arc<dyn MergeStrategy>,
    completeness: Arc<dyn Completeness>,
    invalidate_on: Vec<String>,
    fallback_only_when_empty: bool,
}

fn has_any_data(record: &ResolvedRecord) -> bool {
    !record.is_empty()
}

impl DomainPolicy {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into().trim().to_ascii_lowercase(),
            ttl: None,
            merge: Arc::new(FillMissing),
            completeness: Arc::new(has_any_data),
            invalidate_on: Vec::new(),
            fallback_only_when_empty: false,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_merge(mut self, merge: impl MergeStrategy + 'static) -> Self {
        self.merge = Arc::new(merge);
        self
    }

    pub fn with_completeness(mut self, completeness: impl Completeness + 'static) -> Self {
        self.completeness = Arc::new(completeness);
        self
    }

    /// Drop this domain's cached records whenever `topic` is published.
    pub fn invalidate_on(mut self, topic: impl Into<String>) -> Self {
        self.invalidate_on.push(topic.into());
        self
    }

    /// Only consult terminal providers when nothing else produced data.
    ///
    /// For list domains that walk every provider, this keeps mock items out
    /// of a list that real providers already filled.
    pub fn fallback_only_when_empty(mut self) -> Self {
        self.fallback_only_when_empty = true;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn merge(&self) -> &dyn MergeStrategy {
        self.merge.as_ref()
    }

    pub fn completeness(&self) -> &dyn Completeness {
        self.completeness.as_ref()
    }

    pub fn invalidation_topics(&self) -> &[String] {
        &self.invalidate_on
    }

    pub fn skips_fallback_when_populated(&self) -> bool {
        self.fallback_only_when_empty
    }
}

impl std::fmt::Debug for DomainPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainPolicy")
            .field("domain", &self.domain)
            .field("ttl", &self.ttl)
            .field("invalidate_on", &self.invalidate_on)
            .field("fallback_only_when_empty", &self.fallback_only_when_empty)
            .finish_non_exhaustive()
    }
}

/// Policies for the bundled domains.
pub fn standard_policies() -> Vec<DomainPolicy> {
    vec![
        DomainPolicy::new(domains::ACTIVITIES)
            .with_ttl(AGGREGATION_TTL)
            .with_merge(DedupByIdentity::default())
            .with_completeness(NonEmptyItems)
            .invalidate_on(GROUP_DATA_UPDATED)
            .invalidate_on(PLUGIN_DATA_UPDATED),
        DomainPolicy::new(domains::PLAYER_STATS)
            .with_ttl(AGGREGATION_TTL)
            .with_completeness(RequiredFields::new(["username", "exp"])),
        // Unlock status comes from the plugin, price from the wiki
        DomainPolicy::new(domains::COLLECTION_LOG_ITEM)
            .with_ttl(WIKI_METADATA_TTL)
            .with_completeness(RequiredFields::new(["unlocked", "price"]))
            .invalidate_on(PLUGIN_DATA_UPDATED),
        DomainPolicy::new(domains::CALENDAR_EVENTS)
            .with_merge(DedupByIdentity::default())
            .with_completeness(WalkAll)
            .invalidate_on(CALENDAR_UPDATED)
            .fallback_only_when_empty(),
    ]
}
