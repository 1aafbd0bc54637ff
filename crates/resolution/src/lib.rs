//! Groupscape Resolution Crate
//!
//! This crate resolves panel data (group activity, player stats, collection
//! log items, calendar events) from several data origins tried in a fixed
//! priority order, merging what they return and tagging every datum with the
//! provider that supplied it.
//!
//! # Overview
//!
//! The resolution crate supports:
//! - Multiple providers: plugin bridge, aggregation API, wiki prices API, mock fallback
//! - Per-domain merge and completeness rules
//! - A TTL cache with request coalescing and bus-driven invalidation
//! - Circuit breaking and per-attempt deadlines
//!
//! # Architecture
//!
//! ```text
//! +-------------------+     +------------------+
//! |    Panel Layer    | --> | RequestDescriptor|  (domain + subject + range)
//! +-------------------+     +------------------+
//!                                   |
//!                                   v
//!                           +------------------+
//!                           | ResolutionEngine |  <-- InvalidationBus
//!                           +------------------+
//!                              |           |
//!                     hit      v           v  miss
//!                   +------------+   +------------------+
//!                   | CacheStore |   |  SourceProvider  |  (plugin, aggregation,
//!                   +------------+   |  chain, in order |   wiki, fallback)
//!                                    +------------------+
//!                                             |
//!                                             v
//!                                    +------------------+
//!                                    |  MergeStrategy   |  (fill gaps, dedup)
//!                                    +------------------+
//!                                             |
//!                                             v
//!                                    +------------------+
//!                                    |  ResolvedRecord  |  (per-field provenance)
//!                                    +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`RequestDescriptor`] - What is being resolved, and its cache key
//! - [`ResolvedRecord`] - Merged fields and items, each with its source
//! - [`ResolutionEngine`] - Walks providers and owns the cache
//! - [`SourceProvider`] - One data origin behind a never-failing `attempt`
//! - [`DomainPolicy`] - Merge, completeness, TTL and invalidation per domain
//! - [`InvalidationBus`] - Topic pub/sub used to drop stale cache entries
//!
//! # Type Aliases
//!
//! - [`SourceId`] - Provider identifier (e.g., "plugin", "wiki")

pub mod bus;
pub mod cache;
pub mod clock;
pub mod errors;
pub mod merge;
pub mod models;
pub mod provider;
pub mod registry;

// Re-export all public types from models
pub use models::{
    domains, identity_of, sources, Payload, ProviderResult, RequestDescriptor, ResolvedField,
    ResolvedItem, ResolvedRecord, SourceId, TimeRange,
};

pub use bus::{BusEvent, InvalidationBus, Subscription};
pub use cache::{CacheEntry, CacheStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{ProviderError, ResolutionError, RetryClass};
pub use merge::{
    Completeness, DedupByIdentity, FillMissing, MergeStrategy, NonEmptyItems, RequiredFields,
    WalkAll,
};

// Re-export provider types
pub use provider::aggregation::{AggregationProvider, AGGREGATION_TTL, GROUP_ID_TTL};
pub use provider::fallback::{FallbackGenerator, FallbackProvider, MockDataGenerator};
pub use provider::plugin::{PluginBridge, PluginProvider, SnapshotBridge};
pub use provider::unavailable::UnavailableProvider;
pub use provider::wiki::{WikiProvider, WIKI_METADATA_TTL};
pub use provider::{ProviderOutcome, SourceProvider};

// Re-export registry types
pub use registry::{
    standard_policies, AttemptStatus, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    DomainPolicy, EngineBuilder, EngineSettings, FetchDiagnostics, ProviderAttempt,
    ResolutionEngine, SkipReason,
};
