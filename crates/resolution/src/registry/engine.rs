//! Resolution engine: walks providers in priority order and merges what they return.
//!
//! The engine owns:
//! - Provider ordering (declared priority, settings overrides, registration order)
//! - Per-domain merge and completeness rules
//! - The record cache and request coalescing
//! - Circuit breaking and deadlines around each provider attempt
//! - Diagnostic tracking for every walk

use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use tokio::time::Instant;

use super::{CircuitBreaker, CircuitState, DomainPolicy, EngineSettings, FetchDiagnostics, SkipReason};
use crate::bus::{BusEvent, InvalidationBus, Subscription, INVALIDATE_DOMAIN, INVALIDATE_KEY};
use crate::cache::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::errors::{ProviderError, ResolutionError, RetryClass};
use crate::models::{RequestDescriptor, ResolvedRecord, SourceId};
use crate::provider::{ProviderOutcome, SourceProvider};

type SharedWalk = Shared<BoxFuture<'static, ResolvedRecord>>;

/// A running walk and the flag invalidation raises when its result goes stale.
struct InflightWalk {
    walk: SharedWalk,
    stale: Arc<AtomicBool>,
}

/// Cached records must answer the key they are stored under.
fn record_matches_key(key: &str, record: &ResolvedRecord) -> bool {
    record.key() == key
}

struct EngineInner {
    /// Sorted once at build time; the sort is stable so ties keep registration order.
    providers: Vec<Arc<dyn SourceProvider>>,
    policies: HashMap<String, DomainPolicy>,
    default_policy: DomainPolicy,
    settings: EngineSettings,
    cache: CacheStore<ResolvedRecord>,
    circuit_breaker: CircuitBreaker,
    clock: Arc<dyn Clock>,
    inflight: Mutex<HashMap<String, InflightWalk>>,
    bus: InvalidationBus,
    /// Handlers on `bus`, registered for the engine's lifetime.
    _subscriptions: Vec<Subscription>,
}

/// Removes the in-flight entry when a walk ends, including by panic.
///
/// Only the walk's own entry is removed; after an invalidation the key may
/// already belong to a newer walk.
struct InflightGuard {
    inner: Arc<EngineInner>,
    key: String,
    stale: Arc<AtomicBool>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut inflight = self.inner.lock_inflight();
        if inflight
            .get(&self.key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.stale, &self.stale))
        {
            inflight.remove(&self.key);
        }
    }
}

/// Resolves request descriptors against an ordered chain of source providers.
///
/// Cheap to clone; clones share the cache, circuit breaker and bus.
///
/// # Example
///
/// ```ignore
/// use groupscape_resolution::{standard_policies, ResolutionEngine, RequestDescriptor};
/// use groupscape_resolution::provider::fallback::FallbackProvider;
///
/// let engine = ResolutionEngine::builder()
///     .provider(Arc::new(FallbackProvider::default()))
///     .policies(standard_policies())
///     .build()?;
///
/// let record = engine.resolve(&RequestDescriptor::new("activities", "group42")?).await;
/// ```
#[derive(Clone)]
pub struct ResolutionEngine {
    inner: Arc<EngineInner>,
}

impl ResolutionEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Resolve `descriptor`, from cache when possible.
    ///
    /// Never fails: provider errors degrade the record, and a walk that
    /// produced nothing returns an empty record sourced `none`.
    ///
    /// Concurrent calls for the same cache key share one walk. The walk runs
    /// on its own task, so a caller that stops waiting does not cancel it and
    /// its result still reaches the cache.
    pub async fn resolve(&self, descriptor: &RequestDescriptor) -> ResolvedRecord {
        let key = descriptor.cache_key();
        if let Some(record) = self.inner.cache.get(key) {
            debug!("Cache hit for '{}'", key);
            return record;
        }

        let walk = {
            let mut inflight = self.inner.lock_inflight();
            if let Some(existing) = inflight.get(key) {
                debug!("Joining in-flight resolution of '{}'", key);
                existing.walk.clone()
            } else {
                // A walk may have finished between the first lookup and the lock
                if let Some(record) = self.inner.cache.get(key) {
                    debug!("Cache hit for '{}'", key);
                    return record;
                }
                debug!("Cache miss for '{}', walking providers", key);
                let entry = self.spawn_walk(descriptor.clone());
                let walk = entry.walk.clone();
                inflight.insert(key.to_string(), entry);
                walk
            }
        };

        walk.await
    }

    /// Start a walk on its own task. The caller registers it as in flight
    /// while still holding the in-flight lock.
    fn spawn_walk(&self, descriptor: RequestDescriptor) -> InflightWalk {
        let inner = Arc::clone(&self.inner);
        let key = descriptor.cache_key().to_string();
        let stale = Arc::new(AtomicBool::new(false));
        let walk_stale = Arc::clone(&stale);

        let handle = tokio::spawn(async move {
            let _guard = InflightGuard {
                inner: Arc::clone(&inner),
                key: descriptor.cache_key().to_string(),
                stale: Arc::clone(&walk_stale),
            };
            let record = inner.walk(&descriptor).await;
            inner.store(&descriptor, &record, &walk_stale);
            record
        });

        let clock = Arc::clone(&self.inner.clock);
        let walk = async move {
            handle.await.unwrap_or_else(|e| {
                warn!("Resolution of '{}' aborted: {}", key, e);
                ResolvedRecord::empty(key, clock.now())
            })
        }
        .boxed()
        .shared();

        InflightWalk { walk, stale }
    }

    /// Drop the cached record for `descriptor`.
    pub fn invalidate(&self, descriptor: &RequestDescriptor) -> bool {
        self.invalidate_key(descriptor.cache_key())
    }

    /// Drop the cached record stored under `key`.
    ///
    /// A walk for `key` still in flight will not cache its result, and the
    /// next `resolve` starts a fresh walk instead of joining it.
    pub fn invalidate_key(&self, key: &str) -> bool {
        self.inner.invalidate_key(key)
    }

    /// Drop every cached record of `domain`.
    pub fn invalidate_domain(&self, domain: &str) -> usize {
        self.inner.invalidate_prefix(&RequestDescriptor::domain_prefix(domain))
    }

    /// Register `handler` on the engine's bus.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(topic, handler)
    }

    /// The bus this engine listens on.
    pub fn bus(&self) -> &InvalidationBus {
        &self.inner.bus
    }

    /// Invalidate this engine's cache from `bus` events.
    ///
    /// Listens to [`INVALIDATE_KEY`], [`INVALIDATE_DOMAIN`] and every
    /// policy's own invalidation topics. The engine binds its own bus at build
    /// time; use this for additional buses. Handlers stay registered while
    /// the returned subscriptions are alive.
    pub fn bind(&self, bus: &InvalidationBus) -> Vec<Subscription> {
        bind_cache_handlers(&Arc::downgrade(&self.inner), bus, &self.inner.policies)
    }

    pub fn is_cached(&self, descriptor: &RequestDescriptor) -> bool {
        self.inner.cache.get(descriptor.cache_key()).is_some()
    }

    /// Sweep expired records. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.cache.purge_expired()
    }

    pub fn cached_len(&self) -> usize {
        self.inner.cache.len()
    }

    /// Ids of the providers a walk for `domain` would visit, in order.
    pub fn providers_for(&self, domain: &str) -> Vec<&'static str> {
        let domain = domain.trim().to_ascii_lowercase();
        self.inner
            .providers
            .iter()
            .filter(|p| p.supports(&domain))
            .map(|p| p.id())
            .collect()
    }

    pub fn circuit_state(&self, provider_id: &str) -> CircuitState {
        self.inner.circuit_breaker.state(provider_id)
    }

    pub fn reset_circuit(&self, provider_id: &str) {
        self.inner.circuit_breaker.reset(provider_id);
    }
}

impl EngineInner {
    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<String, InflightWalk>> {
        self.inflight.lock().unwrap_or_else(|poisoned| {
            warn!("In-flight map mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn policy_for(&self, domain: &str) -> &DomainPolicy {
        self.policies.get(domain).unwrap_or(&self.default_policy)
    }

    /// Cache a finished walk unless it was invalidated while running.
    ///
    /// Checked and written under the in-flight lock, which invalidation also
    /// holds, so an invalidation is never overtaken by an older result.
    fn store(&self, descriptor: &RequestDescriptor, record: &ResolvedRecord, stale: &AtomicBool) {
        let _inflight = self.lock_inflight();
        if stale.load(Ordering::SeqCst) {
            debug!("'{}' was invalidated during its walk, not caching", descriptor);
            return;
        }
        let ttl = self
            .policy_for(descriptor.domain())
            .ttl()
            .unwrap_or(self.settings.default_ttl);
        self.cache.set(descriptor.cache_key(), record.clone(), ttl);
    }

    fn invalidate_key(&self, key: &str) -> bool {
        let mut inflight = self.lock_inflight();
        if let Some(entry) = inflight.remove(key) {
            debug!("Dropping in-flight resolution of '{}'", key);
            entry.stale.store(true, Ordering::SeqCst);
        }
        self.cache.invalidate(key)
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut inflight = self.lock_inflight();
        inflight.retain(|key, entry| {
            let keep = !key.starts_with(prefix);
            if !keep {
                debug!("Dropping in-flight resolution of '{}'", key);
                entry.stale.store(true, Ordering::SeqCst);
            }
            keep
        });
        self.cache.invalidate_by_prefix(prefix)
    }

    /// Walk the provider chain once.
    ///
    /// For each provider, in order:
    /// 1. Skip it if it doesn't serve the domain
    /// 2. Terminal providers: skip if the policy keeps them for empty records only
    /// 3. Others: skip once the resolve deadline passed or the circuit is open
    /// 4. Attempt under a deadline, converting panics and timeouts into failures
    /// 5. Merge a success and stop once the record is complete
    async fn walk(&self, descriptor: &RequestDescriptor) -> ResolvedRecord {
        let domain = descriptor.domain();
        let policy = self.policy_for(domain);
        let resolve_deadline = self.settings.resolve_deadline.map(|d| Instant::now() + d);

        let mut record = ResolvedRecord::empty(descriptor.cache_key(), self.clock.now());
        let mut diagnostics = FetchDiagnostics::new();

        for provider in &self.providers {
            let provider_id: SourceId = Cow::Borrowed(provider.id());

            if !provider.supports(domain) {
                diagnostics.record_skip(provider_id, SkipReason::DomainNotSupported);
                continue;
            }

            let terminal = provider.is_terminal();
            if terminal {
                if policy.skips_fallback_when_populated() && !record.is_empty() {
                    diagnostics.record_skip(provider_id, SkipReason::RecordAlreadyPopulated);
                    continue;
                }
            } else {
                if resolve_deadline.is_some_and(|d| Instant::now() >= d) {
                    debug!("Resolve deadline passed, skipping '{}'", provider_id);
                    diagnostics.record_skip(provider_id, SkipReason::DeadlineExceeded);
                    continue;
                }
                if !self.circuit_breaker.is_allowed(&provider_id) {
                    debug!("Circuit breaker open for '{}', skipping", provider_id);
                    diagnostics.record_skip(provider_id, SkipReason::CircuitBreakerOpen);
                    continue;
                }
            }

            let timeout = provider.timeout().unwrap_or(self.settings.provider_timeout);
            let mut deadline = Instant::now() + timeout;
            if !terminal {
                if let Some(d) = resolve_deadline {
                    deadline = deadline.min(d);
                }
            }

            debug!("Attempting '{}' for '{}'", provider_id, descriptor);
            match attempt_guarded(provider.as_ref(), descriptor, deadline).await {
                ProviderOutcome::Success(mut result) if !result.is_empty() => {
                    // Provenance is the provider's id and the engine's clock,
                    // whatever the payload claims
                    result.source_id = provider_id.clone();
                    result.fetched_at = self.clock.now();

                    let before = record.populated();
                    record = policy.merge().merge(record, &result);
                    let contributed = record.populated().saturating_sub(before);

                    if !terminal {
                        self.circuit_breaker.record_success(&provider_id);
                    }
                    debug!(
                        "'{}' contributed {} entries to '{}'{}",
                        provider_id,
                        contributed,
                        descriptor,
                        if result.partial() { " (partial)" } else { "" }
                    );
                    diagnostics.record_success(provider_id, contributed);

                    if policy.completeness().is_complete(&record) {
                        debug!("'{}' complete, stopping walk", descriptor);
                        break;
                    }
                }
                ProviderOutcome::Success(_) | ProviderOutcome::Empty => {
                    if !terminal {
                        self.circuit_breaker.record_success(&provider_id);
                    }
                    debug!("'{}' had no data for '{}'", provider_id, descriptor);
                    diagnostics.record_empty(provider_id);
                }
                ProviderOutcome::Failure(e) => {
                    if !terminal && e.retry_class() == RetryClass::FailoverWithPenalty {
                        self.circuit_breaker.record_failure(&provider_id);
                    }
                    debug!(
                        "'{}' failed for '{}': {}, trying next provider",
                        provider_id, descriptor, e
                    );
                    diagnostics.record_error(provider_id, e.to_string());
                }
            }
        }

        if record.is_empty() {
            warn!(
                "No provider produced data for '{}'. Diagnostics: {}",
                descriptor,
                diagnostics.summary()
            );
        } else {
            debug!("Resolved '{}'. Diagnostics: {}", descriptor, diagnostics.summary());
        }

        record.set_diagnostics(diagnostics);
        record
    }

    fn invalidate_domain_logged(&self, domain: &str, topic: &str) {
        let removed = self.invalidate_prefix(&RequestDescriptor::domain_prefix(domain));
        if removed > 0 {
            info!(
                "Invalidated {} '{}' record(s) on '{}'",
                removed, domain, topic
            );
        }
    }
}

fn bind_cache_handlers(
    engine: &Weak<EngineInner>,
    bus: &InvalidationBus,
    policies: &HashMap<String, DomainPolicy>,
) -> Vec<Subscription> {
    let mut subscriptions = Vec::new();

    let weak = engine.clone();
    subscriptions.push(bus.subscribe(INVALIDATE_KEY, move |event: &BusEvent| {
        if let (Some(inner), Some(key)) = (weak.upgrade(), event.payload_str("key")) {
            if inner.invalidate_key(key) {
                info!("Invalidated '{}' on bus request", key);
            }
        }
    }));

    let weak = engine.clone();
    subscriptions.push(bus.subscribe(INVALIDATE_DOMAIN, move |event: &BusEvent| {
        if let (Some(inner), Some(domain)) = (weak.upgrade(), event.payload_str("domain")) {
            inner.invalidate_domain_logged(domain, INVALIDATE_DOMAIN);
        }
    }));

    for policy in policies.values() {
        for topic in policy.invalidation_topics() {
            let weak = engine.clone();
            let domain = policy.domain().to_string();
            let topic_name = topic.clone();
            subscriptions.push(bus.subscribe(topic.clone(), move |_: &BusEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.invalidate_domain_logged(&domain, &topic_name);
                }
            }));
        }
    }

    subscriptions
}

/// Run one attempt, bounded by `deadline`, with panics caught.
async fn attempt_guarded(
    provider: &dyn SourceProvider,
    descriptor: &RequestDescriptor,
    deadline: Instant,
) -> ProviderOutcome {
    let started = Instant::now();
    let attempt = AssertUnwindSafe(provider.attempt(descriptor, deadline)).catch_unwind();

    match tokio::time::timeout_at(deadline, attempt).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => {
            warn!("Provider '{}' panicked during attempt", provider.id());
            ProviderOutcome::Failure(ProviderError::Panicked {
                provider: provider.id().to_string(),
            })
        }
        Err(_) => ProviderOutcome::Failure(ProviderError::Timeout {
            provider: provider.id().to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }),
    }
}

/// Builder for [`ResolutionEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    providers: Vec<Arc<dyn SourceProvider>>,
    policies: Vec<DomainPolicy>,
    settings: EngineSettings,
    clock: Option<Arc<dyn Clock>>,
    bus: Option<InvalidationBus>,
}

impl EngineBuilder {
    /// Register a provider. Registration order breaks priority ties.
    pub fn provider(mut self, provider: Arc<dyn SourceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn domain(mut self, policy: DomainPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn policies(mut self, policies: impl IntoIterator<Item = DomainPolicy>) -> Self {
        self.policies.extend(policies);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Clock for cache expiry and circuit recovery. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Bus the engine listens on. Defaults to a private bus.
    pub fn bus(mut self, bus: InvalidationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<ResolutionEngine, ResolutionError> {
        self.settings.validate()?;

        let mut seen_ids: Vec<&str> = Vec::new();
        for provider in &self.providers {
            if seen_ids.contains(&provider.id()) {
                return Err(ResolutionError::InvalidConfig(format!(
                    "provider '{}' registered twice",
                    provider.id()
                )));
            }
            seen_ids.push(provider.id());
        }

        let mut policies = HashMap::new();
        for policy in self.policies {
            if policy.domain().is_empty() {
                return Err(ResolutionError::InvalidConfig(
                    "domain policy without a domain".to_string(),
                ));
            }
            if policies.contains_key(policy.domain()) {
                return Err(ResolutionError::InvalidConfig(format!(
                    "domain '{}' configured twice",
                    policy.domain()
                )));
            }
            policies.insert(policy.domain().to_string(), policy);
        }

        let settings = self.settings;
        let mut providers = self.providers;
        providers.sort_by_key(|p| {
            settings
                .priorities
                .get(p.id())
                .copied()
                .unwrap_or_else(|| p.priority())
        });

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let bus = self.bus.unwrap_or_default();

        let inner = Arc::new_cyclic(|weak| {
            let subscriptions = bind_cache_handlers(weak, &bus, &policies);
            EngineInner {
                providers,
                policies,
                default_policy: DomainPolicy::new("*"),
                cache: CacheStore::with_clock(Arc::clone(&clock))
                    .with_validator(record_matches_key),
                circuit_breaker: CircuitBreaker::with_config(
                    settings.circuit_breaker.clone(),
                    Arc::clone(&clock),
                ),
                settings,
                clock,
                inflight: Mutex::new(HashMap::new()),
                bus,
                _subscriptions: subscriptions,
            }
        });

        info!(
            "Resolution engine ready with providers [{}] and {} domain policies",
            inner
                .providers
                .iter()
                .map(|p| p.id())
                .collect::<Vec<_>>()
                .join(", "),
            inner.policies.len()
        );

        Ok(ResolutionEngine { inner })
    }
}
