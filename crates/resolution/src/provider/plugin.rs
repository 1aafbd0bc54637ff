//! Live data from the game client plugin.
//!
//! The plugin is reached through a [`PluginBridge`]. The bundled
//! [`SnapshotBridge`] holds the latest data the plugin pushed, keyed by
//! descriptor, and announces new data on the invalidation bus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::json;
use tokio::time::Instant;

use crate::bus::{BusEvent, InvalidationBus, PLUGIN_DATA_UPDATED};
use crate::errors::ProviderError;
use crate::models::{sources, Payload, RequestDescriptor};

use super::{ProviderOutcome, SourceProvider};

/// Capability exposed by the plugin runtime.
#[async_trait]
pub trait PluginBridge: Send + Sync {
    /// Whether the plugin publishes data for `domain`.
    fn supports(&self, domain: &str) -> bool;

    /// Current plugin data for `descriptor`, `None` when it has none.
    async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Option<Payload>, ProviderError>;
}

/// Provider wrapping a [`PluginBridge`]. Highest priority when present.
pub struct PluginProvider {
    bridge: Arc<dyn PluginBridge>,
}

impl PluginProvider {
    pub fn new(bridge: Arc<dyn PluginBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl SourceProvider for PluginProvider {
    fn id(&self) -> &'static str {
        sources::PLUGIN
    }

    fn priority(&self) -> i32 {
        0
    }

    fn supports(&self, domain: &str) -> bool {
        self.bridge.supports(domain)
    }

    async fn attempt(&self, descriptor: &RequestDescriptor, _deadline: Instant) -> ProviderOutcome {
        let result = self.bridge.fetch(descriptor).await;
        if let Err(e) = &result {
            debug!("Plugin bridge failed for '{}': {}", descriptor, e);
        }
        ProviderOutcome::from_result(sources::PLUGIN, result)
    }
}

/// Bridge over the most recent snapshots pushed by the plugin.
///
/// Snapshots are stored under the descriptor's cache key, so any subject
/// spelling that normalizes to the same key finds the same data.
#[derive(Default)]
pub struct SnapshotBridge {
    domains: Vec<String>,
    snapshots: RwLock<HashMap<String, Payload>>,
    bus: Option<InvalidationBus>,
}

impl SnapshotBridge {
    /// A bridge serving `domains`.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            snapshots: RwLock::new(HashMap::new()),
            bus: None,
        }
    }

    /// Announce pushed snapshots on `bus` as [`PLUGIN_DATA_UPDATED`].
    pub fn with_bus(mut self, bus: InvalidationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Store the plugin's latest data for `descriptor`.
    pub fn push(&self, descriptor: &RequestDescriptor, payload: Payload) {
        self.snapshots
            .write()
            .unwrap_or_else(|poisoned| {
                warn!("Snapshot bridge lock was poisoned, recovering");
                poisoned.into_inner()
            })
            .insert(descriptor.cache_key().to_string(), payload);

        if let Some(bus) = &self.bus {
            bus.publish(BusEvent::with_payload(
                PLUGIN_DATA_UPDATED,
                json!({ "domain": descriptor.domain(), "key": descriptor.cache_key() }),
            ));
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PluginBridge for SnapshotBridge {
    fn supports(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }

    async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Option<Payload>, ProviderError> {
        let snapshots = self.snapshots.read().map_err(|_| ProviderError::Bridge {
            provider: sources::PLUGIN.to_string(),
            message: "snapshot lock poisoned".to_string(),
        })?;
        Ok(snapshots.get(descriptor.cache_key()).cloned())
    }
}
