//! Publish/subscribe bus used to invalidate cached resolutions.
//!
//! The bus does not carry resolution results. Subscribers react to staleness
//! signals (new plugin data, a group update) by dropping cache entries;
//! consumers then call `resolve` again.
//!
//! Handlers run synchronously on the publishing thread. A panicking handler
//! is logged and skipped; the remaining subscribers still receive the event.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, warn};
use serde_json::{json, Value};

/// Canonical topic names.
pub const INVALIDATE_KEY: &str = "cache:invalidate-key";
pub const INVALIDATE_DOMAIN: &str = "cache:invalidate-domain";
pub const PLUGIN_DATA_UPDATED: &str = "plugin:data-updated";
pub const GROUP_DATA_UPDATED: &str = "group:data-updated";
pub const CALENDAR_UPDATED: &str = "calendar:updated";

/// Envelope carrying a topic and an optional JSON payload.
#[derive(Clone, Debug, PartialEq)]
pub struct BusEvent {
    pub topic: String,
    pub payload: Option<Value>,
}

impl BusEvent {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: None,
        }
    }

    pub fn with_payload(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload: Some(payload),
        }
    }

    /// Ask subscribers to drop the entry stored under `key`.
    pub fn invalidate_key(key: &str) -> Self {
        Self::with_payload(INVALIDATE_KEY, json!({ "key": key }))
    }

    /// Ask subscribers to drop every entry of `domain`.
    pub fn invalidate_domain(domain: &str) -> Self {
        Self::with_payload(INVALIDATE_DOMAIN, json!({ "domain": domain }))
    }

    /// String member `name` of the payload, if any.
    pub fn payload_str(&self, name: &str) -> Option<&str> {
        self.payload.as_ref()?.get(name)?.as_str()
    }
}

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(u64, Handler)>>>,
}

impl BusInner {
    fn lock_handlers(&self) -> MutexGuard<'_, HashMap<String, Vec<(u64, Handler)>>> {
        self.handlers.lock().unwrap_or_else(|poisoned| {
            warn!("Invalidation bus mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn remove(&self, topic: &str, id: u64) {
        let mut handlers = self.lock_handlers();
        if let Some(list) = handlers.get_mut(topic) {
            list.retain(|(hid, _)| *hid != id);
            if list.is_empty() {
                handlers.remove(topic);
            }
        }
    }
}

/// Topic-based synchronous event bus.
///
/// Cheap to clone; clones share the same subscriber table.
#[derive(Clone, Default)]
pub struct InvalidationBus {
    inner: Arc<BusInner>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock_handlers()
            .entry(topic.clone())
            .or_default()
            .push((id, Arc::new(handler)));

        debug!("Bus: subscription {} added for '{}'", id, topic);
        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
        }
    }

    /// Deliver `event` to every subscriber of its topic.
    ///
    /// Returns the number of handlers that ran to completion.
    pub fn publish(&self, event: BusEvent) -> usize {
        // Snapshot so handlers may subscribe or unsubscribe while we dispatch
        let handlers: Vec<Handler> = self
            .inner
            .lock_handlers()
            .get(&event.topic)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("Bus: handler for '{}' panicked, continuing", event.topic),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .lock_handlers()
            .get(topic)
            .map_or(0, |list| list.len())
    }
}

/// Handle to a registered handler; unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: String,
    id: u64,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove the handler now.
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(&self.topic, self.id);
        }
    }
}
