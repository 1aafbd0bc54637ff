//! Shared scripted providers for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use groupscape_resolution::{
    Payload, ProviderError, ProviderOutcome, ProviderResult, RequestDescriptor, SourceProvider,
};
use serde_json::{json, Value};
use tokio::time::Instant;

/// What a scripted provider does on every attempt.
#[derive(Clone)]
pub enum Behavior {
    Returns(Payload),
    Empty,
    Fails,
    Panics,
    /// Sleeps this long, then returns the payload.
    Slow(Duration, Payload),
}

/// Provider with a fixed behavior and a call counter.
pub struct ScriptedProvider {
    id: &'static str,
    priority: i32,
    behavior: Behavior,
    domains: Option<Vec<&'static str>>,
    terminal: bool,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(id: &'static str, priority: i32, behavior: Behavior) -> Self {
        Self {
            id,
            priority,
            behavior,
            domains: None,
            terminal: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn only(mut self, domains: &[&'static str]) -> Self {
        self.domains = Some(domains.to_vec());
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for ScriptedProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn supports(&self, domain: &str) -> bool {
        self.domains
            .as_ref()
            .map_or(true, |domains| domains.contains(&domain))
    }

    fn is_terminal(&self) -> bool {
        self.terminal
    }

    async fn attempt(&self, _descriptor: &RequestDescriptor, _deadline: Instant) -> ProviderOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Returns(payload) => {
                ProviderOutcome::Success(ProviderResult::new(self.id, payload.clone()))
            }
            Behavior::Empty => ProviderOutcome::Empty,
            Behavior::Fails => ProviderOutcome::Failure(ProviderError::Network {
                provider: self.id.to_string(),
                message: "connection reset".to_string(),
            }),
            Behavior::Panics => panic!("{} blew up", self.id),
            Behavior::Slow(delay, payload) => {
                tokio::time::sleep(*delay).await;
                ProviderOutcome::Success(ProviderResult::new(self.id, payload.clone()))
            }
        }
    }
}

pub fn fields(pairs: &[(&str, Value)]) -> Payload {
    pairs
        .iter()
        .fold(Payload::new(), |p, (k, v)| p.with_field(*k, v.clone()))
}

pub fn activities(ids: &[&str]) -> Payload {
    Payload::new().with_items(
        ids.iter()
            .map(|id| json!({ "id": id, "type": "joined" }))
            .collect(),
    )
}
