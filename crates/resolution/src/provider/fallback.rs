//! Local mock data, the terminal link of every chain.
//!
//! The fallback provider never fails and never comes back empty, which is
//! what guarantees that a resolution only ever degrades in quality.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::models::{domains, sources, Payload, ProviderResult, RequestDescriptor};

use super::{ProviderOutcome, SourceProvider};

/// Field set on every fallback payload so consumers can flag mock data.
pub const MOCK_MARKER: &str = "mock";

/// Produces mock data for a request. Must be pure.
pub trait FallbackGenerator: Send + Sync {
    fn generate(&self, descriptor: &RequestDescriptor) -> Payload;
}

impl<F> FallbackGenerator for F
where
    F: Fn(&RequestDescriptor) -> Payload + Send + Sync,
{
    fn generate(&self, descriptor: &RequestDescriptor) -> Payload {
        self(descriptor)
    }
}

/// Terminal provider over a [`FallbackGenerator`].
pub struct FallbackProvider {
    generator: Box<dyn FallbackGenerator>,
}

impl FallbackProvider {
    pub fn new(generator: impl FallbackGenerator + 'static) -> Self {
        Self {
            generator: Box::new(generator),
        }
    }
}

impl Default for FallbackProvider {
    fn default() -> Self {
        Self::new(MockDataGenerator)
    }
}

#[async_trait]
impl SourceProvider for FallbackProvider {
    fn id(&self) -> &'static str {
        sources::FALLBACK
    }

    fn priority(&self) -> i32 {
        100
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn attempt(&self, descriptor: &RequestDescriptor, _deadline: Instant) -> ProviderOutcome {
        let mut payload = self.generator.generate(descriptor);
        payload
            .fields
            .insert(MOCK_MARKER.to_string(), Value::Bool(true));
        ProviderOutcome::Success(ProviderResult::new(sources::FALLBACK, payload))
    }
}

const ACTIVITY_TYPES: &[&str] = &["joined", "left", "changed_role", "level_up", "drop"];
const EVENT_TITLES: &[&str] = &["Raid night", "Skilling competition", "Boss mass", "Clue hunt"];

/// Deterministic mock data for the bundled domains.
///
/// The generator seeds its RNG from a SHA-256 digest of the descriptor's
/// cache key, so the same request always produces the same data.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockDataGenerator;

impl MockDataGenerator {
    fn rng_for(descriptor: &RequestDescriptor) -> StdRng {
        let digest = Sha256::digest(descriptor.cache_key().as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        StdRng::from_seed(seed)
    }

    /// Timestamps are anchored to the range end, or a fixed instant, never the wall clock.
    fn anchor(descriptor: &RequestDescriptor) -> DateTime<Utc> {
        descriptor
            .range()
            .and_then(|r| r.end)
            .unwrap_or_else(|| DateTime::<Utc>::default() + ChronoDuration::days(19_700))
    }
}

impl FallbackGenerator for MockDataGenerator {
    fn generate(&self, descriptor: &RequestDescriptor) -> Payload {
        let mut rng = Self::rng_for(descriptor);
        let anchor = Self::anchor(descriptor);
        let subject = descriptor.subject();

        match descriptor.domain() {
            domains::ACTIVITIES => {
                let items = (0..3)
                    .map(|n| {
                        let kind = ACTIVITY_TYPES[rng.gen_range(0..ACTIVITY_TYPES.len())];
                        let at = anchor - ChronoDuration::minutes(rng.gen_range(1..1440));
                        json!({
                            "id": format!("mock-{}-{}", subject.to_lowercase(), n),
                            "player": format!("Player {}", n + 1),
                            "type": kind,
                            "createdAt": at.to_rfc3339(),
                        })
                    })
                    .collect();
                Payload::new().with_items(items)
            }
            domains::CALENDAR_EVENTS => {
                let items = (0..2)
                    .map(|n| {
                        let title = EVENT_TITLES[rng.gen_range(0..EVENT_TITLES.len())];
                        let at = anchor + ChronoDuration::hours(rng.gen_range(1..168));
                        json!({
                            "id": format!("mock-event-{}", n),
                            "title": title,
                            "startsAt": at.to_rfc3339(),
                        })
                    })
                    .collect();
                Payload::new().with_items(items)
            }
            domains::COLLECTION_LOG_ITEM => {
                let item_id = descriptor.param("itemId").unwrap_or(subject);
                Payload::new()
                    .with_field("itemId", item_id)
                    .with_field("name", format!("Item {}", item_id))
                    .with_field("unlocked", false)
                    .with_field("price", rng.gen_range(1_000u64..5_000_000))
            }
            domains::PLAYER_STATS => Payload::new()
                .with_field("username", subject.to_lowercase())
                .with_field("displayName", subject)
                .with_field("exp", rng.gen_range(1_000_000u64..400_000_000))
                .with_field("ehp", (rng.gen_range(0.0f64..2_000.0) * 100.0).round() / 100.0),
            _ => Payload::new().with_field("subject", subject),
        }
    }
}
