//! Wiki prices API provider.
//!
//! Enrichment only: item name, examine text, alchemy values and the latest
//! traded price. The wiki has no idea what a given player owns, so this
//! provider never reports unlock or possession fields, even if an upstream
//! payload happens to carry one.

mod models;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use tokio::time::Instant;

use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::errors::ProviderError;
use crate::models::{domains, sources, Payload, RequestDescriptor};

use super::{http, ProviderOutcome, SourceProvider, DEFAULT_USER_AGENT};

pub use models::{ItemMapping, LatestPrice, LatestResponse};

const PROVIDER_ID: &str = sources::WIKI;

/// Public API root.
pub const DEFAULT_BASE_URL: &str = "https://prices.runescape.wiki/api/v1/osrs";

/// How long item metadata stays cached.
pub const WIKI_METADATA_TTL: Duration = Duration::from_secs(30 * 60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MAPPING_KEY: &str = "mapping";

/// Fields that describe what a player has, not what an item is.
pub const POSSESSION_FIELDS: &[&str] = &["unlocked", "obtained", "completed", "owned"];

type MappingIndex = Arc<HashMap<u32, ItemMapping>>;

pub struct WikiProvider {
    client: Client,
    base_url: String,
    mapping: CacheStore<MappingIndex>,
}

impl WikiProvider {
    /// The wiki asks for a descriptive user agent on every request.
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Self {
        Self::with_client(http::build_client(user_agent, REQUEST_TIMEOUT), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mapping: CacheStore::new(),
        }
    }

    /// Expire the nested metadata cache on `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.mapping = CacheStore::with_clock(clock);
        self
    }

    async fn mapping_index(&self, deadline: Instant) -> Result<MappingIndex, ProviderError> {
        if let Some(index) = self.mapping.get(MAPPING_KEY) {
            return Ok(index);
        }

        let url = format!("{}/mapping", self.base_url);
        let entries: Vec<ItemMapping> =
            http::get_json(&self.client, PROVIDER_ID, &url, deadline)
                .await?
                .unwrap_or_default();

        debug!("Wiki mapping loaded with {} items", entries.len());
        let index: MappingIndex = Arc::new(entries.into_iter().map(|m| (m.id, m)).collect());
        // An empty mapping is an upstream hiccup, retry it on the next lookup
        if !index.is_empty() {
            self.mapping.set(MAPPING_KEY, Arc::clone(&index), WIKI_METADATA_TTL);
        }
        Ok(index)
    }

    async fn item_metadata(
        &self,
        item_id: u32,
        deadline: Instant,
    ) -> Result<Option<ItemMapping>, ProviderError> {
        Ok(self.mapping_index(deadline).await?.get(&item_id).cloned())
    }

    async fn latest_price(&self, item_id: u32, deadline: Instant) -> Result<Option<u64>, ProviderError> {
        let url = format!("{}/latest?id={}", self.base_url, item_id);
        let response: Option<LatestResponse> =
            http::get_json(&self.client, PROVIDER_ID, &url, deadline).await?;

        Ok(response
            .and_then(|r| r.data.get(&item_id.to_string()).copied())
            .and_then(|p| p.best()))
    }

    async fn fetch_item(
        &self,
        descriptor: &RequestDescriptor,
        deadline: Instant,
    ) -> Result<Option<Payload>, ProviderError> {
        let Some(item_id) = item_id_of(descriptor) else {
            debug!("Wiki: no item id in '{}'", descriptor);
            return Ok(None);
        };

        let (metadata, price) = futures::join!(
            self.item_metadata(item_id, deadline),
            self.latest_price(item_id, deadline)
        );

        build_item_payload(metadata, price).map(|payload| Some(strip_possession_fields(payload)))
    }
}

#[async_trait]
impl SourceProvider for WikiProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> i32 {
        20
    }

    fn supports(&self, domain: &str) -> bool {
        domain == domains::COLLECTION_LOG_ITEM
    }

    async fn attempt(&self, descriptor: &RequestDescriptor, deadline: Instant) -> ProviderOutcome {
        let result = match descriptor.domain() {
            domains::COLLECTION_LOG_ITEM => self.fetch_item(descriptor, deadline).await,
            _ => Ok(None),
        };
        ProviderOutcome::from_result(PROVIDER_ID, result)
    }
}

/// `itemId=` parameter of the subject, or the subject itself when numeric.
fn item_id_of(descriptor: &RequestDescriptor) -> Option<u32> {
    descriptor
        .param("itemId")
        .unwrap_or(descriptor.subject())
        .parse()
        .ok()
}

/// Combine the two lookups. One failing half makes the payload partial;
/// both failing is a failure.
fn build_item_payload(
    metadata: Result<Option<ItemMapping>, ProviderError>,
    price: Result<Option<u64>, ProviderError>,
) -> Result<Payload, ProviderError> {
    let (metadata, price, partial) = match (metadata, price) {
        (Err(e), Err(_)) => return Err(e),
        (Err(e), Ok(price)) => {
            debug!("Wiki metadata lookup failed: {}", e);
            (None, price, true)
        }
        (Ok(metadata), Err(e)) => {
            debug!("Wiki price lookup failed: {}", e);
            (metadata, None, true)
        }
        (Ok(metadata), Ok(price)) => (metadata, price, false),
    };

    let mut payload = Payload::new().with_field("price", price);
    if let Some(m) = metadata {
        payload = payload
            .with_field("itemId", m.id)
            .with_field("name", m.name)
            .with_field("description", m.examine)
            .with_field("members", m.members)
            .with_field("highalch", m.highalch)
            .with_field("lowalch", m.lowalch)
            .with_field("buyLimit", m.limit);
    }

    Ok(if partial { payload.mark_partial() } else { payload })
}

/// Remove fields the wiki is not authoritative for.
pub fn strip_possession_fields(mut payload: Payload) -> Payload {
    for field in POSSESSION_FIELDS {
        payload.fields.remove(*field);
    }
    payload
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    /// Local HTTP server answering every request with 404. Returns its base
    /// URL and a count of requests served.
    fn not_found_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let served = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&served);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(
                    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                );
            }
        });

        (base_url, served)
    }

    fn whip() -> ItemMapping {
        serde_json::from_value(json!({
            "id": 4151, "name": "Abyssal whip", "examine": "A weapon from the abyss.",
            "members": true, "highalch": 72000, "lowalch": 48000, "limit": 70, "value": 120001
        }))
        .unwrap()
    }

    fn network_error() -> ProviderError {
        ProviderError::Network {
            provider: "wiki".to_string(),
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn test_item_id_from_param_or_numeric_subject() {
        let d = RequestDescriptor::new(domains::COLLECTION_LOG_ITEM, "itemId=12073,player=Foo").unwrap();
        assert_eq!(item_id_of(&d), Some(12073));

        let d = RequestDescriptor::new(domains::COLLECTION_LOG_ITEM, "4151").unwrap();
        assert_eq!(item_id_of(&d), Some(4151));

        let d = RequestDescriptor::new(domains::COLLECTION_LOG_ITEM, "abyssal whip").unwrap();
        assert_eq!(item_id_of(&d), None);
    }

    #[test]
    fn test_full_payload() {
        let payload = build_item_payload(Ok(Some(whip())), Ok(Some(1_500_000))).unwrap();
        assert!(!payload.partial);
        assert_eq!(payload.fields["price"], json!(1_500_000u64));
        assert_eq!(payload.fields["name"], "Abyssal whip");
        assert_eq!(payload.fields["description"], "A weapon from the abyss.");
        assert!(!payload.fields.contains_key("unlocked"));
    }

    #[test]
    fn test_one_failed_half_is_partial() {
        let payload = build_item_payload(Err(network_error()), Ok(Some(2_000))).unwrap();
        assert!(payload.partial);
        assert_eq!(payload.populated(), 1);

        let payload = build_item_payload(Ok(Some(whip())), Err(network_error())).unwrap();
        assert!(payload.partial);
        assert!(payload.fields["price"].is_null());
    }

    #[test]
    fn test_both_halves_failing_is_failure() {
        let result = build_item_payload(Err(network_error()), Err(network_error()));
        assert!(matches!(result, Err(ProviderError::Network { .. })));
    }

    #[test]
    fn test_unknown_item_is_empty() {
        let payload = build_item_payload(Ok(None), Ok(None)).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_strip_possession_fields() {
        let payload = Payload::new()
            .with_field("unlocked", true)
            .with_field("obtained", 3)
            .with_field("price", 10);
        let stripped = strip_possession_fields(payload);
        assert_eq!(stripped.fields.len(), 1);
        assert!(stripped.fields.contains_key("price"));
    }

    #[test]
    fn test_latest_price_prefers_high() {
        let response: LatestResponse = serde_json::from_value(json!({
            "data": {"4151": {"high": 1_510_000, "highTime": 1, "low": 1_490_000, "lowTime": 2}}
        }))
        .unwrap();
        assert_eq!(response.data["4151"].best(), Some(1_510_000));
        assert_eq!(LatestPrice { high: None, low: Some(5) }.best(), Some(5));
    }

    #[test]
    fn test_provider_identity() {
        let provider = WikiProvider::new(DEFAULT_BASE_URL, DEFAULT_USER_AGENT);
        assert_eq!(provider.id(), "wiki");
        assert_eq!(provider.priority(), 20);
        assert!(provider.supports(domains::COLLECTION_LOG_ITEM));
        assert!(!provider.supports(domains::ACTIVITIES));
    }

    #[tokio::test]
    async fn test_missing_mapping_is_not_cached() {
        let (base_url, served) = not_found_server();
        let client = Client::builder().no_proxy().build().unwrap();
        let provider = WikiProvider::with_client(client, base_url);
        let deadline = Instant::now() + Duration::from_secs(5);

        let index = provider.mapping_index(deadline).await.unwrap();
        assert!(index.is_empty());
        assert!(provider.mapping.is_empty());

        // Asked again rather than served from cache
        provider.mapping_index(deadline).await.unwrap();
        assert_eq!(served.load(Ordering::SeqCst), 2);
    }
}
