//! Third-party player-stats aggregation API provider.
//!
//! Serves two domains:
//! - `activities`: recent activity of a group, looked up by group name or id
//! - `player-stats`: a player's stat summary
//!
//! Group names are resolved to numeric ids through the API's group search.
//! Resolved ids change rarely and are kept in a nested cache for a day.

mod models;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::errors::ProviderError;
use crate::models::{domains, sources, Payload, RequestDescriptor, TimeRange};

use super::{http, ProviderOutcome, SourceProvider};

pub use models::{GroupActivity, GroupSummary, PlayerDetails, PlayerRef};

/// Provider ID constant
const PROVIDER_ID: &str = sources::AGGREGATION;

/// Public API root.
pub const DEFAULT_BASE_URL: &str = "https://api.wiseoldman.net/v2";

/// How long aggregation results stay fresh.
pub const AGGREGATION_TTL: Duration = Duration::from_secs(15 * 60);

/// How long a resolved group id stays cached.
pub const GROUP_ID_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of activity entries requested per call.
const ACTIVITY_LIMIT: u32 = 50;

const USER_AGENT: &str = super::DEFAULT_USER_AGENT;

/// Aggregation API provider.
///
/// # Example
///
/// ```ignore
/// use groupscape_resolution::provider::aggregation::{AggregationProvider, DEFAULT_BASE_URL};
///
/// let provider = AggregationProvider::new(DEFAULT_BASE_URL);
/// ```
pub struct AggregationProvider {
    client: Client,
    base_url: String,
    group_ids: CacheStore<u64>,
}

impl AggregationProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(http::build_client(USER_AGENT, REQUEST_TIMEOUT), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            group_ids: CacheStore::new(),
        }
    }

    /// Expire the nested group-id cache on `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.group_ids = CacheStore::with_clock(clock);
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        deadline: Instant,
    ) -> Result<Option<T>, ProviderError> {
        http::get_json(&self.client, PROVIDER_ID, url, deadline).await
    }

    /// Numeric group id for `group`, which may already be numeric.
    async fn resolve_group_id(
        &self,
        group: &str,
        deadline: Instant,
    ) -> Result<Option<u64>, ProviderError> {
        if let Ok(id) = group.parse::<u64>() {
            return Ok(Some(id));
        }

        let cache_key = format!("group:{}", group.to_lowercase());
        if let Some(id) = self.group_ids.get(&cache_key) {
            return Ok(Some(id));
        }

        let url = format!(
            "{}/groups?name={}",
            self.base_url,
            urlencoding::encode(group)
        );
        let groups: Vec<GroupSummary> = self.get_json(&url, deadline).await?.unwrap_or_default();
        let id = pick_group(&groups, group);

        match id {
            Some(id) => {
                debug!("Resolved group '{}' to id {}", group, id);
                self.group_ids.set(&cache_key, id, GROUP_ID_TTL);
            }
            None => debug!("No group named '{}'", group),
        }
        Ok(id)
    }

    async fn fetch_activities(
        &self,
        descriptor: &RequestDescriptor,
        deadline: Instant,
    ) -> Result<Option<Payload>, ProviderError> {
        let group = descriptor.param("group").unwrap_or(descriptor.subject());
        let Some(group_id) = self.resolve_group_id(group, deadline).await? else {
            return Ok(None);
        };

        let url = format!(
            "{}/groups/{}/activity?limit={}",
            self.base_url, group_id, ACTIVITY_LIMIT
        );
        let raw: Option<Vec<GroupActivity>> = self.get_json(&url, deadline).await?;
        Ok(raw.map(|entries| Payload::new().with_items(map_activities(entries, descriptor.range()))))
    }

    async fn fetch_player(
        &self,
        descriptor: &RequestDescriptor,
        deadline: Instant,
    ) -> Result<Option<Payload>, ProviderError> {
        let username = descriptor.param("player").unwrap_or(descriptor.subject());
        let url = format!(
            "{}/players/{}",
            self.base_url,
            urlencoding::encode(&username.to_lowercase())
        );
        let raw: Option<PlayerDetails> = self.get_json(&url, deadline).await?;
        Ok(raw.map(map_player))
    }
}

#[async_trait]
impl SourceProvider for AggregationProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> i32 {
        10
    }

    fn supports(&self, domain: &str) -> bool {
        matches!(domain, domains::ACTIVITIES | domains::PLAYER_STATS)
    }

    async fn attempt(&self, descriptor: &RequestDescriptor, deadline: Instant) -> ProviderOutcome {
        let result = match descriptor.domain() {
            domains::ACTIVITIES => self.fetch_activities(descriptor, deadline).await,
            domains::PLAYER_STATS => self.fetch_player(descriptor, deadline).await,
            _ => Ok(None),
        };
        ProviderOutcome::from_result(PROVIDER_ID, result)
    }
}

/// Exact (case-insensitive) name match, else the API's best match.
fn pick_group(groups: &[GroupSummary], name: &str) -> Option<u64> {
    groups
        .iter()
        .find(|g| g.name.eq_ignore_ascii_case(name))
        .or_else(|| groups.first())
        .map(|g| g.id)
}

/// Activity entries inside `range`, shaped like plugin activity items.
///
/// The API has no activity id, so one is derived from player, type and time.
fn map_activities(entries: Vec<GroupActivity>, range: Option<&TimeRange>) -> Vec<Value> {
    entries
        .into_iter()
        .filter(|e| range.map_or(true, |r| r.contains(&e.created_at)))
        .map(|e| {
            let player = e
                .player
                .map(|p| p.display_name.unwrap_or(p.username))
                .unwrap_or_else(|| format!("#{}", e.player_id));
            json!({
                "id": format!("{}-{}-{}", e.player_id, e.kind, e.created_at.timestamp()),
                "player": player,
                "type": e.kind,
                "role": e.role,
                "createdAt": e.created_at.to_rfc3339(),
            })
        })
        .collect()
}

fn map_player(details: PlayerDetails) -> Payload {
    Payload::new()
        .with_field("username", details.username)
        .with_field("displayName", details.display_name)
        .with_field("type", details.account_type)
        .with_field("exp", details.exp)
        .with_field("ehp", details.ehp)
        .with_field("ehb", details.ehb)
        .with_field("updatedAt", details.updated_at.map(|t| t.to_rfc3339()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn activities_json() -> &'static str {
        r#"[
            {"groupId": 42, "playerId": 7, "type": "joined", "role": "member",
             "createdAt": "2024-03-01T12:00:00.000Z",
             "player": {"id": 7, "username": "zezima", "displayName": "Zezima"}},
            {"groupId": 42, "playerId": 8, "type": "changed_role", "role": "captain",
             "createdAt": "2024-02-01T12:00:00.000Z",
             "player": {"id": 8, "username": "lynx titan", "displayName": null}}
        ]"#
    }

    #[test]
    fn test_map_activities_derives_identity() {
        let entries: Vec<GroupActivity> = serde_json::from_str(activities_json()).unwrap();
        let items = map_activities(entries, None);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["player"], "Zezima");
        assert_eq!(items[0]["type"], "joined");
        assert_eq!(
            items[0]["id"],
            format!(
                "7-joined-{}",
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap().timestamp()
            )
        );
        assert_eq!(items[1]["player"], "lynx titan");
    }

    #[test]
    fn test_map_activities_applies_range() {
        let entries: Vec<GroupActivity> = serde_json::from_str(activities_json()).unwrap();
        let range = TimeRange::new(
            Some(Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap()),
            None,
        );
        let items = map_activities(entries, Some(&range));

        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["type"], "joined");
    }

    #[test]
    fn test_map_player_skips_missing_fields() {
        let details: PlayerDetails = serde_json::from_str(
            r#"{"id": 1, "username": "zezima", "displayName": "Zezima", "type": "regular",
                "exp": 123456789, "ehp": 1200.5, "ehb": null}"#,
        )
        .unwrap();
        let payload = map_player(details);

        assert_eq!(payload.fields["exp"], json!(123456789u64));
        assert_eq!(payload.fields["displayName"], "Zezima");
        assert!(payload.fields["ehb"].is_null());
        assert_eq!(payload.populated(), 5);
    }

    #[test]
    fn test_pick_group_prefers_exact_match() {
        let groups = vec![
            GroupSummary {
                id: 1,
                name: "Iron Foundry".to_string(),
            },
            GroupSummary {
                id: 2,
                name: "Iron".to_string(),
            },
        ];
        assert_eq!(pick_group(&groups, "iron"), Some(2));
        assert_eq!(pick_group(&groups, "Foundry"), Some(1));
        assert_eq!(pick_group(&[], "iron"), None);
    }

    #[tokio::test]
    async fn test_numeric_and_cached_group_ids_skip_the_network() {
        let provider = AggregationProvider::new("http://127.0.0.1:9");
        let deadline = Instant::now() + Duration::from_secs(1);

        assert_eq!(provider.resolve_group_id("1234", deadline).await.unwrap(), Some(1234));

        provider.group_ids.set("group:iron foundry", 99, GROUP_ID_TTL);
        assert_eq!(
            provider.resolve_group_id("Iron Foundry", deadline).await.unwrap(),
            Some(99)
        );
    }

    #[test]
    fn test_provider_identity() {
        let provider = AggregationProvider::new(DEFAULT_BASE_URL);
        assert_eq!(provider.id(), "aggregation");
        assert_eq!(provider.priority(), 10);
        assert!(provider.supports(domains::ACTIVITIES));
        assert!(provider.supports(domains::PLAYER_STATS));
        assert!(!provider.supports(domains::COLLECTION_LOG_ITEM));
    }
}
