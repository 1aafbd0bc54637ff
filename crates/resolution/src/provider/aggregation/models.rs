//! Response shapes of the aggregation API.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Entry of `GET /groups?name=`.
#[derive(Debug, Deserialize)]
pub struct GroupSummary {
    pub id: u64,
    pub name: String,
}

/// Player reference embedded in activity entries.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRef {
    pub username: String,
    pub display_name: Option<String>,
}

/// Entry of `GET /groups/{id}/activity`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupActivity {
    pub player_id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub player: Option<PlayerRef>,
}

/// Body of `GET /players/{username}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDetails {
    pub username: String,
    pub display_name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub exp: Option<u64>,
    pub ehp: Option<f64>,
    pub ehb: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}
