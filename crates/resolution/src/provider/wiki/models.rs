//! Response shapes of the wiki prices API.

use std::collections::HashMap;

use serde::Deserialize;

/// Entry of `GET /mapping`: static item metadata.
#[derive(Clone, Debug, Deserialize)]
pub struct ItemMapping {
    pub id: u32,
    pub name: String,
    pub examine: Option<String>,
    #[serde(default)]
    pub members: bool,
    pub highalch: Option<u64>,
    pub lowalch: Option<u64>,
    pub limit: Option<u32>,
    pub value: Option<u64>,
}

/// Instant-buy (`high`) and instant-sell (`low`) prices of one item.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct LatestPrice {
    pub high: Option<u64>,
    pub low: Option<u64>,
}

impl LatestPrice {
    /// Buy price when known, else sell price.
    pub fn best(&self) -> Option<u64> {
        self.high.or(self.low)
    }
}

/// Body of `GET /latest?id=`. Keys are item ids as strings.
#[derive(Debug, Deserialize)]
pub struct LatestResponse {
    #[serde(default)]
    pub data: HashMap<String, LatestPrice>,
}
