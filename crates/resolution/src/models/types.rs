use std::borrow::Cow;

/// Source identifier - mostly static constants
pub type SourceId = Cow<'static, str>;

/// Well-known source ids, one per kind of data origin.
pub mod sources {
    /// Live data pushed by the game client plugin.
    pub const PLUGIN: &str = "plugin";
    /// Third-party player-stats aggregation API.
    pub const AGGREGATION: &str = "aggregation";
    /// Wiki item/monster metadata.
    pub const WIKI: &str = "wiki";
    /// Local mock data, the terminal link of every chain.
    pub const FALLBACK: &str = "fallback";
    /// Provenance of a record no provider contributed to.
    pub const NONE: &str = "none";
}

/// Domain keys used by the bundled providers and policies.
pub mod domains {
    /// Recent group activity feed (list).
    pub const ACTIVITIES: &str = "activities";
    /// Player stat summary (record).
    pub const PLAYER_STATS: &str = "player-stats";
    /// One collection-log item for one player (record).
    pub const COLLECTION_LOG_ITEM: &str = "collection-log-item";
    /// Shared group calendar events (list).
    pub const CALENDAR_EVENTS: &str = "calendar-events";
}
