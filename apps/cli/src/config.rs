use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use groupscape_resolution::provider::{aggregation, wiki, DEFAULT_USER_AGENT};
use groupscape_resolution::EngineSettings;

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub aggregation_url: String,
    pub wiki_url: String,
    pub user_agent: String,
    pub provider_timeout: Option<Duration>,
    pub cache_ttl: Option<Duration>,
    pub resolve_deadline: Option<Duration>,
    pub log_format: String,
    /// Register stubs instead of the network providers.
    pub offline: bool,
    /// JSON file of plugin snapshots to serve through the plugin provider.
    pub plugin_snapshot: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            aggregation_url: var("GS_AGGREGATION_URL")
                .unwrap_or_else(|| aggregation::DEFAULT_BASE_URL.to_string()),
            wiki_url: var("GS_WIKI_URL").unwrap_or_else(|| wiki::DEFAULT_BASE_URL.to_string()),
            user_agent: var("GS_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            provider_timeout: parse_var("GS_PROVIDER_TIMEOUT_MS")?.map(Duration::from_millis),
            cache_ttl: parse_var("GS_CACHE_TTL_SECS")?.map(Duration::from_secs),
            resolve_deadline: parse_var("GS_RESOLVE_DEADLINE_MS")?.map(Duration::from_millis),
            log_format: var("GS_LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            offline: var("GS_OFFLINE").is_some_and(|v| is_truthy(&v)),
            plugin_snapshot: var("GS_PLUGIN_SNAPSHOT").map(PathBuf::from),
        })
    }

    /// Engine settings with the configured overrides applied.
    pub fn engine_settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::default();
        if let Some(timeout) = self.provider_timeout {
            settings.provider_timeout = timeout;
        }
        if let Some(ttl) = self.cache_ttl {
            settings.default_ttl = ttl;
        }
        settings.resolve_deadline = self.resolve_deadline;
        settings
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var(name: &str) -> anyhow::Result<Option<u64>> {
    var(name)
        .map(|v| {
            v.parse::<u64>()
                .with_context(|| format!("{} must be a whole number, got '{}'", name, v))
        })
        .transpose()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
