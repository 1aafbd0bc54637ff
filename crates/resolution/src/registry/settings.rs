//! Engine-wide tuning knobs.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use super::CircuitBreakerConfig;
use crate::errors::ResolutionError;

/// TTL for domains whose policy doesn't set one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Per-attempt deadline for providers that don't declare their own.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings shared by every domain of an engine.
///
/// Deserializes from camelCase JSON with durations in milliseconds; every
/// key is optional.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    #[serde(rename = "defaultTtlMs", with = "millis")]
    pub default_ttl: Duration,

    #[serde(rename = "providerTimeoutMs", with = "millis")]
    pub provider_timeout: Duration,

    /// Upper bound on a whole resolution. Once passed, remaining
    /// non-terminal providers are skipped and the fallback answers.
    #[serde(rename = "resolveDeadlineMs", with = "option_millis")]
    pub resolve_deadline: Option<Duration>,

    pub circuit_breaker: CircuitBreakerConfig,

    /// Provider id -> priority, replacing the provider's own priority.
    /// Lower values are tried first.
    pub priorities: HashMap<String, i32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            resolve_deadline: None,
            circuit_breaker: CircuitBreakerConfig::default(),
            priorities: HashMap::new(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ResolutionError> {
        if self.provider_timeout.is_zero() {
            return Err(ResolutionError::InvalidConfig(
                "provider timeout must be greater than zero".to_string(),
            ));
        }
        if self.resolve_deadline.is_some_and(|d| d.is_zero()) {
            return Err(ResolutionError::InvalidConfig(
                "resolve deadline must be greater than zero".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0
            || self.circuit_breaker.half_open_success_threshold == 0
        {
            return Err(ResolutionError::InvalidConfig(
                "circuit breaker thresholds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

pub(crate) mod option_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
