//! Source provider trait definitions.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::errors::ProviderError;
use crate::models::{Payload, ProviderResult, RequestDescriptor, SourceId};

/// Result of one provider attempt.
///
/// `Empty` means the provider was reached but had nothing for this request.
/// It is not an error and is logged more quietly than `Failure`.
#[derive(Debug)]
pub enum ProviderOutcome {
    Success(ProviderResult),
    Empty,
    Failure(ProviderError),
}

impl ProviderOutcome {
    /// Convert a provider-internal result into an outcome.
    ///
    /// `Ok(None)` and payloads with nothing populated both become `Empty`.
    pub fn from_result(
        source_id: impl Into<SourceId>,
        result: Result<Option<Payload>, ProviderError>,
    ) -> Self {
        match result {
            Ok(Some(payload)) if !payload.is_empty() => {
                Self::Success(ProviderResult::new(source_id, payload))
            }
            Ok(_) => Self::Empty,
            Err(e) => Self::Failure(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Trait for data origins consulted by the resolution engine.
///
/// Implementations must not panic or leak errors: any internal failure is
/// reported as [`ProviderOutcome::Failure`]. The engine additionally bounds
/// every attempt by its deadline and converts panics into failures.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use groupscape_resolution::provider::{ProviderOutcome, SourceProvider};
///
/// struct BossStrategyProvider;
///
/// #[async_trait]
/// impl SourceProvider for BossStrategyProvider {
///     fn id(&self) -> &'static str {
///         "boss-notes"
///     }
///
///     fn supports(&self, domain: &str) -> bool {
///         domain == "boss-strategy"
///     }
///
///     async fn attempt(&self, descriptor: &RequestDescriptor, deadline: Instant) -> ProviderOutcome {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Stable identifier, also used as provenance on every datum it supplies.
    fn id(&self) -> &'static str;

    /// Rank in the chain. Lower values are tried first; ties keep
    /// registration order.
    fn priority(&self) -> i32 {
        10
    }

    /// Per-attempt deadline. `None` uses the engine's default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Whether this provider has anything to say about `domain`.
    fn supports(&self, domain: &str) -> bool {
        let _ = domain;
        true
    }

    /// Terminal providers close the chain. They are exempt from the circuit
    /// breaker and from the resolve deadline.
    fn is_terminal(&self) -> bool {
        false
    }

    /// Fetch data for `descriptor`, finishing before `deadline` when possible.
    async fn attempt(&self, descriptor: &RequestDescriptor, deadline: Instant) -> ProviderOutcome;
}
