//! Per-resolution record of which providers were tried, skipped, or failed.

use serde::Serialize;

use crate::models::SourceId;

/// Why a provider was not attempted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// Provider doesn't serve this domain.
    DomainNotSupported,

    /// Circuit breaker is open for this provider.
    CircuitBreakerOpen,

    /// The resolve deadline passed before this provider's turn.
    DeadlineExceeded,

    /// The domain only consults the fallback for records that are still empty.
    RecordAlreadyPopulated,
}

/// What happened when a provider was visited.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AttemptStatus {
    /// The provider returned data. `contributed` counts fields and items
    /// that actually made it into the record.
    Success { contributed: usize },
    Empty,
    Failed { error: String },
    Skipped { reason: SkipReason },
}

/// Record of a single provider visit during a resolution.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider_id: SourceId,
    #[serde(flatten)]
    pub status: AttemptStatus,
}

/// The provider walk behind one resolved record, in visit order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    fn push(&mut self, provider_id: SourceId, status: AttemptStatus) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            status,
        });
    }

    pub fn record_skip(&mut self, provider_id: SourceId, reason: SkipReason) {
        self.push(provider_id, AttemptStatus::Skipped { reason });
    }

    pub fn record_error(&mut self, provider_id: SourceId, error: String) {
        self.push(provider_id, AttemptStatus::Failed { error });
    }

    pub fn record_empty(&mut self, provider_id: SourceId) {
        self.push(provider_id, AttemptStatus::Empty);
    }

    pub fn record_success(&mut self, provider_id: SourceId, contributed: usize) {
        self.push(provider_id, AttemptStatus::Success { contributed });
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no providers".to_string();
        }
        self.attempts
            .iter()
            .map(|a| match &a.status {
                AttemptStatus::Success { contributed } => {
                    format!("{}: SUCCESS (+{})", a.provider_id, contributed)
                }
                AttemptStatus::Empty => format!("{}: EMPTY", a.provider_id),
                AttemptStatus::Failed { error } => format!("{}: ERROR ({})", a.provider_id, error),
                AttemptStatus::Skipped { reason } => {
                    format!("{}: SKIPPED ({:?})", a.provider_id, reason)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Check if any provider succeeded.
    pub fn has_success(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| matches!(a.status, AttemptStatus::Success { .. }))
    }

    /// Get all skip reasons.
    pub fn skip_reasons(&self) -> Vec<(&SourceId, &SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| match &a.status {
                AttemptStatus::Skipped { reason } => Some((&a.provider_id, reason)),
                _ => None,
            })
            .collect()
    }

    /// Get all errors.
    pub fn errors(&self) -> Vec<(&SourceId, &str)> {
        self.attempts
            .iter()
            .filter_map(|a| match &a.status {
                AttemptStatus::Failed { error } => Some((&a.provider_id, error.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Providers whose `attempt` actually ran, in order.
    pub fn visited(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter(|a| !matches!(a.status, AttemptStatus::Skipped { .. }))
            .map(|a| a.provider_id.as_ref())
            .collect()
    }
}
