//! Error types and failover classification for the resolution crate.
//!
//! This module provides:
//! - [`ProviderError`]: Failures local to a single source provider
//! - [`ResolutionError`]: Programmer errors raised while building descriptors or engines
//! - [`RetryClass`]: Classification for how the engine reacts to a provider failure

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur inside a source provider.
///
/// These never escape [`ResolutionEngine::resolve`](crate::ResolutionEngine::resolve).
/// The engine records them in the record's diagnostics and moves on to the next
/// provider. Each variant is classified via [`retry_class`](Self::retry_class).
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider did not answer before its deadline.
    #[error("Timeout: {provider} after {elapsed_ms}ms")]
    Timeout {
        /// The provider that timed out
        provider: String,
        /// How long the engine waited
        elapsed_ms: u64,
    },

    /// The upstream service answered with a non-success status code.
    #[error("HTTP {status} from {provider}")]
    Http {
        /// The provider that received the response
        provider: String,
        /// The HTTP status code
        status: u16,
    },

    /// The request never produced a response (DNS, TLS, connection reset...).
    #[error("Network error: {provider} - {message}")]
    Network {
        /// The provider whose request failed
        provider: String,
        /// The transport error message
        message: String,
    },

    /// The upstream response could not be decoded or was missing required data.
    #[error("Malformed response from {provider}: {message}")]
    Malformed {
        /// The provider that returned the payload
        provider: String,
        /// Description of what was wrong
        message: String,
    },

    /// The capability behind this provider is not present in this runtime.
    #[error("Provider unavailable: {provider}")]
    Unavailable {
        /// The stubbed provider
        provider: String,
    },

    /// The plugin bridge reported an error of its own.
    #[error("Bridge error: {provider} - {message}")]
    Bridge {
        /// The provider wrapping the bridge
        provider: String,
        /// The bridge error message
        message: String,
    },

    /// The provider panicked while producing its outcome.
    #[error("Provider panicked: {provider}")]
    Panicked {
        /// The provider that panicked
        provider: String,
    },
}

impl ProviderError {
    /// Returns the failover classification for this error.
    ///
    /// Every class falls through to the next provider. The distinction only
    /// controls whether the failure counts against the provider's circuit.
    ///
    /// # Examples
    ///
    /// ```
    /// use groupscape_resolution::errors::{ProviderError, RetryClass};
    ///
    /// let error = ProviderError::Http { provider: "aggregation".to_string(), status: 503 };
    /// assert_eq!(error.retry_class(), RetryClass::FailoverWithPenalty);
    ///
    /// let error = ProviderError::Unavailable { provider: "plugin".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::NextProvider);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient upstream trouble - penalize so a flapping service gets skipped
            Self::Timeout { .. } | Self::Network { .. } | Self::Panicked { .. } => {
                RetryClass::FailoverWithPenalty
            }
            Self::Http { status, .. } if *status == 429 || *status >= 500 => {
                RetryClass::FailoverWithPenalty
            }

            // The provider can't help with this request, but it is healthy
            Self::Http { .. }
            | Self::Malformed { .. }
            | Self::Unavailable { .. }
            | Self::Bridge { .. } => RetryClass::NextProvider,
        }
    }

    /// The id of the provider that produced this error.
    pub fn provider(&self) -> &str {
        match self {
            Self::Timeout { provider, .. }
            | Self::Http { provider, .. }
            | Self::Network { provider, .. }
            | Self::Malformed { provider, .. }
            | Self::Unavailable { provider }
            | Self::Bridge { provider, .. }
            | Self::Panicked { provider } => provider,
        }
    }

    /// Whether this failure was a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors surfaced to callers of the engine.
///
/// These represent programmer errors (a malformed descriptor, an inconsistent
/// engine configuration), never runtime or network conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The request descriptor is malformed.
    #[error("Invalid request descriptor: {0}")]
    InvalidDescriptor(String),

    /// The engine was configured inconsistently.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}
