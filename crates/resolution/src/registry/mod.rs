//! Provider orchestration.
//!
//! This module provides the resolution engine and what it is configured with:
//! - Provider ordering by priority, with settings overrides
//! - Per-domain policies (merge, completeness, TTL, invalidation topics)
//! - Circuit breaking for fault tolerance
//! - Diagnostics for every provider walk

mod circuit_breaker;
mod diagnostics;
mod engine;
mod policy;
mod settings;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use diagnostics::{AttemptStatus, FetchDiagnostics, ProviderAttempt, SkipReason};
pub use engine::{EngineBuilder, ResolutionEngine};
pub use policy::{standard_policies, DomainPolicy};
pub use settings::{EngineSettings, DEFAULT_PROVIDER_TIMEOUT, DEFAULT_TTL};
