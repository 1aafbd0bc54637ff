//! Per-provider circuit breaker.
//!
//! A provider that keeps timing out or erroring is skipped for a while
//! instead of costing every resolution its full timeout. The circuit has
//! three states:
//!
//! - **Closed**: Normal operation, attempts are allowed.
//! - **Open**: Provider is failing, attempts are skipped.
//! - **HalfOpen**: Recovery timeout elapsed, attempts are allowed again
//!   until the provider proves healthy or fails once more.
//!
//! State is in-memory and driven by the engine's [`Clock`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

/// Default number of failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of successful attempts needed to close the circuit from HalfOpen.
const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Consecutive failures.
    failure_count: u32,
    /// Consecutive successes in HalfOpen.
    half_open_successes: u32,
    last_failure: Option<DateTime<Utc>>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            last_failure: None,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait before testing recovery.
    #[serde(rename = "recoveryTimeoutMs", with = "super::settings::millis")]
    pub recovery_timeout: Duration,
    /// Number of successes needed to close from HalfOpen.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            half_open_success_threshold: HALF_OPEN_SUCCESS_THRESHOLD,
        }
    }
}

/// Thread-safe per-provider circuit breaker.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is a slightly wrong circuit
    /// state, which is better than panicking.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether `provider` may be attempted.
    ///
    /// Moves an Open circuit to HalfOpen once the recovery timeout elapsed.
    pub fn is_allowed(&self, provider: &str) -> bool {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let recovered = circuit
                    .last_failure
                    .and_then(|at| (now - at).to_std().ok())
                    .is_some_and(|elapsed| elapsed >= self.config.recovery_timeout);
                if recovered {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                        provider
                    );
                    circuit.state = CircuitState::HalfOpen;
                    circuit.half_open_successes = 0;
                }
                recovered
            }
        }
    }

    /// Record a successful attempt.
    ///
    /// In Closed state: resets failure count.
    /// In HalfOpen state: counts toward closing the circuit.
    pub fn record_success(&self, provider: &str) {
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => {
                circuit.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                circuit.half_open_successes += 1;
                debug!(
                    "Circuit breaker: success for '{}' in HalfOpen ({}/{})",
                    provider, circuit.half_open_successes, self.config.half_open_success_threshold
                );

                if circuit.half_open_successes >= self.config.half_open_success_threshold {
                    info!(
                        "Circuit breaker: closing circuit for '{}' after {} successes",
                        provider, circuit.half_open_successes
                    );
                    *circuit = Circuit::new();
                }
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: unexpected success for '{}' in Open state",
                    provider
                );
            }
        }
    }

    /// Record a failed attempt. Any failure in HalfOpen reopens the circuit.
    pub fn record_failure(&self, provider: &str) {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        circuit.failure_count += 1;
        circuit.last_failure = Some(now);

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        provider, circuit.failure_count
                    );
                    circuit.state = CircuitState::Open;
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        provider, circuit.failure_count, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: reopening circuit for '{}' after failure in HalfOpen",
                    provider
                );
                circuit.state = CircuitState::Open;
                circuit.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        self.lock_circuits()
            .get(provider)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn failure_count(&self, provider: &str) -> u32 {
        self.lock_circuits()
            .get(provider)
            .map(|c| c.failure_count)
            .unwrap_or(0)
    }

    /// Reset the circuit for a provider to Closed state.
    pub fn reset(&self, provider: &str) {
        if let Some(circuit) = self.lock_circuits().get_mut(provider) {
            info!("Circuit breaker: manually resetting circuit for '{}'", provider);
            *circuit = Circuit::new();
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker(threshold: u32, recovery: Duration, half_open: u32) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::default();
        let cb = CircuitBreaker::with_config(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: recovery,
                half_open_success_threshold: half_open,
            },
            Arc::new(clock.clone()),
        );
        (cb, clock)
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::new();
        assert!(cb.is_allowed("aggregation"));
        assert_eq!(cb.state("aggregation"), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let (cb, _) = breaker(3, Duration::from_secs(60), 2);

        cb.record_failure("aggregation");
        cb.record_failure("aggregation");
        assert!(cb.is_allowed("aggregation"));

        cb.record_failure("aggregation");
        assert!(!cb.is_allowed("aggregation"));
        assert_eq!(cb.state("aggregation"), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (cb, _) = breaker(3, Duration::from_secs(60), 2);

        cb.record_failure("wiki");
        cb.record_failure("wiki");
        assert_eq!(cb.failure_count("wiki"), 2);

        cb.record_success("wiki");
        assert_eq!(cb.failure_count("wiki"), 0);
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let (cb, clock) = breaker(1, Duration::from_secs(60), 2);

        cb.record_failure("wiki");
        assert!(!cb.is_allowed("wiki"));

        clock.advance(Duration::from_secs(59));
        assert!(!cb.is_allowed("wiki"));

        clock.advance(Duration::from_secs(1));
        assert!(cb.is_allowed("wiki"));
        assert_eq!(cb.state("wiki"), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_closes_on_successes() {
        let (cb, clock) = breaker(1, Duration::from_secs(10), 2);

        cb.record_failure("wiki");
        clock.advance(Duration::from_secs(10));
        assert!(cb.is_allowed("wiki"));

        cb.record_success("wiki");
        assert_eq!(cb.state("wiki"), CircuitState::HalfOpen);
        cb.record_success("wiki");
        assert_eq!(cb.state("wiki"), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_reopens_on_failure() {
        let (cb, clock) = breaker(1, Duration::from_secs(10), 2);

        cb.record_failure("wiki");
        clock.advance(Duration::from_secs(10));
        cb.is_allowed("wiki");
        assert_eq!(cb.state("wiki"), CircuitState::HalfOpen);

        cb.record_failure("wiki");
        assert_eq!(cb.state("wiki"), CircuitState::Open);
        assert!(!cb.is_allowed("wiki"));
    }

    #[test]
    fn test_manual_reset_and_isolation() {
        let (cb, _) = breaker(1, Duration::from_secs(60), 2);

        cb.record_failure("aggregation");
        assert!(!cb.is_allowed("aggregation"));
        assert!(cb.is_allowed("wiki"));

        cb.reset("aggregation");
        assert_eq!(cb.state("aggregation"), CircuitState::Closed);
        assert_eq!(cb.failure_count("aggregation"), 0);
    }

    #[test]
    fn test_config_from_json() {
        let config: CircuitBreakerConfig =
            serde_json::from_str(r#"{"failureThreshold": 2, "recoveryTimeoutMs": 1500}"#).unwrap();
        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.recovery_timeout, Duration::from_millis(1500));
        assert_eq!(config.half_open_success_threshold, HALF_OPEN_SUCCESS_THRESHOLD);
    }
}
