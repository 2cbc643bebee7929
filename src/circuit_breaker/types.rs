use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed, calls flow normally
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is half-open, allowing trial calls
    HalfOpen,
}

impl CircuitState {
    /// Numeric value exported on the state gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration
///
/// Fixed for the lifetime of a breaker. Every field must be positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Milliseconds to stay open before a trial call is allowed
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// Successful trial calls required in half-open state before closing
    #[serde(default = "default_half_open_max_attempts")]
    pub half_open_max_attempts: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_half_open_max_attempts() -> u32 {
    3
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            half_open_max_attempts: default_half_open_max_attempts(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Reject zero thresholds and timeouts
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(GuardError::InvalidBreakerConfig(
                "failure_threshold must be > 0".to_string(),
            ));
        }
        if self.reset_timeout_ms == 0 {
            return Err(GuardError::InvalidBreakerConfig(
                "reset_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.half_open_max_attempts == 0 {
            return Err(GuardError::InvalidBreakerConfig(
                "half_open_max_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Circuit breaker metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerMetrics {
    /// Number of calls admitted to the wrapped operation
    pub total_calls: u64,
    /// Number of admitted calls that succeeded
    pub successful_calls: u64,
    /// Number of admitted calls that failed
    pub failed_calls: u64,
    /// Number of calls rejected without running the operation
    pub rejected_calls: u64,
    /// Outcomes that arrived after the breaker had already moved on; also
    /// included in `successful_calls` or `failed_calls`
    pub stale_outcomes: u64,
    /// Number of times circuit opened
    pub circuit_opened_count: u64,
    /// Number of times circuit closed
    pub circuit_closed_count: u64,
    /// Number of times circuit half-opened
    pub circuit_half_opened_count: u64,
}

/// Point-in-time view of a breaker, suitable for status endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub half_open_attempts: u32,
    pub half_open_in_flight: u32,
    /// Milliseconds since the most recent failure, if any
    pub since_last_failure_ms: Option<u64>,
    pub metrics: CircuitBreakerMetrics,
}
