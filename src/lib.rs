//! Circuit breakers for calls to unreliable remote dependencies.
//!
//! A [`CircuitBreaker`] wraps each call to a dependency. After
//! `failure_threshold` consecutive failures it opens and refuses calls with
//! [`CircuitBreakerError::Open`] until `reset_timeout` has passed since the
//! last failure. The next call is then admitted as a trial (half-open);
//! `half_open_max_attempts` successful trials close the circuit and a single
//! failed trial opens it again.
//!
//! ```text
//! Closed ──[failure_threshold failures]──> Open
//!   ▲                                        │
//!   │                                        │ [reset_timeout elapsed]
//!   │                                        ▼
//!   └──[half_open_max_attempts successes]── HalfOpen ──[any failure]──> Open
//! ```
//!
//! Build one breaker per dependency, directly or through a
//! [`CircuitBreakerRegistry`], and pass the handles to the clients that
//! call that dependency.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod metrics;

pub use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
pub use crate::config::GuardConfig;
pub use crate::error::{CircuitBreakerError, GuardError, Result};

/// Initialize tracing/logging
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circuit_guard=debug".into()),
        )
        .with_target(false)
        .compact()
        .try_init();
}
