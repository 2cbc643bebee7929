use super::clock::{Clock, SystemClock};
use super::types::{BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
use crate::error::CircuitBreakerError;
use crate::metrics;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker guarding a single remote dependency
///
/// The admission decision and the outcome bookkeeping each run under the
/// state lock; the wrapped operation runs outside it. The lock is never held
/// across an `.await`.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Configuration
    config: CircuitBreakerConfig,
    /// Current state
    state: Arc<Mutex<State>>,
    /// Dependency identifier
    name: String,
    /// Time source
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
struct State {
    /// Current circuit state
    circuit_state: CircuitState,
    /// Consecutive failures since the last reset-to-zero event
    failure_count: u32,
    /// Successful trial completions in half-open state
    half_open_attempts: u32,
    /// Trial calls admitted in half-open state and not yet completed
    half_open_in_flight: u32,
    /// Time of the most recent failure
    last_failure_time: Option<Instant>,
    /// Bumped on every transition and reset; admissions carry the value they saw
    generation: u64,
    /// Metrics
    metrics: CircuitBreakerMetrics,
}

impl State {
    fn new() -> Self {
        Self {
            circuit_state: CircuitState::Closed,
            failure_count: 0,
            half_open_attempts: 0,
            half_open_in_flight: 0,
            last_failure_time: None,
            generation: 0,
            metrics: CircuitBreakerMetrics::default(),
        }
    }

    fn release_trial(&mut self, generation: u64) {
        if self.generation == generation && self.circuit_state == CircuitState::HalfOpen {
            self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
        }
    }
}

/// Ticket for a call the breaker decided to run
struct Admission {
    generation: u64,
    trial: bool,
    settled: bool,
    state: Arc<Mutex<State>>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.settled || !self.trial {
            return;
        }

        // Caller dropped the call mid-flight; free its trial slot.
        lock_state(&self.state).release_trial(self.generation);
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl CircuitBreaker {
    /// Create a new circuit breaker on the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a new circuit breaker on the given clock
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout_ms,
            half_open_max_attempts = config.half_open_max_attempts,
            "Creating circuit breaker"
        );
        metrics::record_circuit_breaker_state(&name, CircuitState::Closed.as_gauge());

        Self {
            config,
            state: Arc::new(Mutex::new(State::new())),
            name,
            clock,
        }
    }

    /// Run `operation` if the breaker admits it
    ///
    /// Returns [`CircuitBreakerError::Open`] without invoking `operation` when
    /// the circuit is open and the reset timeout has not elapsed, or when every
    /// half-open trial slot is taken. Otherwise the operation's own result is
    /// returned, with its error wrapped in [`CircuitBreakerError::Inner`].
    ///
    /// If the returned future is dropped before the operation completes, the
    /// call counts as neither a success nor a failure.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(mut admission) = self.admit() else {
            return Err(CircuitBreakerError::Open);
        };

        match operation().await {
            Ok(value) => {
                self.record_success(&mut admission);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(&mut admission);
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    /// Force the breaker closed and zero every counter
    ///
    /// Outcomes of calls admitted before the reset are ignored.
    pub async fn reset(&self) {
        let mut state = self.lock();

        info!(
            breaker = %self.name,
            previous_state = %state.circuit_state,
            failure_count = state.failure_count,
            "Circuit breaker manually reset"
        );

        if state.circuit_state == CircuitState::Closed {
            state.generation += 1;
        } else {
            self.set_state(&mut state, CircuitState::Closed);
            state.metrics.circuit_closed_count += 1;
        }
        state.failure_count = 0;
        state.half_open_attempts = 0;
        state.half_open_in_flight = 0;
        state.last_failure_time = None;
    }

    /// Get current state
    pub async fn state(&self) -> CircuitState {
        self.lock().circuit_state
    }

    /// Get the consecutive-failure counter
    ///
    /// Not cleared when the circuit opens, so while open it reports the
    /// failures that tripped it (plus any half-open relapse).
    pub async fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Get the number of successful trial calls in the current half-open period
    pub async fn half_open_attempts(&self) -> u32 {
        self.lock().half_open_attempts
    }

    /// Get metrics
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        self.lock().metrics.clone()
    }

    /// Point-in-time view of state, counters and metrics
    pub async fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        let now = self.clock.now();

        BreakerSnapshot {
            name: self.name.clone(),
            state: state.circuit_state,
            failure_count: state.failure_count,
            half_open_attempts: state.half_open_attempts,
            half_open_in_flight: state.half_open_in_flight,
            since_last_failure_ms: state
                .last_failure_time
                .map(|t| now.saturating_duration_since(t).as_millis() as u64),
            metrics: state.metrics.clone(),
        }
    }

    /// Dependency identifier
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration fixed at construction
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }

    /// Decide whether a call may run
    fn admit(&self) -> Option<Admission> {
        let mut state = self.lock();

        let trial = match state.circuit_state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let now = self.clock.now();
                let elapsed = state
                    .last_failure_time
                    .map(|t| now.saturating_duration_since(t));

                match elapsed {
                    Some(elapsed) if elapsed < self.config.reset_timeout() => {
                        debug!(
                            breaker = %self.name,
                            time_remaining = ?self.config.reset_timeout() - elapsed,
                            "Circuit breaker open, rejecting call"
                        );
                        self.reject(&mut state);
                        return None;
                    }
                    _ => {
                        // This call becomes the first trial
                        self.transition_to_half_open(&mut state);
                        state.half_open_in_flight += 1;
                        true
                    }
                }
            }
            CircuitState::HalfOpen => {
                let committed = state.half_open_attempts + state.half_open_in_flight;
                if committed >= self.config.half_open_max_attempts {
                    debug!(
                        breaker = %self.name,
                        half_open_attempts = state.half_open_attempts,
                        in_flight = state.half_open_in_flight,
                        "Half-open trial slots taken, rejecting call"
                    );
                    self.reject(&mut state);
                    return None;
                }

                state.half_open_in_flight += 1;
                debug!(
                    breaker = %self.name,
                    in_flight = state.half_open_in_flight,
                    max = self.config.half_open_max_attempts,
                    "Allowing half-open trial call"
                );
                true
            }
        };

        state.metrics.total_calls += 1;

        Some(Admission {
            generation: state.generation,
            trial,
            settled: false,
            state: self.state.clone(),
        })
    }

    fn reject(&self, state: &mut State) {
        state.metrics.rejected_calls += 1;
        metrics::record_call(&self.name, "rejected");
    }

    /// Record a successful call
    fn record_success(&self, admission: &mut Admission) {
        let mut state = self.lock();
        admission.settled = true;
        state.metrics.successful_calls += 1;

        if admission.generation != state.generation {
            self.record_stale(&mut state, "success");
            return;
        }
        metrics::record_call(&self.name, "success");
        if admission.trial {
            state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
        }

        match state.circuit_state {
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                state.half_open_attempts += 1;

                debug!(
                    breaker = %self.name,
                    half_open_attempts = state.half_open_attempts,
                    max = self.config.half_open_max_attempts,
                    "Half-open trial call succeeded"
                );

                if state.half_open_attempts >= self.config.half_open_max_attempts {
                    self.transition_to_closed(&mut state);
                }
            }
            CircuitState::Open => {
                // Opening bumps the generation, so this cannot be a current admission
                warn!(breaker = %self.name, "Recording success in open state");
            }
        }
    }

    /// Record a failed call
    fn record_failure(&self, admission: &mut Admission) {
        let mut state = self.lock();
        admission.settled = true;
        state.metrics.failed_calls += 1;

        if admission.generation != state.generation {
            self.record_stale(&mut state, "failure");
            return;
        }
        metrics::record_call(&self.name, "failure");
        if admission.trial {
            state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
        }

        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_time = Some(self.clock.now());

        match state.circuit_state {
            CircuitState::Closed => {
                debug!(
                    breaker = %self.name,
                    failure_count = state.failure_count,
                    threshold = self.config.failure_threshold,
                    "Call failed in closed state"
                );

                if state.failure_count >= self.config.failure_threshold {
                    self.transition_to_open(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    breaker = %self.name,
                    "Half-open trial call failed, reopening circuit"
                );
                self.transition_to_open(&mut state);
            }
            CircuitState::Open => {
                debug!(breaker = %self.name, "Recording failure in open state");
            }
        }
    }

    fn record_stale(&self, state: &mut State, outcome: &str) {
        state.metrics.stale_outcomes += 1;
        metrics::record_call(&self.name, "stale");
        debug!(
            breaker = %self.name,
            outcome,
            state = %state.circuit_state,
            "Ignoring outcome of a call admitted before the last transition"
        );
    }

    fn set_state(&self, state: &mut State, to: CircuitState) {
        let from = state.circuit_state;
        state.circuit_state = to;
        state.generation += 1;

        metrics::record_circuit_breaker_transition(&self.name, &from.to_string(), &to.to_string());
        metrics::record_circuit_breaker_state(&self.name, to.as_gauge());
    }

    /// Transition to open state
    fn transition_to_open(&self, state: &mut State) {
        info!(
            breaker = %self.name,
            failure_count = state.failure_count,
            "Circuit breaker opening"
        );

        self.set_state(state, CircuitState::Open);
        state.half_open_attempts = 0;
        state.half_open_in_flight = 0;
        state.metrics.circuit_opened_count += 1;
    }

    /// Transition to half-open state
    fn transition_to_half_open(&self, state: &mut State) {
        info!(
            breaker = %self.name,
            reset_timeout = ?self.config.reset_timeout(),
            "Circuit breaker transitioning to half-open"
        );

        self.set_state(state, CircuitState::HalfOpen);
        state.half_open_attempts = 0;
        state.half_open_in_flight = 0;
        state.metrics.circuit_half_opened_count += 1;
    }

    /// Transition to closed state
    fn transition_to_closed(&self, state: &mut State) {
        info!(
            breaker = %self.name,
            half_open_attempts = state.half_open_attempts,
            "Circuit breaker closing"
        );

        self.set_state(state, CircuitState::Closed);
        state.failure_count = 0;
        state.half_open_attempts = 0;
        state.half_open_in_flight = 0;
        state.metrics.circuit_closed_count += 1;
    }
}
