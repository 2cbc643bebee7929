use super::breaker::CircuitBreaker;
use super::clock::{Clock, SystemClock};
use super::types::{BreakerSnapshot, CircuitState};
use crate::config::GuardConfig;
use crate::error::{CircuitBreakerError, Result};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Circuit breakers for a set of dependencies, one per dependency name
///
/// Build one at composition time and hand it (or the individual breaker
/// handles) to the service clients that need it.
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    /// Circuit breakers per dependency
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    /// Defaults and per-dependency overrides
    config: Arc<GuardConfig>,
    /// Clock shared by every breaker
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    /// Create a registry on the system clock
    pub fn new(config: GuardConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry whose breakers all use `clock`
    ///
    /// Breakers named in the configuration are created up front.
    pub fn with_clock(config: GuardConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let registry = Self {
            breakers: Arc::new(DashMap::new()),
            config: Arc::new(config),
            clock,
        };
        for name in registry.config.breakers.keys() {
            registry.breaker(name);
        }

        Ok(registry)
    }

    /// Get or create the circuit breaker for a dependency
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(breaker = name, "Registering circuit breaker");
                Arc::new(CircuitBreaker::with_clock(
                    name,
                    self.config.breaker_config(name),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Get the circuit breaker for a dependency if one exists
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// Run `operation` through the named dependency's breaker
    pub async fn execute<F, Fut, T, E>(
        &self,
        name: &str,
        operation: F,
    ) -> std::result::Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.breaker(name).execute(operation).await
    }

    /// Get the state of a dependency's breaker
    ///
    /// Unknown dependencies report `Closed`, which is what a fresh breaker
    /// would report.
    pub async fn state(&self, name: &str) -> CircuitState {
        match self.get(name) {
            Some(breaker) => breaker.state().await,
            None => CircuitState::Closed,
        }
    }

    /// Get all dependency names with circuit breakers
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot every breaker, ordered by name
    pub async fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut results = Vec::new();
        for breaker in self.handles() {
            results.push(breaker.snapshot().await);
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        results
    }

    /// Manually reset every breaker
    pub async fn reset_all(&self) {
        for breaker in self.handles() {
            breaker.reset().await;
        }
    }

    // Clone the handles out so no map guard is held across an await
    fn handles(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.iter().map(|e| e.value().clone()).collect()
    }
}
