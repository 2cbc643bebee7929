use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Breaker configuration for a set of dependencies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Settings used by every breaker unless overridden
    #[serde(default)]
    pub defaults: CircuitBreakerConfig,
    /// Per-dependency overrides, keyed by dependency name
    #[serde(default)]
    pub breakers: HashMap<String, BreakerOverride>,
}

/// Partial breaker settings for one dependency
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerOverride {
    #[serde(default)]
    pub failure_threshold: Option<u32>,
    #[serde(default)]
    pub reset_timeout_ms: Option<u64>,
    #[serde(default)]
    pub half_open_max_attempts: Option<u32>,
}

impl GuardConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GuardError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Effective configuration for a dependency
    pub fn breaker_config(&self, name: &str) -> CircuitBreakerConfig {
        let defaults = &self.defaults;
        match self.breakers.get(name) {
            Some(o) => CircuitBreakerConfig {
                failure_threshold: o.failure_threshold.unwrap_or(defaults.failure_threshold),
                reset_timeout_ms: o.reset_timeout_ms.unwrap_or(defaults.reset_timeout_ms),
                half_open_max_attempts: o
                    .half_open_max_attempts
                    .unwrap_or(defaults.half_open_max_attempts),
            },
            None => defaults.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.defaults
            .validate()
            .map_err(|e| GuardError::Config(format!("defaults: {}", e)))?;

        for name in self.breakers.keys() {
            if name.trim().is_empty() {
                return Err(GuardError::Config(
                    "Breaker name cannot be empty".to_string(),
                ));
            }

            self.breaker_config(name)
                .validate()
                .map_err(|e| GuardError::Config(format!("breaker '{}': {}", name, e)))?;
        }

        Ok(())
    }
}
