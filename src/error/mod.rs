use thiserror::Error;

/// Result type for configuration and setup operations
pub type Result<T> = std::result::Result<T, GuardError>;

/// Configuration and setup error types
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid circuit breaker configuration: {0}")]
    InvalidBreakerConfig(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome error of a guarded call
///
/// `Open` is produced by the breaker itself and means the operation was never
/// attempted. `Inner` carries the operation's own error unchanged.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open: too many failures")]
    Open,

    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// True when the breaker refused to attempt the call
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open)
    }

    /// The operation's own error, if the call was attempted
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Open => None,
            CircuitBreakerError::Inner(e) => Some(e),
        }
    }
}
