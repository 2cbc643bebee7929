pub mod breaker;
pub mod clock;
pub mod registry;
pub mod types;

pub use breaker::CircuitBreaker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use registry::CircuitBreakerRegistry;
pub use types::{BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
