//! Retry policy, circuit breaker and connection-control policy backing
//! every upstream HTTP call the gateway makes (spec §4.7, §4.8).

pub mod backoff;
pub mod circuit_breaker;
pub mod connection;
pub mod retry;

pub use backoff::{BackoffCalculator, BackoffStrategy};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerConfig, CircuitState};
pub use connection::{ConnectionPolicy, ConnectionRegistry};
pub use retry::{RetryError, RetryExecutor, RetryHint, RetryPolicy};
