//! Circuit breaker per spec §4.7.
//!
//! One breaker per upstream service (the http engine keys its breaker map
//! by service name, not by tenant, matching the spec's "circuit breaker
//! (per service)"). The breaker owns the
//! categorised-failure contract itself: [`CircuitBreaker::record_failure`]
//! takes the caller's [`ErrorCategory`] and only counts it against the
//! window when it is one of `breaker_categories` (by default `transient`
//! and `rate_limited` — a 404 on a validly configured endpoint is a
//! `client` error and never trips the breaker). Callers no longer need to
//! re-derive that contract themselves.

use mcpfusion_core::ErrorCategory;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of categorised failures within `window` before opening.
    pub failure_threshold: u32,
    /// Number of successes in half-open state before closing.
    pub success_threshold: u32,
    /// Time to wait before transitioning from open to half-open.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Rolling window over which failures are counted.
    #[serde(with = "humantime_serde", default = "default_window")]
    pub window: Duration,
    /// Minimum requests observed in the window before the breaker evaluates.
    #[serde(default = "default_min_requests")]
    pub min_requests: u32,
    /// Error categories that count against the failure window. Anything
    /// else reaching [`CircuitBreaker::record_failure`] is ignored.
    #[serde(default = "default_breaker_categories")]
    pub breaker_categories: HashSet<ErrorCategory>,
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

fn default_min_requests() -> u32 {
    5
}

fn default_breaker_categories() -> HashSet<ErrorCategory> {
    [ErrorCategory::Transient, ErrorCategory::RateLimited].into_iter().collect()
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(60),
            window: default_window(),
            min_requests: default_min_requests(),
            breaker_categories: default_breaker_categories(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CircuitMetrics {
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_time: Option<Instant>,
    pub last_success_time: Option<Instant>,
    pub last_state_change: Option<Instant>,
}

/// Per-service circuit breaker. The http engine keeps one of these per
/// upstream service name so one tenant's broken integration against a
/// service degrades that service for everyone calling it, not the tenant's
/// other services.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

struct CircuitBreakerState {
    state: CircuitState,
    metrics: CircuitMetrics,
    window_requests: Vec<(Instant, bool)>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                metrics: CircuitMetrics::default(),
                window_requests: Vec::new(),
            })),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Whether requests should currently be rejected without dispatch.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();
        self.update_state(&mut state);
        matches!(state.state, CircuitState::Open)
    }

    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.update_state(&mut state);
        state.state
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        self.update_state(&mut state);

        let now = Instant::now();
        state.metrics.total_requests += 1;
        state.metrics.total_successes += 1;
        state.metrics.last_success_time = Some(now);
        state.window_requests.push((now, true));

        match state.state {
            CircuitState::HalfOpen => {
                state.metrics.consecutive_successes += 1;
                state.metrics.consecutive_failures = 0;
                if state.metrics.consecutive_successes >= self.config.success_threshold {
                    self.transition_to_closed(&mut state);
                }
            }
            CircuitState::Closed => {
                state.metrics.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }

        self.clean_window(&mut state);
    }

    /// Record an outcome categorised by the caller. Only categories in
    /// `breaker_categories` (transient, rate-limited by default) count
    /// against the failure window; anything else is a no-op, so a caller
    /// can pass every non-success error through without re-deriving which
    /// categories are allowed to trip the breaker.
    pub fn record_failure(&self, category: ErrorCategory) {
        if !self.config.breaker_categories.contains(&category) {
            return;
        }

        let mut state = self.state.lock();
        self.update_state(&mut state);

        let now = Instant::now();
        state.metrics.total_requests += 1;
        state.metrics.total_failures += 1;
        state.metrics.last_failure_time = Some(now);
        state.metrics.consecutive_failures += 1;
        state.window_requests.push((now, false));

        match state.state {
            CircuitState::Closed => {
                self.clean_window(&mut state);
                if self.should_open(&state) {
                    self.transition_to_open(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                state.metrics.consecutive_successes = 0;
                self.transition_to_open(&mut state);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_rejection(&self) {
        let mut state = self.state.lock();
        state.metrics.total_rejected += 1;
    }

    pub fn metrics(&self) -> CircuitMetrics {
        self.state.lock().metrics.clone()
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.state = CircuitState::Closed;
        state.metrics = CircuitMetrics::default();
        state.window_requests.clear();
        state.metrics.last_state_change = Some(Instant::now());
    }

    fn update_state(&self, state: &mut CircuitBreakerState) {
        if state.state == CircuitState::Open {
            if let Some(last_failure) = state.metrics.last_failure_time {
                if last_failure.elapsed() >= self.config.timeout {
                    self.transition_to_half_open(state);
                }
            }
        }
    }

    fn should_open(&self, state: &CircuitBreakerState) -> bool {
        let window_failures = state.window_requests.iter().filter(|(_, success)| !success).count() as u32;
        let window_total = state.window_requests.len() as u32;
        window_total >= self.config.min_requests && window_failures >= self.config.failure_threshold
    }

    fn clean_window(&self, state: &mut CircuitBreakerState) {
        let cutoff = Instant::now() - self.config.window;
        state.window_requests.retain(|(timestamp, _)| *timestamp > cutoff);
    }

    fn transition_to_open(&self, state: &mut CircuitBreakerState) {
        state.state = CircuitState::Open;
        state.metrics.last_state_change = Some(Instant::now());
        tracing::warn!(
            consecutive_failures = state.metrics.consecutive_failures,
            "circuit breaker opened"
        );
    }

    fn transition_to_closed(&self, state: &mut CircuitBreakerState) {
        state.state = CircuitState::Closed;
        state.metrics.consecutive_failures = 0;
        state.metrics.consecutive_successes = 0;
        state.metrics.last_state_change = Some(Instant::now());
        tracing::info!("circuit breaker closed after successful recovery");
    }

    fn transition_to_half_open(&self, state: &mut CircuitBreakerState) {
        state.state = CircuitState::HalfOpen;
        state.metrics.consecutive_successes = 0;
        state.metrics.last_state_change = Some(Instant::now());
        tracing::info!("circuit breaker half-open, probing for recovery");
    }
}

pub struct CircuitBreakerBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerBuilder {
    pub fn new() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
        }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    pub fn min_requests(mut self, min: u32) -> Self {
        self.config.min_requests = min;
        self
    }

    pub fn breaker_categories(mut self, categories: HashSet<ErrorCategory>) -> Self {
        self.config.breaker_categories = categories;
        self
    }

    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::new(self.config)
    }
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn basic_open_half_open_close_flow() {
        let breaker = CircuitBreakerBuilder::new()
            .failure_threshold(3)
            .success_threshold(2)
            .timeout(Duration::from_millis(100))
            .min_requests(1)
            .build();

        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure(ErrorCategory::Transient);
        breaker.record_failure(ErrorCategory::Transient);
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure(ErrorCategory::Transient);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.is_open());

        thread::sleep(Duration::from_millis(150));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.is_open());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreakerBuilder::new()
            .failure_threshold(2)
            .success_threshold(2)
            .timeout(Duration::from_millis(50))
            .min_requests(1)
            .build();

        breaker.record_failure(ErrorCategory::Transient);
        breaker.record_failure(ErrorCategory::Transient);
        assert_eq!(breaker.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(100));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure(ErrorCategory::Transient);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn metrics_track_totals() {
        let breaker = CircuitBreaker::with_defaults();

        breaker.record_success();
        breaker.record_success();
        breaker.record_failure(ErrorCategory::Transient);
        breaker.record_rejection();

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.total_successes, 2);
        assert_eq!(metrics.total_failures, 1);
        assert_eq!(metrics.total_rejected, 1);
    }

    #[test]
    fn failures_outside_window_do_not_count() {
        let breaker = CircuitBreakerBuilder::new()
            .failure_threshold(3)
            .window(Duration::from_millis(200))
            .min_requests(3)
            .build();

        breaker.record_failure(ErrorCategory::Transient);
        breaker.record_failure(ErrorCategory::Transient);

        thread::sleep(Duration::from_millis(250));

        breaker.record_failure(ErrorCategory::Transient);
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure(ErrorCategory::Transient);
        breaker.record_failure(ErrorCategory::Transient);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn uncategorised_failures_never_trip_the_breaker() {
        let breaker = CircuitBreakerBuilder::new().failure_threshold(1).min_requests(1).build();

        for _ in 0..10 {
            breaker.record_failure(ErrorCategory::Client);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().total_failures, 0);

        breaker.record_failure(ErrorCategory::Transient);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn custom_breaker_categories_replace_the_default_set() {
        let breaker = CircuitBreakerBuilder::new()
            .failure_threshold(1)
            .min_requests(1)
            .breaker_categories([ErrorCategory::PermissionDenied].into_iter().collect())
            .build();

        breaker.record_failure(ErrorCategory::Transient);
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure(ErrorCategory::PermissionDenied);
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
