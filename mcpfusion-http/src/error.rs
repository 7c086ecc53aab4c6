//! Errors raised by the HTTP request engine (spec §4.6-§4.8).

use std::time::Duration;

use mcpfusion_core::{Categorized, ErrorCategory};
use mcpfusion_resilience::RetryHint;
use thiserror::Error;

pub type HttpResult<T> = Result<T, HttpEngineError>;

#[derive(Debug, Clone, Error)]
pub enum HttpEngineError {
    #[error("parameter error: {0}")]
    Param(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("network error calling upstream: {0}")]
    Network(String),

    #[error("upstream returned {status}: {body}")]
    Upstream {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("circuit breaker open for service '{0}'")]
    CircuitOpen(String),

    #[error("invalid header name or value: {0}")]
    InvalidHeader(String),

    #[error("response body was not valid {expected}: {detail}")]
    InvalidBody { expected: &'static str, detail: String },

    #[error("pagination path '{0}' did not resolve to an array")]
    PaginationShape(String),

    #[error("response transform path '{0}' did not resolve")]
    TransformPath(String),
}

impl From<mcpfusion_config::ParamError> for HttpEngineError {
    fn from(e: mcpfusion_config::ParamError) -> Self {
        HttpEngineError::Param(e.to_string())
    }
}

impl From<mcpfusion_auth::AuthError> for HttpEngineError {
    fn from(e: mcpfusion_auth::AuthError) -> Self {
        HttpEngineError::Auth(e.to_string())
    }
}

impl From<reqwest::Error> for HttpEngineError {
    fn from(e: reqwest::Error) -> Self {
        HttpEngineError::Network(e.to_string())
    }
}

/// Maps an upstream HTTP status to the shared error taxonomy (spec §4.7).
pub fn category_for_status(status: u16) -> ErrorCategory {
    match status {
        401 | 403 => ErrorCategory::PermissionDenied,
        429 => ErrorCategory::RateLimited,
        500..=599 => ErrorCategory::Transient,
        400..=499 => ErrorCategory::Client,
        _ => ErrorCategory::Internal,
    }
}

impl Categorized for HttpEngineError {
    fn category(&self) -> ErrorCategory {
        match self {
            HttpEngineError::Param(_) => ErrorCategory::Validation,
            HttpEngineError::Auth(_) => ErrorCategory::AuthenticationRequired,
            HttpEngineError::Network(_) => ErrorCategory::Transient,
            HttpEngineError::Upstream { status, .. } => category_for_status(*status),
            HttpEngineError::CircuitOpen(_) => ErrorCategory::CircuitOpen,
            HttpEngineError::InvalidHeader(_) => ErrorCategory::Configuration,
            HttpEngineError::InvalidBody { .. } => ErrorCategory::Transient,
            HttpEngineError::PaginationShape(_) => ErrorCategory::Configuration,
            HttpEngineError::TransformPath(_) => ErrorCategory::Configuration,
        }
    }
}

impl RetryHint for HttpEngineError {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            HttpEngineError::Upstream { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_rate_limit_statuses_map_correctly() {
        assert_eq!(category_for_status(401), ErrorCategory::PermissionDenied);
        assert_eq!(category_for_status(403), ErrorCategory::PermissionDenied);
        assert_eq!(category_for_status(429), ErrorCategory::RateLimited);
        assert_eq!(category_for_status(503), ErrorCategory::Transient);
        assert_eq!(category_for_status(404), ErrorCategory::Client);
    }

    #[test]
    fn upstream_error_carries_retry_after_through_the_hint() {
        let err = HttpEngineError::Upstream {
            status: 429,
            body: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }
}
