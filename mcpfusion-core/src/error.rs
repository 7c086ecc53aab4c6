//! Error categories shared across every MCPFusion crate.
//!
//! Every fallible operation in the gateway eventually reduces to one of
//! these categories so the reliability layer and the MCP-facing error
//! translator can treat errors uniformly regardless of which subsystem
//! raised them.

use serde::{Deserialize, Serialize};

/// Coarse-grained error category used for retry policy, circuit-breaker
/// bookkeeping and the plain-text error surfaced to MCP callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Fatal at load time; never retried.
    Configuration,
    /// The caller must complete an interactive step before retrying.
    AuthenticationRequired,
    /// Bad tool arguments; never retried.
    Validation,
    /// 401/403 from an upstream; retried once after invalidating the token.
    PermissionDenied,
    /// 429 from an upstream; retried within budget, honouring `Retry-After`.
    RateLimited,
    /// Network failure, timeout or 5xx; retried per policy.
    Transient,
    /// 4xx other than auth/rate-limit; never retried.
    Client,
    /// The circuit breaker for this service is open.
    CircuitOpen,
    /// The persistent store failed; the triggering write was rolled back.
    Store,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Whether the reliability layer should ever retry an error in this
    /// category, independent of the configured retryable-category set.
    pub fn is_retryable_by_default(self) -> bool {
        matches!(
            self,
            ErrorCategory::Transient | ErrorCategory::RateLimited | ErrorCategory::PermissionDenied
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::AuthenticationRequired => "authentication_required",
            ErrorCategory::Validation => "validation",
            ErrorCategory::PermissionDenied => "permission_denied",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Client => "client",
            ErrorCategory::CircuitOpen => "circuit_open",
            ErrorCategory::Store => "store",
            ErrorCategory::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// Implemented by every crate-local error enum so the gateway can convert
/// any error into `(category, sanitised message)` without knowing the
/// concrete type.
pub trait Categorized {
    fn category(&self) -> ErrorCategory;
}

/// A gateway-facing error: category plus a plain-text message that has
/// already passed through [`crate::redact::sanitize`].
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ToolError {
    pub category: ErrorCategory,
    pub message: String,
    pub correlation_id: String,
}

impl ToolError {
    pub fn new(category: ErrorCategory, message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            category,
            message: crate::redact::sanitize(&message.into()),
            correlation_id: correlation_id.into(),
        }
    }
}
