//! Gateway-level errors: config/startup failures plus dispatch-time
//! failures that are not already covered by a lower crate's error type.

use mcpfusion_core::{Categorized, ErrorCategory};
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to read config file '{path}': {source}")]
    Io { path: String, source: std::io::Error },

    #[error("invalid gateway configuration: {0}")]
    Config(String),

    #[error("no tool named '{0}' is registered")]
    UnknownTool(String),

    #[error("tool name '{0}' does not match '<service>_<endpoint>'")]
    MalformedToolName(String),

    #[error("tenant is not permitted to call service '{0}'")]
    TenantDenied(String),

    #[error("command group '{0}' has no local execution backend configured")]
    CommandNotImplemented(String),

    #[error(transparent)]
    ConfigLoad(#[from] mcpfusion_config::ConfigError),

    #[error(transparent)]
    Store(#[from] mcpfusion_store::StoreError),

    #[error(transparent)]
    Auth(#[from] mcpfusion_auth::AuthError),

    #[error(transparent)]
    Http(#[from] mcpfusion_http::HttpEngineError),
}

impl Categorized for GatewayError {
    fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::Io { .. } | GatewayError::Config(_) | GatewayError::ConfigLoad(_) => ErrorCategory::Configuration,
            GatewayError::UnknownTool(_) | GatewayError::MalformedToolName(_) => ErrorCategory::Validation,
            GatewayError::TenantDenied(_) => ErrorCategory::PermissionDenied,
            GatewayError::CommandNotImplemented(_) => ErrorCategory::Configuration,
            GatewayError::Store(e) => e.category(),
            GatewayError::Auth(e) => e.category(),
            GatewayError::Http(e) => e.category(),
        }
    }
}
