//! Configuration and parameter errors.

use mcpfusion_core::{Categorized, ErrorCategory};
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// One or more load-time validation checks failed. Carries every
    /// failure found, not just the first, so an operator can fix a
    /// configuration file in one pass.
    #[error("configuration invalid: {} issue(s)", .0.len())]
    Invalid(Vec<ValidationIssue>),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Categorized for ConfigError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Parameter validation/transform errors raised per tool invocation,
/// distinct from load-time [`ConfigError`] since they happen on the
/// request path and must map to MCP-facing categories.
#[derive(Debug, Error, Clone)]
pub enum ParamError {
    #[error("parameter missing: {0}")]
    Missing(String),
    #[error("parameter invalid: {0}: {1}")]
    Invalid(String, String),
    #[error("parameter conflict: {0}")]
    Conflict(String),
}

impl Categorized for ParamError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}
