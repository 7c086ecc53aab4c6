//! Authentication errors (spec §4.4, §4.5, §4.9).

use mcpfusion_core::{Categorized, ErrorCategory};
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication config for strategy '{0}' is invalid: {1}")]
    InvalidConfig(String, String),

    #[error("no stored token for service '{service}'; run the external authentication helper first")]
    ExternalAuthRequired { service: String },

    /// Surfaced to the caller verbatim so they know where to complete
    /// the device flow; not an internal failure.
    #[error("visit {verification_url} and enter code {user_code} to finish signing in")]
    DeviceCodeIssued { verification_url: String, user_code: String },

    #[error("device authorization was denied")]
    DeviceCodeDenied,

    #[error("device authorization expired before it was completed")]
    DeviceCodeExpired,

    #[error("upstream authentication request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned an unexpected authentication response: {0}")]
    UnexpectedResponse(String),

    #[error("no refresh credential is available for service '{service}'")]
    RefreshUnavailable { service: String },

    #[error("unknown authentication strategy '{0}'")]
    UnknownStrategy(String),

    #[error("presented API token is not valid")]
    InvalidToken,

    #[error("auth-code CSRF state does not match the one issued")]
    CsrfMismatch,

    #[error("auth code is invalid, expired, or already consumed")]
    InvalidAuthCode,

    #[error(transparent)]
    Store(#[from] mcpfusion_store::StoreError),
}

impl Categorized for AuthError {
    fn category(&self) -> ErrorCategory {
        match self {
            AuthError::InvalidConfig(..) | AuthError::UnknownStrategy(_) => ErrorCategory::Configuration,
            AuthError::ExternalAuthRequired { .. }
            | AuthError::DeviceCodeIssued { .. }
            | AuthError::DeviceCodeDenied
            | AuthError::DeviceCodeExpired
            | AuthError::CsrfMismatch
            | AuthError::InvalidAuthCode
            | AuthError::InvalidToken => ErrorCategory::AuthenticationRequired,
            AuthError::Request(_) | AuthError::UnexpectedResponse(_) => ErrorCategory::Transient,
            AuthError::RefreshUnavailable { .. } => ErrorCategory::PermissionDenied,
            AuthError::Store(e) => e.category(),
        }
    }
}
