//! The per-strategy contract every authentication method implements
//! (spec §4.4): `authenticate`, `refresh`, `apply`, and a `supports_refresh`
//! predicate.

use async_trait::async_trait;
use mcpfusion_store::{Store, StoredToken};
use serde_json::Value;

use crate::error::AuthResult;

/// Everything a strategy needs to act for one (tenant, service) pair.
pub struct AuthContext<'a> {
    pub tenant_hash: &'a str,
    pub service: &'a str,
    pub http: &'a reqwest::Client,
    /// Write-through handle so long-running flows (device polling) can
    /// persist a token once it arrives, independent of the call that
    /// started them.
    pub store: &'a Store,
}

/// Headers/query/cookies collected for one outgoing upstream request. The
/// HTTP request engine builds the rest of the request and merges this in.
#[derive(Debug, Default)]
pub struct PreparedRequest {
    pub headers: http::HeaderMap,
    pub query: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
}

impl PreparedRequest {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Establish a brand-new stored token from the service's opaque
    /// auth configuration.
    async fn authenticate(&self, ctx: &AuthContext<'_>, config: &Value) -> AuthResult<StoredToken>;

    /// Refresh an existing stored token. Only ever called when
    /// [`AuthStrategy::supports_refresh`] is true.
    async fn refresh(&self, ctx: &AuthContext<'_>, config: &Value, stored: &StoredToken) -> AuthResult<StoredToken>;

    /// Apply a stored token to an outgoing request.
    fn apply(&self, config: &Value, stored: &StoredToken, request: &mut PreparedRequest) -> AuthResult<()>;

    fn supports_refresh(&self) -> bool;
}

/// Reads a dot-separated path (`"data.token"`) out of a JSON value. Object
/// keys only; no array indexing, matching the strategies that need it.
pub(crate) fn dot_path_get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

pub(crate) fn config_str<'a>(config: &'a Value, field: &str, strategy: &str) -> AuthResult<&'a str> {
    config
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| crate::error::AuthError::InvalidConfig(strategy.to_string(), format!("missing '{field}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dot_path_resolves_nested_field() {
        let body = json!({"data": {"token": "abc123"}});
        assert_eq!(dot_path_get(&body, "data.token").unwrap(), "abc123");
    }

    #[test]
    fn dot_path_missing_segment_is_none() {
        let body = json!({"data": {}});
        assert!(dot_path_get(&body, "data.token").is_none());
    }
}
