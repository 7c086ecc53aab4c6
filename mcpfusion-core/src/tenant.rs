//! Per-request tenant context (§3 "Tenant context").

use crate::correlation::CorrelationId;
use serde::{Deserialize, Serialize};

/// Fixed hash value used for callers that connect without an API token,
/// when the transport middleware is configured to permit it.
pub const NO_AUTH_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";
pub const NO_AUTH_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

/// The principal computed for one inbound MCP call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContext {
    /// SHA-256 hash of the API token's plaintext (hex), or [`NO_AUTH_HASH`].
    pub token_hash: String,
    /// Stable user id this token is linked to.
    pub user_id: String,
    /// Correlation id for this call.
    pub request_id: CorrelationId,
    /// Populated once tool lookup has resolved a service.
    pub service: Option<String>,
}

impl TenantContext {
    pub fn new(token_hash: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token_hash: token_hash.into(),
            user_id: user_id.into(),
            request_id: CorrelationId::new(),
            service: None,
        }
    }

    /// The sentinel tenant used for untokened requests.
    pub fn no_auth() -> Self {
        Self::new(NO_AUTH_HASH, NO_AUTH_USER_ID)
    }

    pub fn is_no_auth(&self) -> bool {
        self.token_hash == NO_AUTH_HASH
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}
