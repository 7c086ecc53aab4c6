//! HTTP Basic authentication (spec §4.4 "Bearer / API key / Basic").

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::HeaderValue;
use mcpfusion_store::StoredToken;
use serde_json::Value;

use crate::error::{AuthError, AuthResult};
use crate::strategy::{config_str, AuthContext, AuthStrategy, PreparedRequest};

pub struct BasicStrategy;

#[async_trait]
impl AuthStrategy for BasicStrategy {
    async fn authenticate(&self, _ctx: &AuthContext<'_>, config: &Value) -> AuthResult<StoredToken> {
        let username = config_str(config, "username", "basic")?;
        let password = config_str(config, "password", "basic")?;
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        let now = Utc::now();
        Ok(StoredToken {
            access_token: encoded,
            refresh_token: None,
            token_type: "Basic".to_string(),
            expires_at: None,
            scope: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: None,
        })
    }

    async fn refresh(&self, ctx: &AuthContext<'_>, config: &Value, _stored: &StoredToken) -> AuthResult<StoredToken> {
        self.authenticate(ctx, config).await
    }

    fn apply(&self, _config: &Value, stored: &StoredToken, request: &mut PreparedRequest) -> AuthResult<()> {
        let value = format!("Basic {}", stored.access_token);
        request
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_str(&value).map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?);
        Ok(())
    }

    fn supports_refresh(&self) -> bool {
        false
    }
}
