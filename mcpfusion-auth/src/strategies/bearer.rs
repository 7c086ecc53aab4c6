//! Static bearer-token authentication (spec §4.4 "Bearer / API key / Basic").

use async_trait::async_trait;
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::HeaderValue;
use mcpfusion_store::StoredToken;
use serde_json::Value;

use crate::error::{AuthError, AuthResult};
use crate::strategy::{config_str, AuthContext, AuthStrategy, PreparedRequest};

pub struct BearerStrategy;

#[async_trait]
impl AuthStrategy for BearerStrategy {
    async fn authenticate(&self, _ctx: &AuthContext<'_>, config: &Value) -> AuthResult<StoredToken> {
        let token = config_str(config, "token", "bearer")?;
        let now = Utc::now();
        Ok(StoredToken {
            access_token: token.to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
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
        let value = format!("Bearer {}", stored.access_token);
        request
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_str(&value).map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?);
        Ok(())
    }

    fn supports_refresh(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpfusion_store::Store;
    use serde_json::json;

    #[tokio::test]
    async fn authenticate_reads_static_token_and_apply_sets_header() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let http = reqwest::Client::new();
        let ctx = AuthContext { tenant_hash: "t", service: "svc", http: &http, store: &store };

        let strategy = BearerStrategy;
        let token = strategy.authenticate(&ctx, &json!({"token": "abc123"})).await.unwrap();
        assert_eq!(token.access_token, "abc123");

        let mut req = PreparedRequest::new();
        strategy.apply(&json!({}), &token, &mut req).unwrap();
        assert_eq!(req.headers.get(AUTHORIZATION).unwrap(), "Bearer abc123");
    }

    #[tokio::test]
    async fn missing_token_field_is_invalid_config() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let http = reqwest::Client::new();
        let ctx = AuthContext { tenant_hash: "t", service: "svc", http: &http, store: &store };

        let err = BearerStrategy.authenticate(&ctx, &json!({})).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidConfig(..)));
    }
}
