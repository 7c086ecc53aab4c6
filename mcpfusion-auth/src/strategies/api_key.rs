//! Named-header API-key authentication (spec §4.4 "Bearer / API key / Basic").

use async_trait::async_trait;
use chrono::Utc;
use http::{HeaderName, HeaderValue};
use mcpfusion_store::StoredToken;
use serde_json::Value;

use crate::error::{AuthError, AuthResult};
use crate::strategy::{config_str, AuthContext, AuthStrategy, PreparedRequest};

pub struct ApiKeyStrategy;

fn header_name(config: &Value) -> &str {
    config.get("header").and_then(Value::as_str).unwrap_or("X-API-Key")
}

#[async_trait]
impl AuthStrategy for ApiKeyStrategy {
    async fn authenticate(&self, _ctx: &AuthContext<'_>, config: &Value) -> AuthResult<StoredToken> {
        let key = config_str(config, "key", "api_key")?;
        let now = Utc::now();
        Ok(StoredToken {
            access_token: key.to_string(),
            refresh_token: None,
            token_type: "ApiKey".to_string(),
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

    fn apply(&self, config: &Value, stored: &StoredToken, request: &mut PreparedRequest) -> AuthResult<()> {
        let name = HeaderName::try_from(header_name(config)).map_err(|e| AuthError::InvalidConfig("api_key".to_string(), e.to_string()))?;
        let value =
            HeaderValue::from_str(&stored.access_token).map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?;
        request.headers.insert(name, value);
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
    async fn apply_uses_configured_header_name() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let http = reqwest::Client::new();
        let ctx = AuthContext { tenant_hash: "t", service: "svc", http: &http, store: &store };

        let config = json!({"key": "secret", "header": "X-Custom-Key"});
        let token = ApiKeyStrategy.authenticate(&ctx, &config).await.unwrap();

        let mut req = PreparedRequest::new();
        ApiKeyStrategy.apply(&config, &token, &mut req).unwrap();
        assert_eq!(req.headers.get("x-custom-key").unwrap(), "secret");
    }

    #[tokio::test]
    async fn apply_defaults_to_x_api_key() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let http = reqwest::Client::new();
        let ctx = AuthContext { tenant_hash: "t", service: "svc", http: &http, store: &store };

        let config = json!({"key": "secret"});
        let token = ApiKeyStrategy.authenticate(&ctx, &config).await.unwrap();

        let mut req = PreparedRequest::new();
        ApiKeyStrategy.apply(&config, &token, &mut req).unwrap();
        assert_eq!(req.headers.get("x-api-key").unwrap(), "secret");
    }
}
