//! OAuth2 "external" flow (spec §4.4 "OAuth2 external"): the gateway never
//! initiates an interactive login for this strategy. A token only exists
//! here once the helper-flow bridge (§4.9) has pushed one in.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use http::header::AUTHORIZATION;
use http::HeaderValue;
use mcpfusion_store::StoredToken;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AuthError, AuthResult};
use crate::strategy::{config_str, AuthContext, AuthStrategy, PreparedRequest};

pub struct OAuth2ExternalStrategy;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[async_trait]
impl AuthStrategy for OAuth2ExternalStrategy {
    async fn authenticate(&self, ctx: &AuthContext<'_>, _config: &Value) -> AuthResult<StoredToken> {
        Err(AuthError::ExternalAuthRequired { service: ctx.service.to_string() })
    }

    async fn refresh(&self, ctx: &AuthContext<'_>, config: &Value, stored: &StoredToken) -> AuthResult<StoredToken> {
        let Some(refresh_token) = &stored.refresh_token else {
            return Err(AuthError::RefreshUnavailable { service: ctx.service.to_string() });
        };
        let token_url = config_str(config, "token_url", "oauth2_external")?;
        let client_id = config_str(config, "client_id", "oauth2_external")?;
        let client_secret = config.get("client_secret").and_then(Value::as_str);

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id),
        ];
        if let Some(secret) = client_secret {
            form.push(("client_secret", secret));
        }

        let resp = ctx.http.post(token_url).form(&form).send().await?;
        if !resp.status().is_success() {
            return Err(AuthError::RefreshUnavailable { service: ctx.service.to_string() });
        }
        let body: TokenResponse = resp.json().await?;
        let now = Utc::now();
        Ok(StoredToken {
            access_token: body.access_token,
            refresh_token: body.refresh_token.or_else(|| stored.refresh_token.clone()),
            token_type: "Bearer".to_string(),
            expires_at: body.expires_in.map(|secs| now + ChronoDuration::seconds(secs)),
            scope: body
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(|| stored.scope.clone()),
            created_at: stored.created_at,
            updated_at: now,
            metadata: stored.metadata.clone(),
        })
    }

    fn apply(&self, _config: &Value, stored: &StoredToken, request: &mut PreparedRequest) -> AuthResult<()> {
        let value = format!("Bearer {}", stored.access_token);
        request
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_str(&value).map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?);
        Ok(())
    }

    fn supports_refresh(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpfusion_store::Store;
    use serde_json::json;

    #[tokio::test]
    async fn authenticate_always_requires_the_helper() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let http = reqwest::Client::new();
        let ctx = AuthContext { tenant_hash: "t", service: "google", http: &http, store: &store };

        let err = OAuth2ExternalStrategy.authenticate(&ctx, &json!({})).await.unwrap_err();
        assert!(matches!(err, AuthError::ExternalAuthRequired { service } if service == "google"));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails() {
        let (store, _dir) = Store::open_temporary().unwrap();
        let http = reqwest::Client::new();
        let ctx = AuthContext { tenant_hash: "t", service: "google", http: &http, store: &store };
        let now = Utc::now();
        let stored = StoredToken {
            access_token: "old".into(),
            refresh_token: None,
            token_type: "Bearer".into(),
            expires_at: None,
            scope: vec![],
            created_at: now,
            updated_at: now,
            metadata: None,
        };

        let err = OAuth2ExternalStrategy.refresh(&ctx, &json!({}), &stored).await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshUnavailable { .. }));
    }
}
