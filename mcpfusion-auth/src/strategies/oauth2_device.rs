//! OAuth2 device-authorization-grant flow (spec §4.4 "OAuth2 device flow").
//!
//! `authenticate` kicks off the flow and returns immediately with a
//! distinguished, user-surfaced error carrying the verification URL and
//! user code. A detached task polls the token endpoint in the background
//! and writes the resulting token straight to the store once granted, so
//! the next `GetToken` call for this (tenant, service) picks it up.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use http::header::AUTHORIZATION;
use http::HeaderValue;
use mcpfusion_store::StoredToken;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::{AuthError, AuthResult};
use crate::strategy::{config_str, AuthContext, AuthStrategy, PreparedRequest};

pub struct OAuth2DeviceStrategy;

#[derive(Debug, Deserialize)]
struct DeviceAuthResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    #[serde(default = "default_interval")]
    interval: u64,
}

fn default_interval() -> u64 {
    5
}

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

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
}

/// Substitutes `${MS365_TENANT_ID}`-style placeholders using the
/// `tenant_id` field of the strategy config, per spec §4.4.
fn expand_tenant_placeholder(url: &str, config: &Value) -> String {
    match config.get("tenant_id").and_then(Value::as_str) {
        Some(tenant_id) => url.replace("${MS365_TENANT_ID}", tenant_id),
        None => url.to_string(),
    }
}

fn token_from_response(resp: TokenResponse) -> StoredToken {
    let now = Utc::now();
    StoredToken {
        access_token: resp.access_token,
        refresh_token: resp.refresh_token,
        token_type: "Bearer".to_string(),
        expires_at: resp.expires_in.map(|secs| now + ChronoDuration::seconds(secs)),
        scope: resp
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        created_at: now,
        updated_at: now,
        metadata: None,
    }
}

#[async_trait]
impl AuthStrategy for OAuth2DeviceStrategy {
    async fn authenticate(&self, ctx: &AuthContext<'_>, config: &Value) -> AuthResult<StoredToken> {
        let device_auth_url = expand_tenant_placeholder(config_str(config, "device_auth_url", "oauth2_device")?, config);
        let token_url = expand_tenant_placeholder(config_str(config, "token_url", "oauth2_device")?, config);
        let client_id = config_str(config, "client_id", "oauth2_device")?.to_string();
        let scope = config.get("scope").and_then(Value::as_str).map(str::to_string);

        let mut form = vec![("client_id", client_id.clone())];
        if let Some(scope) = &scope {
            form.push(("scope", scope.clone()));
        }

        let device: DeviceAuthResponse = ctx.http.post(&device_auth_url).form(&form).send().await?.json().await?;

        let verification_url = device.verification_uri_complete.clone().unwrap_or_else(|| device.verification_uri.clone());
        let user_code = device.user_code.clone();

        let store = ctx.store.clone();
        let tenant_hash = ctx.tenant_hash.to_string();
        let service = ctx.service.to_string();
        let http = ctx.http.clone();

        tokio::spawn(async move {
            poll_for_token(&http, &token_url, &client_id, &device.device_code, device.interval, store, &tenant_hash, &service).await;
        });

        Err(AuthError::DeviceCodeIssued { verification_url, user_code })
    }

    async fn refresh(&self, ctx: &AuthContext<'_>, config: &Value, stored: &StoredToken) -> AuthResult<StoredToken> {
        let Some(refresh_token) = &stored.refresh_token else {
            return Err(AuthError::RefreshUnavailable { service: ctx.service.to_string() });
        };
        let token_url = expand_tenant_placeholder(config_str(config, "token_url", "oauth2_device")?, config);
        let client_id = config_str(config, "client_id", "oauth2_device")?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id),
        ];
        let resp = ctx.http.post(&token_url).form(&form).send().await?;
        if !resp.status().is_success() {
            return Err(AuthError::RefreshUnavailable { service: ctx.service.to_string() });
        }
        let body: TokenResponse = resp.json().await?;
        Ok(token_from_response(body))
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

async fn poll_for_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    device_code: &str,
    mut interval: u64,
    store: mcpfusion_store::Store,
    tenant_hash: &str,
    service: &str,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15 * 60);
    loop {
        tokio::time::sleep(Duration::from_secs(interval)).await;
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(service, "device code polling gave up after the expiry window");
            return;
        }

        let form = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ("device_code", device_code),
            ("client_id", client_id),
        ];
        let resp = match http.post(token_url).form(&form).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(service, error = %e, "device code poll request failed, retrying");
                continue;
            }
        };

        if resp.status().is_success() {
            match resp.json::<TokenResponse>().await {
                Ok(body) => {
                    let token = token_from_response(body);
                    if let Err(e) = store.store_oauth_token(tenant_hash, service, &token) {
                        tracing::error!(service, error = %e, "failed to persist device-flow token");
                    } else {
                        tracing::info!(service, "device flow completed");
                    }
                }
                Err(e) => tracing::warn!(service, error = %e, "device token response was not valid JSON"),
            }
            return;
        }

        match resp.json::<TokenErrorResponse>().await {
            Ok(err) if err.error == "authorization_pending" => continue,
            Ok(err) if err.error == "slow_down" => {
                interval += 5;
                continue;
            }
            Ok(err) if err.error == "access_denied" => {
                tracing::info!(service, "device authorization was denied by the user");
                return;
            }
            Ok(err) if err.error == "expired_token" => {
                tracing::info!(service, "device authorization expired");
                return;
            }
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_placeholder_is_substituted() {
        let config = serde_json::json!({"tenant_id": "contoso"});
        let url = expand_tenant_placeholder("https://login.example.com/${MS365_TENANT_ID}/device", &config);
        assert_eq!(url, "https://login.example.com/contoso/device");
    }

    #[test]
    fn missing_tenant_id_leaves_placeholder_untouched() {
        let config = serde_json::json!({});
        let url = expand_tenant_placeholder("https://login.example.com/${MS365_TENANT_ID}/device", &config);
        assert_eq!(url, "https://login.example.com/${MS365_TENANT_ID}/device");
    }
}
