//! Session-JWT authentication (spec §4.4 "Session JWT"): logs in against
//! `loginURL`, extracts the token by a dot-separated JSON path, and places
//! it in a header, cookie, or query parameter on outgoing requests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use http::{HeaderName, HeaderValue};
use mcpfusion_store::StoredToken;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{AuthError, AuthResult};
use crate::strategy::{config_str, dot_path_get, AuthContext, AuthStrategy, PreparedRequest};

pub struct SessionJwtStrategy;

fn method(config: &Value) -> &str {
    config.get("method").and_then(Value::as_str).unwrap_or("POST")
}

/// Pulls a `refresh_token_path`-named cookie out of a response's
/// `Set-Cookie` headers, if the server issued one.
fn refresh_cookie_from_headers(headers: &reqwest::header::HeaderMap, config: &Value) -> Option<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|c| config.get("refresh_token_path").and_then(Value::as_str).map(|p| c.starts_with(&format!("{p}="))).unwrap_or(false))
        .map(|c| c.split(';').next().unwrap_or(c).splitn(2, '=').nth(1).unwrap_or_default().to_string())
}

/// Resolves the refresh token a login/refresh response carries: a
/// `Set-Cookie` header takes precedence over the `refresh_token_path`
/// body field, matching how a browser treats a same-name cookie from the
/// same origin. Returns `None` if the response carries neither.
fn refresh_token_from_response(refresh_from_cookie: Option<String>, config: &Value, json_body: &Value) -> Option<String> {
    refresh_from_cookie.or_else(|| {
        config
            .get("refresh_token_path")
            .and_then(Value::as_str)
            .and_then(|p| dot_path_get(json_body, p))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

async fn login(http: &reqwest::Client, config: &Value) -> AuthResult<StoredToken> {
    let login_url = config_str(config, "login_url", "session_jwt")?;
    let body = config.get("body").cloned().unwrap_or_else(|| Value::Object(Default::default()));
    let token_path = config_str(config, "token_path", "session_jwt")?;

    let resp = http
        .request(method(config).parse().map_err(|_| AuthError::InvalidConfig("session_jwt".to_string(), "invalid method".to_string()))?, login_url)
        .json(&body)
        .send()
        .await?;

    let refresh_from_cookie = refresh_cookie_from_headers(resp.headers(), config);

    let json_body: Value = resp.json().await?;

    let token = dot_path_get(&json_body, token_path)
        .and_then(Value::as_str)
        .ok_or_else(|| AuthError::UnexpectedResponse(format!("token path '{token_path}' not found in login response")))?
        .to_string();

    let expires_at = config
        .get("expires_in_path")
        .and_then(Value::as_str)
        .and_then(|p| dot_path_get(&json_body, p))
        .and_then(Value::as_i64)
        .map(|secs| Utc::now() + ChronoDuration::seconds(secs));

    let refresh_token = refresh_token_from_response(refresh_from_cookie, config, &json_body);

    let now = Utc::now();
    Ok(StoredToken {
        access_token: token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_at,
        scope: Vec::new(),
        created_at: now,
        updated_at: now,
        metadata: None,
    })
}

#[async_trait]
impl AuthStrategy for SessionJwtStrategy {
    async fn authenticate(&self, ctx: &AuthContext<'_>, config: &Value) -> AuthResult<StoredToken> {
        login(ctx.http, config).await
    }

    async fn refresh(&self, ctx: &AuthContext<'_>, config: &Value, stored: &StoredToken) -> AuthResult<StoredToken> {
        let Some(refresh_url) = config.get("refresh_url").and_then(Value::as_str) else {
            return Err(AuthError::RefreshUnavailable { service: ctx.service.to_string() });
        };
        let Some(refresh_token) = &stored.refresh_token else {
            return Err(AuthError::RefreshUnavailable { service: ctx.service.to_string() });
        };
        let token_path = config_str(config, "token_path", "session_jwt")?;

        let mut body = HashMap::new();
        body.insert("refreshToken", refresh_token.as_str());
        let resp = ctx.http.post(refresh_url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(AuthError::RefreshUnavailable { service: ctx.service.to_string() });
        }
        let refresh_from_cookie = refresh_cookie_from_headers(resp.headers(), config);
        let json_body: Value = resp.json().await?;
        let token = dot_path_get(&json_body, token_path)
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::UnexpectedResponse(format!("token path '{token_path}' not found in refresh response")))?
            .to_string();

        let expires_at = config
            .get("expires_in_path")
            .and_then(Value::as_str)
            .and_then(|p| dot_path_get(&json_body, p))
            .and_then(Value::as_i64)
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));

        // Rotate the refresh token when the refresh response carries a new
        // one (cookie or body path); otherwise keep the one already stored.
        let refresh_token = refresh_token_from_response(refresh_from_cookie, config, &json_body).or_else(|| stored.refresh_token.clone());

        Ok(StoredToken {
            access_token: token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_at,
            scope: stored.scope.clone(),
            created_at: stored.created_at,
            updated_at: Utc::now(),
            metadata: stored.metadata.clone(),
        })
    }

    fn apply(&self, config: &Value, stored: &StoredToken, request: &mut PreparedRequest) -> AuthResult<()> {
        let placement = config.get("placement").and_then(Value::as_object);
        let location = placement.and_then(|p| p.get("location")).and_then(Value::as_str).unwrap_or("header");

        match location {
            "header" => {
                let name = placement.and_then(|p| p.get("name")).and_then(Value::as_str).unwrap_or("Authorization");
                let token_type = placement.and_then(|p| p.get("token_type")).and_then(Value::as_str).unwrap_or("Bearer");
                let header_name = HeaderName::try_from(name).map_err(|e| AuthError::InvalidConfig("session_jwt".to_string(), e.to_string()))?;
                let value = format!("{token_type} {}", stored.access_token);
                request
                    .headers
                    .insert(header_name, HeaderValue::from_str(&value).map_err(|e| AuthError::UnexpectedResponse(e.to_string()))?);
            }
            "cookie" => {
                let name = placement.and_then(|p| p.get("name")).and_then(Value::as_str).unwrap_or("session");
                let template = placement.and_then(|p| p.get("value_template")).and_then(Value::as_str).unwrap_or("{token}");
                let value = template.replace("{token}", &stored.access_token);
                request.cookies.push((name.to_string(), value));
            }
            "query" => {
                let name = placement.and_then(|p| p.get("name")).and_then(Value::as_str).unwrap_or("token");
                request.query.push((name.to_string(), stored.access_token.clone()));
            }
            other => {
                return Err(AuthError::InvalidConfig("session_jwt".to_string(), format!("unknown placement location '{other}'")));
            }
        }
        Ok(())
    }

    fn supports_refresh(&self) -> bool {
        true
    }
}
