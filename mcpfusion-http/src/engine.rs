//! HTTP request engine (spec §4.6): ties parameter resolution, caching,
//! authentication, the reliability layer, response shaping and pagination
//! together for one tool invocation.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use mcpfusion_auth::AuthManager;
use mcpfusion_config::{AuthConfig, EndpointDescription, ServiceDescription};
use mcpfusion_core::{Categorized, ErrorCategory};
use mcpfusion_resilience::{CircuitBreaker, CircuitBreakerConfig, ConnectionRegistry, RetryExecutor, RetryPolicy};
use parking_lot::Mutex;
use serde_json::Value;

use crate::cache::{self, ResponseCache};
use crate::error::{HttpEngineError, HttpResult};
use crate::output::ToolOutput;
use crate::pagination::{self, NextPage};
use crate::request::{self, RequestSpec};

/// Owns the connection pool, per-service circuit breakers and the
/// response cache for the lifetime of the gateway process.
pub struct RequestEngine {
    auth: Arc<AuthManager>,
    connections: ConnectionRegistry,
    cache: ResponseCache,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl RequestEngine {
    pub fn new(auth: Arc<AuthManager>) -> Self {
        Self {
            auth,
            connections: ConnectionRegistry::new(reqwest::Client::builder),
            cache: ResponseCache::new(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    fn breaker_for(&self, service: &str, config: Option<&CircuitBreakerConfig>) -> CircuitBreaker {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(service.to_string())
            .or_insert_with(|| CircuitBreaker::new(config.cloned().unwrap_or_default()))
            .clone()
    }

    /// Runs one tool invocation end to end (spec §4.6 steps 1-8).
    pub async fn call(
        &self,
        tenant_hash: &str,
        service: &ServiceDescription,
        endpoint: &EndpointDescription,
        args: &serde_json::Map<String, Value>,
    ) -> HttpResult<ToolOutput> {
        let params = mcpfusion_config::resolve_params(endpoint, args)?;

        let cache_key = endpoint
            .response
            .cache
            .as_ref()
            .and_then(|c| cache::cache_key(c, &service.name, &endpoint.id, tenant_hash, &params));
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key) {
                if let Ok(output) = serde_json::from_value::<ToolOutput>(cached) {
                    return Ok(output);
                }
            }
        }

        let base_url = endpoint.effective_base_url(service).to_string();
        let base_spec = request::build_request_spec(endpoint, &base_url, &params)?;
        let host = base_spec.url.host_str().unwrap_or_default().to_string();

        let connection_policy = endpoint.connection.clone().unwrap_or_default();
        let client = if connection_policy.bypasses_pool() {
            self.connections.ephemeral_client(connection_policy.disable_keep_alive)
        } else {
            self.connections.client_for(&host)
        };

        let breaker = self.breaker_for(&service.name, service.circuit_breaker.as_ref());
        if breaker.is_open() {
            breaker.record_rejection();
            return Err(HttpEngineError::CircuitOpen(service.name.clone()));
        }

        let dispatch_result = self
            .dispatch_with_retry(&client, &host, &base_spec, &service.auth, tenant_hash, &service.name, retry_policy_for(service, endpoint))
            .await;
        let bytes = match dispatch_result {
            Ok(bytes) => {
                breaker.record_success();
                bytes
            }
            Err(e) => {
                breaker.record_failure(e.category());
                return Err(e);
            }
        };

        let mut shaped = ToolOutput::from_bytes(endpoint.response.r#type, &bytes)?;
        if let Some(transform_path) = &endpoint.response.transform {
            shaped = apply_transform(shaped, transform_path)?;
        }

        if let Some(pagination_config) = &endpoint.response.pagination {
            let value = shaped
                .as_json()
                .cloned()
                .ok_or_else(|| HttpEngineError::PaginationShape("pagination requires a json response".to_string()))?;
            let token_param_name = pagination_config
                .next_page_token_path
                .rsplit('.')
                .next()
                .unwrap_or(pagination_config.next_page_token_path.as_str())
                .to_string();

            let merged = pagination::paginate(value, pagination_config, &endpoint.id, |next| {
                self.fetch_page(&client, &base_spec, &service.auth, tenant_hash, &service.name, &token_param_name, next)
            })
            .await?;
            shaped = ToolOutput::Json(merged);
        }

        if let (Some(key), Some(cache_cfg)) = (cache_key, &endpoint.response.cache) {
            if let Ok(value) = serde_json::to_value(&shaped) {
                self.cache.put(key, value, cache_cfg.ttl);
            }
        }

        Ok(shaped)
    }

    /// Dispatches through the retry executor, reauthenticating once after a
    /// 401/403 (spec §4.6 "Authentication-failure handling") and evicting
    /// the pooled connection after a transient failure (spec §4.8).
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_with_retry(
        &self,
        client: &reqwest::Client,
        host: &str,
        base_spec: &RequestSpec,
        auth_config: &AuthConfig,
        tenant_hash: &str,
        service_name: &str,
        policy: RetryPolicy,
    ) -> HttpResult<Vec<u8>> {
        let executor = RetryExecutor::new(policy);
        let need_reauth = Rc::new(Cell::new(false));

        let result = executor
            .execute_with_context(|_attempt| {
                let reauth = need_reauth.replace(false);
                let spec = base_spec.clone();
                let need_reauth = need_reauth.clone();
                async move {
                    if reauth {
                        let _ = self.auth.invalidate_token(tenant_hash, service_name);
                    }
                    let token = self.auth.get_token(tenant_hash, service_name, auth_config).await?;
                    let prepared = self.auth.apply_token(auth_config, &token)?;
                    let spec = request::apply_auth(spec, prepared);

                    self.dispatch(client, &spec).await.map_err(|err| {
                        if err.category() == ErrorCategory::PermissionDenied {
                            need_reauth.set(true);
                        }
                        if ConnectionRegistry::should_evict(err.category()) {
                            self.connections.evict(host);
                        }
                        err
                    })
                }
            })
            .await;

        result.map_err(|retry_err| retry_err.into_inner().expect("retry executor always carries the last error here"))
    }

    async fn dispatch(&self, client: &reqwest::Client, spec: &RequestSpec) -> HttpResult<Vec<u8>> {
        let response = request::to_reqwest(client, spec).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.bytes().await?.to_vec())
        } else {
            let retry_after = response
                .headers()
                .get(http::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            Err(HttpEngineError::Upstream { status: status.as_u16(), body, retry_after })
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_page(
        &self,
        client: &reqwest::Client,
        base_spec: &RequestSpec,
        auth_config: &AuthConfig,
        tenant_hash: &str,
        service_name: &str,
        token_param_name: &str,
        next: NextPage,
    ) -> HttpResult<Value> {
        let token = self.auth.get_token(tenant_hash, service_name, auth_config).await?;
        let prepared = self.auth.apply_token(auth_config, &token)?;
        let mut spec = request::apply_auth(base_spec.clone(), prepared);

        match next {
            NextPage::AbsoluteUrl(url) => {
                spec.url = url::Url::parse(&url).map_err(|e| HttpEngineError::InvalidHeader(format!("invalid pagination url: {e}")))?;
                spec.query.clear();
            }
            NextPage::Token(token_value) => {
                spec.query.retain(|(k, _)| k != token_param_name);
                spec.query.push((token_param_name.to_string(), token_value));
            }
        }

        let bytes = self.dispatch(client, &spec).await?;
        serde_json::from_slice(&bytes).map_err(|e| HttpEngineError::InvalidBody { expected: "json", detail: e.to_string() })
    }
}

fn retry_policy_for(service: &ServiceDescription, endpoint: &EndpointDescription) -> RetryPolicy {
    let over = endpoint.retry.as_ref().or(service.retry.as_ref());
    match over {
        Some(o) => RetryPolicy {
            max_attempts: o.max_attempts,
            initial_delay: o.initial_delay,
            max_delay: o.max_delay,
            backoff_strategy: o.backoff_strategy,
            jitter: o.jitter,
            ..RetryPolicy::default()
        },
        None => RetryPolicy::default(),
    }
}

fn apply_transform(output: ToolOutput, transform_path: &str) -> HttpResult<ToolOutput> {
    let ToolOutput::Json(value) = output else {
        return Ok(output);
    };
    let extracted = crate::path::get(&value, transform_path)
        .cloned()
        .ok_or_else(|| HttpEngineError::TransformPath(transform_path.to_string()))?;
    Ok(ToolOutput::Json(extracted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpfusion_config::{HttpMethod, RetryOverride, ResponseShaping, ResponseType};
    use mcpfusion_resilience::BackoffStrategy;

    fn service() -> ServiceDescription {
        ServiceDescription {
            name: "svc".to_string(),
            base_url: "https://api.example.com".to_string(),
            auth: AuthConfig { kind: "bearer".to_string(), config: serde_json::json!({"token": "t"}) },
            retry: None,
            circuit_breaker: None,
            endpoints: vec![],
        }
    }

    fn endpoint() -> EndpointDescription {
        EndpointDescription {
            id: "ep".to_string(),
            name: "Endpoint".to_string(),
            description: String::new(),
            method: HttpMethod::Get,
            path: "/things".to_string(),
            base_url: None,
            parameters: vec![],
            response: ResponseShaping { r#type: ResponseType::Json, transform: None, pagination: None, cache: None },
            connection: None,
            retry: None,
        }
    }

    #[test]
    fn endpoint_retry_override_wins_over_service_default() {
        let mut svc = service();
        svc.retry = Some(RetryOverride {
            max_attempts: 7,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_strategy: BackoffStrategy::Fixed,
            jitter: false,
        });
        let mut ep = endpoint();
        ep.retry = Some(RetryOverride {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            backoff_strategy: BackoffStrategy::Fixed,
            jitter: false,
        });

        let policy = retry_policy_for(&svc, &ep);
        assert_eq!(policy.max_attempts, 2);
    }

    #[test]
    fn falls_back_to_service_override_then_default() {
        let mut svc = service();
        svc.retry = Some(RetryOverride {
            max_attempts: 9,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_strategy: BackoffStrategy::Fixed,
            jitter: false,
        });
        let policy = retry_policy_for(&svc, &endpoint());
        assert_eq!(policy.max_attempts, 9);

        let policy = retry_policy_for(&service(), &endpoint());
        assert_eq!(policy.max_attempts, RetryPolicy::default().max_attempts);
    }

    #[test]
    fn transform_extracts_nested_value() {
        let output = ToolOutput::Json(serde_json::json!({"data": {"items": [1, 2]}}));
        let result = apply_transform(output, "data.items").unwrap();
        assert_eq!(result.as_json().unwrap(), &serde_json::json!([1, 2]));
    }

    #[test]
    fn transform_on_missing_path_is_an_error() {
        let output = ToolOutput::Json(serde_json::json!({"data": {}}));
        assert!(apply_transform(output, "data.items").is_err());
    }
}
