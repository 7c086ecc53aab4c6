//! Service/endpoint description data model (spec §3).
//!
//! Everything here is populated once at startup from configuration files
//! and is immutable afterwards; the gateway never mutates a loaded
//! [`ServiceDescription`] in place.

use mcpfusion_resilience::{BackoffStrategy, CircuitBreakerConfig, ConnectionPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::transform::Transform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub name: String,
    pub base_url: String,
    pub auth: AuthConfig,
    #[serde(default)]
    pub retry: Option<RetryOverride>,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub endpoints: Vec<EndpointDescription>,
}

/// Auth kind plus an opaque per-strategy configuration mapping; the
/// strategy registry in `mcpfusion-auth` interprets `config` according to
/// `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A retry policy as expressed in configuration. Converted into
/// [`mcpfusion_resilience::RetryPolicy`] by the HTTP engine, which also
/// supplies the gateway-wide default retryable-category set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOverride {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,
    #[serde(default = "default_backoff_strategy")]
    pub backoff_strategy: BackoffStrategy,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}
fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}
fn default_backoff_strategy() -> BackoffStrategy {
    BackoffStrategy::Exponential { base: 2.0 }
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub method: HttpMethod,
    /// Path template with `{name}` placeholders, e.g. `/users/{id}/messages`.
    pub path: String,
    /// Overrides the service's `base_url` for this endpoint only.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub response: ResponseShaping,
    #[serde(default)]
    pub connection: Option<ConnectionPolicy>,
    #[serde(default)]
    pub retry: Option<RetryOverride>,
}

impl EndpointDescription {
    /// Tool name exposed to MCP: `<service>_<endpoint_id>`.
    pub fn tool_name(&self, service: &str) -> String {
        format!("{service}_{}", self.id)
    }

    pub fn effective_base_url<'a>(&'a self, service: &'a ServiceDescription) -> &'a str {
        self.base_url.as_deref().unwrap_or(&service.base_url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamValidation {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub r#enum: Option<Vec<serde_json::Value>>,
    /// One of a small set of named formats (`email`, `uri`, `date-time`, ...).
    /// Interpretation lives in [`crate::params`].
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    /// Upstream name: how the value is placed into the request.
    pub name: String,
    /// MCP-visible name. Must match `^[A-Za-z0-9_.-]{1,64}$` when present.
    #[serde(default)]
    pub alias: Option<String>,
    pub r#type: ParamType,
    #[serde(default)]
    pub required: bool,
    pub location: ParamLocation,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Omitted from the MCP schema; always emitted with `default`.
    #[serde(default)]
    pub r#static: bool,
    #[serde(default)]
    pub validation: Option<ParamValidation>,
    #[serde(default)]
    pub transform: Option<Transform>,
    /// Wraps the emitted value in double quotes (certain OData filters).
    #[serde(default)]
    pub quoted: bool,
}

impl Parameter {
    /// The name this parameter is known by in the MCP tool schema: the
    /// explicit alias if present, otherwise the sanitised upstream name.
    pub fn mcp_name(&self) -> String {
        self.alias.clone().unwrap_or_else(|| sanitize_mcp_name(&self.name))
    }
}

/// MCP identifiers must match `^[A-Za-z0-9_.-]{1,64}$`; anything else in
/// an upstream parameter name is replaced with `_` and the result is
/// truncated to 64 characters.
pub fn sanitize_mcp_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    out.truncate(64);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Json,
    Text,
    Binary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub next_page_token_path: String,
    pub data_path: String,
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Hard cap on pages fetched for one tool call, independent of whether
    /// the upstream keeps offering a next page.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_max_pages() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub ttl: Duration,
    #[serde(default)]
    pub key_template: Option<String>,
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseShaping {
    pub r#type: ResponseType,
    /// JSON-path-like dotted expression applied to the parsed body before
    /// pagination/caching, e.g. `data.items`.
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

/// A locally-executed command descriptor. Out of scope beyond this shape:
/// handlers must never be issued to upstream HTTP (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandGroupDescription {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub commands: Vec<CommandDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDescription {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// The top-level shape of one configuration file: `services` keyed by
/// service name, plus an optional `commands` mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub services: HashMap<String, ServiceDescription>,
    #[serde(default)]
    pub commands: HashMap<String, CommandGroupDescription>,
}

/// The fully merged, validated configuration set loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub services: HashMap<String, ServiceDescription>,
    pub commands: HashMap<String, CommandGroupDescription>,
}
