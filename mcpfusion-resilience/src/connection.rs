//! Connection-control policy (spec §4.8).
//!
//! Endpoints configure keep-alive/pooling behaviour per call; idle pooled
//! connections to a host are proactively discarded after a timeout or
//! network-category failure so the next retry never re-binds a broken
//! socket.

use mcpfusion_core::ErrorCategory;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-endpoint connection behaviour.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ConnectionPolicy {
    /// Send `Connection: close` and skip the shared pool for this request.
    #[serde(default)]
    pub disable_keep_alive: bool,
    /// Bypass the shared pool even if keep-alive is otherwise allowed.
    #[serde(default)]
    pub force_new_connection: bool,
    /// Explicit per-request timeout overriding the endpoint default.
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
}

impl ConnectionPolicy {
    pub fn bypasses_pool(&self) -> bool {
        self.disable_keep_alive || self.force_new_connection
    }
}

/// One pooled [`reqwest::Client`] per upstream host, so a host whose
/// connections just misbehaved can be rebuilt without disturbing every
/// other host's pool.
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<String, reqwest::Client>>,
    builder: Arc<dyn Fn() -> reqwest::ClientBuilder + Send + Sync>,
}

impl ConnectionRegistry {
    pub fn new(builder: impl Fn() -> reqwest::ClientBuilder + Send + Sync + 'static) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            builder: Arc::new(builder),
        }
    }

    /// Shared, pooled client for `host`, built lazily and cached.
    pub fn client_for(&self, host: &str) -> reqwest::Client {
        if let Some(client) = self.clients.read().get(host) {
            return client.clone();
        }
        let client = (self.builder)()
            .build()
            .expect("connection registry builder must produce a valid client");
        self.clients.write().insert(host.to_string(), client.clone());
        client
    }

    /// A client dedicated to one request, never shared or cached. Used for
    /// `disableKeepAlive` / `forceNewConnection` endpoints.
    pub fn ephemeral_client(&self, disable_keep_alive: bool) -> reqwest::Client {
        let mut builder = (self.builder)();
        if disable_keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }
        builder.build().expect("ephemeral client builder must produce a valid client")
    }

    /// Discard the pooled client for `host`, forcing the next `client_for`
    /// call to rebuild it.
    pub fn evict(&self, host: &str) {
        if self.clients.write().remove(host).is_some() {
            tracing::debug!(host, "evicted pooled connection after failure");
        }
    }

    /// Whether a failure of this category should trigger eviction. Network
    /// failures and timeouts both collapse into `transient` in this
    /// gateway's error model, so eviction is keyed on that category alone.
    pub fn should_evict(category: ErrorCategory) -> bool {
        matches!(category, ErrorCategory::Transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypasses_pool_when_either_flag_set() {
        let mut policy = ConnectionPolicy::default();
        assert!(!policy.bypasses_pool());

        policy.disable_keep_alive = true;
        assert!(policy.bypasses_pool());

        let mut policy = ConnectionPolicy::default();
        policy.force_new_connection = true;
        assert!(policy.bypasses_pool());
    }

    #[test]
    fn evict_removes_cached_client_and_rebuilds_on_next_use() {
        let registry = ConnectionRegistry::new(reqwest::Client::builder);
        let _ = registry.client_for("api.example.com");
        assert_eq!(registry.clients.read().len(), 1);

        registry.evict("api.example.com");
        assert_eq!(registry.clients.read().len(), 0);

        let _ = registry.client_for("api.example.com");
        assert_eq!(registry.clients.read().len(), 1);
    }

    #[test]
    fn only_transient_category_triggers_eviction() {
        assert!(ConnectionRegistry::should_evict(ErrorCategory::Transient));
        assert!(!ConnectionRegistry::should_evict(ErrorCategory::Client));
        assert!(!ConnectionRegistry::should_evict(ErrorCategory::Validation));
    }
}
