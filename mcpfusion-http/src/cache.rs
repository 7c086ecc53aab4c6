//! Response cache (spec §4.6 step 2/7): keyed by a configured template or
//! a canonical hash of (service, endpoint, tenant, sorted parameters).

use std::time::{Duration, Instant};

use mcpfusion_config::{CacheConfig, ResolvedParam};
use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

struct CachedEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CachedEntry {
    fn is_live(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

/// Process-wide response cache. Entries are evicted lazily on lookup; a
/// cache miss because of expiry is indistinguishable from a plain miss.
#[derive(Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CachedEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read();
        entries.get(key).filter(|e| e.is_live()).map(|e| e.value.clone())
    }

    pub fn put(&self, key: String, value: Value, ttl: Duration) {
        self.entries.write().insert(
            key,
            CachedEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }
}

/// Builds the cache key for one tool call per `config`. Returns `None`
/// when caching is disabled for this endpoint.
pub fn cache_key(
    config: &CacheConfig,
    service: &str,
    endpoint_id: &str,
    tenant_hash: &str,
    params: &[ResolvedParam],
) -> Option<String> {
    if !config.enabled {
        return None;
    }
    Some(match &config.key_template {
        Some(template) => substitute_template(template, params),
        None => canonical_hash(service, endpoint_id, tenant_hash, params),
    })
}

fn substitute_template(template: &str, params: &[ResolvedParam]) -> String {
    let mut out = template.to_string();
    for param in params {
        let placeholder = format!("{{{}}}", param.name);
        if out.contains(&placeholder) {
            let value = match &param.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&placeholder, &value);
        }
    }
    out
}

fn canonical_hash(service: &str, endpoint_id: &str, tenant_hash: &str, params: &[ResolvedParam]) -> String {
    let mut sorted: Vec<(&str, String)> =
        params.iter().map(|p| (p.name.as_str(), p.value.to_string())).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    hasher.update(service.as_bytes());
    hasher.update(b"\0");
    hasher.update(endpoint_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(tenant_hash.as_bytes());
    for (name, value) in &sorted {
        hasher.update(b"\0");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpfusion_config::ParamLocation;
    use std::time::Duration as StdDuration;

    fn param(name: &str, value: Value) -> ResolvedParam {
        ResolvedParam { name: name.to_string(), location: ParamLocation::Query, value, quoted: false }
    }

    #[test]
    fn template_substitution_fills_named_placeholders() {
        let params = vec![param("id", Value::String("42".to_string()))];
        let key = substitute_template("user:{id}", &params);
        assert_eq!(key, "user:42");
    }

    #[test]
    fn canonical_hash_is_order_independent() {
        let a = vec![param("b", Value::from(2)), param("a", Value::from(1))];
        let b = vec![param("a", Value::from(1)), param("b", Value::from(2))];
        assert_eq!(
            canonical_hash("svc", "ep", "tenant", &a),
            canonical_hash("svc", "ep", "tenant", &b)
        );
    }

    #[test]
    fn disabled_config_never_yields_a_key() {
        let config = CacheConfig { enabled: false, ttl: StdDuration::from_secs(1), key_template: None };
        assert!(cache_key(&config, "svc", "ep", "tenant", &[]).is_none());
    }

    #[test]
    fn cache_entries_expire_after_ttl() {
        let cache = ResponseCache::new();
        cache.put("k".to_string(), Value::from(1), StdDuration::from_millis(1));
        std::thread::sleep(StdDuration::from_millis(20));
        assert!(cache.get("k").is_none());
    }
}
