//! Strategy registry indexed by auth-type tag (spec §4.4 "Strategy registry").

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AuthError, AuthResult};
use crate::strategies::{ApiKeyStrategy, BasicStrategy, BearerStrategy, OAuth2DeviceStrategy, OAuth2ExternalStrategy, SessionJwtStrategy};
use crate::strategy::AuthStrategy;

pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn AuthStrategy>>,
}

impl StrategyRegistry {
    pub fn with_defaults() -> Self {
        let mut strategies: HashMap<String, Arc<dyn AuthStrategy>> = HashMap::new();
        strategies.insert("bearer".to_string(), Arc::new(BearerStrategy));
        strategies.insert("api_key".to_string(), Arc::new(ApiKeyStrategy));
        strategies.insert("basic".to_string(), Arc::new(BasicStrategy));
        strategies.insert("oauth2_device".to_string(), Arc::new(OAuth2DeviceStrategy));
        strategies.insert("oauth2_external".to_string(), Arc::new(OAuth2ExternalStrategy));
        strategies.insert("session_jwt".to_string(), Arc::new(SessionJwtStrategy));
        Self { strategies }
    }

    pub fn register(&mut self, kind: impl Into<String>, strategy: Arc<dyn AuthStrategy>) {
        self.strategies.insert(kind.into(), strategy);
    }

    pub fn get(&self, kind: &str) -> AuthResult<Arc<dyn AuthStrategy>> {
        self.strategies.get(kind).cloned().ok_or_else(|| AuthError::UnknownStrategy(kind.to_string()))
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_every_built_in_strategy() {
        let registry = StrategyRegistry::with_defaults();
        for kind in ["bearer", "api_key", "basic", "oauth2_device", "oauth2_external", "session_jwt"] {
            assert!(registry.get(kind).is_ok(), "missing strategy {kind}");
        }
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let registry = StrategyRegistry::with_defaults();
        assert!(matches!(registry.get("carrier-pigeon"), Err(AuthError::UnknownStrategy(_))));
    }
}
