//! Dispatcher (spec §4.10): ties the tool registry, the HTTP engine, the
//! auth manager and the persistent store together for one inbound call.
//!
//! Grounded on the reference MCP server's `RatchetToolRegistry::execute_tool`
//! match-on-name dispatch, generalised here to route by [`ToolKind`]
//! instead of a hardcoded `match` over string literals per tool.

use std::sync::Arc;

use mcpfusion_auth::AuthManager;
use mcpfusion_config::LoadedConfig;
use mcpfusion_core::{CorrelationId, TenantContext, ToolError};
use mcpfusion_http::{RequestEngine, ToolOutput};
use mcpfusion_store::Store;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::knowledge;
use crate::registry::{ToolKind, ToolRegistry};

pub struct Dispatcher {
    config: LoadedConfig,
    gateway_config: GatewayConfig,
    registry: ToolRegistry,
    store: Store,
    auth: Arc<AuthManager>,
    engine: RequestEngine,
}

impl Dispatcher {
    pub fn new(config: LoadedConfig, gateway_config: GatewayConfig, store: Store, auth: Arc<AuthManager>) -> Self {
        let registry = ToolRegistry::build(&config);
        let engine = RequestEngine::new(auth.clone());
        Self { config, gateway_config, registry, store, auth, engine }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// `ExtractTenantFromToken` plus tool-name validation (spec §4.10),
    /// followed by routing the call to its handler. Never panics on
    /// caller-controlled input; every failure reduces to a `ToolError`.
    pub async fn dispatch(&self, plaintext_token: &str, tool_name: &str, args: serde_json::Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let correlation_id = CorrelationId::new();
        match self.dispatch_inner(plaintext_token, tool_name, args, &correlation_id).await {
            Ok(output) => Ok(output),
            Err(e) => {
                tracing::warn!(tool = tool_name, correlation_id = %correlation_id, category = %e.category_display(), "tool call failed");
                Err(e.into_tool_error(correlation_id.clone()))
            }
        }
    }

    async fn dispatch_inner(
        &self,
        plaintext_token: &str,
        tool_name: &str,
        args: serde_json::Map<String, Value>,
        correlation_id: &CorrelationId,
    ) -> Result<ToolOutput, DispatchError> {
        let mut tenant = self.auth.extract_tenant_from_token(plaintext_token)?;
        tenant.request_id = correlation_id.clone();

        let tool = self.registry.get(tool_name).ok_or_else(|| GatewayError::UnknownTool(tool_name.to_string()))?;

        tracing::info!(tool = tool_name, correlation_id = %correlation_id, "dispatching tool call");

        match &tool.kind {
            ToolKind::Http { service, endpoint } => {
                self.validate_tool_name_shape(service, endpoint, tool_name)?;
                if !self.auth.validate_tenant_access(&tenant, service) {
                    return Err(GatewayError::TenantDenied(service.clone()).into());
                }
                let service_desc = self.config.services.get(service).ok_or_else(|| GatewayError::UnknownTool(tool_name.to_string()))?;
                let endpoint_desc = service_desc
                    .endpoints
                    .iter()
                    .find(|e| &e.id == endpoint)
                    .ok_or_else(|| GatewayError::UnknownTool(tool_name.to_string()))?;
                let output = self.engine.call(&tenant.token_hash, service_desc, endpoint_desc, &args).await?;
                Ok(output)
            }
            ToolKind::KnowledgeSet => {
                self.check_knowledge_access(&tenant)?;
                let value = knowledge::knowledge_set(&self.store, &tenant.user_id, &args)?;
                Ok(ToolOutput::Json(value))
            }
            ToolKind::KnowledgeGet => {
                self.check_knowledge_access(&tenant)?;
                let value = knowledge::knowledge_get(&self.store, &tenant.user_id, &args)?;
                Ok(ToolOutput::Json(value))
            }
            ToolKind::KnowledgeDelete => {
                self.check_knowledge_access(&tenant)?;
                let value = knowledge::knowledge_delete(&self.store, &tenant.user_id, &args)?;
                Ok(ToolOutput::Json(value))
            }
            ToolKind::Command { group } => crate::commands::dispatch(group, &args),
        }
    }

    fn check_knowledge_access(&self, tenant: &TenantContext) -> Result<(), GatewayError> {
        if tenant.is_no_auth() && !self.gateway_config.allow_no_auth_knowledge {
            return Err(GatewayError::TenantDenied("knowledge".to_string()));
        }
        Ok(())
    }

    /// Tool names for HTTP-backed tools must parse back into the exact
    /// `<service>_<endpoint>` pair the registry indexed them under (spec
    /// §4.10 "rejects calls whose resolved tool name does not parse").
    fn validate_tool_name_shape(&self, service: &str, endpoint: &str, tool_name: &str) -> Result<(), GatewayError> {
        let expected = format!("{service}_{endpoint}");
        if expected != tool_name {
            return Err(GatewayError::MalformedToolName(tool_name.to_string()));
        }
        Ok(())
    }
}

/// Internal dispatch-time error union, collapsed into a sanitised
/// [`ToolError`] before it ever leaves [`Dispatcher::dispatch`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum DispatchError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Auth(#[from] mcpfusion_auth::AuthError),
    #[error(transparent)]
    Http(#[from] mcpfusion_http::HttpEngineError),
}

impl DispatchError {
    fn category_display(&self) -> mcpfusion_core::ErrorCategory {
        use mcpfusion_core::Categorized;
        match self {
            DispatchError::Gateway(e) => e.category(),
            DispatchError::Auth(e) => e.category(),
            DispatchError::Http(e) => e.category(),
        }
    }

    fn into_tool_error(self, correlation_id: CorrelationId) -> ToolError {
        use mcpfusion_core::Categorized;
        let category = self.category_display();
        ToolError::new(category, self.to_string(), correlation_id.to_string())
    }
}
