//! Tool registry (spec §4.10): converts loaded service/endpoint
//! descriptions and the built-in knowledge/command operations into the
//! flat tool list an MCP transport exposes to clients.
//!
//! Grounded on the reference MCP server's `RatchetToolRegistry`: a
//! `HashMap<String, Tool>` built once at startup, each entry carrying its
//! JSON Schema alongside a tag describing how dispatch should route a
//! call to it.

use std::collections::HashMap;

use mcpfusion_config::{schema, CommandGroupDescription, EndpointDescription, LoadedConfig};
use serde_json::{json, Value};

/// How a registered tool's call should be routed by the dispatcher.
#[derive(Debug, Clone)]
pub enum ToolKind {
    Http { service: String, endpoint: String },
    KnowledgeSet,
    KnowledgeGet,
    KnowledgeDelete,
    /// Local command-group execution; out of scope to actually run, but
    /// registered so the tool surface and schema contract are complete.
    Command { group: String },
}

#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub kind: ToolKind,
}

/// The full set of tools derived from one loaded configuration.
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn build(config: &LoadedConfig) -> Self {
        let mut tools = HashMap::new();

        for service in config.services.values() {
            for endpoint in &service.endpoints {
                let tool = http_tool(&service.name, endpoint);
                tools.insert(tool.name.clone(), tool);
            }
        }

        for tool in knowledge_tools() {
            tools.insert(tool.name.clone(), tool);
        }

        for group in config.commands.values() {
            let tool = command_tool(group);
            tools.insert(tool.name.clone(), tool);
        }

        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn http_tool(service_name: &str, endpoint: &EndpointDescription) -> Tool {
    Tool {
        name: endpoint.tool_name(service_name),
        description: endpoint.description.clone(),
        input_schema: schema::input_schema_for(endpoint),
        kind: ToolKind::Http { service: service_name.to_string(), endpoint: endpoint.id.clone() },
    }
}

fn knowledge_tools() -> [Tool; 3] {
    [
        Tool {
            name: "knowledge_set".to_string(),
            description: "Store a piece of free-form content under (domain, key) for the calling user.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "domain": { "type": "string" },
                    "key": { "type": "string" },
                    "content": { "type": "string" },
                },
                "required": ["domain", "key", "content"],
                "additionalProperties": false,
            }),
            kind: ToolKind::KnowledgeSet,
        },
        Tool {
            name: "knowledge_get".to_string(),
            description: "Read knowledge entries for the calling user: one entry (domain+key), a domain's entries \
                           (domain only), or all of the caller's entries (neither given)."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "domain": { "type": "string" },
                    "key": { "type": "string" },
                },
                "required": [],
                "additionalProperties": false,
            }),
            kind: ToolKind::KnowledgeGet,
        },
        Tool {
            name: "knowledge_delete".to_string(),
            description: "Delete a knowledge entry for the calling user.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "domain": { "type": "string" },
                    "key": { "type": "string" },
                },
                "required": ["domain", "key"],
                "additionalProperties": false,
            }),
            kind: ToolKind::KnowledgeDelete,
        },
    ]
}

fn command_tool(group: &CommandGroupDescription) -> Tool {
    let names: Vec<Value> = group.commands.iter().map(|c| json!(c.name)).collect();
    Tool {
        name: format!("command_{}", group.id),
        description: group.description.clone(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "enum": names },
                "args": { "type": "array", "items": { "type": "string" } },
            },
            "required": ["command"],
            "additionalProperties": false,
        }),
        kind: ToolKind::Command { group: group.id.clone() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpfusion_config::{AuthConfig, CommandDescription, HttpMethod, ResponseShaping, ResponseType, ServiceDescription};
    use std::collections::HashMap;

    fn sample_config() -> LoadedConfig {
        let mut services = HashMap::new();
        services.insert(
            "svc".to_string(),
            ServiceDescription {
                name: "svc".to_string(),
                base_url: "https://example.com".to_string(),
                auth: AuthConfig { kind: "bearer".to_string(), config: json!({}) },
                retry: None,
                circuit_breaker: None,
                endpoints: vec![EndpointDescription {
                    id: "list".to_string(),
                    name: "List".to_string(),
                    description: "List things".to_string(),
                    method: HttpMethod::Get,
                    path: "/things".to_string(),
                    base_url: None,
                    parameters: vec![],
                    response: ResponseShaping { r#type: ResponseType::Json, transform: None, pagination: None, cache: None },
                    connection: None,
                    retry: None,
                }],
            },
        );
        let mut commands = HashMap::new();
        commands.insert(
            "git".to_string(),
            CommandGroupDescription {
                id: "git".to_string(),
                description: "git helpers".to_string(),
                commands: vec![CommandDescription { name: "status".to_string(), program: "git".to_string(), args: vec!["status".to_string()] }],
            },
        );
        LoadedConfig { services, commands }
    }

    #[test]
    fn registers_http_knowledge_and_command_tools() {
        let registry = ToolRegistry::build(&sample_config());
        assert!(registry.get("svc_list").is_some());
        assert!(registry.get("knowledge_set").is_some());
        assert!(registry.get("knowledge_get").is_some());
        assert!(registry.get("knowledge_delete").is_some());
        assert!(registry.get("command_git").is_some());
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn http_tool_kind_carries_service_and_endpoint() {
        let registry = ToolRegistry::build(&sample_config());
        let tool = registry.get("svc_list").unwrap();
        assert!(matches!(&tool.kind, ToolKind::Http { service, endpoint } if service == "svc" && endpoint == "list"));
    }
}
