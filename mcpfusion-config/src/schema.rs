//! Derives the MCP-visible JSON Schema for an endpoint's parameters.
//!
//! Grounded on the teacher's input/output schema check in its task
//! registry loader: the schema is built once per endpoint, then validated
//! with `jsonschema::validator_for` so a malformed `enum`/`pattern`
//! combination is caught at load time rather than surfacing as a
//! confusing MCP client error on first call.

use serde_json::{json, Value};

use crate::error::{ConfigError, ValidationIssue};
use crate::model::{EndpointDescription, ParamType};

/// Build the JSON Schema object MCP clients see for this endpoint's tool.
pub fn input_schema_for(endpoint: &EndpointDescription) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for param in &endpoint.parameters {
        if param.r#static {
            continue;
        }
        let mut prop = json!({ "type": json_type(param.r#type) });
        if let Some(rules) = &param.validation {
            let obj = prop.as_object_mut().unwrap();
            if let Some(pattern) = &rules.pattern {
                obj.insert("pattern".to_string(), json!(pattern));
            }
            if let Some(min) = rules.min_length {
                obj.insert("minLength".to_string(), json!(min));
            }
            if let Some(max) = rules.max_length {
                obj.insert("maxLength".to_string(), json!(max));
            }
            if let Some(min) = rules.minimum {
                obj.insert("minimum".to_string(), json!(min));
            }
            if let Some(max) = rules.maximum {
                obj.insert("maximum".to_string(), json!(max));
            }
            if let Some(values) = &rules.r#enum {
                obj.insert("enum".to_string(), json!(values));
            }
            if let Some(format) = &rules.format {
                obj.insert("format".to_string(), json!(format));
            }
        }
        properties.insert(param.mcp_name(), prop);
        if param.required && param.default.is_none() {
            required.push(param.mcp_name());
        }
    }

    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
        "additionalProperties": false,
    })
}

fn json_type(param_type: ParamType) -> &'static str {
    match param_type {
        ParamType::String => "string",
        ParamType::Number => "number",
        ParamType::Boolean => "boolean",
        ParamType::Array => "array",
        ParamType::Object => "object",
    }
}

/// Confirms the derived schema is itself valid JSON Schema. Called during
/// load-time validation, not on the request path.
pub fn check_compiles(endpoint: &EndpointDescription) -> Result<(), ValidationIssue> {
    let schema = input_schema_for(endpoint);
    jsonschema::validator_for(&schema)
        .map(|_| ())
        .map_err(|e| ValidationIssue::new(format!("endpoints.{}.parameters", endpoint.id), format!("derived schema is invalid: {e}")))
}

pub fn validate_all_schemas(config: &crate::model::LoadedConfig) -> Result<(), ConfigError> {
    let mut issues = Vec::new();
    for service in config.services.values() {
        for endpoint in &service.endpoints {
            if let Err(issue) = check_compiles(endpoint) {
                issues.push(issue);
            }
        }
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(issues))
    }
}
