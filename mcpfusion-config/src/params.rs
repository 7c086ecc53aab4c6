//! Parameter validation for one tool invocation (spec §4.3 steps 1-5).
//!
//! Placing the resolved values into path/query/header/body belongs to the
//! HTTP request builder, which knows about method and content type; this
//! module only gets the endpoint's declared parameters and the caller's
//! arguments to an agreed common shape.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::ParamError;
use crate::model::{EndpointDescription, ParamLocation, ParamType, Parameter};

/// One parameter after validation/transform/static-override, ready for
/// the request builder to place according to `location`.
#[derive(Debug, Clone)]
pub struct ResolvedParam {
    /// Upstream name, after any transform's `target_name` override.
    pub name: String,
    pub location: ParamLocation,
    pub value: Value,
    pub quoted: bool,
}

/// Validate and transform `args` (the MCP-supplied flat JSON object)
/// against `endpoint`'s declared parameters.
pub fn resolve(endpoint: &EndpointDescription, args: &serde_json::Map<String, Value>) -> Result<Vec<ResolvedParam>, ParamError> {
    let declared: HashMap<String, &Parameter> = endpoint.parameters.iter().map(|p| (p.mcp_name(), p)).collect();

    for key in args.keys() {
        if !declared.contains_key(key) {
            return Err(ParamError::Conflict(format!("unexpected parameter '{key}'")));
        }
    }

    let mut resolved = Vec::with_capacity(endpoint.parameters.len());
    for param in &endpoint.parameters {
        if param.r#static {
            let default = param
                .default
                .clone()
                .ok_or_else(|| ParamError::Invalid(param.name.clone(), "static parameter has no default".to_string()))?;
            resolved.push(finalize(param, default)?);
            continue;
        }

        let mcp_name = param.mcp_name();
        let raw = match args.get(&mcp_name) {
            Some(v) => v.clone(),
            None => match &param.default {
                Some(default) => default.clone(),
                None => {
                    if param.required {
                        return Err(ParamError::Missing(mcp_name));
                    }
                    continue;
                }
            },
        };

        let coerced = coerce(param, raw)?;
        validate(param, &coerced)?;
        resolved.push(finalize(param, coerced)?);
    }

    Ok(resolved)
}

fn finalize(param: &Parameter, value: Value) -> Result<ResolvedParam, ParamError> {
    let (name, value) = match &param.transform {
        Some(transform) => {
            let transformed = transform.apply(&value)?;
            (transform.target_name.clone().unwrap_or_else(|| param.name.clone()), transformed)
        }
        None => (param.name.clone(), value),
    };
    Ok(ResolvedParam {
        name,
        location: param.location,
        value,
        quoted: param.quoted,
    })
}

fn coerce(param: &Parameter, value: Value) -> Result<Value, ParamError> {
    let invalid = |msg: String| ParamError::Invalid(param.mcp_name(), msg);

    match (param.r#type, &value) {
        (ParamType::String, Value::String(_)) => Ok(value),
        (ParamType::String, other) => Ok(Value::String(match other {
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(invalid(format!("expected string, got {other}"))),
        })),
        (ParamType::Number, Value::Number(_)) => Ok(value),
        (ParamType::Number, Value::String(s)) => {
            s.parse::<f64>().map(|n| Value::from(n)).map_err(|_| invalid(format!("'{s}' is not a number")))
        }
        (ParamType::Number, other) => Err(invalid(format!("expected number, got {other}"))),
        (ParamType::Boolean, Value::Bool(_)) => Ok(value),
        (ParamType::Boolean, Value::String(s)) => match s.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid(format!("'{s}' is not a boolean"))),
        },
        (ParamType::Boolean, other) => Err(invalid(format!("expected boolean, got {other}"))),
        (ParamType::Array, Value::Array(_)) => Ok(value),
        (ParamType::Array, other) => Err(invalid(format!("expected array, got {other}"))),
        (ParamType::Object, Value::Object(_)) => Ok(value),
        (ParamType::Object, other) => Err(invalid(format!("expected object, got {other}"))),
    }
}

fn validate(param: &Parameter, value: &Value) -> Result<(), ParamError> {
    let Some(rules) = &param.validation else {
        return Ok(());
    };
    let invalid = |msg: String| ParamError::Invalid(param.mcp_name(), msg);

    if let Some(values) = &rules.r#enum {
        if !values.contains(value) {
            return Err(invalid(format!("{value} is not one of the allowed values")));
        }
    }

    if let Value::String(s) = value {
        if let Some(min) = rules.min_length {
            if s.chars().count() < min {
                return Err(invalid(format!("length must be at least {min}")));
            }
        }
        if let Some(max) = rules.max_length {
            if s.chars().count() > max {
                return Err(invalid(format!("length must be at most {max}")));
            }
        }
        if let Some(pattern) = &rules.pattern {
            let re = regex::Regex::new(pattern).map_err(|e| invalid(format!("invalid pattern '{pattern}': {e}")))?;
            if !re.is_match(s) {
                return Err(invalid(format!("does not match pattern '{pattern}'")));
            }
        }
        if let Some(format) = &rules.format {
            validate_format(format, s).map_err(|e| invalid(e))?;
        }
    }

    if let Value::Number(n) = value {
        let n = n.as_f64().unwrap_or(f64::NAN);
        if let Some(min) = rules.minimum {
            if n < min {
                return Err(invalid(format!("must be >= {min}")));
            }
        }
        if let Some(max) = rules.maximum {
            if n > max {
                return Err(invalid(format!("must be <= {max}")));
            }
        }
    }

    Ok(())
}

fn validate_format(format: &str, value: &str) -> Result<(), String> {
    match format {
        "email" => {
            if value.contains('@') && !value.starts_with('@') && !value.ends_with('@') {
                Ok(())
            } else {
                Err(format!("'{value}' is not a valid email address"))
            }
        }
        "uri" => url::Url::parse(value).map(|_| ()).map_err(|e| format!("'{value}' is not a valid URI: {e}")),
        "date-time" => chrono::DateTime::parse_from_rfc3339(value)
            .map(|_| ())
            .map_err(|e| format!("'{value}' is not a valid RFC3339 date-time: {e}")),
        other => Err(format!("unknown format '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpMethod, ResponseShaping, ResponseType};
    use serde_json::json;

    fn endpoint_with(parameters: Vec<Parameter>) -> EndpointDescription {
        EndpointDescription {
            id: "ep".to_string(),
            name: "Endpoint".to_string(),
            description: String::new(),
            method: HttpMethod::Get,
            path: "/things".to_string(),
            base_url: None,
            parameters,
            response: ResponseShaping {
                r#type: ResponseType::Json,
                transform: None,
                pagination: None,
                cache: None,
            },
            connection: None,
            retry: None,
        }
    }

    fn string_param(name: &str, required: bool) -> Parameter {
        Parameter {
            name: name.to_string(),
            alias: None,
            r#type: ParamType::String,
            required,
            location: ParamLocation::Query,
            default: None,
            r#static: false,
            validation: None,
            transform: None,
            quoted: false,
        }
    }

    #[test]
    fn missing_required_parameter_is_rejected() {
        let endpoint = endpoint_with(vec![string_param("q", true)]);
        let args = serde_json::Map::new();
        assert!(matches!(resolve(&endpoint, &args), Err(ParamError::Missing(_))));
    }

    #[test]
    fn unexpected_parameter_is_rejected() {
        let endpoint = endpoint_with(vec![string_param("q", false)]);
        let mut args = serde_json::Map::new();
        args.insert("bogus".to_string(), json!("x"));
        assert!(matches!(resolve(&endpoint, &args), Err(ParamError::Conflict(_))));
    }

    #[test]
    fn static_parameter_ignores_caller_input() {
        let mut param = string_param("apiVersion", false);
        param.r#static = true;
        param.default = Some(json!("v2"));
        let endpoint = endpoint_with(vec![param]);
        let args = serde_json::Map::new();

        let resolved = resolve(&endpoint, &args).unwrap();
        assert_eq!(resolved[0].value, json!("v2"));
    }

    #[test]
    fn transform_renames_and_converts_value() {
        let mut param = string_param("startDate", true);
        param.transform = Some(crate::transform::Transform {
            target_name: Some("start_date".to_string()),
            expression: "concat(slice(v,0,4),'-',slice(v,4,6),'-',slice(v,6,8))".to_string(),
        });
        let endpoint = endpoint_with(vec![param]);
        let mut args = serde_json::Map::new();
        args.insert("startDate".to_string(), json!("20240701"));

        let resolved = resolve(&endpoint, &args).unwrap();
        assert_eq!(resolved[0].name, "start_date");
        assert_eq!(resolved[0].value, json!("2024-07-01"));
    }

    #[test]
    fn enum_validation_rejects_out_of_set_values() {
        let mut param = string_param("status", true);
        param.validation = Some(crate::model::ParamValidation {
            r#enum: Some(vec![json!("open"), json!("closed")]),
            ..Default::default()
        });
        let endpoint = endpoint_with(vec![param]);
        let mut args = serde_json::Map::new();
        args.insert("status".to_string(), json!("pending"));

        assert!(matches!(resolve(&endpoint, &args), Err(ParamError::Invalid(_, _))));
    }
}
