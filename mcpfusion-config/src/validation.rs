//! Load-time validation of a merged configuration set (spec §4.2).
//!
//! Every check below accumulates into a single [`ConfigError::Invalid`]
//! instead of bailing on the first problem, so an operator fixing a
//! configuration file sees every mistake in one pass.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::error::{ConfigError, ConfigResult, ValidationIssue};
use crate::model::{EndpointDescription, LoadedConfig, Parameter, ServiceDescription};

static ALIAS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").unwrap());

pub struct ConfigValidator {
    issues: Vec<ValidationIssue>,
}

impl ConfigValidator {
    pub fn validate(config: &LoadedConfig) -> ConfigResult<()> {
        let mut validator = Self { issues: Vec::new() };
        validator.validate_services(&config.services);
        if validator.issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(validator.issues))
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(path, message));
    }

    fn validate_services(&mut self, services: &HashMap<String, ServiceDescription>) {
        for (name, service) in services {
            if name != &service.name {
                self.error(format!("services.{name}"), format!("key '{name}' does not match service.name '{}'", service.name));
            }
            if service.base_url.is_empty() {
                self.error(format!("services.{name}.baseURL"), "must not be empty");
            }

            let mut endpoint_ids = HashSet::new();
            for endpoint in &service.endpoints {
                if !endpoint_ids.insert(endpoint.id.clone()) {
                    self.error(
                        format!("services.{name}.endpoints"),
                        format!("duplicate endpoint id '{}'", endpoint.id),
                    );
                }
                self.validate_endpoint(name, endpoint);
            }
        }
    }

    fn validate_endpoint(&mut self, service: &str, endpoint: &EndpointDescription) {
        let path = format!("services.{service}.endpoints.{}", endpoint.id);

        if endpoint.path.is_empty() || !endpoint.path.starts_with('/') {
            self.error(format!("{path}.path"), "must be a non-empty path starting with '/'");
        }

        if let Some(pagination) = &endpoint.response.pagination {
            if pagination.data_path.is_empty() {
                self.error(format!("{path}.response.pagination.dataPath"), "must not be empty");
            }
            if pagination.next_page_token_path.is_empty() {
                self.error(format!("{path}.response.pagination.nextPageTokenPath"), "must not be empty");
            }
        }

        let mut mcp_names = HashSet::new();
        for param in &endpoint.parameters {
            self.validate_parameter(&path, param, &mut mcp_names);
        }
    }

    fn validate_parameter(&mut self, endpoint_path: &str, param: &Parameter, mcp_names: &mut HashSet<String>) {
        let path = format!("{endpoint_path}.parameters.{}", param.name);

        if let Some(alias) = &param.alias {
            if !ALIAS_PATTERN.is_match(alias) {
                self.error(format!("{path}.alias"), format!("'{alias}' does not match ^[A-Za-z0-9_.-]{{1,64}}$"));
            }
        }

        let mcp_name = param.mcp_name();
        if !mcp_names.insert(mcp_name.clone()) {
            self.error(path.clone(), format!("resolves to MCP-visible name '{mcp_name}' already used by another parameter"));
        }

        if param.r#static && param.default.is_none() {
            self.error(format!("{path}.static"), "static parameters must declare a default");
        }

        if let Some(rules) = &param.validation {
            if let Some(pattern) = &rules.pattern {
                if Regex::new(pattern).is_err() {
                    self.error(format!("{path}.validation.pattern"), format!("'{pattern}' does not compile"));
                }
            }
            if let Some(values) = &rules.r#enum {
                if values.is_empty() {
                    self.error(format!("{path}.validation.enum"), "must not be empty when present");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AuthConfig, HttpMethod, ParamLocation, ParamType, ParamValidation, ResponseShaping, ResponseType,
    };
    use serde_json::json;

    fn minimal_service(name: &str) -> ServiceDescription {
        ServiceDescription {
            name: name.to_string(),
            base_url: "https://example.com".to_string(),
            auth: AuthConfig {
                kind: "bearer".to_string(),
                config: json!({"token": "${EXAMPLE_TOKEN}"}),
            },
            retry: None,
            circuit_breaker: None,
            endpoints: vec![],
        }
    }

    fn minimal_endpoint(id: &str) -> EndpointDescription {
        EndpointDescription {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            method: HttpMethod::Get,
            path: "/items".to_string(),
            base_url: None,
            parameters: vec![],
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

    #[test]
    fn duplicate_endpoint_ids_are_rejected() {
        let mut service = minimal_service("svc");
        service.endpoints = vec![minimal_endpoint("list"), minimal_endpoint("list")];
        let mut services = HashMap::new();
        services.insert("svc".to_string(), service);
        let config = LoadedConfig { services, commands: HashMap::new() };

        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(issues) if issues.iter().any(|i| i.message.contains("duplicate endpoint id"))));
    }

    #[test]
    fn colliding_mcp_names_are_rejected() {
        let mut service = minimal_service("svc");
        let mut endpoint = minimal_endpoint("list");
        let mut p1 = Parameter {
            name: "user-id".to_string(),
            alias: None,
            r#type: ParamType::String,
            required: false,
            location: ParamLocation::Query,
            default: None,
            r#static: false,
            validation: None,
            transform: None,
            quoted: false,
        };
        let mut p2 = p1.clone();
        p1.name = "user_id".to_string();
        p2.name = "user.id".to_string();
        endpoint.parameters = vec![p1, p2];
        service.endpoints = vec![endpoint];
        let mut services = HashMap::new();
        services.insert("svc".to_string(), service);
        let config = LoadedConfig { services, commands: HashMap::new() };

        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn static_parameter_without_default_is_rejected() {
        let mut service = minimal_service("svc");
        let mut endpoint = minimal_endpoint("list");
        endpoint.parameters = vec![Parameter {
            name: "apiVersion".to_string(),
            alias: None,
            r#type: ParamType::String,
            required: false,
            location: ParamLocation::Query,
            default: None,
            r#static: true,
            validation: None,
            transform: None,
            quoted: false,
        }];
        service.endpoints = vec![endpoint];
        let mut services = HashMap::new();
        services.insert("svc".to_string(), service);
        let config = LoadedConfig { services, commands: HashMap::new() };

        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn invalid_regex_pattern_is_rejected() {
        let mut service = minimal_service("svc");
        let mut endpoint = minimal_endpoint("list");
        endpoint.parameters = vec![Parameter {
            name: "q".to_string(),
            alias: None,
            r#type: ParamType::String,
            required: false,
            location: ParamLocation::Query,
            default: None,
            r#static: false,
            validation: Some(ParamValidation {
                pattern: Some("(unclosed".to_string()),
                ..Default::default()
            }),
            transform: None,
            quoted: false,
        }];
        service.endpoints = vec![endpoint];
        let mut services = HashMap::new();
        services.insert("svc".to_string(), service);
        let config = LoadedConfig { services, commands: HashMap::new() };

        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn well_formed_service_passes() {
        let mut service = minimal_service("svc");
        service.endpoints = vec![minimal_endpoint("list")];
        let mut services = HashMap::new();
        services.insert("svc".to_string(), service);
        let config = LoadedConfig { services, commands: HashMap::new() };

        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
