//! Gateway process configuration: where the store lives, the transport
//! settings an external MCP transport consumes, and ambient defaults for
//! connection control and logging.
//!
//! Grounded on the reference MCP server's own config module: a TOML file
//! of layered defaults (`#[serde(default = "fn")]` everywhere) overridden
//! by a small, explicit set of environment variables, validated once after
//! loading rather than scattered through the types that use it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_config_paths")]
    pub config_paths: Vec<PathBuf>,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Policy switch (spec §9 open question): whether untokened ("no-auth")
    /// callers may see and invoke the three knowledge tools.
    #[serde(default)]
    pub allow_no_auth_knowledge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./mcpfusion-data")
}

fn default_config_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("./mcpfusion.json")]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7700
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            config_paths: default_config_paths(),
            transport: TransportConfig::default(),
            log_level: default_log_level(),
            allow_no_auth_knowledge: false,
        }
    }
}

impl GatewayConfig {
    /// Reads `path` as TOML, then applies `MCPFUSION_*` environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| GatewayError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        let config: GatewayConfig = toml::from_str(&raw).map_err(|e| GatewayError::Config(e.to_string()))?;
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Same as [`Self::from_file`] but tolerates a missing file, falling
    /// back to built-in defaults plus env overrides (so a fresh checkout
    /// can start without hand-writing a config file first).
    pub fn from_file_or_default(path: impl AsRef<Path>) -> GatewayResult<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default().with_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("MCPFUSION_STORE_PATH") {
            self.store_path = PathBuf::from(path);
        }
        if let Ok(paths) = std::env::var("MCPFUSION_CONFIG_PATHS") {
            self.config_paths = paths.split(',').map(PathBuf::from).collect();
        }
        if let Ok(host) = std::env::var("MCPFUSION_HOST") {
            self.transport.host = host;
        }
        if let Ok(port) = std::env::var("MCPFUSION_PORT") {
            if let Ok(port) = port.parse() {
                self.transport.port = port;
            }
        }
        if let Ok(level) = std::env::var("MCPFUSION_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(flag) = std::env::var("MCPFUSION_ALLOW_NO_AUTH_KNOWLEDGE") {
            self.allow_no_auth_knowledge = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        self
    }

    fn validate(&self) -> GatewayResult<()> {
        if self.config_paths.is_empty() {
            return Err(GatewayError::Config("config_paths must list at least one file".to_string()));
        }
        if self.transport.port == 0 {
            return Err(GatewayError::Config("transport.port must be nonzero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn loads_toml_and_applies_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "store_path = \"/tmp/data\"\nconfig_paths = [\"/tmp/svc.json\"]\n").unwrap();

        std::env::set_var("MCPFUSION_PORT", "9999");
        let config = GatewayConfig::from_file(&path).unwrap();
        std::env::remove_var("MCPFUSION_PORT");

        assert_eq!(config.store_path, PathBuf::from("/tmp/data"));
        assert_eq!(config.transport.port, 9999);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = GatewayConfig::from_file_or_default("/no/such/path.toml").unwrap();
        assert_eq!(config.transport.port, default_port());
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut config = GatewayConfig::default();
        config.transport.port = 0;
        assert!(config.validate().is_err());
    }
}
