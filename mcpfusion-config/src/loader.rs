//! Multi-file configuration loading with environment-variable expansion
//! (spec §4.2).

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{ConfigFile, LoadedConfig};
use crate::schema::validate_all_schemas;
use crate::validation::ConfigValidator;

/// Matches `${VAR}` and `${VAR:default}`.
static ENV_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:([^}]*))?\}").unwrap());

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and merge every file in `paths`, in order: later files
    /// override services/commands of the same name, with a warning.
    pub fn load(paths: &[impl AsRef<Path>]) -> ConfigResult<LoadedConfig> {
        let mut merged = LoadedConfig::default();

        for path in paths {
            let path = path.as_ref();
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let expanded = expand_env(&raw);
            let file: ConfigFile = serde_json::from_str(&expanded).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

            for (name, service) in file.services {
                if merged.services.contains_key(&name) {
                    tracing::warn!(service = %name, file = %path.display(), "service overridden by later config file");
                }
                merged.services.insert(name, service);
            }
            for (name, group) in file.commands {
                if merged.commands.contains_key(&name) {
                    tracing::warn!(command_group = %name, file = %path.display(), "command group overridden by later config file");
                }
                merged.commands.insert(name, group);
            }
        }

        ConfigValidator::validate(&merged)?;
        validate_all_schemas(&merged)?;

        Ok(merged)
    }
}

/// Replace every `${VAR}`/`${VAR:default}` occurrence with the environment
/// value, or the literal default (empty string if no default and unset).
pub fn expand_env(input: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(input, |caps: &regex::Captures| {
            let var = &caps[1];
            let default = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}
