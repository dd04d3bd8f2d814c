//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Service-level settings, loaded from the TOML config file when present.
///
/// Every field has a default so the service starts with zero configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Role name (case-insensitive) that grants admin access
    pub admin_role_name: String,
    /// Session lifetime in seconds
    pub session_ttl_seconds: i64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            admin_role_name: "ADMIN".to_string(),
            session_ttl_seconds: 8 * 60 * 60,
        }
    }
}

impl ServiceConfig {
    /// Load service settings from the config file, falling back to defaults
    /// when the file is missing or has no matching keys.
    pub fn load() -> Self {
        if let Ok(config_path) = config_file_path() {
            if let Ok(contents) = std::fs::read_to_string(&config_path) {
                match toml::from_str::<ServiceConfig>(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(
                            "Ignoring malformed config file {}: {}",
                            config_path.display(),
                            e
                        );
                    }
                }
            }
        }
        ServiceConfig::default()
    }
}

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`data_dir` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = config_file_path() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(data_dir) = config.get("data_dir").and_then(|v| v.as_str()) {
                    return PathBuf::from(data_dir);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_data_dir()
}

/// Get configuration file path for the platform
fn config_file_path() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/multirank/config.toml first, then /etc/multirank/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("multirank").join("config.toml"));
        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/multirank/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("multirank").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// Get OS-dependent default data folder path
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("multirank"))
        .unwrap_or_else(|| PathBuf::from("./multirank_data"))
}

/// Ensure the data directory exists and return the database path inside it
pub fn database_path(data_dir: &std::path::Path) -> Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("multirank.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arg_takes_priority() {
        let dir = resolve_data_dir(Some("/tmp/from-cli"), "MULTIRANK_TEST_UNSET_VAR");
        assert_eq!(dir, PathBuf::from("/tmp/from-cli"));
    }

    #[test]
    fn env_var_used_when_no_cli_arg() {
        std::env::set_var("MULTIRANK_TEST_DATA_DIR_CFG", "/tmp/from-env");
        let dir = resolve_data_dir(None, "MULTIRANK_TEST_DATA_DIR_CFG");
        assert_eq!(dir, PathBuf::from("/tmp/from-env"));
        std::env::remove_var("MULTIRANK_TEST_DATA_DIR_CFG");
    }

    #[test]
    fn service_config_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.admin_role_name, "ADMIN");
        assert!(config.session_ttl_seconds > 0);
    }
}
