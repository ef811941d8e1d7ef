//! Server configuration (spec §6 "Configuration").

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    30
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// The configuration file as written on disk, before env-var overlay
/// and validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    pub tools_dir: Option<PathBuf>,
    #[serde(default)]
    pub tools_registry: std::collections::HashMap<String, crate::tool::ToolDescriptor>,
    pub port: Option<u16>,
    pub timeout: Option<u64>,
    pub log_format: Option<String>,
    pub log_level: Option<String>,
}

/// Resolved, validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tools_dir: Option<PathBuf>,
    pub tools_registry: std::collections::HashMap<String, crate::tool::ToolDescriptor>,
    pub port: u16,
    pub timeout: u64,
    pub log_format: String,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tools_dir: None,
            tools_registry: std::collections::HashMap::new(),
            port: default_port(),
            timeout: default_timeout(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

/// Load a YAML config file, resolving `tools_dir` relative to the file's
/// own directory (spec §6 "relative paths resolve against config-file
/// directory").
pub fn load(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawConfig = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tools_dir = raw.tools_dir.map(|dir| {
        if dir.is_absolute() {
            dir
        } else {
            config_dir.join(dir)
        }
    });

    let raw = apply_env_overrides(RawConfig { tools_dir, ..raw });
    build_config(raw)
}

/// Overlay environment variables onto a config, per key `K` trying `K`
/// then `ORLA_<K>` (spec §6 "Environment lookup").
pub fn apply_env_overrides(mut raw: RawConfig) -> RawConfig {
    if let Some(value) = env_lookup("port") {
        if let Ok(port) = value.parse() {
            raw.port = Some(port);
        }
    }
    if let Some(value) = env_lookup("timeout") {
        if let Ok(timeout) = value.parse() {
            raw.timeout = Some(timeout);
        }
    }
    if let Some(value) = env_lookup("log_format") {
        raw.log_format = Some(value);
    }
    if let Some(value) = env_lookup("log_level") {
        raw.log_level = Some(value);
    }
    if let Some(value) = env_lookup("tools_dir") {
        raw.tools_dir = Some(PathBuf::from(value));
    }
    raw
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key)
        .or_else(|_| std::env::var(format!("ORLA_{}", key.to_uppercase())))
        .ok()
}

/// Apply defaults and validate (spec §6 table, `timeout >= 1, warn
/// >3600`).
pub fn build_config(raw: RawConfig) -> Result<ServerConfig, ConfigError> {
    let timeout = raw.timeout.unwrap_or_else(default_timeout);
    if timeout < 1 {
        return Err(ConfigError::InvalidValue {
            key: "timeout",
            message: "must be >= 1".to_string(),
        });
    }
    if timeout > 3600 {
        warn!(timeout, "configured timeout exceeds 3600s");
    }

    let log_format = raw.log_format.unwrap_or_else(default_log_format);
    if log_format != "json" && log_format != "pretty" {
        return Err(ConfigError::InvalidValue {
            key: "log_format",
            message: format!("must be 'json' or 'pretty', got {log_format:?}"),
        });
    }

    let log_level = raw.log_level.unwrap_or_else(default_log_level);
    if !["debug", "info", "warn", "error", "fatal"].contains(&log_level.as_str()) {
        return Err(ConfigError::InvalidValue {
            key: "log_level",
            message: format!("unrecognized level {log_level:?}"),
        });
    }

    Ok(ServerConfig {
        tools_dir: raw.tools_dir,
        tools_registry: raw.tools_registry,
        port: raw.port.unwrap_or_else(default_port),
        timeout,
        log_format,
        log_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let config = build_config(RawConfig::default()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.timeout, 30);
        assert_eq!(config.log_format, "json");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let raw = RawConfig {
            timeout: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            build_config(raw),
            Err(ConfigError::InvalidValue { key: "timeout", .. })
        ));
    }

    #[test]
    fn unrecognized_log_format_is_rejected() {
        let raw = RawConfig {
            log_format: Some("xml".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            build_config(raw),
            Err(ConfigError::InvalidValue { key: "log_format", .. })
        ));
    }

    #[test]
    fn env_override_wins_over_file_default() {
        std::env::set_var("ORLA_PORT", "9999");
        let raw = apply_env_overrides(RawConfig::default());
        std::env::remove_var("ORLA_PORT");
        assert_eq!(raw.port, Some(9999));
    }

    #[test]
    fn load_applies_env_overrides_over_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("orla.yaml");
        std::fs::write(&path, "port: 1111\n").unwrap();

        std::env::set_var("ORLA_PORT", "2222");
        let config = load(&path).unwrap();
        std::env::remove_var("ORLA_PORT");

        assert_eq!(config.port, 2222);
    }
}
