//! Server configuration
//!
//! Read from `configuration.yaml` in the config directory. Every section is
//! optional and unknown top-level keys are ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use emontx_config::EmonTxSettings;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const CONFIG_FILE: &str = "configuration.yaml";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub http: HttpConfig,
    #[serde(deserialize_with = "null_as_default")]
    pub logger: LoggerConfig,
    #[serde(deserialize_with = "null_as_default")]
    pub emontx_config: EmonTxSettings,
}

/// `http:` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub server_host: String,
    pub server_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8123,
        }
    }
}

impl HttpConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// `logger:` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Level for everything not listed in `logs`
    pub default: String,
    /// Per-target levels, e.g. `emontx_config: debug`
    pub logs: BTreeMap<String, String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            default: "info".to_string(),
            logs: BTreeMap::new(),
        }
    }
}

impl LoggerConfig {
    /// `tracing-subscriber` filter directives for this section
    pub fn filter_directives(&self) -> String {
        std::iter::once(self.default.clone())
            .chain(
                self.logs
                    .iter()
                    .map(|(target, level)| format!("{}={}", target, level)),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// An empty section (`emontx_config:`) means "use the defaults"
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Load `configuration.yaml`; a missing file yields the defaults
pub fn load(config_dir: &Path) -> ConfigResult<ServerConfig> {
    let path = config_dir.join(CONFIG_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ServerConfig::default());
        }
        Err(source) => return Err(ConfigError::ReadFile { path, source }),
    };

    parse(&content).map_err(|source| ConfigError::ParseYaml { path, source })
}

fn parse(content: &str) -> Result<ServerConfig, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(ServerConfig::default());
    }
    serde_yaml::from_str(content)
}
