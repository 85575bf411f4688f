use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Operator-facing configuration, loaded from a JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    /// RCON endpoint, `host:port`.
    pub server: String,

    /// Shared RCON password.
    pub rconpw: String,

    /// Newline-delimited chat filter rules.
    #[serde(default = "default_chat_filter")]
    pub chat_filter: PathBuf,

    /// Directory receiving the kick/ban/chat/error log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Optional player-lookup backend.
    #[serde(default)]
    pub lookup: Option<LookupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Endpoint template; `{guid}` is replaced with the player GUID.
    pub endpoint: String,

    /// Bearer token, if the backend wants one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout (seconds).
    #[serde(default = "default_lookup_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_chat_filter() -> PathBuf {
    PathBuf::from("filter/chat.txt")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_lookup_timeout_secs() -> u64 {
    10
}

impl WardenConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: WardenConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() {
            return Err(ConfigError::Validation("server cannot be empty".to_string()));
        }
        if !self.server.contains(':') {
            return Err(ConfigError::Validation(format!("server must be host:port, got {:?}", self.server)));
        }
        if let Some(lookup) = &self.lookup {
            if !lookup.endpoint.contains("{guid}") {
                return Err(ConfigError::Validation("lookup endpoint must contain a {guid} placeholder".to_string()));
            }
        }
        Ok(())
    }
}
