use crate::reconnect::DEFAULT_RECONNECT_INTERVAL_MS;
use crate::wire::DEFAULT_MAX_FRAME_BYTES;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";
pub const DEFAULT_CLOCK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_LOG_LEVEL: &str = "info";
const MAX_RECONNECT_INTERVAL_MS: u64 = 24 * 60 * 60 * 1_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config: {0}")]
    Io(#[from] io::Error),
    #[error("unable to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid websocket url '{value}': {source}")]
    InvalidUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("unsupported websocket scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebsocketConfig {
    pub url: String,
    pub max_frame_bytes: usize,
}

impl Default for WebsocketConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub clock_interval_ms: u64,
    pub reconnect_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            clock_interval_ms: DEFAULT_CLOCK_INTERVAL_MS,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for the log file. Empty disables file logging.
    pub dir: String,
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            dir: String::new(),
            stderr: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub websocket: WebsocketConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

/// Values that win over the config file. Filled from the environment and
/// then from command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub url: Option<String>,
    pub log_level: Option<String>,
    pub log_dir: Option<String>,
    pub log_stderr: Option<bool>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            url: non_empty("PENDANT_URL"),
            log_level: non_empty("PENDANT_LOG_LEVEL"),
            log_dir: non_empty("PENDANT_LOG_DIR"),
            log_stderr: non_empty("PENDANT_LOG_STDERR").and_then(|value| parse_bool_flag(&value)),
        }
    }
}

/// Settings the session needs, resolved and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub url: Url,
    pub max_frame_bytes: usize,
    pub reconnect_interval: chrono::Duration,
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(url) = overrides.url.as_ref() {
            self.websocket.url = url.clone();
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = level.clone();
        }
        if let Some(dir) = overrides.log_dir.as_ref() {
            self.logging.dir = dir.clone();
        }
        if let Some(stderr) = overrides.log_stderr {
            self.logging.stderr = stderr;
        }
    }

    pub fn clock_interval(&self) -> Duration {
        Duration::from_millis(self.timing.clock_interval_ms.max(1))
    }

    pub fn session_options(&self) -> Result<SessionOptions, ConfigError> {
        let url = Url::parse(self.websocket.url.trim()).map_err(|source| {
            ConfigError::InvalidUrl {
                value: self.websocket.url.clone(),
                source,
            }
        })?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        let reconnect_ms = self.timing.reconnect_interval_ms.min(MAX_RECONNECT_INTERVAL_MS) as i64;
        Ok(SessionOptions {
            url,
            max_frame_bytes: self.websocket.max_frame_bytes,
            reconnect_interval: chrono::Duration::milliseconds(reconnect_ms),
        })
    }
}

pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var("PENDANT_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    config_dir().join("pendant/config.toml")
}

fn config_dir() -> PathBuf {
    if let Ok(path) = env::var("XDG_CONFIG_HOME") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home).join(".config");
    }
    PathBuf::from(".")
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
