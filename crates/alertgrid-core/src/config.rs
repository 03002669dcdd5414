//! alertgrid.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DEFAULT_NAMESPACE;

/// Default Kapacitor HTTP port appended to bare node addresses.
pub const DEFAULT_KAPACITOR_PORT: u16 = 9092;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertGridConfig {
    pub kapacitor: KapacitorConfig,
    pub event: EventConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub sync: Option<SyncConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KapacitorConfig {
    /// Node hosts. Bare hosts get `http://` and the port added.
    pub addrs: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-request timeout, e.g. "20s".
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Endpoint the generated scripts post alerts to.
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub list_policy: ListPolicy,
    /// Measurements never turned into tasks.
    #[serde(default)]
    pub skip_measurements: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            list_policy: ListPolicy::default(),
            skip_measurements: Vec::new(),
        }
    }
}

/// How an aggregated task listing treats a node that fails to answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListPolicy {
    /// Any node error fails the whole listing.
    #[default]
    FailFast,
    /// Failing nodes are logged and left out of the result.
    BestEffort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// JSON file holding the desired alarms.
    pub alarms_file: PathBuf,
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_port() -> u16 {
    DEFAULT_KAPACITOR_PORT
}

fn default_timeout() -> String {
    "20s".to_string()
}

fn default_interval() -> String {
    "60s".to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl AlertGridConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: AlertGridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.event.addr.trim().is_empty() {
            return Err(ConfigError::Invalid("event.addr must not be empty".into()));
        }
        if self.engine.namespace.is_empty() {
            return Err(ConfigError::Invalid("engine.namespace must not be empty".into()));
        }
        self.request_timeout()?;
        if let Some(sync) = &self.sync {
            parse_duration(&sync.interval).ok_or_else(|| {
                ConfigError::Invalid(format!("sync.interval: bad duration {:?}", sync.interval))
            })?;
        }
        Ok(())
    }

    /// Per-request timeout for node calls.
    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.kapacitor.timeout).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "kapacitor.timeout: bad duration {:?}",
                self.kapacitor.timeout
            ))
        })
    }

    /// Interval between sync passes, if a sync section is configured.
    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync.as_ref().and_then(|s| parse_duration(&s.interval))
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
