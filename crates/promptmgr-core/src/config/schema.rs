//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default secure session lifetime in minutes.
pub const DEFAULT_SESSION_TTL_MINUTES: u32 = 60;

/// Longest session a config file may request (one week).
pub const MAX_SESSION_TTL_MINUTES: u32 = 7 * 24 * 60;

/// Main promptmgr configuration (`~/.pm_config.json`).
///
/// The file is shared with other promptmgr components (provider API keys,
/// model choices). Their keys are kept in `extra` and written back untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Minutes a secure session stays unlocked.
    #[serde(default = "default_session_ttl")]
    pub secure_session_ttl_minutes: u32,

    /// Prompt data file; the secure store lives next to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,

    /// Currently selected LLM provider, used for API key lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Keys owned by other components.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secure_session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            data_file: None,
            provider: None,
            logging: LoggingConfig::default(),
            extra: BTreeMap::new(),
        }
    }
}

fn default_session_ttl() -> u32 {
    DEFAULT_SESSION_TTL_MINUTES
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is not set.
    #[serde(default)]
    pub level: LogLevel,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
