//! Configuration loading and persistence.

use super::{Config, DEFAULT_SESSION_TTL_MINUTES, MAX_SESSION_TTL_MINUTES};
use crate::env::{self, vars};
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Load configuration from the default path, falling back to defaults.
    ///
    /// A missing file is normal; an unreadable one is logged and ignored.
    pub fn load_or_default() -> Self {
        match Self::load_default() {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => {
                warn!("ignoring unreadable config file: {e}");
                Self::default()
            }
        }
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<(), ConfigError> {
        let path = paths::config_file()?;
        self.save(&path)
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.secure_session_ttl_minutes == 0 {
            errors.push("secure_session_ttl_minutes must be greater than 0".to_string());
        }
        if self.secure_session_ttl_minutes > MAX_SESSION_TTL_MINUTES {
            errors.push(format!(
                "secure_session_ttl_minutes {} exceeds maximum of {}",
                self.secure_session_ttl_minutes, MAX_SESSION_TTL_MINUTES
            ));
        }

        if let Some(provider) = &self.provider {
            if provider.trim().is_empty() {
                errors.push("provider must not be empty when set".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Resolve the secure session TTL in minutes.
    ///
    /// Order: `PM_SECURE_SESSION_TTL`, then this config, then the default.
    /// Zero or out-of-range values at either layer are skipped.
    pub fn session_ttl_minutes(&self) -> u32 {
        if let Some(minutes) = env::get_u32(vars::PM_SECURE_SESSION_TTL) {
            if (1..=MAX_SESSION_TTL_MINUTES).contains(&minutes) {
                debug!(minutes, "session TTL from environment");
                return minutes;
            }
            warn!(minutes, "ignoring out-of-range {}", vars::PM_SECURE_SESSION_TTL);
        }

        if (1..=MAX_SESSION_TTL_MINUTES).contains(&self.secure_session_ttl_minutes) {
            self.secure_session_ttl_minutes
        } else {
            DEFAULT_SESSION_TTL_MINUTES
        }
    }

    /// Resolve the prompt data file: config value, then `PM_DATA_FILE`/default.
    pub fn resolve_data_file(&self) -> Result<PathBuf, ConfigError> {
        if env::get_var(vars::PM_DATA_FILE).is_none() {
            if let Some(path) = &self.data_file {
                return Ok(paths::expand_tilde(&path.to_string_lossy()));
            }
        }
        paths::data_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_original_config_shape() {
        // Files written by older tools carry extra keys alongside the TTL.
        let config = Config::parse(
            r#"{
                "provider": "openai",
                "api_keys": { "openai": "env" },
                "models": { "openai": "gpt-4o" },
                "secure_session_ttl_minutes": 15,
            }"#,
        )
        .unwrap();

        assert_eq!(config.secure_session_ttl_minutes, 15);
        assert_eq!(config.provider.as_deref(), Some("openai"));
    }

    #[test]
    fn test_save_keeps_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"models": {"openai": "gpt-4o"}, "secure_session_ttl_minutes": 15}"#,
        )
        .unwrap();

        let mut config = Config::load(&path).unwrap();
        config.secure_session_ttl_minutes = 20;
        config.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["models"]["openai"], "gpt-4o");
        assert_eq!(raw["secure_session_ttl_minutes"], 20);
    }

    #[test]
    fn test_parse_empty_object_uses_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.secure_session_ttl_minutes, DEFAULT_SESSION_TTL_MINUTES);
        assert!(config.data_file.is_none());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = Config {
            secure_session_ttl_minutes: 0,
            provider: Some("  ".to_string()),
            ..Config::default()
        };

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("secure_session_ttl_minutes"));
        assert!(err.contains("provider"));
    }

    #[test]
    fn test_save_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = Config {
            secure_session_ttl_minutes: 0,
            ..Config::default()
        };
        assert!(config.save(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_session_ttl_falls_back_on_invalid_value() {
        let config = Config {
            secure_session_ttl_minutes: MAX_SESSION_TTL_MINUTES + 1,
            ..Config::default()
        };
        // Only meaningful when the override variable is not set in the test env.
        if env::get_var(vars::PM_SECURE_SESSION_TTL).is_none() {
            assert_eq!(config.session_ttl_minutes(), DEFAULT_SESSION_TTL_MINUTES);
        }
    }
}
