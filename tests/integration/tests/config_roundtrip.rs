//! Config save/load roundtrip integration tests.

use promptmgr_core::config::{Config, LogLevel, DEFAULT_SESSION_TTL_MINUTES};
use promptmgr_core::paths;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(
        loaded.secure_session_ttl_minutes,
        config.secure_session_ttl_minutes
    );
    assert_eq!(loaded.logging.level, config.logging.level);
    assert!(loaded.data_file.is_none());
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.secure_session_ttl_minutes = 15;
    config.provider = Some("openai".to_string());
    config.logging.level = LogLevel::Debug;
    config.data_file = Some(PathBuf::from("/srv/prompts/library.json"));
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.secure_session_ttl_minutes, 15);
    assert_eq!(loaded.provider.as_deref(), Some("openai"));
    assert_eq!(loaded.logging.level, LogLevel::Debug);
    assert_eq!(
        paths::secure_store_file(loaded.data_file.as_deref().unwrap()),
        PathBuf::from("/srv/prompts/library_secure.json")
    );
}

#[test]
fn test_config_from_other_tools_is_accepted() {
    // The config file is shared; unrelated keys must not break loading.
    let config = Config::parse(
        r#"{
            // written by the prompt manager itself
            "openai_api_key": "stored elsewhere",
            "model": "gpt-4",
            "secure_session_ttl_minutes": 30,
        }"#,
    )
    .unwrap();
    assert_eq!(config.secure_session_ttl_minutes, 30);
}

#[test]
fn test_missing_ttl_uses_default() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.secure_session_ttl_minutes, DEFAULT_SESSION_TTL_MINUTES);
}

#[test]
fn test_invalid_config_not_saved() {
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
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/config.json"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    let result = Config::parse("not valid json");
    assert!(result.is_err());
}
