//! Path resolution utilities.

use crate::env::{self, vars};
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Suffix that distinguishes the secure store from the plaintext prompt store.
pub const SECURE_STORE_SUFFIX: &str = "_secure";

/// Get the current user's home directory.
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })
}

/// Get the promptmgr data directory (~/.pm).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(".pm"))
}

/// Get the prompt data file path.
///
/// `PM_DATA_FILE` wins over the default `~/.pm/prompts.json`.
pub fn data_file() -> Result<PathBuf, ConfigError> {
    match env::get_var(vars::PM_DATA_FILE) {
        Some(path) => Ok(expand_tilde(&path)),
        None => Ok(base_dir()?.join("prompts.json")),
    }
}

/// Get the config file path (`PM_CONFIG_FILE` or ~/.pm_config.json).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    match env::get_var(vars::PM_CONFIG_FILE) {
        Some(path) => Ok(expand_tilde(&path)),
        None => Ok(home_dir()?.join(".pm_config.json")),
    }
}

/// Get the fallback credential file path (~/.pm_secure_hash).
pub fn credential_file() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(".pm_secure_hash"))
}

/// Get the owner-only session directory for `user` inside the OS temp directory.
pub fn session_dir(user: &str) -> PathBuf {
    std::env::temp_dir().join(format!(".pm_secure-{}", user))
}

/// Get the session file path for `user`.
pub fn session_file(user: &str) -> PathBuf {
    session_dir(user).join("session.json")
}

/// Derive the secure store path that sits next to a prompt data file.
///
/// `prompts.json` becomes `prompts_secure.json`; a file without a `.json`
/// extension gets `_secure.json` appended to its full name.
pub fn secure_store_file(data_file: &Path) -> PathBuf {
    let file_name = data_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "prompts.json".to_string());

    let stem = file_name.strip_suffix(".json").unwrap_or(&file_name);
    data_file.with_file_name(format!("{}{}.json", stem, SECURE_STORE_SUFFIX))
}

/// Create `dir` (and parents) and restrict it to the owner on Unix.
pub fn ensure_private_dir(dir: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
