//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
pub fn get_var_or(name: &str, default: &str) -> String {
    get_var(name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable as a u32.
///
/// Unparsable values are treated as unset.
pub fn get_u32(name: &str) -> Option<u32> {
    get_var(name).and_then(|v| v.trim().parse().ok())
}

/// Environment variable names read by promptmgr.
pub mod vars {
    /// Secure session TTL override, in minutes.
    pub const PM_SECURE_SESSION_TTL: &str = "PM_SECURE_SESSION_TTL";

    /// Config file override (defaults to `~/.pm_config.json`).
    pub const PM_CONFIG_FILE: &str = "PM_CONFIG_FILE";

    /// Prompt data file override (the secure store lives next to it).
    pub const PM_DATA_FILE: &str = "PM_DATA_FILE";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_var_empty_is_none() {
        env::set_var("PM_TEST_EMPTY_VAR", "");
        assert!(get_var("PM_TEST_EMPTY_VAR").is_none());
        assert_eq!(get_var_or("PM_TEST_EMPTY_VAR", "fallback"), "fallback");
        env::remove_var("PM_TEST_EMPTY_VAR");
    }

    #[test]
    fn test_get_u32() {
        env::set_var("PM_TEST_U32_OK", " 45 ");
        env::set_var("PM_TEST_U32_BAD", "forty");

        assert_eq!(get_u32("PM_TEST_U32_OK"), Some(45));
        assert_eq!(get_u32("PM_TEST_U32_BAD"), None);
        assert_eq!(get_u32("PM_TEST_U32_MISSING"), None);

        env::remove_var("PM_TEST_U32_OK");
        env::remove_var("PM_TEST_U32_BAD");
    }
}
