//! Local user and host identity.
//!
//! Both values are used as non-secret labels: the keychain account name, the
//! audit `user` field, the session file suffix, and the credential salt.

/// Name of the current OS user, or `"default"` when it cannot be determined.
pub fn username() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|name| crate::env::get_var(name))
        .unwrap_or_else(|| "default".to_string())
}

/// Hostname of this machine, or `"localhost"` when it cannot be determined.
pub fn hostname() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
