//! Error types for secure variable management.

use thiserror::Error;

/// Errors that can occur during secure variable operations.
///
/// Decryption problems never reach callers of the store as a distinct
/// variant: the cipher reports them as `None`, so a wrong password and a
/// corrupted blob look the same from outside.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secure variable not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Keychain error: {0}")]
    KeychainError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid variable name: {0}")]
    InvalidName(String),

    #[error("Configuration error: {0}")]
    Config(#[from] promptmgr_core::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for secure variable operations.
pub type Result<T> = std::result::Result<T, SecretError>;
