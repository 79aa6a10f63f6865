//! # promptmgr-core
//!
//! Core types, configuration, and utilities shared by the promptmgr crates.
//!
//! - **Configuration**: loading, validation, and persistence of `~/.pm_config.json`
//! - **Paths**: where credentials, sessions, and the secure store live
//! - **Utilities**: environment lookups, local identity, zeroizing strings

pub mod config;
pub mod env;
pub mod error;
pub mod identity;
pub mod paths;
pub mod secret;

// Re-exports for convenience
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use secret::SecretString;
