//! Core types for secure variables.
//!
//! The on-disk document ([`StoreDocument`]) only ever holds ciphertext for
//! values, descriptions, and defaults; usage metadata stays in plaintext.

use chrono::{DateTime, Utc};
use promptmgr_core::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Format version written into store and export metadata.
pub const STORE_VERSION: &str = "1.0";

/// One encrypted secure variable as stored on disk.
///
/// Each encrypted field is an independent blob produced by
/// [`crate::crypto::Cipher::encrypt`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureVariableRecord {
    pub encrypted_value: String,

    pub encrypted_description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_default: Option<String>,

    /// Always `true`; lets the plaintext prompt store tell the two apart.
    #[serde(default = "default_true")]
    pub is_secure: bool,

    pub created_at: DateTime<Utc>,

    /// Successful decryptions via `get`.
    #[serde(default)]
    pub used_count: u64,

    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Store-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,

    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    STORE_VERSION.to_string()
}

/// The whole secure store file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub secure_variables: BTreeMap<String, SecureVariableRecord>,

    pub metadata: StoreMetadata,
}

impl StoreDocument {
    /// An empty document stamped with `now`.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            secure_variables: BTreeMap::new(),
            metadata: StoreMetadata {
                created_at: now,
                last_modified: None,
                version: default_version(),
            },
        }
    }

    /// Mark the document as modified.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.metadata.last_modified = Some(now);
    }
}

/// Who exported a store and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub exported_at: DateTime<Utc>,
    pub exported_by: String,
    pub version: String,
}

/// An exported store: the unchanged encrypted document plus export metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    #[serde(flatten)]
    pub document: StoreDocument,

    pub export_metadata: ExportMetadata,
}

/// Display-safe view of one variable, as returned by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct VariableSummary {
    pub name: String,
    pub description: String,
    /// Plaintext only when values were explicitly requested; otherwise the placeholder.
    pub value: String,
    pub default_value: Option<String>,
    pub has_default: bool,
    pub is_secure: bool,
    pub created_at: DateTime<Utc>,
    pub used_count: u64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Decrypted description and default of one record.
///
/// Fields that no longer decrypt carry a fixed marker instead of plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMetadata {
    pub description: String,
    pub default_value: Option<String>,
}

/// A three-way field change: leave it, replace it, or remove it.
///
/// Keeps "not supplied" and "explicitly cleared" apart instead of overloading
/// the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> FieldUpdate<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldUpdate::Keep)
    }
}

/// Changes to apply to an existing secure variable.
///
/// Fields left as `None`/[`FieldUpdate::Keep`] are not re-encrypted.
#[derive(Debug, Clone, Default)]
pub struct VariableUpdate {
    pub description: Option<String>,
    pub value: Option<String>,
    pub default: FieldUpdate<String>,
}

impl VariableUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = FieldUpdate::Set(default.into());
        self
    }

    pub fn clear_default(mut self) -> Self {
        self.default = FieldUpdate::Clear;
        self
    }

    /// True when nothing would change.
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.value.is_none() && self.default.is_keep()
    }
}

/// Outcome of re-encrypting the store under a new password.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationReport {
    /// Fields decrypted with the old hash and re-encrypted with the new one.
    pub re_encrypted: usize,
    /// Fields that were already undecryptable and were left as-is.
    pub skipped: usize,
}

/// A decrypted secure variable value held in memory.
///
/// Wraps `SecretString` so the plaintext is zeroed on drop. Debug and Display
/// both emit `[REDACTED]` to prevent accidental logging.
pub struct DecryptedSecret {
    inner: SecretString,
}

impl DecryptedSecret {
    /// Create a new decrypted secret from raw plaintext.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: SecretString::new(value),
        }
    }

    /// Expose the plaintext value. Use sparingly.
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }
}

impl fmt::Debug for DecryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for DecryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for DecryptedSecret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
