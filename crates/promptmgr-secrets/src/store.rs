//! The secure variable store.
//!
//! One JSON document per store file, next to the prompt data file. Every
//! field that could hold a secret is encrypted independently under the
//! session's credential hash; usage statistics stay in plaintext.
//!
//! All operations authenticate first (prompting if needed) and are recorded
//! in the audit log, successful or not.

use crate::audit::{AuditAction, AuditEvent, AuditLog, ALL_VARIABLES};
use crate::auth::AuthSession;
use crate::crypto::{placeholder, Cipher};
use crate::error::{Result, SecretError};
use crate::files;
use crate::prompt::Prompter;
use crate::types::{
    DecryptedSecret, ExportDocument, ExportMetadata, FieldUpdate, RotationReport,
    SecureVariableRecord, StoreDocument, VariableSummary, VariableUpdate, STORE_VERSION,
};
use promptmgr_core::{identity, paths, Config, SecretString};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, warn};

/// Maximum allowed length for a variable name.
const MAX_NAME_LEN: usize = 128;

/// Shown by `list` in place of a value that no longer decrypts.
pub const DECRYPT_FAILED: &str = "[DECRYPT_FAILED]";

/// Password-gated, encrypted-at-rest variable store.
pub struct SecureVariableStore {
    path: PathBuf,
    auth: AuthSession,
    cipher: Cipher,
    audit: Mutex<AuditLog>,
}

impl SecureVariableStore {
    pub fn new(path: impl Into<PathBuf>, auth: AuthSession, cipher: Cipher) -> Self {
        Self {
            path: path.into(),
            auth,
            cipher,
            audit: Mutex::new(AuditLog::new()),
        }
    }

    /// The store next to the configured data file, with the platform
    /// credential and session stores and the best available cipher.
    pub fn from_config(config: &Config, prompter: Arc<dyn Prompter>) -> Result<Self> {
        let data_file = config.resolve_data_file()?;
        Self::open(&data_file, config, prompter)
    }

    /// Like [`Self::from_config`], for an explicit prompt data file.
    pub fn open(data_file: &Path, config: &Config, prompter: Arc<dyn Prompter>) -> Result<Self> {
        let path = paths::secure_store_file(data_file);
        let auth = AuthSession::from_config(config, prompter)?;
        Ok(Self::new(path, auth, Cipher::probe()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn cipher(&self) -> &Cipher {
        &self.cipher
    }

    /// Encrypt and store a variable.
    ///
    /// An existing variable is only replaced after the user confirms;
    /// declining returns `Ok(false)`. An empty `default` means no default.
    pub async fn add(
        &self,
        name: &str,
        description: &str,
        value: &str,
        default: Option<&str>,
    ) -> Result<bool> {
        let action = AuditAction::Add;
        self.audited(action, name, validate_name(name), "Invalid name")?;
        let hash = self.unlock(action, name).await?;
        let mut doc = self.audited(action, name, self.load().await, "Storage error")?;

        if doc.secure_variables.contains_key(name)
            && !self.confirm(&format!(
                "Secure variable '{name}' already exists. Overwrite?"
            ))
        {
            self.record(action, name, false, Some("User cancelled overwrite"));
            return Ok(false);
        }

        let record = self.audited(
            action,
            name,
            self.encrypt_record(description, value, default, &hash),
            "Encryption failed",
        )?;

        let now = self.auth.now();
        doc.secure_variables.insert(name.to_string(), record);
        doc.touch(now);
        self.audited(action, name, self.save(&doc).await, "Storage error")?;

        self.record(action, name, true, Some("Added secure variable"));
        Ok(true)
    }

    /// Decrypt a variable's value.
    ///
    /// Every failure (authentication, unknown name, undecryptable blob,
    /// unreadable store) is `None`; the audit log tells them apart.
    pub async fn get(&self, name: &str) -> Option<DecryptedSecret> {
        let action = AuditAction::Get;
        self.audited(action, name, validate_name(name), "Invalid name").ok()?;
        let hash = self.unlock(action, name).await.ok()?;
        let mut doc = self
            .audited(action, name, self.load().await, "Storage error")
            .ok()?;

        let Some(record) = doc.secure_variables.get_mut(name) else {
            self.record(action, name, false, Some("Not found"));
            return None;
        };

        let Some(plaintext) = self
            .cipher
            .decrypt(&record.encrypted_value, hash.expose_secret())
        else {
            self.record(action, name, false, Some("Decryption failed"));
            return None;
        };

        let now = self.auth.now();
        record.used_count += 1;
        record.last_accessed = Some(now);
        doc.touch(now);
        if let Err(e) = self.save(&doc).await {
            warn!(variable = name, error = %e, "could not persist usage statistics");
        }

        self.record(action, name, true, None);
        Some(DecryptedSecret::new(plaintext))
    }

    /// Summaries of every variable, sorted by name.
    ///
    /// Values and defaults are masked unless `show_values` is set.
    pub async fn list(&self, show_values: bool) -> Result<Vec<VariableSummary>> {
        let action = AuditAction::List;
        let hash = self.unlock(action, ALL_VARIABLES).await?;
        let doc = self.audited(action, ALL_VARIABLES, self.load().await, "Storage error")?;

        let summaries: Vec<VariableSummary> = doc
            .secure_variables
            .iter()
            .map(|(name, record)| self.summarize(name, record, &hash, show_values))
            .collect();

        self.record(
            action,
            ALL_VARIABLES,
            true,
            Some(&format!("Listed {} variables", summaries.len())),
        );
        Ok(summaries)
    }

    /// Whether a variable exists. Names are not secret, so this does not prompt.
    pub async fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.load().await?.secure_variables.contains_key(name))
    }

    /// Re-encrypt only the supplied fields of an existing variable.
    ///
    /// Returns `Ok(false)` for an unknown name or an empty update.
    pub async fn update(&self, name: &str, update: VariableUpdate) -> Result<bool> {
        let action = AuditAction::Update;
        self.audited(action, name, validate_name(name), "Invalid name")?;
        let hash = self.unlock(action, name).await?;
        let mut doc = self.audited(action, name, self.load().await, "Storage error")?;

        let Some(record) = doc.secure_variables.get_mut(name) else {
            self.record(action, name, false, Some("Not found"));
            return Ok(false);
        };
        if update.is_empty() {
            self.record(action, name, false, Some("Nothing to update"));
            return Ok(false);
        }

        let hash = hash.expose_secret();
        let encrypt = |plaintext: &str| {
            self.audited(action, name, self.cipher.encrypt(plaintext, hash), "Encryption failed")
        };

        let mut changed = Vec::new();
        if let Some(description) = &update.description {
            record.encrypted_description = encrypt(description)?;
            changed.push("description");
        }
        if let Some(value) = &update.value {
            record.encrypted_value = encrypt(value)?;
            changed.push("value");
        }
        match update.default {
            FieldUpdate::Keep => {}
            FieldUpdate::Set(default) if !default.is_empty() => {
                record.encrypted_default = Some(encrypt(&default)?);
                changed.push("default");
            }
            FieldUpdate::Set(_) | FieldUpdate::Clear => {
                record.encrypted_default = None;
                changed.push("default");
            }
        }

        let now = self.auth.now();
        record.last_modified = Some(now);
        doc.touch(now);
        self.audited(action, name, self.save(&doc).await, "Storage error")?;

        self.record(action, name, true, Some(&format!("Updated {}", changed.join(", "))));
        Ok(true)
    }

    /// Remove a variable. Asks for confirmation unless `force` is set.
    pub async fn delete(&self, name: &str, force: bool) -> Result<bool> {
        let action = AuditAction::Delete;
        self.audited(action, name, validate_name(name), "Invalid name")?;
        self.unlock(action, name).await?;
        let mut doc = self.audited(action, name, self.load().await, "Storage error")?;

        if !doc.secure_variables.contains_key(name) {
            self.record(action, name, false, Some("Not found"));
            return Ok(false);
        }

        if !force && !self.confirm(&format!("Delete secure variable '{name}'?")) {
            self.record(action, name, false, Some("User cancelled"));
            return Ok(false);
        }

        doc.secure_variables.remove(name);
        doc.touch(self.auth.now());
        self.audited(action, name, self.save(&doc).await, "Storage error")?;

        self.record(action, name, true, Some("Deleted secure variable"));
        Ok(true)
    }

    /// Write the still-encrypted store plus export metadata to `dest` (mode 0600).
    pub async fn export(&self, dest: &Path) -> Result<bool> {
        let action = AuditAction::Export;
        self.unlock(action, ALL_VARIABLES).await?;
        let document =
            self.audited(action, ALL_VARIABLES, self.load().await, "Storage error")?;

        let export = ExportDocument {
            document,
            export_metadata: ExportMetadata {
                exported_at: self.auth.now(),
                exported_by: identity::username(),
                version: STORE_VERSION.to_string(),
            },
        };

        let json = self.audited(
            action,
            ALL_VARIABLES,
            serde_json::to_vec_pretty(&export).map_err(SecretError::from),
            "Serialization failed",
        )?;
        self.audited(
            action,
            ALL_VARIABLES,
            files::write_private_file(dest, &json)
                .await
                .map_err(SecretError::from),
            "Storage error",
        )?;

        self.record(
            action,
            ALL_VARIABLES,
            true,
            Some(&format!("Exported to {}", dest.display())),
        );
        Ok(true)
    }

    /// Change the password and re-encrypt every field under the new one.
    ///
    /// Everything is decrypted before the password changes. Fields that were
    /// already undecryptable are left untouched and counted as skipped. If the
    /// re-encrypted store cannot be written, the old credential is put back.
    pub async fn rotate_password(&self) -> Result<RotationReport> {
        let action = AuditAction::Rotate;
        let old_hash = self.unlock(action, ALL_VARIABLES).await?;
        let mut doc = self.audited(action, ALL_VARIABLES, self.load().await, "Storage error")?;

        let plaintexts: Vec<Option<SecretString>> = doc
            .secure_variables
            .values_mut()
            .flat_map(blobs_mut)
            .map(|blob| {
                self.cipher
                    .decrypt(blob, old_hash.expose_secret())
                    .map(SecretString::new)
            })
            .collect();

        let (_, new_hash) = self.audited(
            action,
            ALL_VARIABLES,
            self.auth.change_password().await,
            "Password change failed",
        )?;

        let outcome = self.reencrypt(&mut doc, &plaintexts, &new_hash).await;
        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "re-encryption failed, restoring previous password");
                if let Err(restore) = self.auth.reinstate(old_hash).await {
                    error!(error = %restore, "could not restore previous password");
                }
                self.record(action, ALL_VARIABLES, false, Some("Re-encryption failed"));
                return Err(e);
            }
        };

        self.record(
            action,
            ALL_VARIABLES,
            true,
            Some(&format!(
                "Re-encrypted {} fields, skipped {}",
                report.re_encrypted, report.skipped
            )),
        );
        Ok(report)
    }

    /// All retained audit events, oldest first.
    pub fn audit_log(&self) -> Vec<AuditEvent> {
        self.audit_guard().events()
    }

    /// The last `limit` audit events, oldest first.
    pub fn recent_audit(&self, limit: usize) -> Vec<AuditEvent> {
        self.audit_guard().recent(limit)
    }

    async fn reencrypt(
        &self,
        doc: &mut StoreDocument,
        plaintexts: &[Option<SecretString>],
        new_hash: &SecretString,
    ) -> Result<RotationReport> {
        let mut report = RotationReport::default();
        let now = self.auth.now();

        let blobs = doc.secure_variables.values_mut().flat_map(blobs_mut);
        for (blob, plaintext) in blobs.zip(plaintexts) {
            match plaintext {
                Some(plaintext) => {
                    *blob = self
                        .cipher
                        .encrypt(plaintext.expose_secret(), new_hash.expose_secret())?;
                    report.re_encrypted += 1;
                }
                None => report.skipped += 1,
            }
        }

        for record in doc.secure_variables.values_mut() {
            record.last_modified = Some(now);
        }
        doc.touch(now);
        self.save(doc).await?;
        Ok(report)
    }

    fn encrypt_record(
        &self,
        description: &str,
        value: &str,
        default: Option<&str>,
        hash: &SecretString,
    ) -> Result<SecureVariableRecord> {
        let hash = hash.expose_secret();
        let encrypted_default = default
            .filter(|d| !d.is_empty())
            .map(|d| self.cipher.encrypt(d, hash))
            .transpose()?;

        let now = self.auth.now();
        Ok(SecureVariableRecord {
            encrypted_value: self.cipher.encrypt(value, hash)?,
            encrypted_description: self.cipher.encrypt(description, hash)?,
            encrypted_default,
            is_secure: true,
            created_at: now,
            used_count: 0,
            last_accessed: None,
            last_modified: Some(now),
        })
    }

    fn summarize(
        &self,
        name: &str,
        record: &SecureVariableRecord,
        hash: &SecretString,
        show_values: bool,
    ) -> VariableSummary {
        let meta = self.cipher.decrypt_metadata(record, hash.expose_secret());
        let has_default = record.encrypted_default.is_some();

        let (value, default_value) = if show_values {
            let value = self
                .cipher
                .decrypt(&record.encrypted_value, hash.expose_secret())
                .unwrap_or_else(|| DECRYPT_FAILED.to_string());
            (value, meta.default_value)
        } else {
            let masked_default = has_default.then(|| placeholder().to_string());
            (placeholder().to_string(), masked_default)
        };

        VariableSummary {
            name: name.to_string(),
            description: meta.description,
            value,
            default_value,
            has_default,
            is_secure: record.is_secure,
            created_at: record.created_at,
            used_count: record.used_count,
            last_accessed: record.last_accessed,
            last_modified: record.last_modified,
        }
    }

    async fn unlock(&self, action: AuditAction, name: &str) -> Result<SecretString> {
        let outcome = self.auth.ensure_authenticated().await;
        self.audited(action, name, outcome, "Authentication failed")
    }

    /// Read the store. A missing file is an empty store; an unreadable one is an error.
    async fn load(&self) -> Result<StoreDocument> {
        let Some(data) = files::read_optional(&self.path).await? else {
            return Ok(StoreDocument::empty(self.auth.now()));
        };

        serde_json::from_str(&data).map_err(|e| {
            SecretError::StorageError(format!(
                "secure store {} is unreadable: {e}",
                self.path.display()
            ))
        })
    }

    async fn save(&self, doc: &StoreDocument) -> Result<()> {
        let json = serde_json::to_vec_pretty(doc)?;
        files::write_private_file(&self.path, &json).await?;
        debug!(path = %self.path.display(), count = doc.secure_variables.len(), "secure store saved");
        Ok(())
    }

    fn confirm(&self, question: &str) -> bool {
        self.auth.prompter().confirm(question).unwrap_or_else(|e| {
            warn!(error = %e, "confirmation aborted");
            false
        })
    }

    /// Record a failure with `reason` when `result` is an error.
    fn audited<T>(
        &self,
        action: AuditAction,
        name: &str,
        result: Result<T>,
        reason: &str,
    ) -> Result<T> {
        if result.is_err() {
            self.record(action, name, false, Some(reason));
        }
        result
    }

    fn record(&self, action: AuditAction, name: &str, success: bool, details: Option<&str>) {
        let mut event = AuditEvent::new(action, name, success).at(self.auth.now());
        if let Some(details) = details {
            event = event.with_details(details);
        }
        self.audit_guard().record(event);
    }

    fn audit_guard(&self) -> MutexGuard<'_, AuditLog> {
        self.audit.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Every encrypted field of a record, in a fixed order.
fn blobs_mut(record: &mut SecureVariableRecord) -> impl Iterator<Item = &mut String> {
    [&mut record.encrypted_value, &mut record.encrypted_description]
        .into_iter()
        .chain(record.encrypted_default.as_mut())
}

/// Validate a variable name.
///
/// Names must be non-empty, at most [`MAX_NAME_LEN`] characters, and consist
/// of ASCII alphanumerics, underscores, and hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SecretError::InvalidName(
            "name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SecretError::InvalidName(format!(
            "name exceeds maximum length of {MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(SecretError::InvalidName(format!(
            "name contains invalid characters (allowed: alphanumeric, underscore, hyphen): {name}"
        )));
    }
    Ok(())
}
