//! Storage for the credential hash.
//!
//! The hash is looked up in priority order:
//! 1. OS keychain (macOS Keychain via Security.framework)
//! 2. `~/.pm_secure_hash`, mode 0600
//!
//! On Linux and other platforms the keychain is not available and only the
//! file is used.

use crate::error::{Result, SecretError};
use crate::files;
use async_trait::async_trait;
use promptmgr_core::{identity, paths, SecretString};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Keychain service name for the credential item.
pub const KEYCHAIN_SERVICE: &str = "prompt-manager-secure";

/// Where the credential hash is kept.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The stored hash, or `None` before first-time setup.
    async fn load(&self) -> Result<Option<SecretString>>;

    /// Store or replace the hash.
    async fn save(&self, password_hash: &SecretString) -> Result<()>;

    /// Remove the hash. Succeeds when there is none.
    async fn delete(&self) -> Result<()>;
}

/// Hex hash in a single owner-only file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.pm_secure_hash`.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(paths::credential_file()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<SecretString>> {
        let hash = files::read_optional(&self.path)
            .await?
            .map(|data| data.trim().to_string())
            .filter(|data| !data.is_empty())
            .map(SecretString::new);
        Ok(hash)
    }

    async fn save(&self, password_hash: &SecretString) -> Result<()> {
        files::write_private_file(&self.path, password_hash.expose_secret().as_bytes()).await?;
        debug!(path = %self.path.display(), "credential written to file");
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        files::remove_if_exists(&self.path).await?;
        Ok(())
    }
}

/// Generic-password item in the OS keychain.
#[derive(Debug, Clone)]
pub struct KeychainCredentialStore {
    service: String,
    account: String,
}

impl KeychainCredentialStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    /// The `prompt-manager-secure` item for the current OS user.
    pub fn for_current_user() -> Self {
        Self::new(KEYCHAIN_SERVICE, identity::username())
    }

    /// Whether this platform has a keychain backend.
    pub fn is_supported() -> bool {
        cfg!(target_os = "macos")
    }
}

#[async_trait]
impl CredentialStore for KeychainCredentialStore {
    async fn load(&self) -> Result<Option<SecretString>> {
        keychain::get(&self.service, &self.account)
    }

    async fn save(&self, password_hash: &SecretString) -> Result<()> {
        keychain::set(&self.service, &self.account, password_hash)
    }

    async fn delete(&self) -> Result<()> {
        keychain::delete(&self.service, &self.account)
    }
}

// ---------------------------------------------------------------------------
// macOS keychain implementation
// ---------------------------------------------------------------------------

#[cfg(target_os = "macos")]
mod keychain {
    use super::*;
    use security_framework::passwords::{
        delete_generic_password, get_generic_password, set_generic_password,
    };

    /// errSecItemNotFound
    const ITEM_NOT_FOUND: i32 = -25300;

    pub(super) fn get(service: &str, account: &str) -> Result<Option<SecretString>> {
        match get_generic_password(service, account) {
            Ok(data) => {
                let hash = String::from_utf8(data.to_vec()).map_err(|e| {
                    SecretError::KeychainError(format!("keychain data is not valid UTF-8: {e}"))
                })?;
                Ok(Some(SecretString::new(hash.trim())))
            }
            Err(e) if e.code() == ITEM_NOT_FOUND => Ok(None),
            Err(e) => Err(SecretError::KeychainError(format!(
                "keychain read failed: {e}"
            ))),
        }
    }

    pub(super) fn set(service: &str, account: &str, hash: &SecretString) -> Result<()> {
        set_generic_password(service, account, hash.expose_secret().as_bytes())
            .map_err(|e| SecretError::KeychainError(format!("keychain write failed: {e}")))
    }

    pub(super) fn delete(service: &str, account: &str) -> Result<()> {
        match delete_generic_password(service, account) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ITEM_NOT_FOUND => Ok(()),
            Err(e) => Err(SecretError::KeychainError(format!(
                "keychain delete failed: {e}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Stub for other platforms
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "macos"))]
mod keychain {
    use super::*;

    pub(super) fn get(_service: &str, _account: &str) -> Result<Option<SecretString>> {
        Ok(None)
    }

    pub(super) fn set(_service: &str, _account: &str, _hash: &SecretString) -> Result<()> {
        Err(SecretError::KeychainError(
            "OS keychain is not supported on this platform".to_string(),
        ))
    }

    pub(super) fn delete(_service: &str, _account: &str) -> Result<()> {
        Ok(())
    }
}

/// Keychain first, then the owner-only file.
///
/// Reads try the keychain and fall through to the file. Writes go to the
/// keychain when it works and to the file otherwise.
pub struct KeychainThenFileStore {
    keychain: Option<KeychainCredentialStore>,
    file: FileCredentialStore,
}

impl KeychainThenFileStore {
    pub fn new(keychain: Option<KeychainCredentialStore>, file: FileCredentialStore) -> Self {
        Self { keychain, file }
    }

    /// The platform default: keychain where supported, `~/.pm_secure_hash` always.
    pub fn default_location() -> Result<Self> {
        let keychain = KeychainCredentialStore::is_supported()
            .then(KeychainCredentialStore::for_current_user);
        Ok(Self::new(keychain, FileCredentialStore::default_location()?))
    }
}

#[async_trait]
impl CredentialStore for KeychainThenFileStore {
    async fn load(&self) -> Result<Option<SecretString>> {
        if let Some(keychain) = &self.keychain {
            match keychain.load().await {
                Ok(Some(hash)) => return Ok(Some(hash)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "keychain unavailable, reading credential file"),
            }
        }
        self.file.load().await
    }

    async fn save(&self, password_hash: &SecretString) -> Result<()> {
        if let Some(keychain) = &self.keychain {
            match keychain.save(password_hash).await {
                Ok(()) => {
                    debug!("credential stored in keychain");
                    // A stale file copy would otherwise win if the keychain item disappears.
                    if let Err(e) = self.file.delete().await {
                        warn!(error = %e, "could not remove old credential file");
                    }
                    return Ok(());
                }
                Err(e) => warn!(error = %e, "keychain write failed, using credential file"),
            }
        }
        self.file.save(password_hash).await
    }

    async fn delete(&self) -> Result<()> {
        if let Some(keychain) = &self.keychain {
            keychain.delete().await?;
        }
        self.file.delete().await
    }
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    hash: Mutex<Option<SecretString>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `password_hash`.
    pub fn with_hash(password_hash: SecretString) -> Self {
        Self {
            hash: Mutex::new(Some(password_hash)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<SecretString>> {
        self.hash.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<SecretString>> {
        Ok(self.lock().clone())
    }

    async fn save(&self, password_hash: &SecretString) -> Result<()> {
        *self.lock() = Some(password_hash.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        *self.lock() = None;
        Ok(())
    }
}

/// The credential store used by the CLI.
pub fn default_credential_store() -> Result<Arc<dyn CredentialStore>> {
    Ok(Arc::new(KeychainThenFileStore::default_location()?))
}
