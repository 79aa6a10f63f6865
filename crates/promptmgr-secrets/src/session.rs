//! Persisted unlock state.
//!
//! A [`Session`] is a time-boxed copy of the credential hash. Stores are
//! fail-closed: anything that does not parse is deleted and treated as no
//! session at all.

use crate::error::Result;
use crate::files;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use promptmgr_core::{identity, paths, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// An unlocked session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub password_hash: SecretString,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
}

impl Session {
    /// Start a session at `now` lasting `ttl`.
    pub fn start(password_hash: SecretString, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            password_hash,
            created_at: now,
            expires_at: now + ttl,
            access_count: 0,
        }
    }

    /// Valid strictly before `expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Time left at `now`, clamped to zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Where sessions live between invocations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the stored session, if any. Unparsable data is discarded.
    async fn load(&self) -> Result<Option<Session>>;

    /// Replace the stored session.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Remove the stored session. Succeeds when there is none.
    async fn clear(&self) -> Result<()>;
}

/// JSON session file, mode 0600, inside an owner-only directory.
///
/// A file that is not a regular file, is readable or writable by anyone but
/// the owner, or sits in a directory others can write to is discarded on load.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The session file for the current OS user.
    pub fn for_current_user() -> Self {
        Self::new(paths::session_file(&identity::username()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn discard(&self, reason: &str) -> Result<Option<Session>> {
        warn!(path = %self.path.display(), reason, "discarding session file");
        files::remove_if_exists(&self.path).await?;
        Ok(None)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<Session>> {
        let meta = match tokio::fs::symlink_metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !meta.file_type().is_file() {
            return self.discard("not a regular file").await;
        }
        match untrusted(&self.path, &meta).await? {
            Some(Untrusted::SharedDirectory) => {
                warn!(path = %self.path.display(), "session directory is writable by others, ignoring session");
                return Ok(None);
            }
            Some(Untrusted::LooseFile) => {
                return self.discard("file is not private to its owner").await;
            }
            None => {}
        }

        let Some(data) = files::read_optional_bytes(&self.path).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<Session>(&data) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                debug!(error = %e, "session file does not parse");
                self.discard("unreadable session").await
            }
        }
    }

    async fn save(&self, session: &Session) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                paths::ensure_private_dir(dir)?;
            }
        }

        let json = serde_json::to_vec(session)?;
        files::write_private_file(&self.path, &json).await?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        files::remove_if_exists(&self.path).await?;
        Ok(())
    }
}

/// Why a session file on disk cannot be trusted.
#[cfg_attr(not(unix), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Untrusted {
    /// Others can create or replace files next to it.
    SharedDirectory,
    /// Group/other permission bits set, or a different owner than its directory.
    LooseFile,
}

#[cfg(unix)]
async fn untrusted(path: &Path, meta: &std::fs::Metadata) -> Result<Option<Untrusted>> {
    use std::os::unix::fs::MetadataExt;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let dir_meta = tokio::fs::metadata(dir).await?;
    if dir_meta.mode() & 0o022 != 0 {
        return Ok(Some(Untrusted::SharedDirectory));
    }
    if meta.mode() & 0o077 != 0 || meta.uid() != dir_meta.uid() {
        return Ok(Some(Untrusted::LooseFile));
    }
    Ok(None)
}

#[cfg(not(unix))]
async fn untrusted(_path: &Path, _meta: &std::fs::Metadata) -> Result<Option<Untrusted>> {
    Ok(None)
}

/// In-process session store.
///
/// Keeps the serialized form so tests can plant corrupted data.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    raw: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored bytes verbatim.
    pub fn set_raw(&self, raw: impl Into<String>) {
        *self.lock() = Some(raw.into());
    }

    /// Whether anything is stored, parsable or not.
    pub fn is_present(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.raw.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<Session>> {
        let mut raw = self.lock();
        let Some(data) = raw.as_deref() else {
            return Ok(None);
        };

        match serde_json::from_str::<Session>(data) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "discarding unreadable session");
                *raw = None;
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &Session) -> Result<()> {
        *self.lock() = Some(serde_json::to_string(session)?);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A temp dir that only the owner can write to, whatever the umask.
    fn private_tmp() -> TempDir {
        let tmp = TempDir::new().unwrap();
        paths::ensure_private_dir(tmp.path()).unwrap();
        tmp
    }

    fn sample(now: DateTime<Utc>) -> Session {
        Session::start(SecretString::new("abc123"), now, Duration::minutes(60))
    }

    #[test]
    fn test_session_validity_boundary() {
        let t0 = Utc::now();
        let session = sample(t0);

        assert!(session.is_valid_at(t0));
        assert!(session.is_valid_at(t0 + Duration::minutes(60) - Duration::seconds(1)));
        assert!(!session.is_valid_at(t0 + Duration::minutes(60)));
        assert!(!session.is_valid_at(t0 + Duration::minutes(61)));
    }

    #[test]
    fn test_remaining_clamps_to_zero() {
        let t0 = Utc::now();
        let session = sample(t0);
        assert_eq!(session.remaining(t0 + Duration::minutes(15)), Duration::minutes(45));
        assert_eq!(session.remaining(t0 + Duration::hours(3)), Duration::zero());
    }

    #[test]
    fn test_session_json_shape() {
        let session = sample(Utc::now());
        let value = serde_json::to_value(&session).unwrap();

        assert_eq!(value["password_hash"], "abc123");
        assert!(value["created_at"].is_string());
        assert!(value["expires_at"].is_string());
        assert_eq!(value["access_count"], 0);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip_and_clear() {
        let tmp = private_tmp();
        let store = FileSessionStore::new(tmp.path().join(".pm_secure_session-test"));

        assert!(store.load().await.unwrap().is_none());

        let session = sample(Utc::now());
        store.save(&session).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.password_hash, session.password_hash);
        assert_eq!(loaded.expires_at, session.expires_at);

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_discards_corrupt_file() {
        let tmp = private_tmp();
        let path = tmp.path().join(".pm_secure_session-test");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileSessionStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[cfg(unix)]
    fn chmod(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_discards_non_utf8_file() {
        let tmp = private_tmp();
        let path = tmp.path().join("session.json");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x7b]).unwrap();
        chmod(&path, 0o600);

        let store = FileSessionStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = private_tmp();
        let store = FileSessionStore::new(tmp.path().join("pm_secure").join("session.json"));
        store.save(&sample(Utc::now())).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let dir = store.path().parent().unwrap();
        let dir_mode = std::fs::metadata(dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_rejects_group_readable_session() {
        let tmp = private_tmp();
        let path = tmp.path().join("session.json");
        let planted = serde_json::to_string(&sample(Utc::now())).unwrap();
        std::fs::write(&path, planted).unwrap();
        chmod(&path, 0o644);

        let store = FileSessionStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_ignores_session_in_shared_directory() {
        let tmp = private_tmp();
        let dir = tmp.path().join("shared");
        std::fs::create_dir(&dir).unwrap();
        let path = dir.join("session.json");
        std::fs::write(&path, serde_json::to_string(&sample(Utc::now())).unwrap()).unwrap();
        chmod(&path, 0o600);
        chmod(&dir, 0o777);

        let store = FileSessionStore::new(&path);
        assert!(store.load().await.unwrap().is_none());

        // Saving tightens the directory again before anything is written.
        store.save(&sample(Utc::now())).await.unwrap();
        assert!(store.load().await.unwrap().is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_discards_symlinked_session() {
        let tmp = private_tmp();
        let target = tmp.path().join("elsewhere.json");
        std::fs::write(&target, serde_json::to_string(&sample(Utc::now())).unwrap()).unwrap();
        chmod(&target, 0o600);
        let path = tmp.path().join("session.json");
        std::os::unix::fs::symlink(&target, &path).unwrap();

        let store = FileSessionStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
        assert!(std::fs::symlink_metadata(&path).is_err());
        assert!(target.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_save_does_not_write_through_symlink() {
        let tmp = private_tmp();
        let target = tmp.path().join("collector");
        std::fs::write(&target, "").unwrap();
        let path = tmp.path().join("session.json");
        std::os::unix::fs::symlink(&target, &path).unwrap();

        let store = FileSessionStore::new(&path);
        store.save(&sample(Utc::now())).await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "");
        assert!(std::fs::symlink_metadata(&path).unwrap().file_type().is_file());
    }

    #[tokio::test]
    async fn test_memory_store_discards_corrupt_data() {
        let store = MemorySessionStore::new();
        store.set_raw("garbage");

        assert!(store.load().await.unwrap().is_none());
        assert!(!store.is_present());
    }
}
