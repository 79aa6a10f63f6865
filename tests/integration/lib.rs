//! Shared harness for the integration tests.
//!
//! [`TestEnv`] lays out the credential file, session file, and secure store
//! inside one temp directory, so several store instances can share state the
//! way separate `pm` invocations do.

use chrono::{DateTime, Utc};
use promptmgr_secrets::{
    AuthSession, Cipher, Clock, FileCredentialStore, FileSessionStore, ManualClock,
    ScriptedPrompter, SecureVariableStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Salt used instead of the machine's `user_host` salt.
pub const TEST_SALT: &[u8] = b"integration_testhost";

/// Session lifetime used by the harness, in minutes.
pub const TEST_TTL_MINUTES: u32 = 60;

pub struct TestEnv {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
            clock: Arc::new(ManualClock::new(start)),
        }
    }

    pub fn credential_path(&self) -> PathBuf {
        self.dir.path().join(".pm_secure_hash")
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.path().join("session").join("session.json")
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.path().join("prompts_secure.json")
    }

    /// A fresh auth session over the shared files, answering from `prompter`.
    pub fn auth(&self, prompter: Arc<ScriptedPrompter>) -> AuthSession {
        let clock: Arc<dyn Clock> = self.clock.clone();
        AuthSession::new(
            Arc::new(FileCredentialStore::new(self.credential_path())),
            Arc::new(FileSessionStore::new(self.session_path())),
            prompter,
        )
        .with_clock(clock)
        .with_salt(TEST_SALT)
        .with_ttl_minutes(TEST_TTL_MINUTES)
    }

    /// A fresh store instance over the shared files, like a new process.
    pub fn store(&self, prompter: Arc<ScriptedPrompter>) -> SecureVariableStore {
        SecureVariableStore::new(self.store_path(), self.auth(prompter), Cipher::probe())
    }

    /// Store plus the prompter feeding it `passwords`.
    pub fn store_with_passwords(
        &self,
        passwords: &[&str],
    ) -> (SecureVariableStore, Arc<ScriptedPrompter>) {
        let prompter = Arc::new(ScriptedPrompter::new().with_passwords(passwords.iter().copied()));
        (self.store(prompter.clone()), prompter)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
