//! Password authentication and time-boxed sessions.
//!
//! [`AuthSession`] moves between three states:
//!
//! - `NoCredential`: first run. Authenticating runs password setup.
//! - `Unauthenticated`: a credential exists but no session is valid.
//!   Authenticating prompts for the password, up to three attempts.
//! - `Authenticated`: a session exists, carries the stored credential hash,
//!   and `now < expires_at`.
//!
//! Sessions are checked lazily on every call; an expired session, or one
//! whose hash is not the stored credential, is deleted the first time it is
//! seen.

use crate::clock::{Clock, SystemClock};
use crate::credential::{self, CredentialStore};
use crate::error::{Result, SecretError};
use crate::kdf;
use crate::prompt::Prompter;
use crate::session::{FileSessionStore, Session, SessionStore};
use chrono::{DateTime, Duration, Utc};
use promptmgr_core::config::DEFAULT_SESSION_TTL_MINUTES;
use promptmgr_core::{Config, SecretString};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Password attempts per authentication.
pub const MAX_ATTEMPTS: usize = 3;

/// Minimum password length in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Where the authentication state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NoCredential,
    Unauthenticated,
    Authenticated,
}

/// Snapshot of the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub time_remaining_minutes: i64,
    pub access_count: u64,
}

/// Gatekeeper for everything that needs the credential hash.
pub struct AuthSession {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    prompter: Arc<dyn Prompter>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    salt: Vec<u8>,
}

impl AuthSession {
    /// Build with the system clock, the default TTL and this machine's salt.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            credentials,
            sessions,
            prompter,
            clock: Arc::new(SystemClock),
            ttl: Duration::minutes(i64::from(DEFAULT_SESSION_TTL_MINUTES)),
            salt: kdf::local_system_salt(),
        }
    }

    /// Keychain/file credential, temp-dir session file, TTL from `config`.
    pub fn from_config(config: &Config, prompter: Arc<dyn Prompter>) -> Result<Self> {
        let session = Self::new(
            credential::default_credential_store()?,
            Arc::new(FileSessionStore::for_current_user()),
            prompter,
        );
        Ok(session.with_ttl_minutes(config.session_ttl_minutes()))
    }

    pub fn with_ttl_minutes(mut self, minutes: u32) -> Self {
        self.ttl = Duration::minutes(i64::from(minutes));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the credential salt. Tests use a fixed one.
    pub fn with_salt(mut self, salt: impl Into<Vec<u8>>) -> Self {
        self.salt = salt.into();
        self
    }

    pub fn prompter(&self) -> &Arc<dyn Prompter> {
        &self.prompter
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current state. Expired sessions are removed as a side effect.
    pub async fn state(&self) -> Result<AuthState> {
        if self.current_session().await.is_some() {
            return Ok(AuthState::Authenticated);
        }
        if self.credentials.load().await?.is_some() {
            Ok(AuthState::Unauthenticated)
        } else {
            Ok(AuthState::NoCredential)
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current_session().await.is_some()
    }

    /// Make sure a valid session exists, prompting if needed.
    ///
    /// With `force_new` an existing session is ignored and the password is
    /// asked for again.
    pub async fn authenticate(&self, force_new: bool) -> Result<()> {
        self.unlock(force_new).await.map(|_| ())
    }

    /// The credential hash of a valid session, authenticating first if needed.
    pub async fn ensure_authenticated(&self) -> Result<SecretString> {
        self.unlock(false).await
    }

    /// The credential hash of the active session, without prompting.
    pub async fn password_hash(&self) -> Option<SecretString> {
        self.current_session().await.map(|s| s.password_hash)
    }

    /// End the session now.
    pub async fn logout(&self) -> Result<()> {
        self.sessions.clear().await?;
        info!("secure session ended");
        Ok(())
    }

    /// Push the expiry of the active session back by `minutes` (default: one TTL).
    ///
    /// Returns `false` when there is no valid session to extend.
    pub async fn extend_session(&self, minutes: Option<u32>) -> Result<bool> {
        let Some(mut session) = self.current_session().await else {
            return Ok(false);
        };

        let by = minutes
            .map(|m| Duration::minutes(i64::from(m)))
            .unwrap_or(self.ttl);
        session.expires_at += by;
        self.sessions.save(&session).await?;
        info!(expires_at = %session.expires_at, "secure session extended");
        Ok(true)
    }

    /// Details of the active session, if any.
    pub async fn session_info(&self) -> Option<SessionInfo> {
        let session = self.current_session().await?;
        let now = self.clock.now();
        Some(SessionInfo {
            created_at: session.created_at,
            expires_at: session.expires_at,
            time_remaining_minutes: session.remaining(now).num_minutes(),
            access_count: session.access_count,
        })
    }

    /// Replace the password. Requires a valid session and the current password.
    ///
    /// Returns `(old_hash, new_hash)` so callers can re-encrypt their data.
    pub async fn change_password(&self) -> Result<(SecretString, SecretString)> {
        let Some(session) = self.current_session().await else {
            return Err(SecretError::AuthenticationFailed(
                "no active session".to_string(),
            ));
        };
        let old_hash = session.password_hash;

        self.verify_password(&old_hash, "Current password: ").await?;

        let new_hash = self.choose_password("New password: ").await?;
        self.credentials.save(&new_hash).await?;
        self.start_session(new_hash.clone()).await?;

        info!("credential replaced");
        self.prompter.message("Password changed");
        Ok((old_hash, new_hash))
    }

    /// Put `password_hash` back as the credential and start a session with it.
    pub(crate) async fn reinstate(&self, password_hash: SecretString) -> Result<()> {
        self.credentials.save(&password_hash).await?;
        self.start_session(password_hash).await
    }

    async fn unlock(&self, force_new: bool) -> Result<SecretString> {
        if !force_new {
            if let Some(mut session) = self.current_session().await {
                session.access_count += 1;
                if let Err(e) = self.sessions.save(&session).await {
                    warn!(error = %e, "could not record session access");
                }
                return Ok(session.password_hash);
            }
        }

        match self.credentials.load().await? {
            Some(stored) => self.login(&stored).await,
            None => self.setup().await,
        }
    }

    /// First-time setup: choose a password and store its hash.
    async fn setup(&self) -> Result<SecretString> {
        self.prompter.message("Set up a password to protect secure variables");

        let hash = self.choose_password("Enter new password: ").await?;
        self.credentials.save(&hash).await?;
        self.start_session(hash.clone()).await?;

        info!("secure variables protection enabled");
        self.prompter.message("Secure variables protection enabled");
        Ok(hash)
    }

    async fn login(&self, stored: &SecretString) -> Result<SecretString> {
        let hash = self.verify_password(stored, "Enter password: ").await?;
        self.start_session(hash.clone()).await?;
        self.prompter.message("Authentication successful");
        Ok(hash)
    }

    /// Prompt until the entered password hashes to `stored`.
    async fn verify_password(&self, stored: &SecretString, prompt: &str) -> Result<SecretString> {
        for attempt in 1..=MAX_ATTEMPTS {
            let password = self.read_password(prompt)?;
            if !password.is_empty() {
                let hash = kdf::hash_password(&password, &self.salt);
                if &hash == stored {
                    debug!(attempt, "password accepted");
                    return Ok(hash);
                }
            }

            let remaining = MAX_ATTEMPTS - attempt;
            warn!(attempt, "invalid password");
            if remaining > 0 {
                self.prompter
                    .message(&format!("Invalid password ({remaining} attempts remaining)"));
            }
        }

        self.prompter.message("Authentication failed - too many attempts");
        Err(SecretError::AuthenticationFailed(
            "too many failed attempts".to_string(),
        ))
    }

    /// Prompt for a new password plus confirmation. Rejected entries use up attempts.
    async fn choose_password(&self, prompt: &str) -> Result<SecretString> {
        for _ in 0..MAX_ATTEMPTS {
            let password = self.read_password(prompt)?;
            let confirm = self.read_password("Confirm password: ")?;

            if password != confirm {
                self.prompter.message("Passwords don't match");
                continue;
            }
            if password.char_count() < MIN_PASSWORD_LENGTH {
                self.prompter.message(&format!(
                    "Password must be at least {MIN_PASSWORD_LENGTH} characters"
                ));
                continue;
            }

            return Ok(kdf::hash_password(&password, &self.salt));
        }

        Err(SecretError::AuthenticationFailed(
            "password setup failed".to_string(),
        ))
    }

    fn read_password(&self, prompt: &str) -> Result<SecretString> {
        self.prompter
            .read_password(prompt)
            .map_err(|e| SecretError::AuthenticationFailed(format!("password entry aborted: {e}")))
    }

    async fn start_session(&self, password_hash: SecretString) -> Result<()> {
        let session = Session::start(password_hash, self.clock.now(), self.ttl);
        self.sessions.save(&session).await?;
        info!(expires_at = %session.expires_at, "secure session started");
        Ok(())
    }

    /// The stored session if it is still valid and belongs to the current
    /// credential. Anything else reads as none.
    async fn current_session(&self) -> Option<Session> {
        let session = match self.sessions.load().await {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "could not read session, treating as locked");
                return None;
            }
        };

        if !session.is_valid_at(self.clock.now()) {
            debug!(expired_at = %session.expires_at, "secure session expired");
            self.drop_session("expired").await;
            return None;
        }

        match self.credentials.load().await {
            Ok(Some(stored)) if stored == session.password_hash => Some(session),
            Ok(_) => {
                warn!("session does not match the stored credential");
                self.drop_session("foreign").await;
                None
            }
            Err(e) => {
                warn!(error = %e, "could not read credential, treating as locked");
                None
            }
        }
    }

    async fn drop_session(&self, kind: &str) {
        if let Err(e) = self.sessions.clear().await {
            warn!(error = %e, kind, "could not remove session");
        }
    }
}
