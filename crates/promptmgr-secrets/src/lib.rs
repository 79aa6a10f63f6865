//! Password-gated, encrypted-at-rest secure variables for promptmgr.
//!
//! Each value, description, and default is encrypted with AES-256-CBC (or a
//! reduced-security XOR fallback) under a key derived from the user's
//! credential hash. Access goes through a time-boxed [`AuthSession`] and is
//! recorded in an [`AuditLog`].

pub mod audit;
pub mod auth;
pub mod clock;
pub mod credential;
pub mod crypto;
pub mod error;
mod files;
pub mod kdf;
pub mod prompt;
pub mod resolve;
pub mod session;
pub mod store;
pub mod types;

pub use audit::{AuditAction, AuditEvent, AuditLog};
pub use auth::{AuthSession, AuthState, SessionInfo};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{
    CredentialStore, FileCredentialStore, KeychainCredentialStore, KeychainThenFileStore,
    MemoryCredentialStore,
};
pub use crypto::{verify_encryption_capability, CapabilityReport, Cipher, CipherAlgorithm};
pub use error::{Result, SecretError};
pub use prompt::{Prompter, ScriptedPrompter};
pub use resolve::{api_key_for_provider, VariableResolver, VariableSource};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
pub use store::SecureVariableStore;
pub use types::{
    DecryptedMetadata, DecryptedSecret, FieldUpdate, RotationReport, SecureVariableRecord,
    VariableSummary, VariableUpdate,
};
