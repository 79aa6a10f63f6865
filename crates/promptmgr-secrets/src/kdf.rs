//! PBKDF2-HMAC-SHA256 key derivation.
//!
//! Two stages share the same primitive:
//!
//! 1. raw password + system salt -> credential hash (hex, stored)
//! 2. credential hash + per-blob random salt -> AES-256 key (never stored)

use pbkdf2::pbkdf2_hmac;
use promptmgr_core::{identity, SecretString};
use sha2::Sha256;
use zeroize::Zeroizing;

/// PBKDF2 rounds for both derivation stages.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derived key length in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Per-blob random salt length in bytes.
pub const SALT_SIZE: usize = 16;

fn pbkdf2_sha256(input: &[u8], salt: &[u8], rounds: u32) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2_hmac::<Sha256>(input, salt, rounds, &mut out[..]);
    out
}

/// Derive the per-blob encryption key from the credential hash and a salt.
///
/// Deterministic for the same inputs. The returned key is wiped on drop.
pub fn derive_key(password_hash: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    pbkdf2_sha256(password_hash.as_bytes(), salt, PBKDF2_ITERATIONS)
}

/// Build the credential salt from the OS username and hostname.
///
/// This is not random and not secret: anyone who knows both values can
/// precompute guesses. Existing credentials depend on this exact format.
pub fn system_salt(user: &str, host: &str) -> Vec<u8> {
    format!("{}_{}", user, host).into_bytes()
}

/// The credential salt for the current user on this machine.
pub fn local_system_salt() -> Vec<u8> {
    system_salt(&identity::username(), &identity::hostname())
}

/// Hash a raw password into the hex credential stored in the keychain.
pub fn hash_password(password: &SecretString, salt: &[u8]) -> SecretString {
    let digest = pbkdf2_sha256(password.expose_secret().as_bytes(), salt, PBKDF2_ITERATIONS);
    SecretString::new(hex::encode(&digest[..]))
}
