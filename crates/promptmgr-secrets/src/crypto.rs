//! Symmetric encryption of individual secure-variable fields.
//!
//! Every blob is base64 of a one-byte algorithm tag followed by the
//! algorithm's payload:
//!
//! ```text
//! 0x01 | salt(16) | iv(16) | AES-256-CBC ciphertext (PKCS7)
//! 0x02 | salt(16) | XOR-ed bytes
//! ```
//!
//! The tag makes blobs self-describing, so decryption never depends on which
//! backend the current process happens to have. The per-blob key is derived
//! from the credential hash and the blob's salt (see [`crate::kdf`]).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::Result;
use crate::kdf::{self, SALT_SIZE};
use crate::types::{DecryptedMetadata, SecureVariableRecord};

const IV_SIZE: usize = 16;
const TAG_SIZE: usize = 1;

/// Shown in place of values that were not explicitly requested.
pub const VALUE_PLACEHOLDER: &str = "•••••••••••••••";

/// Shown when a description cannot be decrypted with the session's hash.
pub const UNDECRYPTABLE_DESCRIPTION: &str = "[ENCRYPTED - CANNOT DECRYPT]";

/// Shown when a stored default cannot be decrypted.
pub const UNDECRYPTABLE_DEFAULT: &str = "[ENCRYPTED]";

const SELF_TEST_PLAINTEXT: &str = "test_encryption_capability";
const SELF_TEST_HASH: &str = "test_password_hash";

/// Which cipher produced (or will produce) a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherAlgorithm {
    /// AES-256-CBC with PKCS7 padding.
    Aes256Cbc,
    /// Keyed XOR stream. No integrity and a repeating 32-byte keystream;
    /// a wrong key can decrypt to garbage text instead of failing.
    XorFallback,
}

impl CipherAlgorithm {
    /// Leading byte of blobs produced by this algorithm.
    pub fn tag(self) -> u8 {
        match self {
            CipherAlgorithm::Aes256Cbc => 0x01,
            CipherAlgorithm::XorFallback => 0x02,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(CipherAlgorithm::Aes256Cbc),
            0x02 => Some(CipherAlgorithm::XorFallback),
            _ => None,
        }
    }

    pub fn is_reduced_security(self) -> bool {
        matches!(self, CipherAlgorithm::XorFallback)
    }

    /// Human-readable capability message.
    pub fn description(self) -> &'static str {
        match self {
            CipherAlgorithm::Aes256Cbc => "AES-256 encryption available",
            CipherAlgorithm::XorFallback => "Fallback encryption available (less secure)",
        }
    }
}

/// Result of the encryption self-test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityReport {
    pub ok: bool,
    pub algorithm: CipherAlgorithm,
    pub message: String,
}

impl CapabilityReport {
    /// True when secrets would be written with the weaker fallback cipher.
    pub fn is_degraded(&self) -> bool {
        self.ok && self.algorithm.is_reduced_security()
    }
}

/// Field cipher bound to one encryption algorithm.
///
/// The algorithm only governs `encrypt`; `decrypt` follows each blob's tag.
#[derive(Debug, Clone, Copy)]
pub struct Cipher {
    algorithm: CipherAlgorithm,
}

impl Cipher {
    pub fn new(algorithm: CipherAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Pick AES when its backend is present and passes a self-test,
    /// otherwise the XOR fallback.
    pub fn probe() -> Self {
        if aes_available() {
            Self::new(CipherAlgorithm::Aes256Cbc)
        } else {
            warn!("AES backend unavailable; secure variables will use the reduced-security fallback cipher");
            Self::new(CipherAlgorithm::XorFallback)
        }
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Encrypt `plaintext` under a key derived from `password_hash`.
    ///
    /// A fresh salt (and IV) is drawn for every call, so encrypting the same
    /// plaintext twice yields different blobs.
    pub fn encrypt(&self, plaintext: &str, password_hash: &str) -> Result<String> {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);

        let payload = match self.algorithm {
            CipherAlgorithm::Aes256Cbc => {
                let mut iv = [0u8; IV_SIZE];
                rand::thread_rng().fill_bytes(&mut iv);

                let key = kdf::derive_key(password_hash, &salt);
                let ciphertext = aes_cbc::encrypt(&key[..], &iv, plaintext.as_bytes())?;

                let mut payload = Vec::with_capacity(SALT_SIZE + IV_SIZE + ciphertext.len());
                payload.extend_from_slice(&salt);
                payload.extend_from_slice(&iv);
                payload.extend_from_slice(&ciphertext);
                payload
            }
            CipherAlgorithm::XorFallback => {
                let mut payload = Vec::with_capacity(SALT_SIZE + plaintext.len());
                payload.extend_from_slice(&salt);
                payload.extend(xor_keystream(password_hash, &salt, plaintext.as_bytes()));
                payload
            }
        };

        let mut blob = Vec::with_capacity(TAG_SIZE + payload.len());
        blob.push(self.algorithm.tag());
        blob.extend_from_slice(&payload);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a blob produced by [`Cipher::encrypt`].
    ///
    /// Returns `None` for every failure: bad base64, truncated blob, unknown
    /// tag, wrong key, bad padding, or non-UTF-8 output. Callers cannot tell
    /// these apart.
    pub fn decrypt(&self, blob: &str, password_hash: &str) -> Option<String> {
        let data = Zeroizing::new(BASE64.decode(blob.trim()).ok()?);
        let (&tag, payload) = data.split_first()?;

        let plaintext = match CipherAlgorithm::from_tag(tag)? {
            CipherAlgorithm::Aes256Cbc => {
                if payload.len() < SALT_SIZE + IV_SIZE {
                    return None;
                }
                let (salt, rest) = payload.split_at(SALT_SIZE);
                let (iv, ciphertext) = rest.split_at(IV_SIZE);

                let key = kdf::derive_key(password_hash, salt);
                aes_cbc::decrypt(&key[..], iv, ciphertext)?
            }
            CipherAlgorithm::XorFallback => {
                if payload.len() < SALT_SIZE {
                    return None;
                }
                let (salt, xored) = payload.split_at(SALT_SIZE);
                xor_keystream(password_hash, salt, xored)
            }
        };

        match String::from_utf8(plaintext) {
            Ok(text) => Some(text),
            Err(e) => {
                // Wipe the rejected bytes before dropping them.
                let _ = Zeroizing::new(e.into_bytes());
                None
            }
        }
    }

    /// Decrypt the description and default of `record` for display.
    ///
    /// Undecryptable fields become marker strings rather than errors.
    pub fn decrypt_metadata(
        &self,
        record: &SecureVariableRecord,
        password_hash: &str,
    ) -> DecryptedMetadata {
        let description = self
            .decrypt(&record.encrypted_description, password_hash)
            .unwrap_or_else(|| UNDECRYPTABLE_DESCRIPTION.to_string());

        let default_value = record.encrypted_default.as_ref().map(|blob| {
            self.decrypt(blob, password_hash)
                .unwrap_or_else(|| UNDECRYPTABLE_DEFAULT.to_string())
        });

        DecryptedMetadata {
            description,
            default_value,
        }
    }

    /// Round-trip fixed test data through this cipher and report the result.
    pub fn verify_capability(&self) -> CapabilityReport {
        let outcome = self
            .encrypt(SELF_TEST_PLAINTEXT, SELF_TEST_HASH)
            .map(|blob| self.decrypt(&blob, SELF_TEST_HASH));

        let (ok, message) = match outcome {
            Ok(Some(text)) if text == SELF_TEST_PLAINTEXT => {
                (true, self.algorithm.description().to_string())
            }
            Ok(_) => (false, "Encryption test failed".to_string()),
            Err(e) => (false, format!("Encryption error: {e}")),
        };

        debug!(algorithm = ?self.algorithm, ok, "encryption self-test");
        CapabilityReport {
            ok,
            algorithm: self.algorithm,
            message,
        }
    }
}

impl Default for Cipher {
    fn default() -> Self {
        Self::probe()
    }
}

/// Probe the best available cipher and run its self-test.
pub fn verify_encryption_capability() -> CapabilityReport {
    Cipher::probe().verify_capability()
}

/// The mask shown instead of a secret value.
pub fn placeholder() -> &'static str {
    VALUE_PLACEHOLDER
}

/// Whether the AES backend is compiled in and round-trips correctly.
pub fn aes_available() -> bool {
    aes_cbc::self_test()
}

/// XOR `data` with SHA-256(password_hash || hex(salt)), repeating the digest.
fn xor_keystream(password_hash: &str, salt: &[u8], data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(password_hash.as_bytes());
    hasher.update(hex::encode(salt).as_bytes());
    let key = Zeroizing::new(hasher.finalize().to_vec());

    data.iter()
        .enumerate()
        .map(|(i, byte)| byte ^ key[i % key.len()])
        .collect()
}

#[cfg(feature = "aes")]
mod aes_cbc {
    use aes::cipher::block_padding::Pkcs7;
    use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

    use crate::error::{Result, SecretError};

    type Encryptor = cbc::Encryptor<aes::Aes256>;
    type Decryptor = cbc::Decryptor<aes::Aes256>;

    const BLOCK_SIZE: usize = 16;

    pub(super) fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let encryptor = Encryptor::new_from_slices(key, iv)
            .map_err(|e| SecretError::EncryptionFailed(e.to_string()))?;
        Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    pub(super) fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return None;
        }
        let decryptor = Decryptor::new_from_slices(key, iv).ok()?;
        decryptor.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).ok()
    }

    pub(super) fn self_test() -> bool {
        let key = [0x42u8; 32];
        let iv = [0x24u8; BLOCK_SIZE];
        let plaintext = b"aes self test";

        encrypt(&key, &iv, plaintext)
            .ok()
            .and_then(|ct| decrypt(&key, &iv, &ct))
            .map_or(false, |pt| pt == plaintext)
    }
}

#[cfg(not(feature = "aes"))]
mod aes_cbc {
    use crate::error::{Result, SecretError};

    pub(super) fn encrypt(_key: &[u8], _iv: &[u8], _plaintext: &[u8]) -> Result<Vec<u8>> {
        Err(SecretError::EncryptionFailed(
            "AES backend not compiled in (enable the `aes` feature)".to_string(),
        ))
    }

    pub(super) fn decrypt(_key: &[u8], _iv: &[u8], _ciphertext: &[u8]) -> Option<Vec<u8>> {
        None
    }

    pub(super) fn self_test() -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const HASH_A: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c4b5a69788796a5b4c3d2e1f0";
    const HASH_B: &str = "ffeeddccbbaa99887766554433221100ffeeddccbbaa99887766554433221100";

    fn ciphers() -> Vec<Cipher> {
        let mut ciphers = vec![Cipher::new(CipherAlgorithm::XorFallback)];
        if aes_available() {
            ciphers.push(Cipher::new(CipherAlgorithm::Aes256Cbc));
        }
        ciphers
    }

    #[test]
    fn test_round_trip_ascii_and_unicode() {
        let long = "x".repeat(1000);
        let samples: [&str; 6] = [
            "",
            "sk-12345",
            "This is a secret API key: abc123xyz789",
            "exactly sixteen!",
            "päss wörd — 秘密 🔑",
            long.as_str(),
        ];

        for cipher in ciphers() {
            for sample in samples {
                let blob = cipher.encrypt(sample, HASH_A).unwrap();
                assert_eq!(
                    cipher.decrypt(&blob, HASH_A).as_deref(),
                    Some(sample),
                    "{:?} round trip failed",
                    cipher.algorithm()
                );
            }
        }
    }

    #[cfg(feature = "aes")]
    #[test]
    fn test_aes_wrong_key_returns_none() {
        let cipher = Cipher::new(CipherAlgorithm::Aes256Cbc);
        for sample in ["sk-12345", "a longer value spanning several AES blocks"] {
            let blob = cipher.encrypt(sample, HASH_A).unwrap();
            assert_eq!(cipher.decrypt(&blob, HASH_B), None);
        }
    }

    #[test]
    fn test_encryption_is_not_deterministic() {
        for cipher in ciphers() {
            let a = cipher.encrypt("same plaintext", HASH_A).unwrap();
            let b = cipher.encrypt("same plaintext", HASH_A).unwrap();
            assert_ne!(a, b);
        }
    }

    #[cfg(feature = "aes")]
    #[test]
    fn test_aes_blob_layout() {
        let cipher = Cipher::new(CipherAlgorithm::Aes256Cbc);
        let blob = cipher.encrypt("sk-12345", HASH_A).unwrap();
        let raw = BASE64.decode(blob).unwrap();

        assert_eq!(raw[0], CipherAlgorithm::Aes256Cbc.tag());
        // tag + salt + iv + one padded block
        assert_eq!(raw.len(), TAG_SIZE + SALT_SIZE + IV_SIZE + 16);
    }

    #[test]
    fn test_fallback_blob_layout() {
        let cipher = Cipher::new(CipherAlgorithm::XorFallback);
        let blob = cipher.encrypt("sk-12345", HASH_A).unwrap();
        let raw = BASE64.decode(blob).unwrap();

        assert_eq!(raw[0], CipherAlgorithm::XorFallback.tag());
        assert_eq!(raw.len(), TAG_SIZE + SALT_SIZE + "sk-12345".len());
    }

    #[cfg(feature = "aes")]
    #[test]
    fn test_decrypt_follows_blob_tag_not_cipher_setting() {
        let aes = Cipher::new(CipherAlgorithm::Aes256Cbc);
        let xor = Cipher::new(CipherAlgorithm::XorFallback);

        let from_xor = xor.encrypt("legacy", HASH_A).unwrap();
        let from_aes = aes.encrypt("modern", HASH_A).unwrap();

        assert_eq!(aes.decrypt(&from_xor, HASH_A).as_deref(), Some("legacy"));
        assert_eq!(xor.decrypt(&from_aes, HASH_A).as_deref(), Some("modern"));
    }

    #[test]
    fn test_malformed_blobs_return_none() {
        let cipher = Cipher::probe();
        let too_short = BASE64.encode([CipherAlgorithm::Aes256Cbc.tag(), 1, 2, 3]);
        let unknown_tag = BASE64.encode([0x7fu8; 64]);
        let unaligned = {
            let mut raw = vec![CipherAlgorithm::Aes256Cbc.tag()];
            raw.extend_from_slice(&[0u8; SALT_SIZE + IV_SIZE + 15]);
            BASE64.encode(raw)
        };

        let blobs: [&str; 5] = [
            "",
            "not base64!!",
            too_short.as_str(),
            unknown_tag.as_str(),
            unaligned.as_str(),
        ];
        for blob in blobs {
            assert_eq!(cipher.decrypt(blob, HASH_A), None, "blob {:?}", blob);
        }
    }

    #[cfg(feature = "aes")]
    #[test]
    fn test_tampered_aes_ciphertext_does_not_yield_plaintext() {
        let cipher = Cipher::new(CipherAlgorithm::Aes256Cbc);
        let blob = cipher.encrypt("important secret", HASH_A).unwrap();
        let mut raw = BASE64.decode(blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;

        let tampered = BASE64.encode(raw);
        assert_ne!(
            cipher.decrypt(&tampered, HASH_A).as_deref(),
            Some("important secret")
        );
    }

    #[test]
    fn test_capability_report() {
        let report = verify_encryption_capability();
        assert!(report.ok);
        if aes_available() {
            assert_eq!(report.algorithm, CipherAlgorithm::Aes256Cbc);
            assert_eq!(report.message, "AES-256 encryption available");
            assert!(!report.is_degraded());
        }

        let fallback = Cipher::new(CipherAlgorithm::XorFallback).verify_capability();
        assert!(fallback.ok);
        assert!(fallback.is_degraded());
        assert_eq!(fallback.message, "Fallback encryption available (less secure)");
    }

    #[test]
    fn test_decrypt_metadata_markers() {
        let cipher = Cipher::probe();
        let record = SecureVariableRecord {
            encrypted_value: cipher.encrypt("v", HASH_A).unwrap(),
            encrypted_description: cipher.encrypt("API key for X", HASH_A).unwrap(),
            encrypted_default: Some(cipher.encrypt("default", HASH_A).unwrap()),
            is_secure: true,
            created_at: Utc::now(),
            used_count: 0,
            last_accessed: None,
            last_modified: None,
        };

        let meta = cipher.decrypt_metadata(&record, HASH_A);
        assert_eq!(meta.description, "API key for X");
        assert_eq!(meta.default_value.as_deref(), Some("default"));

        let wrong = cipher.decrypt_metadata(&record, HASH_B);
        assert_eq!(wrong.description, UNDECRYPTABLE_DESCRIPTION);
        assert_eq!(wrong.default_value.as_deref(), Some(UNDECRYPTABLE_DEFAULT));
    }

    #[test]
    fn test_tags_round_trip() {
        for alg in [CipherAlgorithm::Aes256Cbc, CipherAlgorithm::XorFallback] {
            assert_eq!(CipherAlgorithm::from_tag(alg.tag()), Some(alg));
        }
        assert_eq!(CipherAlgorithm::from_tag(0), None);
    }
}
