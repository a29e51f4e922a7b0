//! Cryptography for provider credentials at rest.
//!
//! Secrets are encrypted with AES-256-GCM and stored as
//! `enc:v1:NONCE:CIPHERTEXT` (both parts base64). The cipher key is derived
//! from the configured passphrase with PBKDF2-HMAC-SHA256; a passphrase that
//! is already a 32-byte hex string is used as the key directly. Without a
//! passphrase the cipher is disabled and secrets are stored as plaintext,
//! which `Config::from_env` only permits in dev mode.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

/// Prefix marking an encrypted secret.
const ENCRYPTED_PREFIX: &str = "enc:v1:";

/// Nonce length in bytes (96 bits for AES-GCM).
const NONCE_LENGTH: usize = 12;

/// Key length in bytes (256 bits for AES-256).
const KEY_LENGTH: usize = 32;

/// PBKDF2 iteration count for passphrase-derived keys.
const PBKDF2_ROUNDS: u32 = 100_000;

/// Application salt for passphrase derivation.
const KDF_SALT: &[u8] = b"banana-studio.keystore.v1";

/// Errors from protecting or revealing a stored secret.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid encrypted format: {0}")]
    InvalidFormat(String),

    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Cipher key not available")]
    KeyNotAvailable,
}

/// AES-256-GCM cipher over stored credentials.
///
/// Holds the derived key for the process lifetime; construct once and share.
pub struct SecretCipher {
    key: Option<[u8; KEY_LENGTH]>,
}

impl SecretCipher {
    /// Build a cipher from the configured passphrase.
    ///
    /// `None` (or an empty passphrase) disables encryption; secrets then
    /// round-trip as plaintext and a warning is logged once here.
    pub fn from_passphrase(passphrase: Option<&str>) -> Self {
        let key = passphrase
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(derive_key);
        if key.is_none() {
            warn!("No secret key configured; credentials will be stored as plaintext");
        }
        Self { key }
    }

    /// Whether encryption is active.
    pub fn is_available(&self) -> bool {
        self.key.is_some()
    }

    /// Encrypt a secret for storage.
    ///
    /// Already-wrapped values are returned unchanged, and a disabled cipher
    /// passes the plaintext through.
    pub fn protect(&self, secret: &str) -> Result<String, CryptoError> {
        if is_protected(secret) {
            return Ok(secret.to_string());
        }
        let key = match &self.key {
            Some(key) => key,
            None => return Ok(secret.to_string()),
        };

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, secret.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(format!(
            "{}{}:{}",
            ENCRYPTED_PREFIX,
            BASE64.encode(nonce_bytes),
            BASE64.encode(&ciphertext)
        ))
    }

    /// Recover the plaintext of a stored secret.
    ///
    /// Unwrapped values pass through unchanged so databases written before
    /// a passphrase was configured stay readable.
    pub fn reveal(&self, stored: &str) -> Result<String, CryptoError> {
        if !is_protected(stored) {
            return Ok(stored.to_string());
        }

        let key = self.key.as_ref().ok_or(CryptoError::KeyNotAvailable)?;

        let inner = stored
            .strip_prefix(ENCRYPTED_PREFIX)
            .ok_or_else(|| CryptoError::InvalidFormat("missing prefix".to_string()))?;
        let (nonce_b64, ciphertext_b64) = inner
            .split_once(':')
            .ok_or_else(|| CryptoError::InvalidFormat("expected NONCE:CIPHERTEXT".to_string()))?;

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|e| CryptoError::InvalidBase64(e.to_string()))?;
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| CryptoError::InvalidBase64(e.to_string()))?;

        if nonce_bytes.len() != NONCE_LENGTH {
            return Err(CryptoError::InvalidFormat(format!(
                "nonce length {} != {}",
                nonce_bytes.len(),
                NONCE_LENGTH
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed("decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
    }
}

/// Check whether a stored value carries the encryption wrapper.
pub fn is_protected(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Display form of a secret: first and last four characters with the middle
/// elided, or fully masked when too short to show anything safely.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 8 {
        return "••••".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

fn derive_key(passphrase: &str) -> [u8; KEY_LENGTH] {
    // A 64-char hex passphrase is taken as the raw key.
    if passphrase.len() == 64 && passphrase.chars().all(|c| c.is_ascii_hexdigit()) {
        if let Ok(bytes) = hex::decode(passphrase) {
            if bytes.len() == KEY_LENGTH {
                let mut key = [0u8; KEY_LENGTH];
                key.copy_from_slice(&bytes);
                return key;
            }
        }
    }

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KDF_SALT, PBKDF2_ROUNDS, &mut key);
    key
}
