//! Secret encryption at rest
//!
//! Provider API keys and next-gen shared secrets are stored encrypted with
//! AES-256-GCM. Each ciphertext gets a fresh random salt and nonce; the
//! encryption key is derived from the configured master key and the salt, so
//! two encryptions of the same plaintext never produce the same blob.
//!
//! The stored form is a single base64 string: `salt | nonce | ciphertext+tag`.
//! Nothing outside this process reads these blobs, so the envelope has no
//! versioning or interop requirements.
//!
//! The cipher is constructed once at startup from
//! `REASONKIT_HOOKS_ENCRYPTION_KEY`; a missing key is a fatal configuration
//! error, not a runtime one.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// Per-ciphertext salt length in bytes
const SALT_LEN: usize = 16;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// AES-256 key length in bytes
const KEY_LEN: usize = 32;

/// AES-GCM authentication tag length in bytes
const TAG_LEN: usize = 16;

/// Symmetric cipher for secrets at rest.
///
/// Holds the master key for the lifetime of the process. The key is never
/// exposed through `Debug` output or logs.
pub struct SecretCipher {
    master_key: Vec<u8>,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Create a cipher from the configured master key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EmptyKey` if the key is empty.
    pub fn new(master_key: &str) -> Result<Self, CryptoError> {
        if master_key.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        Ok(Self {
            master_key: master_key.as_bytes().to_vec(),
        })
    }

    /// Derive a per-ciphertext AES key from the master key and salt.
    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(&self.master_key);
        hasher.update(salt);
        let digest = hasher.finalize();

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest);
        key
    }

    /// Encrypt a plaintext secret into a base64 envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce_bytes = [0u8; NONCE_LEN];
        let mut rng = rand::rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce_bytes);

        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?;

        let mut envelope = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(envelope))
    }

    /// Decrypt a base64 envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// `CryptoError::MalformedEnvelope` for undecodable/truncated blobs,
    /// `CryptoError::DecryptFailed` when the key is wrong or the data was
    /// tampered with (GCM tag mismatch).
    pub fn decrypt(&self, blob: &str) -> Result<String, CryptoError> {
        let envelope = BASE64
            .decode(blob)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;

        if envelope.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "envelope too short: {} bytes",
                envelope.len()
            )));
        }

        let (salt, rest) = envelope.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::DecryptFailed(e.to_string()))?;

        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptFailed("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptFailed(format!("invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new("test-master-key-for-unit-tests").unwrap()
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            SecretCipher::new(""),
            Err(CryptoError::EmptyKey)
        ));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = cipher();
        let plaintext = "live_abc123def456";

        let blob = cipher.encrypt(plaintext).unwrap();
        let decrypted = cipher.decrypt(&blob).unwrap();

        assert_eq!(plaintext, decrypted);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let cipher = cipher();
        let blob = cipher.encrypt("").unwrap();
        assert_eq!(cipher.decrypt(&blob).unwrap(), "");
    }

    #[test]
    fn test_same_plaintext_different_blobs() {
        let cipher = cipher();
        let a = cipher.encrypt("secret").unwrap();
        let b = cipher.encrypt("secret").unwrap();
        // Fresh salt and nonce per encryption
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = cipher().encrypt("secret").unwrap();
        let other = SecretCipher::new("a-completely-different-key").unwrap();
        assert!(matches!(
            other.decrypt(&blob),
            Err(CryptoError::DecryptFailed(_))
        ));
    }

    #[test]
    fn test_tampered_blob_fails() {
        let cipher = cipher();
        let blob = cipher.encrypt("secret").unwrap();

        let mut raw = BASE64.decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);

        assert!(matches!(
            cipher.decrypt(&tampered),
            Err(CryptoError::DecryptFailed(_))
        ));
    }

    #[test]
    fn test_malformed_blob_rejected() {
        let cipher = cipher();
        assert!(matches!(
            cipher.decrypt("not base64!!!"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            cipher.decrypt("AAAA"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }
}
