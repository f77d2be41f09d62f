//! AES-256-GCM encryption of contact data at rest.
//!
//! Stored format: `base64(nonce || ciphertext || tag)` with a 12-byte random
//! nonce. The 256-bit key is derived from the configured secret with SHA-256.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::ports::Decryptor;

/// AES-GCM nonce size (96 bits).
const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size.
const TAG_SIZE: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Invalid ciphertext: {0}")]
    Decode(String),

    #[error("Decryption failed")]
    Decrypt,
}

/// Symmetric cipher for user contact fields.
#[derive(Clone)]
pub struct ContactCipher {
    cipher: Aes256Gcm,
}

impl ContactCipher {
    pub fn new(secret: &[u8]) -> Self {
        let derived: [u8; 32] = Sha256::digest(secret).into();
        let key = Key::<Aes256Gcm>::from_slice(&derived);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(output))
    }

    pub fn try_decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Decode(e.to_string()))?;
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decode("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::Decode(e.to_string()))
    }
}

impl Decryptor for ContactCipher {
    fn decrypt(&self, value: &str) -> Option<String> {
        match self.try_decrypt(value) {
            Ok(plain) => Some(plain),
            Err(e) => {
                tracing::debug!(error = %e, "Contact decryption failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt() {
        let cipher = ContactCipher::new(b"test-secret");
        let stored = cipher.encrypt("asha@example.com").unwrap();

        assert_ne!(stored, "asha@example.com");
        assert_eq!(cipher.decrypt(&stored).as_deref(), Some("asha@example.com"));
    }

    #[test]
    fn nonce_makes_ciphertexts_differ() {
        let cipher = ContactCipher::new(b"test-secret");
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_yields_none() {
        let stored = ContactCipher::new(b"key-a").encrypt("x@example.com").unwrap();
        assert!(ContactCipher::new(b"key-b").decrypt(&stored).is_none());
    }

    #[test]
    fn garbage_yields_none() {
        let cipher = ContactCipher::new(b"test-secret");
        assert!(cipher.decrypt("not base64 !!").is_none());
        assert!(cipher.decrypt("c2hvcnQ=").is_none());
        assert!(cipher.decrypt("").is_none());
    }
}
