//! AES-256-GCM adapter: Implementation of `PayloadCipher`.
//!
//! Ciphertext layout:
//!
//! ```text
//! version (1 byte) | nonce (12 bytes) | AES-GCM ciphertext + 16-byte tag
//! ```
//!
//! # Security
//!
//! - AES-256-GCM provides authenticated encryption (AEAD)
//! - Random nonce per encryption operation
//! - Version byte lets `decrypt` reject payloads it does not understand

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::domain::{CipherKey, CryptoError};
use crate::ports::PayloadCipher;

/// Current ciphertext format version.
const FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + NONCE_LEN;

/// Payload cipher holding one AES-256-GCM key for the process lifetime.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
    fingerprint: String,
}

impl AesGcmCipher {
    /// Build a cipher from the configured key.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKeyFormat` if the key cannot initialize AES-256.
    pub fn new(key: &CipherKey) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        tracing::debug!("Payload cipher ready (key {})", key.fingerprint);
        Ok(Self {
            cipher,
            fingerprint: key.fingerprint.clone(),
        })
    }
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCipher")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl PayloadCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < HEADER_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let (header, sealed) = ciphertext.split_at(HEADER_LEN);
        if header[0] != FORMAT_VERSION {
            return Err(CryptoError::DecryptionFailed);
        }
        let nonce = Nonce::from_slice(&header[1..]);

        // Tag mismatch covers both tampering and a different key.
        self.cipher
            .decrypt(nonce, sealed)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    fn key_fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
