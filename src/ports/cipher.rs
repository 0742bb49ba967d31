//! Cipher port: Trait for payload encryption at rest.

use crate::domain::CryptoError;

/// Authenticated symmetric encryption under one process-wide key.
///
/// Implementations must:
/// - use fresh randomness per `encrypt` call, so equal plaintexts never
///   produce equal ciphertexts
/// - detect any tampering, truncation or key mismatch in `decrypt`
pub trait PayloadCipher: Send + Sync {
    /// Encrypt a plaintext payload.
    ///
    /// # Errors
    /// Returns `CryptoError::Encryption` if the cipher fails.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt and authenticate a payload produced by `encrypt`.
    ///
    /// # Errors
    /// Returns `CryptoError::DecryptionFailed` for malformed, tampered or
    /// foreign-key ciphertext.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Fingerprint of the active key (not secret).
    fn key_fingerprint(&self) -> &str;
}
