//! Secret key material: the payload cipher key and the token signing secret.
//!
//! # Memory Security
//!
//! Both types zeroize their bytes on drop. `Debug` prints only a SHA-256
//! fingerprint, never key bytes.

use base64::engine::general_purpose;
use base64::Engine;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of an AES-256 key in bytes.
pub const CIPHER_KEY_LEN: usize = 32;

/// Minimum accepted length of the token signing secret.
pub const MIN_SIGNING_SECRET_LEN: usize = 32;

/// Error type for key parsing and cipher operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: ciphertext is malformed, tampered or from another key")]
    DecryptionFailed,
}

/// The process-wide payload encryption key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    bytes: [u8; CIPHER_KEY_LEN],

    #[zeroize(skip)]
    pub fingerprint: String,
}

impl CipherKey {
    #[must_use]
    pub fn from_bytes(bytes: [u8; CIPHER_KEY_LEN]) -> Self {
        let fingerprint = compute_fingerprint(&bytes);
        Self { bytes, fingerprint }
    }

    /// Parse a base64 key (standard or URL-safe alphabet).
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKeyFormat` unless the input decodes to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let trimmed = encoded.trim();
        let decoded = Zeroizing::new(
            general_purpose::STANDARD
                .decode(trimmed)
                .or_else(|_| general_purpose::URL_SAFE.decode(trimmed))
                .map_err(|_| {
                    CryptoError::InvalidKeyFormat("cipher key is not valid base64".into())
                })?,
        );

        let bytes: [u8; CIPHER_KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKeyFormat(format!(
                "cipher key must be {CIPHER_KEY_LEN} bytes, got {}",
                decoded.len()
            ))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// HMAC secret used to sign and verify bearer tokens.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret {
    bytes: Vec<u8>,

    #[zeroize(skip)]
    pub fingerprint: String,
}

impl SigningSecret {
    /// # Errors
    /// Returns `CryptoError::InvalidKeyFormat` if the secret is shorter than 32 bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_SIGNING_SECRET_LEN {
            let len = bytes.len();
            drop(Zeroizing::new(bytes));
            return Err(CryptoError::InvalidKeyFormat(format!(
                "signing secret must be at least {MIN_SIGNING_SECRET_LEN} bytes, got {len}"
            )));
        }
        let fingerprint = compute_fingerprint(&bytes);
        Ok(Self { bytes, fingerprint })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningSecret")
            .field("fingerprint", &self.fingerprint)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

/// First 8 bytes of SHA-256 over the key, hex encoded.
fn compute_fingerprint(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    Sha256::digest(bytes)[..8]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
