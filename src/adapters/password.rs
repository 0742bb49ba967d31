//! Argon2id adapter: Implementation of `PasswordHashing`.
//!
//! Hashes are stored in PHC string format, so parameters and salt travel
//! with the hash and old hashes keep verifying if parameters change.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

use crate::ports::PasswordHashing;
use crate::{ClinicError, Result};

/// Argon2id password hasher.
pub struct Argon2Passwords {
    params: Params,
}

impl Argon2Passwords {
    /// Production parameters: 46 MiB memory, 1 iteration, 1 lane.
    ///
    /// # Errors
    /// Returns `ClinicError::Unavailable` if the parameters are rejected.
    pub fn new() -> Result<Self> {
        Self::with_params(47104, 1, 1)
    }

    /// # Errors
    /// Returns `ClinicError::Unavailable` if the parameters are rejected.
    pub fn with_params(memory_kib: u32, iterations: u32, lanes: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, lanes, Some(32))
            .map_err(|e| ClinicError::Unavailable(format!("invalid Argon2 params: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordHashing for Argon2Passwords {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| ClinicError::Unavailable(format!("password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            tracing::warn!("Stored password hash is not in PHC format");
            return false;
        };
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
