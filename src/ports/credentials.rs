//! Credential ports: bearer token verification and issuance, password hashing.

use chrono::{DateTime, Utc};

use crate::domain::Identity;
use crate::Result;

/// Recovers the caller's identity from a bearer token.
///
/// Verification trusts the signature alone; no store lookup happens.
pub trait CredentialVerifier: Send + Sync {
    /// Verify `token` against the current time.
    ///
    /// # Errors
    /// Returns `ClinicError::Unauthenticated` for malformed, unsigned,
    /// wrongly signed or expired tokens.
    fn verify(&self, token: &str) -> Result<Identity> {
        self.verify_at(token, Utc::now())
    }

    /// Verify `token` as of `now`.
    ///
    /// # Errors
    /// Returns `ClinicError::Unauthenticated` as for `verify`.
    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity>;
}

/// A freshly minted bearer token.
#[derive(Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Mints bearer tokens for authenticated identities.
pub trait TokenIssuer: Send + Sync {
    /// Issue a token valid from now for the configured lifetime.
    ///
    /// # Errors
    /// Returns `ClinicError::Unavailable` if signing fails.
    fn issue(&self, identity: &Identity) -> Result<IssuedToken> {
        self.issue_at(identity, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    ///
    /// # Errors
    /// Returns `ClinicError::Unavailable` if signing fails.
    fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<IssuedToken>;
}

/// One-way password hashing for account credentials.
pub trait PasswordHashing: Send + Sync {
    /// # Errors
    /// Returns `ClinicError::Unavailable` if hashing fails.
    fn hash(&self, password: &str) -> Result<String>;

    /// Constant-time check of `password` against a stored hash.
    fn verify(&self, password: &str, stored_hash: &str) -> bool;
}
