//! JWT adapter: HS256 bearer tokens carrying the caller's identity.
//!
//! Claims:
//! - `sub`: user id as a decimal string
//! - `role`: `admin`, `clinician` or `patient`
//! - `pid`: linked patient id (patients only)
//! - `iat` / `exp`: issue and expiry time, seconds since the epoch
//!
//! Verification never consults the store. Expiry is checked against the
//! caller-supplied clock with no leeway.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::{Identity, PatientId, Role, SigningSecret, UserId};
use crate::ports::{CredentialVerifier, IssuedToken, TokenIssuer};
use crate::{ClinicError, Result};

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pid: Option<i64>,
    iat: i64,
    exp: i64,
}

/// Signs and verifies bearer tokens with one process-wide secret.
pub struct JwtCredentials {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    fingerprint: String,
}

impl JwtCredentials {
    /// Build from the signing secret and the token lifetime.
    ///
    /// # Errors
    /// Returns `ClinicError::Validation` if `ttl` is not positive.
    pub fn new(secret: &SigningSecret, ttl: Duration) -> Result<Self> {
        if ttl <= Duration::zero() {
            return Err(ClinicError::Validation("token lifetime must be positive".to_string()));
        }

        let mut validation = Validation::new(ALGORITHM);
        // Expiry is enforced in `verify_at` against an explicit clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            fingerprint: secret.fingerprint.clone(),
        })
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl std::fmt::Debug for JwtCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCredentials")
            .field("algorithm", &ALGORITHM)
            .field("ttl_minutes", &self.ttl.num_minutes())
            .field("secret_fingerprint", &self.fingerprint)
            .finish()
    }
}

impl CredentialVerifier for JwtCredentials {
    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!("Rejected bearer token: {e}");
                ClinicError::Unauthenticated
            })?;
        let claims = data.claims;

        if claims.exp <= now.timestamp() {
            tracing::debug!("Rejected expired bearer token");
            return Err(ClinicError::Unauthenticated);
        }

        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| ClinicError::Unauthenticated)?;

        Identity::new(UserId(user_id), claims.role, claims.pid.map(PatientId)).map_err(|e| {
            tracing::debug!("Rejected inconsistent bearer token: {e}");
            ClinicError::Unauthenticated
        })
    }
}

impl TokenIssuer for JwtCredentials {
    fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<IssuedToken> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| ClinicError::Unavailable("token expiry out of range".to_string()))?;
        let claims = Claims {
            sub: identity.id().to_string(),
            role: identity.role(),
            pid: identity.linked_patient().map(|p| p.0),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = jsonwebtoken::encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| ClinicError::Unavailable(format!("token signing failed: {e}")))?;

        Ok(IssuedToken { token, expires_at })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
#[must_use]
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}
