//! Account service: registration and password login.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use zeroize::Zeroizing;

use crate::domain::{Identity, NewUser, Role, UserAccount};
use crate::ports::{IssuedToken, PasswordHashing, Store, TokenIssuer};
use crate::{ClinicError, Result};

pub const MIN_PASSWORD_LEN: usize = 8;
/// Upper bound in bytes, applied at registration and login.
pub const MAX_PASSWORD_LEN: usize = 128;

/// Registration details supplied by the caller.
#[derive(Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: Zeroizing<String>,
    pub role: Role,
}

impl Registration {
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: Zeroizing::new(password.into()),
            role,
        }
    }

    /// # Errors
    /// Returns `ClinicError::Validation` for a malformed username or email, or
    /// a password of the wrong length.
    pub fn validate(&self) -> Result<()> {
        static USERNAME: OnceLock<Regex> = OnceLock::new();
        static EMAIL: OnceLock<Regex> = OnceLock::new();

        let username = USERNAME
            .get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,50}$").expect("Valid regex"));
        if !username.is_match(&self.username) {
            return Err(ClinicError::Validation(
                "username must be 3-50 letters, digits, '.', '_' or '-'".to_string(),
            ));
        }

        let email = EMAIL
            .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").expect("Valid regex"));
        if self.email.len() > 254 || !email.is_match(&self.email) {
            return Err(ClinicError::Validation("email address is malformed".to_string()));
        }

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ClinicError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ClinicError::Validation(format!(
                "password must be at most {MAX_PASSWORD_LEN} bytes"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: IssuedToken,
    pub identity: Identity,
    pub account: UserAccount,
}

/// Service for account registration and login.
pub struct AccountService<S: Store, H: PasswordHashing, I: TokenIssuer> {
    store: Arc<S>,
    hasher: Arc<H>,
    issuer: Arc<I>,
    decoy_hash: String,
}

impl<S: Store, H: PasswordHashing, I: TokenIssuer> AccountService<S, H, I> {
    /// # Errors
    /// Returns `ClinicError::Unavailable` if the hasher cannot produce the
    /// decoy hash used for unknown usernames.
    pub fn new(store: Arc<S>, hasher: Arc<H>, issuer: Arc<I>) -> Result<Self> {
        let decoy_hash = hasher.hash("decoy-password-for-unknown-users")?;
        Ok(Self {
            store,
            hasher,
            issuer,
            decoy_hash,
        })
    }

    /// Create an account. Patient accounts also get their patient profile in
    /// the same transaction.
    ///
    /// # Errors
    /// - `Validation` for malformed fields or a taken username or email
    /// - `Unavailable` if hashing or the store fails
    pub fn register(&self, registration: &Registration) -> Result<Identity> {
        registration.validate()?;
        let password_hash = self.hasher.hash(&registration.password)?;

        let identity = self.store.transaction(|tx| {
            if tx.username_or_email_taken(&registration.username, &registration.email)? {
                return Err(ClinicError::Validation(
                    "username or email already registered".to_string(),
                ));
            }

            let id = tx.create_user(&NewUser {
                username: registration.username.clone(),
                email: registration.email.clone(),
                password_hash: password_hash.clone(),
                role: registration.role,
            })?;

            let identity = match registration.role {
                Role::Admin => Identity::admin(id),
                Role::Clinician => Identity::clinician(id),
                Role::Patient => Identity::patient(id, tx.create_patient(id)?),
            };
            Ok(identity)
        })?;

        tracing::info!("Registered user {} as {}", identity.id(), identity.role());
        Ok(identity)
    }

    /// Check a username and password and issue a bearer token.
    ///
    /// # Errors
    /// - `Unauthenticated` for an unknown username or a wrong password
    /// - `Unavailable` if the store or token signing fails
    pub fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        if password.len() > MAX_PASSWORD_LEN {
            tracing::info!("Login failed: password exceeds {MAX_PASSWORD_LEN} bytes");
            return Err(ClinicError::Unauthenticated);
        }

        let found = self.store.transaction(|tx| {
            let Some(account) = tx.user_by_username(username)? else {
                return Ok(None);
            };
            let patient = match account.role {
                Role::Patient => {
                    let profile = tx.patient_for_user(account.id)?.ok_or_else(|| {
                        ClinicError::Unavailable(format!(
                            "user {} has no patient profile",
                            account.id
                        ))
                    })?;
                    Some(profile.id)
                }
                Role::Admin | Role::Clinician => None,
            };
            Ok(Some((account, patient)))
        })?;

        let Some((account, patient)) = found else {
            // Same hashing cost as a wrong password.
            let _ = self.hasher.verify(password, &self.decoy_hash);
            tracing::info!("Login failed for unknown username");
            return Err(ClinicError::Unauthenticated);
        };

        if !self.hasher.verify(password, &account.password_hash) {
            tracing::info!("Login failed for user {}", account.id);
            return Err(ClinicError::Unauthenticated);
        }

        let identity = Identity::new(account.id, account.role, patient)
            .map_err(|e| ClinicError::Unavailable(e.to_string()))?;
        let token = self.issuer.issue(&identity)?;

        tracing::info!("User {} logged in", account.id);
        Ok(LoginOutcome {
            token,
            identity,
            account,
        })
    }

    /// The account behind an identity.
    ///
    /// # Errors
    /// Returns `NotFound` if the account no longer exists.
    pub fn account(&self, caller: &Identity) -> Result<UserAccount> {
        self.store
            .transaction(|tx| tx.user(caller.id())?.ok_or(ClinicError::NotFound("user")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Argon2Passwords, JwtCredentials, SqliteStore};
    use crate::domain::SigningSecret;
    use crate::ports::CredentialVerifier;

    type Service = AccountService<SqliteStore, Argon2Passwords, JwtCredentials>;

    fn service() -> (Arc<JwtCredentials>, Service) {
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        let hasher =
            Arc::new(Argon2Passwords::with_params(8 * 1024, 1, 1).expect("Should build hasher"));
        let secret = SigningSecret::new(vec![3; 32]).expect("Should build secret");
        let jwt = Arc::new(
            JwtCredentials::new(&secret, chrono::Duration::minutes(30)).expect("Should build jwt"),
        );
        let service =
            AccountService::new(store, hasher, jwt.clone()).expect("Should build service");
        (jwt, service)
    }

    #[test]
    fn test_register_patient_creates_profile_and_logs_in() {
        let (jwt, service) = service();
        let identity = service
            .register(&Registration::new("jane", "jane@clinic.test", "s3cure-pass", Role::Patient))
            .expect("Should register");
        assert_eq!(identity.role(), Role::Patient);
        assert!(identity.linked_patient().is_some());

        let outcome = service.login("jane", "s3cure-pass").expect("Should log in");
        assert_eq!(outcome.identity, identity);
        assert_eq!(outcome.account.email, "jane@clinic.test");
        assert_eq!(jwt.verify(&outcome.token.token).expect("Should verify"), identity);
    }

    #[test]
    fn test_register_staff_has_no_patient_link() {
        let (_, service) = service();
        let identity = service
            .register(&Registration::new(
                "dr.house",
                "house@clinic.test",
                "vicodin-free",
                Role::Clinician,
            ))
            .expect("Should register");
        assert_eq!(identity.linked_patient(), None);
        assert_eq!(
            service.account(&identity).expect("Should load account").username,
            "dr.house"
        );
    }

    #[test]
    fn test_duplicate_username_or_email_rejected() {
        let (_, service) = service();
        service
            .register(&Registration::new("jane", "jane@clinic.test", "s3cure-pass", Role::Patient))
            .expect("Should register");

        for dup in [
            Registration::new("jane", "other@clinic.test", "s3cure-pass", Role::Patient),
            Registration::new("janet", "jane@clinic.test", "s3cure-pass", Role::Patient),
        ] {
            assert!(matches!(service.register(&dup), Err(ClinicError::Validation(_))));
        }
    }

    #[test]
    fn test_wrong_credentials_unauthenticated() {
        let (_, service) = service();
        service
            .register(&Registration::new("jane", "jane@clinic.test", "s3cure-pass", Role::Patient))
            .expect("Should register");

        assert!(matches!(
            service.login("jane", "wrong-pass"),
            Err(ClinicError::Unauthenticated)
        ));
        assert!(matches!(
            service.login("nobody", "s3cure-pass"),
            Err(ClinicError::Unauthenticated)
        ));
    }

    #[test]
    fn test_multibyte_password_checked_in_full() {
        let (_, service) = service();
        let prefix = "é".repeat(60);
        service
            .register(&Registration::new(
                "renee",
                "renee@clinic.test",
                format!("{prefix}RealTail"),
                Role::Patient,
            ))
            .expect("Should register a 128-byte password");

        assert!(service.login("renee", &format!("{prefix}RealTail")).is_ok());
        assert!(matches!(
            service.login("renee", &format!("{prefix}WrongTai")),
            Err(ClinicError::Unauthenticated)
        ));
        assert!(matches!(
            service.login("renee", &format!("{prefix}RealTail-and-more")),
            Err(ClinicError::Unauthenticated)
        ));

        // 64 two-byte characters plus a tail is over the byte limit.
        let too_long = Registration::new(
            "renee2",
            "renee2@clinic.test",
            format!("{}RealTail", "é".repeat(64)),
            Role::Patient,
        );
        assert!(matches!(service.register(&too_long), Err(ClinicError::Validation(_))));
    }

    #[test]
    fn test_registration_validation() {
        for bad in [
            Registration::new("ab", "ab@clinic.test", "long-enough", Role::Patient),
            Registration::new("has space", "x@clinic.test", "long-enough", Role::Patient),
            Registration::new("valid", "not-an-email", "long-enough", Role::Patient),
            Registration::new("valid", "valid@clinic.test", "short", Role::Patient),
            Registration::new("valid", "valid@clinic.test", "x".repeat(129), Role::Patient),
        ] {
            assert!(matches!(bad.validate(), Err(ClinicError::Validation(_))), "{bad:?}");
        }
    }

    #[test]
    fn test_registration_debug_hides_password() {
        let reg = Registration::new("jane", "jane@clinic.test", "s3cure-pass", Role::Patient);
        assert!(!format!("{reg:?}").contains("s3cure-pass"));
    }
}
