//! Caller identities, roles and patient profiles.

use serde::{Deserialize, Serialize};

/// Identifier of a user account (the `sub` of a bearer token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Identifier of a patient profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of roles known to the clinic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access to every patient's data.
    Admin,
    /// Reads and writes for any patient.
    Clinician,
    /// Access limited to the linked patient profile.
    Patient,
}

impl Role {
    /// Stable lowercase name used in tokens and storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Clinician => "clinician",
            Self::Patient => "patient",
        }
    }

    /// True for roles allowed to author clinical content.
    #[must_use]
    pub fn is_staff(&self) -> bool {
        match self {
            Self::Admin | Self::Clinician => true,
            Self::Patient => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "clinician" => Ok(Self::Clinician),
            "patient" => Ok(Self::Patient),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Error raised when an identity would violate the role/profile invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("patient identity {0} has no linked patient profile")]
    MissingPatientLink(UserId),

    #[error("{role} identity {id} cannot be linked to a patient profile")]
    UnexpectedPatientLink { id: UserId, role: Role },
}

/// A verified caller.
///
/// Immutable once built. Patients always carry the id of their own
/// patient profile; staff never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    id: UserId,
    role: Role,
    patient: Option<PatientId>,
}

impl Identity {
    /// Build an identity, checking that the patient link matches the role.
    ///
    /// # Errors
    /// Returns `IdentityError` if a patient has no link or staff has one.
    pub fn new(id: UserId, role: Role, patient: Option<PatientId>) -> Result<Self, IdentityError> {
        match (role, patient) {
            (Role::Patient, None) => Err(IdentityError::MissingPatientLink(id)),
            (Role::Admin | Role::Clinician, Some(_)) => {
                Err(IdentityError::UnexpectedPatientLink { id, role })
            }
            _ => Ok(Self { id, role, patient }),
        }
    }

    #[must_use]
    pub fn admin(id: UserId) -> Self {
        Self {
            id,
            role: Role::Admin,
            patient: None,
        }
    }

    #[must_use]
    pub fn clinician(id: UserId) -> Self {
        Self {
            id,
            role: Role::Clinician,
            patient: None,
        }
    }

    #[must_use]
    pub fn patient(id: UserId, patient: PatientId) -> Self {
        Self {
            id,
            role: Role::Patient,
            patient: Some(patient),
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// The patient profile owned by this caller, if the caller is a patient.
    #[must_use]
    pub fn linked_patient(&self) -> Option<PatientId> {
        self.patient
    }
}

/// A patient profile, owned by exactly one identity with role patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub user_id: UserId,
}

/// A registered user account as held by the store.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl std::fmt::Debug for UserAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserAccount")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Account fields supplied at registration, with the password already hashed.
#[derive(Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}
