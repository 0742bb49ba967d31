//! Access policy: role-based decisions over patient-owned resources.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. Admins may do anything.
//! 2. Clinicians may write for any patient.
//! 3. Clinicians may read any patient's data.
//! 4. Patients may read and write only data owned by their linked profile.
//! 5. Everything else is denied.
//!
//! Medical records and prescriptions are authored by staff only: a patient
//! write to either kind is denied even for their own profile.

use serde::{Deserialize, Serialize};

use super::identity::{Identity, PatientId, Role};

/// What the caller intends to do with a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
}

/// Kinds of patient-owned resources mediated by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Appointment,
    MedicalRecord,
    Prescription,
    Media,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Appointment => "appointment",
            Self::MedicalRecord => "medical_record",
            Self::Prescription => "prescription",
            Self::Media => "media",
        }
    }

    /// Kinds that patients may never create directly.
    #[must_use]
    pub fn is_staff_authored(&self) -> bool {
        matches!(self, Self::MedicalRecord | Self::Prescription)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a policy evaluation. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: &'static str,
}

impl AccessDecision {
    const fn allow(reason: &'static str) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    const fn deny(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }

    /// Turn a denial into `Forbidden`.
    ///
    /// # Errors
    /// Returns `ClinicError::Forbidden` when the decision denies access.
    pub fn require(self) -> Result<(), crate::ClinicError> {
        if self.allowed {
            Ok(())
        } else {
            Err(crate::ClinicError::Forbidden(self.reason))
        }
    }

    /// Turn a denial into the same `NotFound` an absent resource produces.
    ///
    /// # Errors
    /// Returns `ClinicError::NotFound` when the decision denies access.
    pub fn require_visible(self, kind: ResourceKind) -> Result<(), crate::ClinicError> {
        if self.allowed {
            Ok(())
        } else {
            Err(crate::ClinicError::NotFound(kind.as_str()))
        }
    }
}

/// A single authorization question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest {
    pub action: Action,
    pub kind: ResourceKind,
    pub owner: PatientId,
}

impl AccessRequest {
    #[must_use]
    pub fn read(kind: ResourceKind, owner: PatientId) -> Self {
        Self {
            action: Action::Read,
            kind,
            owner,
        }
    }

    #[must_use]
    pub fn write(kind: ResourceKind, owner: PatientId) -> Self {
        Self {
            action: Action::Write,
            kind,
            owner,
        }
    }
}

/// Decide whether `caller` may perform `request`.
///
/// Total: always returns a decision, never fails.
#[must_use]
pub fn authorize(caller: &Identity, request: AccessRequest) -> AccessDecision {
    let decision = match (caller.role(), request.action) {
        (Role::Admin, _) => AccessDecision::allow("admin has full access"),
        (Role::Clinician, Action::Write) => {
            AccessDecision::allow("clinician may write for any patient")
        }
        (Role::Clinician, Action::Read) => AccessDecision::allow("clinician may read any patient"),
        (Role::Patient, Action::Write) if request.kind.is_staff_authored() => {
            AccessDecision::deny("patients cannot author this resource")
        }
        (Role::Patient, _) => match caller.linked_patient() {
            Some(own) if own == request.owner => AccessDecision::allow("patient owns this data"),
            _ => AccessDecision::deny("patients may only access their own data"),
        },
    };

    if !decision.allowed {
        tracing::debug!(
            "Access denied: user={} role={} action={:?} kind={} reason={}",
            caller.id(),
            caller.role(),
            request.action,
            request.kind,
            decision.reason
        );
    }

    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::UserId;

    const ALL_KINDS: [ResourceKind; 4] = [
        ResourceKind::Appointment,
        ResourceKind::MedicalRecord,
        ResourceKind::Prescription,
        ResourceKind::Media,
    ];

    #[test]
    fn test_admin_allowed_everywhere() {
        let admin = Identity::admin(UserId(1));
        for kind in ALL_KINDS {
            assert!(authorize(&admin, AccessRequest::read(kind, PatientId(7))).allowed);
            assert!(authorize(&admin, AccessRequest::write(kind, PatientId(7))).allowed);
        }
    }

    #[test]
    fn test_clinician_reads_and_writes_any_patient() {
        let clinician = Identity::clinician(UserId(2));
        for kind in ALL_KINDS {
            for owner in [PatientId(1), PatientId(99)] {
                assert!(authorize(&clinician, AccessRequest::read(kind, owner)).allowed);
                assert!(authorize(&clinician, AccessRequest::write(kind, owner)).allowed);
            }
        }
    }

    #[test]
    fn test_patient_denied_on_foreign_data() {
        let patient = Identity::patient(UserId(20), PatientId(5));
        for kind in ALL_KINDS {
            for owner in [PatientId(1), PatientId(4), PatientId(6), PatientId(500)] {
                assert!(!authorize(&patient, AccessRequest::read(kind, owner)).allowed);
                assert!(!authorize(&patient, AccessRequest::write(kind, owner)).allowed);
            }
        }
    }

    #[test]
    fn test_patient_own_data() {
        let patient = Identity::patient(UserId(10), PatientId(1));
        let own = PatientId(1);

        for kind in ALL_KINDS {
            assert!(authorize(&patient, AccessRequest::read(kind, own)).allowed);
        }
        assert!(authorize(&patient, AccessRequest::write(ResourceKind::Appointment, own)).allowed);
        assert!(authorize(&patient, AccessRequest::write(ResourceKind::Media, own)).allowed);
    }

    #[test]
    fn test_patient_never_authors_records_or_prescriptions() {
        let patient = Identity::patient(UserId(10), PatientId(1));
        let own = PatientId(1);

        let record = authorize(&patient, AccessRequest::write(ResourceKind::MedicalRecord, own));
        assert!(!record.allowed);
        let rx = authorize(&patient, AccessRequest::write(ResourceKind::Prescription, own));
        assert!(!rx.allowed);
    }

    #[test]
    fn test_denials_map_to_distinct_outcomes() {
        let patient = Identity::patient(UserId(20), PatientId(5));
        let decision = authorize(&patient, AccessRequest::read(ResourceKind::Media, PatientId(1)));

        assert!(matches!(decision.require(), Err(crate::ClinicError::Forbidden(_))));
        assert!(matches!(
            decision.require_visible(ResourceKind::Media),
            Err(crate::ClinicError::NotFound("media"))
        ));
    }
}
