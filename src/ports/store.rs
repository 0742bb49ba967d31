//! Storage port: transactional access to clinic data.
//!
//! The core never holds a connection itself. Each mediator operation runs
//! inside one `Store::transaction` call so the ownership check and the write
//! that follows see the same state.

use crate::domain::{
    Appointment, AppointmentStatus, ContentKind, NewAppointment, NewPrescription,
    NewProtectedResource, NewUser, Patient, PatientId, Prescription, ProtectedResource,
    ResourceKind, UserAccount, UserId,
};
use crate::{ClinicError, Result};

/// A record loaded from the store, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    Appointment(Appointment),
    Prescription(Prescription),
    Protected(ProtectedResource),
}

impl Stored {
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Appointment(_) => ResourceKind::Appointment,
            Self::Prescription(_) => ResourceKind::Prescription,
            Self::Protected(resource) => resource.kind.resource_kind(),
        }
    }

    /// The patient that owns this record.
    #[must_use]
    pub fn owner(&self) -> PatientId {
        match self {
            Self::Appointment(a) => a.patient_id,
            Self::Prescription(p) => p.patient_id,
            Self::Protected(r) => r.patient_id,
        }
    }

    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store answered with another kind.
    pub fn into_appointment(self) -> Result<Appointment> {
        match self {
            Self::Appointment(a) => Ok(a),
            other => Err(mismatch(ResourceKind::Appointment, other.kind())),
        }
    }

    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store answered with another kind.
    pub fn into_prescription(self) -> Result<Prescription> {
        match self {
            Self::Prescription(p) => Ok(p),
            other => Err(mismatch(ResourceKind::Prescription, other.kind())),
        }
    }

    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store answered with another kind.
    pub fn into_protected(self, expected: ContentKind) -> Result<ProtectedResource> {
        match self {
            Self::Protected(r) if r.kind == expected => Ok(r),
            other => Err(mismatch(expected.resource_kind(), other.kind())),
        }
    }
}

fn mismatch(expected: ResourceKind, got: ResourceKind) -> ClinicError {
    ClinicError::Unavailable(format!("store returned {got} where {expected} was requested"))
}

/// A record to insert, tagged by kind.
#[derive(Clone)]
pub enum NewRecord {
    Appointment(NewAppointment),
    Prescription(NewPrescription),
    Protected(NewProtectedResource),
}

/// Narrowing criteria for `Transaction::list`. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub patient_id: Option<PatientId>,
    pub clinician_id: Option<UserId>,
    pub status: Option<AppointmentStatus>,
}

impl ListFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_patient(patient_id: PatientId) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_clinician(clinician_id: UserId) -> Self {
        Self {
            clinician_id: Some(clinician_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: Option<AppointmentStatus>) -> Self {
        self.status = status;
        self
    }
}

/// Operations available inside a store transaction.
pub trait Transaction {
    /// Load one record of `kind` by id.
    ///
    /// # Returns
    /// `None` if no such record exists.
    ///
    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn load(&mut self, kind: ResourceKind, id: i64) -> Result<Option<Stored>>;

    /// Insert a new record and return its id.
    ///
    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn save(&mut self, record: NewRecord) -> Result<i64>;

    /// Persist status, notes and `updated_at` of an existing appointment.
    ///
    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn update_appointment(&mut self, appointment: &Appointment) -> Result<()>;

    /// List records of `kind` matching `filter`, newest first (appointments by
    /// scheduled time, ascending).
    ///
    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn list(&mut self, kind: ResourceKind, filter: &ListFilter) -> Result<Vec<Stored>>;

    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn patient(&mut self, id: PatientId) -> Result<Option<Patient>>;

    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn patient_for_user(&mut self, user_id: UserId) -> Result<Option<Patient>>;

    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn user(&mut self, id: UserId) -> Result<Option<UserAccount>>;

    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn user_by_username(&mut self, username: &str) -> Result<Option<UserAccount>>;

    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn username_or_email_taken(&mut self, username: &str, email: &str) -> Result<bool>;

    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn create_user(&mut self, user: &NewUser) -> Result<UserId>;

    /// Create the patient profile owned by `user_id`.
    ///
    /// # Errors
    /// Returns `ClinicError::Unavailable` if the store fails.
    fn create_patient(&mut self, user_id: UserId) -> Result<PatientId>;
}

/// A transactional store.
pub trait Store: Send + Sync {
    /// Run `f` inside one transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back on `Err`. The error from `f`
    /// is returned unchanged.
    ///
    /// # Errors
    /// Returns the closure's error, or `ClinicError::Unavailable` if the
    /// transaction cannot be opened or committed.
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>;
}
