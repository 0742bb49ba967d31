//! Application layer: Use cases and services.
//!
//! Each mediator combines ownership lookups from the store with the access
//! policy and, for protected content, the payload cipher. Every operation runs
//! inside a single `Store::transaction`.

mod accounts;
mod appointments;
mod clinic;
mod media;
mod prescriptions;
mod records;

#[cfg(test)]
mod testing;

pub use accounts::{AccountService, LoginOutcome, Registration};
pub use appointments::AppointmentService;
pub use clinic::{Clinic, SqliteClinic};
pub use media::MediaService;
pub use prescriptions::PrescriptionService;
pub use records::MedicalRecordService;

use crate::domain::{authorize, AccessRequest, Identity, ResourceKind};
use crate::ports::{Stored, Transaction};
use crate::{ClinicError, Result};

/// Check a patient-scoped request, then confirm the patient exists.
///
/// The policy runs first, so a patient naming another patient id gets
/// `Forbidden` whether or not that patient exists.
fn require_patient<T>(tx: &mut T, caller: &Identity, request: AccessRequest) -> Result<()>
where
    T: Transaction + ?Sized,
{
    authorize(caller, request).require()?;
    if tx.patient(request.owner)?.is_none() {
        return Err(ClinicError::NotFound("patient"));
    }
    Ok(())
}

/// Load a record by id, answering `NotFound` both when it is absent and when
/// the caller may not read it.
fn load_visible<T>(tx: &mut T, caller: &Identity, kind: ResourceKind, id: i64) -> Result<Stored>
where
    T: Transaction + ?Sized,
{
    let stored = tx.load(kind, id)?.ok_or(ClinicError::NotFound(kind.as_str()))?;
    authorize(caller, AccessRequest::read(kind, stored.owner())).require_visible(kind)?;
    Ok(stored)
}
