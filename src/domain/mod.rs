//! Domain layer: Core clinic types and access rules.
//!
//! Pure types with no I/O. The access policy and the appointment lifecycle
//! live here so every adapter and service shares one definition.

mod appointment;
mod crypto;
mod identity;
pub mod policy;
mod prescription;
mod protected;

pub use appointment::{Appointment, AppointmentRequest, AppointmentStatus, NewAppointment};
pub use crypto::{CipherKey, CryptoError, SigningSecret, CIPHER_KEY_LEN, MIN_SIGNING_SECRET_LEN};
pub use identity::{Identity, IdentityError, NewUser, Patient, PatientId, Role, UserAccount, UserId};
pub use policy::{authorize, AccessDecision, AccessRequest, Action, ResourceKind};
pub use prescription::{NewPrescription, Prescription, PrescriptionRequest};
pub use protected::{
    ContentKind, MediaDownload, MediaInfo, MediaUpload, MedicalRecordRequest, MedicalRecordView,
    NewProtectedResource, ProtectedResource, DEFAULT_MEDIA_TYPE,
};

use crate::ClinicError;

/// Require a non-blank text field no longer than `max_len` bytes.
pub(crate) fn require_text(field: &str, value: &str, max_len: usize) -> Result<(), ClinicError> {
    if value.trim().is_empty() {
        return Err(ClinicError::Validation(format!("{field} is required")));
    }
    if value.len() > max_len {
        return Err(ClinicError::Validation(format!(
            "{field} exceeds {max_len} bytes"
        )));
    }
    Ok(())
}
