//! Prescriptions issued by clinicians.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{PatientId, UserId};
use super::require_text;
use crate::ClinicError;

/// A stored prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: i64,
    pub patient_id: PatientId,
    pub clinician_id: UserId,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub notes: String,
    pub issued_at: DateTime<Utc>,
}

/// Caller-supplied prescription fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionRequest {
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    #[serde(default)]
    pub notes: String,
}

impl PrescriptionRequest {
    pub const MAX_FIELD_LEN: usize = 200;
    pub const MAX_NOTES_LEN: usize = 4000;

    /// # Errors
    /// Returns `ClinicError::Validation` naming the first bad field.
    pub fn validate(&self) -> Result<(), ClinicError> {
        require_text("medication_name", &self.medication_name, Self::MAX_FIELD_LEN)?;
        require_text("dosage", &self.dosage, Self::MAX_FIELD_LEN)?;
        require_text("frequency", &self.frequency, Self::MAX_FIELD_LEN)?;
        require_text("duration", &self.duration, Self::MAX_FIELD_LEN)?;
        if self.notes.len() > Self::MAX_NOTES_LEN {
            return Err(ClinicError::Validation(format!(
                "notes exceed {} bytes",
                Self::MAX_NOTES_LEN
            )));
        }
        Ok(())
    }
}

/// Prescription row ready for insertion.
#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub patient_id: PatientId,
    pub clinician_id: UserId,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub notes: String,
    pub issued_at: DateTime<Utc>,
}

impl NewPrescription {
    #[must_use]
    pub fn from_request(
        patient_id: PatientId,
        clinician_id: UserId,
        request: PrescriptionRequest,
    ) -> Self {
        Self {
            patient_id,
            clinician_id,
            medication_name: request.medication_name.trim().to_string(),
            dosage: request.dosage.trim().to_string(),
            frequency: request.frequency.trim().to_string(),
            duration: request.duration.trim().to_string(),
            notes: request.notes,
            issued_at: Utc::now(),
        }
    }
}
