//! Appointments and their status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{PatientId, UserId};
use super::require_text;
use crate::ClinicError;

/// Appointment status.
///
/// Legal moves: `Scheduled -> Confirmed -> Completed`, and
/// `Scheduled | Confirmed -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Apply a status change.
    ///
    /// # Errors
    /// Returns `ClinicError::InvalidTransition` for any move outside the lifecycle,
    /// including re-entering the current status.
    pub fn transition(self, to: Self) -> Result<Self, ClinicError> {
        match (self, to) {
            (Self::Scheduled, Self::Confirmed)
            | (Self::Confirmed, Self::Completed)
            | (Self::Scheduled | Self::Confirmed, Self::Cancelled) => Ok(to),
            (from, to) => Err(ClinicError::InvalidTransition { from, to }),
        }
    }

    /// Only staff may move an appointment into this status.
    #[must_use]
    pub fn requires_staff(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "confirmed" => Ok(Self::Confirmed),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ClinicError::Validation(format!("invalid status: {other}"))),
        }
    }
}

/// A stored appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: PatientId,
    pub clinician_id: UserId,
    pub scheduled_for: DateTime<Utc>,
    pub reason: String,
    pub notes: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for booking an appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub clinician_id: UserId,
    pub scheduled_for: DateTime<Utc>,
    pub reason: String,
    #[serde(default)]
    pub notes: String,
}

impl AppointmentRequest {
    pub const MAX_REASON_LEN: usize = 500;
    pub const MAX_NOTES_LEN: usize = 4000;

    /// # Errors
    /// Returns `ClinicError::Validation` for an empty or oversized reason or notes.
    pub fn validate(&self) -> Result<(), ClinicError> {
        require_text("reason", &self.reason, Self::MAX_REASON_LEN)?;
        if self.notes.len() > Self::MAX_NOTES_LEN {
            return Err(ClinicError::Validation(format!(
                "notes exceed {} bytes",
                Self::MAX_NOTES_LEN
            )));
        }
        Ok(())
    }
}

/// Appointment row ready for insertion.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: PatientId,
    pub clinician_id: UserId,
    pub scheduled_for: DateTime<Utc>,
    pub reason: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl NewAppointment {
    #[must_use]
    pub fn from_request(patient_id: PatientId, request: AppointmentRequest) -> Self {
        Self {
            patient_id,
            clinician_id: request.clinician_id,
            scheduled_for: request.scheduled_for,
            reason: request.reason.trim().to_string(),
            notes: request.notes,
            created_at: Utc::now(),
        }
    }
}
