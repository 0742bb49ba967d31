//! Appointment mediator: booking, lookup and status transitions.

use std::sync::Arc;

use chrono::Utc;

use super::{load_visible, require_patient};
use crate::domain::{
    authorize, AccessRequest, Appointment, AppointmentRequest, AppointmentStatus, Identity,
    NewAppointment, PatientId, ResourceKind, Role,
};
use crate::ports::{ListFilter, NewRecord, Store, Stored};
use crate::{ClinicError, Result};

const KIND: ResourceKind = ResourceKind::Appointment;

/// Service for appointment operations.
pub struct AppointmentService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> AppointmentService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Book an appointment for `patient_id` with the clinician named in
    /// `request`.
    ///
    /// # Errors
    /// - `Forbidden` if a patient books for someone else
    /// - `Validation` for a bad reason or notes
    /// - `NotFound` if the patient or clinician does not exist
    pub fn book(
        &self,
        caller: &Identity,
        patient_id: PatientId,
        request: AppointmentRequest,
    ) -> Result<Appointment> {
        let appointment = self.store.transaction(|tx| {
            require_patient(tx, caller, AccessRequest::write(KIND, patient_id))?;
            request.validate()?;

            match tx.user(request.clinician_id)? {
                Some(user) if user.role.is_staff() => {}
                _ => return Err(ClinicError::NotFound("clinician")),
            }

            let id = tx.save(NewRecord::Appointment(NewAppointment::from_request(
                patient_id, request,
            )))?;
            tx.load(KIND, id)?
                .ok_or(ClinicError::NotFound(KIND.as_str()))?
                .into_appointment()
        })?;

        tracing::info!(
            "Appointment {} booked for patient {} by user {}",
            appointment.id,
            patient_id,
            caller.id()
        );
        Ok(appointment)
    }

    /// # Errors
    /// Returns `NotFound` if the appointment is absent or not visible to `caller`.
    pub fn read(&self, caller: &Identity, id: i64) -> Result<Appointment> {
        self.store
            .transaction(|tx| load_visible(tx, caller, KIND, id)?.into_appointment())
    }

    /// All appointments of one patient, ordered by scheduled time.
    ///
    /// # Errors
    /// `Forbidden` for another patient's id, `NotFound` for an unknown patient.
    pub fn list_for_patient(
        &self,
        caller: &Identity,
        patient_id: PatientId,
    ) -> Result<Vec<Appointment>> {
        self.store.transaction(|tx| {
            require_patient(tx, caller, AccessRequest::read(KIND, patient_id))?;
            collect(tx.list(KIND, &ListFilter::for_patient(patient_id))?)
        })
    }

    /// Appointments in the caller's own view: patients see theirs, clinicians
    /// the ones assigned to them, admins everything.
    ///
    /// # Errors
    /// Returns `Unavailable` if the store fails.
    pub fn list_visible(
        &self,
        caller: &Identity,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>> {
        let filter = match (caller.role(), caller.linked_patient()) {
            (Role::Admin, _) => ListFilter::all(),
            (Role::Clinician, _) => ListFilter::for_clinician(caller.id()),
            (Role::Patient, Some(patient_id)) => ListFilter::for_patient(patient_id),
            (Role::Patient, None) => return Err(ClinicError::NotFound("patient")),
        }
        .with_status(status);

        self.store.transaction(|tx| collect(tx.list(KIND, &filter)?))
    }

    /// Move an appointment to `to`. Non-empty `notes` replace the stored
    /// notes; `None` or an empty string keeps them.
    ///
    /// Staff may confirm, complete or cancel any appointment. A patient may
    /// only cancel their own.
    ///
    /// # Errors
    /// - `NotFound` if the appointment is absent or not visible
    /// - `Forbidden` if a patient attempts anything but cancelling
    /// - `InvalidTransition` for a move outside the lifecycle
    /// - `Validation` for oversized notes
    pub fn transition(
        &self,
        caller: &Identity,
        id: i64,
        to: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment> {
        if let Some(notes) = &notes {
            if notes.len() > AppointmentRequest::MAX_NOTES_LEN {
                return Err(ClinicError::Validation(format!(
                    "notes exceed {} bytes",
                    AppointmentRequest::MAX_NOTES_LEN
                )));
            }
        }

        let (from, appointment) = self.store.transaction(|tx| {
            let mut appointment = load_visible(tx, caller, KIND, id)?.into_appointment()?;

            if to.requires_staff() && !caller.role().is_staff() {
                return Err(ClinicError::Forbidden(
                    "only staff may confirm or complete appointments",
                ));
            }
            authorize(caller, AccessRequest::write(KIND, appointment.patient_id)).require()?;

            let from = appointment.status;
            appointment.status = from.transition(to)?;
            if let Some(notes) = notes.filter(|n| !n.is_empty()) {
                appointment.notes = notes;
            }
            appointment.updated_at = Utc::now();
            tx.update_appointment(&appointment)?;
            Ok((from, appointment))
        })?;

        tracing::info!(
            "Appointment {} moved {} -> {} by user {}",
            appointment.id,
            from,
            appointment.status,
            caller.id()
        );
        Ok(appointment)
    }
}

fn collect(rows: Vec<Stored>) -> Result<Vec<Appointment>> {
    rows.into_iter().map(Stored::into_appointment).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SqliteStore;
    use crate::application::testing::{admin, clinician, owner, store, stranger};
    use crate::domain::UserId;
    use chrono::Duration;

    fn service() -> AppointmentService<SqliteStore> {
        AppointmentService::new(store())
    }

    fn request(hours_ahead: i64) -> AppointmentRequest {
        AppointmentRequest {
            clinician_id: UserId(2),
            scheduled_for: Utc::now() + Duration::hours(hours_ahead),
            reason: "  Annual checkup ".to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_patient_books_own_appointment() {
        let service = service();
        let appt = service
            .book(&owner(), PatientId(1), request(24))
            .expect("Should book");

        assert_eq!(appt.status, AppointmentStatus::Scheduled);
        assert_eq!(appt.reason, "Annual checkup");
        assert_eq!(service.read(&owner(), appt.id).expect("Should read"), appt);
    }

    #[test]
    fn test_patient_cannot_book_for_others() {
        let service = service();
        assert!(matches!(
            service.book(&stranger(), PatientId(1), request(1)),
            Err(ClinicError::Forbidden(_))
        ));
        // Authorization runs before the existence check.
        assert!(matches!(
            service.book(&stranger(), PatientId(404), request(1)),
            Err(ClinicError::Forbidden(_))
        ));
    }

    #[test]
    fn test_booking_checks_patient_and_clinician() {
        let service = service();
        assert!(matches!(
            service.book(&clinician(), PatientId(404), request(1)),
            Err(ClinicError::NotFound("patient"))
        ));

        let mut to_patient = request(1);
        to_patient.clinician_id = UserId(20);
        assert!(matches!(
            service.book(&clinician(), PatientId(1), to_patient),
            Err(ClinicError::NotFound("clinician"))
        ));

        let mut blank = request(1);
        blank.reason = "   ".to_string();
        assert!(matches!(
            service.book(&clinician(), PatientId(1), blank),
            Err(ClinicError::Validation(_))
        ));
    }

    #[test]
    fn test_foreign_appointment_is_hidden() {
        let service = service();
        let appt = service
            .book(&owner(), PatientId(1), request(1))
            .expect("Should book");

        let hidden = service.read(&stranger(), appt.id).expect_err("Should be hidden");
        let missing = service.read(&stranger(), appt.id + 1000).expect_err("Should be missing");
        assert!(matches!(hidden, ClinicError::NotFound("appointment")));
        assert_eq!(hidden.to_string(), missing.to_string());
    }

    #[test]
    fn test_patient_cannot_confirm_but_clinician_can() {
        let service = service();
        let appt = service
            .book(&owner(), PatientId(1), request(1))
            .expect("Should book");

        assert!(matches!(
            service.transition(&owner(), appt.id, AppointmentStatus::Confirmed, None),
            Err(ClinicError::Forbidden(_))
        ));

        let confirmed = service
            .transition(
                &clinician(),
                appt.id,
                AppointmentStatus::Confirmed,
                Some("Bring labs".to_string()),
            )
            .expect("Should confirm");
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
        assert_eq!(confirmed.notes, "Bring labs");

        let completed = service
            .transition(&admin(), appt.id, AppointmentStatus::Completed, Some(String::new()))
            .expect("Should complete");
        assert_eq!(completed.notes, "Bring labs");
    }

    #[test]
    fn test_patient_cancels_only_own() {
        let service = service();
        let appt = service
            .book(&owner(), PatientId(1), request(1))
            .expect("Should book");

        assert!(matches!(
            service.transition(&stranger(), appt.id, AppointmentStatus::Cancelled, None),
            Err(ClinicError::NotFound(_))
        ));
        let cancelled = service
            .transition(&owner(), appt.id, AppointmentStatus::Cancelled, None)
            .expect("Should cancel");
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

        // Terminal: nothing moves it further, and the failure leaves it unchanged.
        assert!(matches!(
            service.transition(&clinician(), appt.id, AppointmentStatus::Confirmed, None),
            Err(ClinicError::InvalidTransition {
                from: AppointmentStatus::Cancelled,
                to: AppointmentStatus::Confirmed,
            })
        ));
        assert_eq!(
            service.read(&admin(), appt.id).expect("Should read").status,
            AppointmentStatus::Cancelled
        );
    }

    #[test]
    fn test_list_visible_scopes_by_role() {
        let service = service();
        let first = service
            .book(&owner(), PatientId(1), request(48))
            .expect("Should book");
        let second = service
            .book(&stranger(), PatientId(5), request(24))
            .expect("Should book");

        let mine = service.list_visible(&owner(), None).expect("Should list");
        assert_eq!(mine.iter().map(|a| a.id).collect::<Vec<_>>(), vec![first.id]);

        // Ordered by scheduled time.
        let assigned = service.list_visible(&clinician(), None).expect("Should list");
        assert_eq!(assigned.iter().map(|a| a.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let other_clinician = Identity::clinician(UserId(3));
        assert!(service.list_visible(&other_clinician, None).expect("Should list").is_empty());

        service
            .transition(&clinician(), first.id, AppointmentStatus::Confirmed, None)
            .expect("Should confirm");
        let confirmed = service
            .list_visible(&admin(), Some(AppointmentStatus::Confirmed))
            .expect("Should list");
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].id, first.id);
    }

    #[test]
    fn test_list_for_patient_access() {
        let service = service();
        service
            .book(&owner(), PatientId(1), request(1))
            .expect("Should book");

        assert_eq!(service.list_for_patient(&owner(), PatientId(1)).expect("Should list").len(), 1);
        assert_eq!(
            service
                .list_for_patient(&clinician(), PatientId(1))
                .expect("Should list")
                .len(),
            1
        );
        assert!(matches!(
            service.list_for_patient(&stranger(), PatientId(1)),
            Err(ClinicError::Forbidden(_))
        ));
        assert!(matches!(
            service.list_for_patient(&admin(), PatientId(404)),
            Err(ClinicError::NotFound("patient"))
        ));
    }
}
