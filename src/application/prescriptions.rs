//! Prescription mediator. Prescriptions are stored in the clear but scoped
//! to their patient like every other resource.

use std::sync::Arc;

use super::{load_visible, require_patient};
use crate::domain::{
    AccessRequest, Identity, NewPrescription, PatientId, Prescription, PrescriptionRequest,
    ResourceKind,
};
use crate::ports::{ListFilter, NewRecord, Store, Stored};
use crate::{ClinicError, Result};

const KIND: ResourceKind = ResourceKind::Prescription;

/// Service for prescriptions.
pub struct PrescriptionService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> PrescriptionService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Issue a prescription for `patient_id`; `caller` is recorded as the
    /// prescribing clinician.
    ///
    /// # Errors
    /// `Forbidden` for patient callers, `Validation` for missing fields,
    /// `NotFound` if the patient does not exist.
    pub fn write(
        &self,
        caller: &Identity,
        patient_id: PatientId,
        request: PrescriptionRequest,
    ) -> Result<Prescription> {
        let prescription = self.store.transaction(|tx| {
            require_patient(tx, caller, AccessRequest::write(KIND, patient_id))?;
            request.validate()?;

            let id = tx.save(NewRecord::Prescription(NewPrescription::from_request(
                patient_id,
                caller.id(),
                request,
            )))?;
            tx.load(KIND, id)?
                .ok_or(ClinicError::NotFound(KIND.as_str()))?
                .into_prescription()
        })?;

        tracing::info!(
            "Prescription {} issued for patient {} by user {}",
            prescription.id,
            patient_id,
            caller.id()
        );
        Ok(prescription)
    }

    /// # Errors
    /// Returns `NotFound` if the prescription is absent or not visible to `caller`.
    pub fn read(&self, caller: &Identity, id: i64) -> Result<Prescription> {
        self.store
            .transaction(|tx| load_visible(tx, caller, KIND, id)?.into_prescription())
    }

    /// # Errors
    /// `Forbidden` for another patient's id, `NotFound` for an unknown patient.
    pub fn list_for_patient(
        &self,
        caller: &Identity,
        patient_id: PatientId,
    ) -> Result<Vec<Prescription>> {
        self.store.transaction(|tx| {
            require_patient(tx, caller, AccessRequest::read(KIND, patient_id))?;
            tx.list(KIND, &ListFilter::for_patient(patient_id))?
                .into_iter()
                .map(Stored::into_prescription)
                .collect()
        })
    }
}
