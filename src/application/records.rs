//! Medical record mediator.
//!
//! Record content is encrypted before it reaches the store and decrypted only
//! after an authorized load. Decryption happens outside the store transaction
//! and the plaintext lives in a `Zeroizing` buffer.

use std::sync::Arc;

use chrono::Utc;
use zeroize::Zeroizing;

use super::{load_visible, require_patient};
use crate::domain::{
    AccessRequest, ContentKind, Identity, MedicalRecordRequest, MedicalRecordView,
    NewProtectedResource, PatientId, ProtectedResource, ResourceKind,
};
use crate::ports::{ListFilter, NewRecord, PayloadCipher, Store};
use crate::{ClinicError, Result};

const KIND: ResourceKind = ResourceKind::MedicalRecord;

/// Service for encrypted medical records.
pub struct MedicalRecordService<S: Store, C: PayloadCipher> {
    store: Arc<S>,
    cipher: Arc<C>,
}

impl<S: Store, C: PayloadCipher> MedicalRecordService<S, C> {
    pub fn new(store: Arc<S>, cipher: Arc<C>) -> Self {
        Self { store, cipher }
    }

    /// Encrypt and store a record for `patient_id`, authored by `caller`.
    ///
    /// # Errors
    /// - `Forbidden` for patient callers
    /// - `Validation` for an empty type or content
    /// - `NotFound` if the patient does not exist
    pub fn write(
        &self,
        caller: &Identity,
        patient_id: PatientId,
        request: MedicalRecordRequest,
    ) -> Result<MedicalRecordView> {
        let MedicalRecordRequest { record_type, content } = request;
        let content = Zeroizing::new(content);
        let record_type = record_type.trim().to_string();

        let resource = self.store.transaction(|tx| {
            require_patient(tx, caller, AccessRequest::write(KIND, patient_id))?;
            MedicalRecordRequest::validate_parts(&record_type, &content)?;

            let ciphertext = self.cipher.encrypt(content.as_bytes())?;
            let id = tx.save(NewRecord::Protected(NewProtectedResource {
                patient_id,
                creator_id: caller.id(),
                kind: ContentKind::MedicalRecord,
                label: record_type.clone(),
                media_type: None,
                ciphertext,
                plaintext_size: content.len() as u64,
                created_at: Utc::now(),
            }))?;
            tx.load(KIND, id)?
                .ok_or(ClinicError::NotFound(KIND.as_str()))?
                .into_protected(ContentKind::MedicalRecord)
        })?;

        tracing::info!(
            "Medical record {} stored for patient {} by user {}",
            resource.id,
            patient_id,
            caller.id()
        );
        Ok(view(&resource, content))
    }

    /// Load and decrypt one record.
    ///
    /// # Errors
    /// - `NotFound` if the record is absent or not visible to `caller`
    /// - `DecryptionFailed` if the stored ciphertext fails authentication
    pub fn read(&self, caller: &Identity, id: i64) -> Result<MedicalRecordView> {
        let resource = self.store.transaction(|tx| {
            load_visible(tx, caller, KIND, id)?.into_protected(ContentKind::MedicalRecord)
        })?;
        self.open(&resource)
    }

    /// All records of one patient, newest first, decrypted.
    ///
    /// # Errors
    /// `Forbidden` for another patient's id, `NotFound` for an unknown patient,
    /// `DecryptionFailed` if any record fails authentication.
    pub fn list_for_patient(
        &self,
        caller: &Identity,
        patient_id: PatientId,
    ) -> Result<Vec<MedicalRecordView>> {
        let resources = self.store.transaction(|tx| {
            require_patient(tx, caller, AccessRequest::read(KIND, patient_id))?;
            tx.list(KIND, &ListFilter::for_patient(patient_id))?
                .into_iter()
                .map(|stored| stored.into_protected(ContentKind::MedicalRecord))
                .collect::<Result<Vec<_>>>()
        })?;

        resources.iter().map(|resource| self.open(resource)).collect()
    }

    fn open(&self, resource: &ProtectedResource) -> Result<MedicalRecordView> {
        let plaintext = self.cipher.decrypt(&resource.ciphertext).map_err(|e| {
            tracing::warn!("Medical record {} failed decryption", resource.id);
            ClinicError::from(e)
        })?;

        let content = String::from_utf8(plaintext).map_err(|e| {
            drop(Zeroizing::new(e.into_bytes()));
            tracing::warn!("Medical record {} decrypted to invalid UTF-8", resource.id);
            ClinicError::DecryptionFailed
        })?;

        Ok(view(resource, Zeroizing::new(content)))
    }
}

fn view(resource: &ProtectedResource, content: Zeroizing<String>) -> MedicalRecordView {
    MedicalRecordView {
        id: resource.id,
        patient_id: resource.patient_id,
        clinician_id: resource.creator_id,
        record_type: resource.label.clone(),
        content,
        created_at: resource.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AesGcmCipher, SqliteStore};
    use crate::application::testing::{admin, cipher, clinician, owner, store, stranger};
    use rusqlite::params;

    fn service() -> (Arc<SqliteStore>, MedicalRecordService<SqliteStore, AesGcmCipher>) {
        let store = store();
        (store.clone(), MedicalRecordService::new(store, cipher()))
    }

    fn note(content: &str) -> MedicalRecordRequest {
        MedicalRecordRequest {
            record_type: "note".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_clinician_writes_owner_reads_plaintext() {
        let (store, service) = service();
        let written = service
            .write(&clinician(), PatientId(1), note("BP 128/82, continue lisinopril"))
            .expect("Should write");
        assert_eq!(written.clinician_id, crate::domain::UserId(2));

        let read = service.read(&owner(), written.id).expect("Should read");
        assert_eq!(read.content.as_str(), "BP 128/82, continue lisinopril");
        assert_eq!(read.record_type, "note");

        // The row holds ciphertext only.
        let stored: Vec<u8> = store.raw(|conn| {
            conn.query_row(
                "SELECT ciphertext FROM protected_resources WHERE id = ?1",
                params![written.id],
                |row| row.get(0),
            )
        });
        assert!(!stored.windows(10).any(|w| w == b"lisinopril"));
    }

    #[test]
    fn test_other_patient_gets_hidden_not_found() {
        let (_, service) = service();
        let written = service
            .write(&clinician(), PatientId(1), note("confidential"))
            .expect("Should write");

        let err = service.read(&stranger(), written.id).expect_err("Should be hidden");
        assert!(matches!(err, ClinicError::NotFound("medical_record")));
        assert!(matches!(
            service.list_for_patient(&stranger(), PatientId(1)),
            Err(ClinicError::Forbidden(_))
        ));
    }

    #[test]
    fn test_patients_cannot_write_records() {
        let (_, service) = service();
        for caller in [owner(), stranger()] {
            assert!(matches!(
                service.write(&caller, PatientId(1), note("self-diagnosis")),
                Err(ClinicError::Forbidden(_))
            ));
        }
    }

    #[test]
    fn test_write_validation_and_unknown_patient() {
        let (_, service) = service();
        assert!(matches!(
            service.write(&clinician(), PatientId(1), note("   ")),
            Err(ClinicError::Validation(_))
        ));
        assert!(matches!(
            service.write(&admin(), PatientId(404), note("text")),
            Err(ClinicError::NotFound("patient"))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_distinctly() {
        let (store, service) = service();
        let written = service
            .write(&clinician(), PatientId(1), note("HbA1c 6.1%"))
            .expect("Should write");

        store.raw(|conn| {
            let mut blob: Vec<u8> = conn.query_row(
                "SELECT ciphertext FROM protected_resources WHERE id = ?1",
                params![written.id],
                |row| row.get(0),
            )?;
            let last = blob.len() - 1;
            blob[last] ^= 0x01;
            conn.execute(
                "UPDATE protected_resources SET ciphertext = ?1 WHERE id = ?2",
                params![blob, written.id],
            )
        });

        assert!(matches!(
            service.read(&clinician(), written.id),
            Err(ClinicError::DecryptionFailed)
        ));
        assert!(matches!(
            service.list_for_patient(&owner(), PatientId(1)),
            Err(ClinicError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_list_newest_first() {
        let (_, service) = service();
        let first = service
            .write(&clinician(), PatientId(1), note("first"))
            .expect("Should write");
        let second = service
            .write(&admin(), PatientId(1), note("second"))
            .expect("Should write");

        let listed = service
            .list_for_patient(&owner(), PatientId(1))
            .expect("Should list");
        let ids: Vec<i64> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(service
            .list_for_patient(&stranger(), PatientId(5))
            .expect("Should list")
            .is_empty());
    }
}
