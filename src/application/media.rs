//! Media mediator: encrypted file uploads such as lab reports and imaging.
//!
//! File bodies are encrypted as a whole; metadata (filename, category, size)
//! stays readable so listings never decrypt anything.

use std::sync::Arc;

use chrono::Utc;
use zeroize::Zeroizing;

use super::{load_visible, require_patient};
use crate::domain::{
    AccessRequest, ContentKind, Identity, MediaDownload, MediaInfo, MediaUpload,
    NewProtectedResource, PatientId, ResourceKind,
};
use crate::ports::{ListFilter, NewRecord, PayloadCipher, Store};
use crate::{ClinicError, Result};

const KIND: ResourceKind = ResourceKind::Media;

/// Service for encrypted media files.
pub struct MediaService<S: Store, C: PayloadCipher> {
    store: Arc<S>,
    cipher: Arc<C>,
    max_upload_bytes: usize,
}

impl<S: Store, C: PayloadCipher> MediaService<S, C> {
    pub fn new(store: Arc<S>, cipher: Arc<C>, max_upload_bytes: usize) -> Self {
        Self {
            store,
            cipher,
            max_upload_bytes,
        }
    }

    /// Encrypt and store an uploaded file for `patient_id`.
    ///
    /// Patients may upload to their own profile.
    ///
    /// # Errors
    /// - `Forbidden` if a patient uploads for someone else
    /// - `Validation` for an unsafe filename, an empty body or an oversized body
    /// - `NotFound` if the patient does not exist
    pub fn upload(
        &self,
        caller: &Identity,
        patient_id: PatientId,
        upload: MediaUpload,
    ) -> Result<MediaInfo> {
        let info = self.store.transaction(|tx| {
            require_patient(tx, caller, AccessRequest::write(KIND, patient_id))?;
            upload.validate(self.max_upload_bytes)?;

            let ciphertext = self.cipher.encrypt(&upload.bytes)?;
            let id = tx.save(NewRecord::Protected(NewProtectedResource {
                patient_id,
                creator_id: caller.id(),
                kind: ContentKind::Media,
                label: upload.filename.clone(),
                media_type: Some(upload.file_type.clone()),
                ciphertext,
                plaintext_size: upload.bytes.len() as u64,
                created_at: Utc::now(),
            }))?;
            let stored = tx
                .load(KIND, id)?
                .ok_or(ClinicError::NotFound(KIND.as_str()))?
                .into_protected(ContentKind::Media)?;
            Ok(MediaInfo::from(&stored))
        })?;

        tracing::info!(
            "Media {} ({} bytes) uploaded for patient {} by user {}",
            info.id,
            info.file_size,
            patient_id,
            caller.id()
        );
        Ok(info)
    }

    /// Metadata of one file, without decrypting it.
    ///
    /// # Errors
    /// Returns `NotFound` if the file is absent or not visible to `caller`.
    pub fn info(&self, caller: &Identity, id: i64) -> Result<MediaInfo> {
        self.store.transaction(|tx| {
            let resource = load_visible(tx, caller, KIND, id)?.into_protected(ContentKind::Media)?;
            Ok(MediaInfo::from(&resource))
        })
    }

    /// Load and decrypt one file.
    ///
    /// # Errors
    /// - `NotFound` if the file is absent or not visible to `caller`
    /// - `DecryptionFailed` if the stored ciphertext fails authentication
    pub fn download(&self, caller: &Identity, id: i64) -> Result<MediaDownload> {
        let resource = self.store.transaction(|tx| {
            load_visible(tx, caller, KIND, id)?.into_protected(ContentKind::Media)
        })?;

        let bytes = self.cipher.decrypt(&resource.ciphertext).map_err(|e| {
            tracing::warn!("Media {} failed decryption", resource.id);
            ClinicError::from(e)
        })?;

        Ok(MediaDownload {
            info: MediaInfo::from(&resource),
            bytes: Zeroizing::new(bytes),
        })
    }

    /// Metadata of every file of one patient, newest first.
    ///
    /// # Errors
    /// `Forbidden` for another patient's id, `NotFound` for an unknown patient.
    pub fn list_for_patient(
        &self,
        caller: &Identity,
        patient_id: PatientId,
    ) -> Result<Vec<MediaInfo>> {
        self.store.transaction(|tx| {
            require_patient(tx, caller, AccessRequest::read(KIND, patient_id))?;
            tx.list(KIND, &ListFilter::for_patient(patient_id))?
                .into_iter()
                .map(|stored| {
                    let resource = stored.into_protected(ContentKind::Media)?;
                    Ok::<_, ClinicError>(MediaInfo::from(&resource))
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AesGcmCipher, SqliteStore};
    use crate::application::testing::{cipher, clinician, owner, store, stranger};
    use crate::domain::{UserId, DEFAULT_MEDIA_TYPE};

    const MAX: usize = 64;

    fn service() -> MediaService<SqliteStore, AesGcmCipher> {
        MediaService::new(store(), cipher(), MAX)
    }

    fn pdf() -> MediaUpload {
        MediaUpload::new("cbc.pdf", None, b"%PDF-1.7 hemoglobin 13.9".to_vec())
    }

    #[test]
    fn test_patient_uploads_and_downloads_own_file() {
        let service = service();
        let info = service
            .upload(&owner(), PatientId(1), pdf())
            .expect("Should upload");
        assert_eq!(info.original_filename, "cbc.pdf");
        assert_eq!(info.file_type, DEFAULT_MEDIA_TYPE);
        assert_eq!(info.uploaded_by, UserId(10));
        assert_eq!(info.file_size, 24);

        let download = service.download(&clinician(), info.id).expect("Should download");
        assert_eq!(download.bytes.as_slice(), b"%PDF-1.7 hemoglobin 13.9");
        assert_eq!(download.info, info);
        assert_eq!(service.info(&owner(), info.id).expect("Should describe"), info);
    }

    #[test]
    fn test_foreign_media_hidden() {
        let service = service();
        let info = service
            .upload(&clinician(), PatientId(1), pdf())
            .expect("Should upload");

        assert!(matches!(
            service.download(&stranger(), info.id),
            Err(ClinicError::NotFound("media"))
        ));
        assert!(matches!(
            service.info(&stranger(), info.id),
            Err(ClinicError::NotFound("media"))
        ));
        assert!(matches!(
            service.upload(&stranger(), PatientId(1), pdf()),
            Err(ClinicError::Forbidden(_))
        ));
    }

    #[test]
    fn test_upload_limits_enforced() {
        let service = service();
        let oversized =
            MediaUpload::new("scan.dcm", Some("imaging".to_string()), vec![7u8; MAX + 1]);
        assert!(matches!(
            service.upload(&clinician(), PatientId(1), oversized),
            Err(ClinicError::Validation(_))
        ));

        let traversal = MediaUpload::new("../../etc/passwd", None, vec![1]);
        assert!(matches!(
            service.upload(&clinician(), PatientId(1), traversal),
            Err(ClinicError::Validation(_))
        ));
    }

    #[test]
    fn test_listing_returns_metadata_only() {
        let service = service();
        service
            .upload(&owner(), PatientId(1), pdf())
            .expect("Should upload");
        service
            .upload(
                &clinician(),
                PatientId(1),
                MediaUpload::new("xray.png", Some("imaging".to_string()), vec![1, 2, 3]),
            )
            .expect("Should upload");

        let listed = service
            .list_for_patient(&owner(), PatientId(1))
            .expect("Should list");
        let names: Vec<&str> = listed.iter().map(|m| m.original_filename.as_str()).collect();
        assert_eq!(names, vec!["xray.png", "cbc.pdf"]);
        assert!(matches!(
            service.list_for_patient(&stranger(), PatientId(1)),
            Err(ClinicError::Forbidden(_))
        ));
    }
}
