//! Encrypted-at-rest clinical payloads: medical records and media files.
//!
//! A `ProtectedResource` only ever holds ciphertext. Decrypted views
//! (`MedicalRecordView`, `MediaDownload`) wrap their plaintext in `Zeroizing`
//! and redact it from `Debug`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::identity::{PatientId, UserId};
use super::policy::ResourceKind;
use super::require_text;
use crate::ClinicError;

/// Which kind of protected payload a resource carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    MedicalRecord,
    Media,
}

impl ContentKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MedicalRecord => "medical_record",
            Self::Media => "media",
        }
    }

    #[must_use]
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::MedicalRecord => ResourceKind::MedicalRecord,
            Self::Media => ResourceKind::Media,
        }
    }

    /// Inverse of `resource_kind`; `None` for kinds stored in the clear.
    #[must_use]
    pub fn for_resource(kind: ResourceKind) -> Option<Self> {
        match kind {
            ResourceKind::MedicalRecord => Some(Self::MedicalRecord),
            ResourceKind::Media => Some(Self::Media),
            ResourceKind::Appointment | ResourceKind::Prescription => None,
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "medical_record" => Ok(Self::MedicalRecord),
            "media" => Ok(Self::Media),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// A stored protected resource.
#[derive(Clone, PartialEq)]
pub struct ProtectedResource {
    pub id: i64,
    pub patient_id: PatientId,
    pub creator_id: UserId,
    pub kind: ContentKind,
    /// Record type for medical records, original filename for media.
    pub label: String,
    /// Media category (e.g. `lab_report`); `None` for medical records.
    pub media_type: Option<String>,
    pub ciphertext: Vec<u8>,
    pub plaintext_size: u64,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for ProtectedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedResource")
            .field("id", &self.id)
            .field("patient_id", &self.patient_id)
            .field("kind", &self.kind)
            .field("ciphertext_bytes", &self.ciphertext.len())
            .field("plaintext_size", &self.plaintext_size)
            .finish_non_exhaustive()
    }
}

/// Protected resource row ready for insertion. Holds ciphertext only.
#[derive(Clone)]
pub struct NewProtectedResource {
    pub patient_id: PatientId,
    pub creator_id: UserId,
    pub kind: ContentKind,
    pub label: String,
    pub media_type: Option<String>,
    pub ciphertext: Vec<u8>,
    pub plaintext_size: u64,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied medical record.
#[derive(Clone, Serialize, Deserialize)]
pub struct MedicalRecordRequest {
    /// note, diagnosis, test_result, ...
    pub record_type: String,
    pub content: String,
}

impl MedicalRecordRequest {
    pub const MAX_TYPE_LEN: usize = 100;
    pub const MAX_CONTENT_LEN: usize = 1024 * 1024;

    /// Validate fields already moved out of a request.
    ///
    /// # Errors
    /// Returns `ClinicError::Validation` for an empty type or content.
    pub fn validate_parts(record_type: &str, content: &str) -> Result<(), ClinicError> {
        require_text("record_type", record_type, Self::MAX_TYPE_LEN)?;
        require_text("content", content, Self::MAX_CONTENT_LEN)
    }
}

impl std::fmt::Debug for MedicalRecordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MedicalRecordRequest")
            .field("record_type", &self.record_type)
            .field("content_bytes", &self.content.len())
            .finish()
    }
}

/// A decrypted medical record, alive for one request only.
#[derive(Clone)]
pub struct MedicalRecordView {
    pub id: i64,
    pub patient_id: PatientId,
    pub clinician_id: UserId,
    pub record_type: String,
    pub content: Zeroizing<String>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for MedicalRecordView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MedicalRecordView")
            .field("id", &self.id)
            .field("patient_id", &self.patient_id)
            .field("record_type", &self.record_type)
            .field("content_bytes", &self.content.len())
            .finish_non_exhaustive()
    }
}

/// Default media category when the uploader does not name one.
pub const DEFAULT_MEDIA_TYPE: &str = "lab_report";

/// A file upload before encryption.
#[derive(Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub file_type: String,
    pub bytes: Zeroizing<Vec<u8>>,
}

impl MediaUpload {
    pub const MAX_FILENAME_LEN: usize = 255;

    #[must_use]
    pub fn new(filename: impl Into<String>, file_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            file_type: file_type.unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string()),
            bytes: Zeroizing::new(bytes),
        }
    }

    /// # Errors
    /// Returns `ClinicError::Validation` for unsafe filenames, empty bodies or
    /// bodies over `max_bytes`.
    pub fn validate(&self, max_bytes: usize) -> Result<(), ClinicError> {
        require_text("filename", &self.filename, Self::MAX_FILENAME_LEN)?;
        if self.filename.contains(['/', '\\'])
            || self.filename == "."
            || self.filename == ".."
            || self.filename.chars().any(char::is_control)
        {
            return Err(ClinicError::Validation(
                "filename must be a plain file name".to_string(),
            ));
        }
        require_text("file_type", &self.file_type, 64)?;
        if self.bytes.is_empty() {
            return Err(ClinicError::Validation("upload is empty".to_string()));
        }
        if self.bytes.len() > max_bytes {
            return Err(ClinicError::Validation(format!(
                "upload of {} bytes exceeds the {max_bytes} byte limit",
                self.bytes.len()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MediaUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaUpload")
            .field("filename", &self.filename)
            .field("file_type", &self.file_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

/// Media metadata, safe to list without decrypting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: i64,
    pub patient_id: PatientId,
    pub original_filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&ProtectedResource> for MediaInfo {
    fn from(resource: &ProtectedResource) -> Self {
        Self {
            id: resource.id,
            patient_id: resource.patient_id,
            original_filename: resource.label.clone(),
            file_type: resource
                .media_type
                .clone()
                .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string()),
            file_size: resource.plaintext_size,
            uploaded_by: resource.creator_id,
            uploaded_at: resource.created_at,
        }
    }
}

/// A decrypted media body with its metadata.
#[derive(Clone)]
pub struct MediaDownload {
    pub info: MediaInfo,
    pub bytes: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for MediaDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaDownload")
            .field("info", &self.info)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_view_debug_no_leak() {
        let view = MedicalRecordView {
            id: 1,
            patient_id: PatientId(1),
            clinician_id: UserId(2),
            record_type: "note".to_string(),
            content: Zeroizing::new("Patient reports chest pain".to_string()),
            created_at: Utc::now(),
        };
        let debug_output = format!("{view:?}");
        assert!(!debug_output.contains("chest pain"));
        assert!(debug_output.contains("content_bytes"));
    }

    #[test]
    fn test_upload_filename_rules() {
        let max = 1024;
        assert!(MediaUpload::new("xray.png", None, vec![1, 2, 3]).validate(max).is_ok());

        for bad in ["", "../etc/passwd", "dir/file.txt", "a\\b", "..", "line\nbreak"] {
            let upload = MediaUpload::new(bad, None, vec![1]);
            assert!(
                matches!(upload.validate(max), Err(ClinicError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_upload_size_limits() {
        assert!(MediaUpload::new("empty.pdf", None, Vec::new()).validate(10).is_err());
        assert!(MediaUpload::new("big.pdf", None, vec![0u8; 11]).validate(10).is_err());
        assert!(MediaUpload::new("ok.pdf", None, vec![0u8; 10]).validate(10).is_ok());
    }

    #[test]
    fn test_default_media_type() {
        let upload = MediaUpload::new("scan.dcm", None, vec![1]);
        assert_eq!(upload.file_type, DEFAULT_MEDIA_TYPE);
        let typed = MediaUpload::new("scan.dcm", Some("imaging".to_string()), vec![1]);
        assert_eq!(typed.file_type, "imaging");
    }

    #[test]
    fn test_content_kind_mapping() {
        for kind in [ContentKind::MedicalRecord, ContentKind::Media] {
            assert_eq!(ContentKind::for_resource(kind.resource_kind()), Some(kind));
            assert_eq!(kind.as_str().parse::<ContentKind>(), Ok(kind));
        }
        assert_eq!(ContentKind::for_resource(ResourceKind::Prescription), None);
    }
}
