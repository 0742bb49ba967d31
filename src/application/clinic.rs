//! Composition root: one handle that owns the adapters and hands out the
//! resource services, plus bearer authentication.

use std::sync::Arc;

use crate::adapters::{bearer_token, AesGcmCipher, Argon2Passwords, JwtCredentials, SqliteStore};
use crate::config::ClinicConfig;
use crate::domain::Identity;
use crate::ports::{CredentialVerifier, PasswordHashing, PayloadCipher, Store, TokenIssuer};
use crate::{ClinicError, Result};

use super::{
    AccountService, AppointmentService, MediaService, MedicalRecordService, PrescriptionService,
};

/// All services built over one store, cipher and credential pair.
pub struct Clinic<S, C, K, H>
where
    S: Store,
    C: PayloadCipher,
    K: CredentialVerifier + TokenIssuer,
    H: PasswordHashing,
{
    credentials: Arc<K>,
    appointments: AppointmentService<S>,
    records: MedicalRecordService<S, C>,
    prescriptions: PrescriptionService<S>,
    media: MediaService<S, C>,
    accounts: AccountService<S, H, K>,
}

/// The production wiring.
pub type SqliteClinic = Clinic<SqliteStore, AesGcmCipher, JwtCredentials, Argon2Passwords>;

impl<S, C, K, H> Clinic<S, C, K, H>
where
    S: Store,
    C: PayloadCipher,
    K: CredentialVerifier + TokenIssuer,
    H: PasswordHashing,
{
    /// # Errors
    /// Returns `ClinicError::Unavailable` if the account service cannot be
    /// initialized.
    pub fn new(
        store: Arc<S>,
        cipher: Arc<C>,
        credentials: Arc<K>,
        hasher: Arc<H>,
        max_upload_bytes: usize,
    ) -> Result<Self> {
        Ok(Self {
            appointments: AppointmentService::new(store.clone()),
            records: MedicalRecordService::new(store.clone(), cipher.clone()),
            prescriptions: PrescriptionService::new(store.clone()),
            media: MediaService::new(store.clone(), cipher, max_upload_bytes),
            accounts: AccountService::new(store, hasher, credentials.clone())?,
            credentials,
        })
    }

    /// Recover the caller from a raw bearer token.
    ///
    /// # Errors
    /// Returns `Unauthenticated` for any token that does not verify.
    pub fn authenticate(&self, token: &str) -> Result<Identity> {
        self.credentials.verify(token).map_err(|e| {
            tracing::debug!("Rejected bearer token");
            e
        })
    }

    /// Recover the caller from an `Authorization` header value.
    ///
    /// # Errors
    /// Returns `Unauthenticated` if the header is absent, not a bearer
    /// header, or carries a token that does not verify.
    pub fn authenticate_header(&self, header_value: Option<&str>) -> Result<Identity> {
        let token = header_value
            .and_then(bearer_token)
            .ok_or(ClinicError::Unauthenticated)?;
        self.authenticate(token)
    }

    pub fn appointments(&self) -> &AppointmentService<S> {
        &self.appointments
    }

    pub fn records(&self) -> &MedicalRecordService<S, C> {
        &self.records
    }

    pub fn prescriptions(&self) -> &PrescriptionService<S> {
        &self.prescriptions
    }

    pub fn media(&self) -> &MediaService<S, C> {
        &self.media
    }

    pub fn accounts(&self) -> &AccountService<S, H, K> {
        &self.accounts
    }
}

impl SqliteClinic {
    /// Open the database and build every adapter from `config`.
    ///
    /// # Errors
    /// Returns `ClinicError::Unavailable` if the database cannot be opened or
    /// an adapter rejects its key material.
    pub fn from_config(config: &ClinicConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.db_path)?);
        let cipher = Arc::new(AesGcmCipher::new(&config.cipher_key)?);
        let credentials =
            Arc::new(JwtCredentials::new(&config.signing_secret, config.token_ttl)?);
        let hasher = Arc::new(Argon2Passwords::new()?);

        tracing::info!(
            "Clinic core ready (db={}, cipher={}, token_ttl={}m)",
            config.db_path.display(),
            cipher.key_fingerprint(),
            credentials.ttl().num_minutes()
        );
        Self::new(store, cipher, credentials, hasher, config.max_upload_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{cipher, store};
    use crate::application::Registration;
    use crate::domain::{
        MediaUpload, MedicalRecordRequest, PatientId, PrescriptionRequest, Role, SigningSecret,
        UserId,
    };
    use rusqlite::params;

    fn clinic() -> (Arc<SqliteStore>, SqliteClinic) {
        let store = store();
        let secret = SigningSecret::new(vec![9; 32]).expect("Should build secret");
        let credentials = Arc::new(
            JwtCredentials::new(&secret, chrono::Duration::minutes(30)).expect("Should build jwt"),
        );
        let hasher =
            Arc::new(Argon2Passwords::with_params(8 * 1024, 1, 1).expect("Should build hasher"));
        let clinic = Clinic::new(store.clone(), cipher(), credentials, hasher, 1024)
            .expect("Should build clinic");
        (store, clinic)
    }

    fn token_for(clinic: &SqliteClinic, identity: &Identity) -> String {
        clinic.credentials.issue(identity).expect("Should issue").token
    }

    fn note(content: &str) -> MedicalRecordRequest {
        MedicalRecordRequest {
            record_type: "progress_note".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_record_flow_through_bearer_tokens() {
        let (_, clinic) = clinic();
        let doctor_token = token_for(&clinic, &Identity::clinician(UserId(2)));
        let owner_token = token_for(&clinic, &Identity::patient(UserId(10), PatientId(1)));
        let stranger_token = token_for(&clinic, &Identity::patient(UserId(20), PatientId(5)));

        let doctor = clinic
            .authenticate_header(Some(&format!("Bearer {doctor_token}")))
            .expect("Should authenticate");
        let written = clinic
            .records()
            .write(&doctor, PatientId(1), note("Allergic to penicillin"))
            .expect("Should write");

        let owner = clinic.authenticate(&owner_token).expect("Should authenticate");
        let read = clinic.records().read(&owner, written.id).expect("Should read");
        assert_eq!(read.content.as_str(), "Allergic to penicillin");

        let stranger = clinic.authenticate(&stranger_token).expect("Should authenticate");
        assert!(matches!(
            clinic.records().read(&stranger, written.id),
            Err(ClinicError::NotFound("medical_record"))
        ));
    }

    #[test]
    fn test_missing_or_bad_header_unauthenticated() {
        let (_, clinic) = clinic();
        for header in [None, Some(""), Some("Basic abc"), Some("Bearer not.a.jwt")] {
            assert!(matches!(
                clinic.authenticate_header(header),
                Err(ClinicError::Unauthenticated)
            ));
        }
    }

    #[test]
    fn test_admin_reaches_every_resource_kind() {
        let (_, clinic) = clinic();
        let admin = Identity::admin(UserId(1));

        let record = clinic
            .records()
            .write(&admin, PatientId(5), note("Intake"))
            .expect("Should write record");
        let prescription = clinic
            .prescriptions()
            .write(
                &admin,
                PatientId(5),
                PrescriptionRequest {
                    medication_name: "Amoxicillin".to_string(),
                    dosage: "250mg".to_string(),
                    frequency: "three times daily".to_string(),
                    duration: "7 days".to_string(),
                    notes: String::new(),
                },
            )
            .expect("Should write prescription");
        let media = clinic
            .media()
            .upload(&admin, PatientId(5), MediaUpload::new("ecg.png", None, vec![0x89, 0x50]))
            .expect("Should upload");

        let read_record = clinic.records().read(&admin, record.id).expect("Should read");
        assert_eq!(read_record.record_type, "progress_note");
        assert_eq!(
            clinic
                .prescriptions()
                .read(&admin, prescription.id)
                .expect("Should read"),
            prescription
        );
        let download = clinic
            .media()
            .download(&admin, media.id)
            .expect("Should download");
        assert_eq!(download.bytes.to_vec(), vec![0x89, 0x50]);
    }

    #[test]
    fn test_tampered_media_fails_integrity() {
        let (store, clinic) = clinic();
        let clinician = Identity::clinician(UserId(2));
        let media = clinic
            .media()
            .upload(
                &clinician,
                PatientId(1),
                MediaUpload::new("mri.dcm", Some("imaging".to_string()), vec![5; 32]),
            )
            .expect("Should upload");

        store.raw(|conn| {
            let mut blob: Vec<u8> = conn.query_row(
                "SELECT ciphertext FROM protected_resources WHERE id = ?1",
                params![media.id],
                |row| row.get(0),
            )?;
            blob[20] ^= 0x80;
            conn.execute(
                "UPDATE protected_resources SET ciphertext = ?1 WHERE id = ?2",
                params![blob, media.id],
            )
        });

        assert!(matches!(
            clinic.media().download(&clinician, media.id),
            Err(ClinicError::DecryptionFailed)
        ));
        // Metadata stays readable.
        let info = clinic
            .media()
            .info(&clinician, media.id)
            .expect("Should describe");
        assert_eq!(info.file_size, 32);
    }

    #[test]
    fn test_register_login_authenticate() {
        let (_, clinic) = clinic();
        let registered = clinic
            .accounts()
            .register(&Registration::new(
                "m.curie",
                "curie@clinic.test",
                "radium-1898",
                Role::Patient,
            ))
            .expect("Should register");

        let outcome = clinic
            .accounts()
            .login("m.curie", "radium-1898")
            .expect("Should log in");
        let caller = clinic
            .authenticate_header(Some(&format!("bearer {}", outcome.token.token)))
            .expect("Should authenticate");
        assert_eq!(caller, registered);

        // A fresh patient sees only their own, empty, history.
        let patient_id = caller.linked_patient().expect("Should be linked");
        assert!(clinic
            .records()
            .list_for_patient(&caller, patient_id)
            .expect("Should list")
            .is_empty());
        assert!(matches!(
            clinic.records().list_for_patient(&caller, PatientId(1)),
            Err(ClinicError::Forbidden(_))
        ));
    }
}
