//! SQLite adapter: Implementation of `Store`.
//!
//! Provides local persistence for accounts, patients and patient-owned
//! resources. Protected resources are stored as ciphertext only.
//!
//! # Transactions
//!
//! Every `Store::transaction` call opens an `IMMEDIATE` transaction, so the
//! write lock is taken before the first read. An ownership check and the
//! mutation that depends on it cannot be separated by another writer.
//!
//! # Mutex Behavior
//!
//! The connection is protected by a `Mutex`. A poisoned mutex is reported as
//! `StorageError::Poisoned` (surfaced as `ClinicError::Unavailable`).

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::domain::{
    Appointment, AppointmentStatus, ContentKind, NewUser, Patient, PatientId, Prescription,
    ProtectedResource, ResourceKind, Role, UserAccount, UserId,
};
use crate::ports::{ListFilter, NewRecord, Store, Stored, Transaction};
use crate::{ClinicError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection lock poisoned")]
    Poisoned,
}

impl From<StorageError> for ClinicError {
    fn from(err: StorageError) -> Self {
        tracing::error!("Storage failure: {err}");
        ClinicError::Unavailable(err.to_string())
    }
}

impl From<rusqlite::Error> for ClinicError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::from(err).into()
    }
}

/// SQLite storage adapter.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or initialized.
    pub fn open<P: AsRef<Path>>(path: P) -> std::result::Result<Self, StorageError> {
        Self::init(Connection::open(path)?)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if the database cannot be created.
    pub fn in_memory() -> std::result::Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> std::result::Result<Self, StorageError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('admin', 'clinician', 'patient')),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS appointments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    clinician_id INTEGER NOT NULL REFERENCES users(id),
    scheduled_for TEXT NOT NULL,
    reason TEXT NOT NULL,
    notes TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL CHECK (status IN ('scheduled', 'confirmed', 'completed', 'cancelled')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prescriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    clinician_id INTEGER NOT NULL REFERENCES users(id),
    medication_name TEXT NOT NULL,
    dosage TEXT NOT NULL,
    frequency TEXT NOT NULL,
    duration TEXT NOT NULL,
    notes TEXT NOT NULL DEFAULT '',
    issued_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS protected_resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    creator_id INTEGER NOT NULL REFERENCES users(id),
    kind TEXT NOT NULL CHECK (kind IN ('medical_record', 'media')),
    label TEXT NOT NULL,
    media_type TEXT,
    ciphertext BLOB NOT NULL,
    plaintext_size INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id);
CREATE INDEX IF NOT EXISTS idx_appointments_clinician ON appointments(clinician_id);
CREATE INDEX IF NOT EXISTS idx_prescriptions_patient ON prescriptions(patient_id);
CREATE INDEX IF NOT EXISTS idx_protected_patient_kind ON protected_resources(patient_id, kind);
";

impl Store for SqliteStore {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Dropping `tx` without commit rolls back.
        let out = {
            let mut scope = SqliteTransaction { conn: &*tx };
            f(&mut scope)?
        };

        tx.commit()?;
        Ok(out)
    }
}

struct SqliteTransaction<'t> {
    conn: &'t Connection,
}

const APPOINTMENT_COLUMNS: &str =
    "id, patient_id, clinician_id, scheduled_for, reason, notes, status, created_at, updated_at";
const PRESCRIPTION_COLUMNS: &str =
    "id, patient_id, clinician_id, medication_name, dosage, frequency, duration, notes, issued_at";
const PROTECTED_COLUMNS: &str =
    "id, patient_id, creator_id, kind, label, media_type, ciphertext, plaintext_size, created_at";
const USER_COLUMNS: &str = "id, username, email, password_hash, role, created_at";

/// Fixed-width UTC timestamps, so text order is time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp {raw:?}: {e}")))
}

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    let status: String = row.get(6)?;
    Ok(Appointment {
        id: row.get(0)?,
        patient_id: PatientId(row.get(1)?),
        clinician_id: UserId(row.get(2)?),
        scheduled_for: time_at(row, 3)?,
        reason: row.get(4)?,
        notes: row.get(5)?,
        status: status
            .parse::<AppointmentStatus>()
            .map_err(|e| conversion_error(6, e.to_string()))?,
        created_at: time_at(row, 7)?,
        updated_at: time_at(row, 8)?,
    })
}

fn prescription_from_row(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: row.get(0)?,
        patient_id: PatientId(row.get(1)?),
        clinician_id: UserId(row.get(2)?),
        medication_name: row.get(3)?,
        dosage: row.get(4)?,
        frequency: row.get(5)?,
        duration: row.get(6)?,
        notes: row.get(7)?,
        issued_at: time_at(row, 8)?,
    })
}

fn protected_from_row(row: &Row<'_>) -> rusqlite::Result<ProtectedResource> {
    let kind: String = row.get(3)?;
    let plaintext_size: i64 = row.get(7)?;
    Ok(ProtectedResource {
        id: row.get(0)?,
        patient_id: PatientId(row.get(1)?),
        creator_id: UserId(row.get(2)?),
        kind: kind.parse::<ContentKind>().map_err(|e| conversion_error(3, e))?,
        label: row.get(4)?,
        media_type: row.get(5)?,
        ciphertext: row.get(6)?,
        plaintext_size: u64::try_from(plaintext_size)
            .map_err(|_| conversion_error(7, format!("negative size {plaintext_size}")))?,
        created_at: time_at(row, 8)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserAccount> {
    let role: String = row.get(4)?;
    Ok(UserAccount {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: role.parse::<Role>().map_err(|e| conversion_error(4, e))?,
        created_at: time_at(row, 5)?,
    })
}

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: PatientId(row.get(0)?),
        user_id: UserId(row.get(1)?),
    })
}

impl Transaction for SqliteTransaction<'_> {
    fn load(&mut self, kind: ResourceKind, id: i64) -> Result<Option<Stored>> {
        let stored = match kind {
            ResourceKind::Appointment => self
                .conn
                .query_row(
                    &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
                    params![id],
                    appointment_from_row,
                )
                .optional()?
                .map(Stored::Appointment),
            ResourceKind::Prescription => self
                .conn
                .query_row(
                    &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?1"),
                    params![id],
                    prescription_from_row,
                )
                .optional()?
                .map(Stored::Prescription),
            ResourceKind::MedicalRecord | ResourceKind::Media => {
                let content = ContentKind::for_resource(kind)
                    .ok_or_else(|| ClinicError::Unavailable(format!("{kind} is not protected")))?;
                self.conn
                    .query_row(
                        &format!(
                            "SELECT {PROTECTED_COLUMNS} FROM protected_resources
                             WHERE id = ?1 AND kind = ?2"
                        ),
                        params![id, content.as_str()],
                        protected_from_row,
                    )
                    .optional()?
                    .map(Stored::Protected)
            }
        };
        Ok(stored)
    }

    fn save(&mut self, record: NewRecord) -> Result<i64> {
        match record {
            NewRecord::Appointment(a) => {
                self.conn.execute(
                    r"
                    INSERT INTO appointments (
                        patient_id, clinician_id, scheduled_for, reason, notes,
                        status, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    ",
                    params![
                        a.patient_id.0,
                        a.clinician_id.0,
                        ts(a.scheduled_for),
                        a.reason,
                        a.notes,
                        AppointmentStatus::Scheduled.as_str(),
                        ts(a.created_at),
                    ],
                )?;
            }
            NewRecord::Prescription(p) => {
                self.conn.execute(
                    r"
                    INSERT INTO prescriptions (
                        patient_id, clinician_id, medication_name, dosage,
                        frequency, duration, notes, issued_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ",
                    params![
                        p.patient_id.0,
                        p.clinician_id.0,
                        p.medication_name,
                        p.dosage,
                        p.frequency,
                        p.duration,
                        p.notes,
                        ts(p.issued_at),
                    ],
                )?;
            }
            NewRecord::Protected(r) => {
                let size = i64::try_from(r.plaintext_size)
                    .map_err(|_| ClinicError::Validation("payload too large".to_string()))?;
                self.conn.execute(
                    r"
                    INSERT INTO protected_resources (
                        patient_id, creator_id, kind, label, media_type,
                        ciphertext, plaintext_size, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ",
                    params![
                        r.patient_id.0,
                        r.creator_id.0,
                        r.kind.as_str(),
                        r.label,
                        r.media_type,
                        r.ciphertext,
                        size,
                        ts(r.created_at),
                    ],
                )?;
            }
        }

        let id = self.conn.last_insert_rowid();
        tracing::debug!("Inserted row {id}");
        Ok(id)
    }

    fn update_appointment(&mut self, appointment: &Appointment) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE appointments SET status = ?1, notes = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                appointment.status.as_str(),
                appointment.notes,
                ts(appointment.updated_at),
                appointment.id,
            ],
        )?;
        if changed == 0 {
            return Err(ClinicError::Unavailable(format!(
                "appointment {} vanished during update",
                appointment.id
            )));
        }
        Ok(())
    }

    fn list(&mut self, kind: ResourceKind, filter: &ListFilter) -> Result<Vec<Stored>> {
        let patient = filter.patient_id.map(|p| p.0);
        let clinician = filter.clinician_id.map(|c| c.0);

        let rows = match kind {
            ResourceKind::Appointment => {
                let mut stmt = self.conn.prepare(&format!(
                    r"
                    SELECT {APPOINTMENT_COLUMNS} FROM appointments
                    WHERE (?1 IS NULL OR patient_id = ?1)
                      AND (?2 IS NULL OR clinician_id = ?2)
                      AND (?3 IS NULL OR status = ?3)
                    ORDER BY scheduled_for ASC, id ASC
                    "
                ))?;
                let status = filter.status.map(|s| s.as_str());
                let rows = stmt
                    .query_map(params![patient, clinician, status], appointment_from_row)?
                    .map(|r| r.map(Stored::Appointment))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            ResourceKind::Prescription => {
                let mut stmt = self.conn.prepare(&format!(
                    r"
                    SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions
                    WHERE (?1 IS NULL OR patient_id = ?1)
                      AND (?2 IS NULL OR clinician_id = ?2)
                    ORDER BY issued_at DESC, id DESC
                    "
                ))?;
                let rows = stmt
                    .query_map(params![patient, clinician], prescription_from_row)?
                    .map(|r| r.map(Stored::Prescription))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            ResourceKind::MedicalRecord | ResourceKind::Media => {
                let content = ContentKind::for_resource(kind)
                    .ok_or_else(|| ClinicError::Unavailable(format!("{kind} is not protected")))?;
                let mut stmt = self.conn.prepare(&format!(
                    r"
                    SELECT {PROTECTED_COLUMNS} FROM protected_resources
                    WHERE kind = ?1
                      AND (?2 IS NULL OR patient_id = ?2)
                      AND (?3 IS NULL OR creator_id = ?3)
                    ORDER BY created_at DESC, id DESC
                    "
                ))?;
                let rows = stmt
                    .query_map(params![content.as_str(), patient, clinician], protected_from_row)?
                    .map(|r| r.map(Stored::Protected))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(rows)
    }

    fn patient(&mut self, id: PatientId) -> Result<Option<Patient>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id FROM patients WHERE id = ?1",
                params![id.0],
                patient_from_row,
            )
            .optional()?)
    }

    fn patient_for_user(&mut self, user_id: UserId) -> Result<Option<Patient>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id FROM patients WHERE user_id = ?1",
                params![user_id.0],
                patient_from_row,
            )
            .optional()?)
    }

    fn user(&mut self, id: UserId) -> Result<Option<UserAccount>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.0],
                user_from_row,
            )
            .optional()?)
    }

    fn user_by_username(&mut self, username: &str) -> Result<Option<UserAccount>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()?)
    }

    fn username_or_email_taken(&mut self, username: &str, email: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2",
            params![username, email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_user(&mut self, user: &NewUser) -> Result<UserId> {
        self.conn.execute(
            r"
            INSERT INTO users (username, email, password_hash, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                user.username,
                user.email,
                user.password_hash,
                user.role.as_str(),
                ts(Utc::now()),
            ],
        )?;
        Ok(UserId(self.conn.last_insert_rowid()))
    }

    fn create_patient(&mut self, user_id: UserId) -> Result<PatientId> {
        self.conn.execute(
            "INSERT INTO patients (user_id, created_at) VALUES (?1, ?2)",
            params![user_id.0, ts(Utc::now())],
        )?;
        Ok(PatientId(self.conn.last_insert_rowid()))
    }
}

#[cfg(test)]
impl SqliteStore {
    /// Insert a user with a fixed id.
    pub(crate) fn seed_user(&self, id: i64, role: Role) {
        let conn = self.conn.lock().expect("Lock failed");
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, 'unused', ?4, ?5)",
            params![
                id,
                format!("user{id}"),
                format!("user{id}@clinic.test"),
                role.as_str(),
                ts(Utc::now()),
            ],
        )
        .expect("Should seed user");
    }

    /// Insert a patient profile with a fixed id.
    pub(crate) fn seed_patient(&self, id: i64, user_id: i64) {
        let conn = self.conn.lock().expect("Lock failed");
        conn.execute(
            "INSERT INTO patients (id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![id, user_id, ts(Utc::now())],
        )
        .expect("Should seed patient");
    }

    /// Run raw SQL against the connection, bypassing the core.
    pub(crate) fn raw<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> T {
        let conn = self.conn.lock().expect("Lock failed");
        f(&conn).expect("Raw SQL should succeed")
    }
}
