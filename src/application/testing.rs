//! Shared fixtures for service tests.
//!
//! Users: admin 1, clinician 2, patient user 10 (patient 1), patient user 20
//! (patient 5).

use std::sync::Arc;

use crate::adapters::{AesGcmCipher, SqliteStore};
use crate::domain::{CipherKey, Identity, PatientId, Role, UserId, CIPHER_KEY_LEN};

pub(crate) fn store() -> Arc<SqliteStore> {
    let store = SqliteStore::in_memory().expect("Should create db");
    store.seed_user(1, Role::Admin);
    store.seed_user(2, Role::Clinician);
    store.seed_user(10, Role::Patient);
    store.seed_user(20, Role::Patient);
    store.seed_patient(1, 10);
    store.seed_patient(5, 20);
    Arc::new(store)
}

pub(crate) fn cipher() -> Arc<AesGcmCipher> {
    Arc::new(
        AesGcmCipher::new(&CipherKey::from_bytes([42; CIPHER_KEY_LEN]))
            .expect("Should build cipher"),
    )
}

pub(crate) fn admin() -> Identity {
    Identity::admin(UserId(1))
}

pub(crate) fn clinician() -> Identity {
    Identity::clinician(UserId(2))
}

/// Patient user 10, owner of patient 1.
pub(crate) fn owner() -> Identity {
    Identity::patient(UserId(10), PatientId(1))
}

/// Patient user 20, owner of patient 5.
pub(crate) fn stranger() -> Identity {
    Identity::patient(UserId(20), PatientId(5))
}
