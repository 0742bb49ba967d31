//! Adapters layer: Concrete implementations of ports.
//!
//! - `aead`: AES-256-GCM payload cipher
//! - `jwt`: HS256 bearer token issuing and verification
//! - `password`: Argon2id password hashing
//! - `sqlite`: SQLite for local storage
//! - `sanitize`: credential and PII redaction for logs

pub mod aead;
pub mod jwt;
pub mod password;
pub mod sanitize;
pub mod sqlite;

pub use aead::AesGcmCipher;
pub use jwt::{bearer_token, JwtCredentials};
pub use password::Argon2Passwords;
pub use sqlite::{SqliteStore, StorageError};
