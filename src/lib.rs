//! # Clinivault
//!
//! Access-control and at-rest confidentiality core for clinic data.
//!
//! This crate provides:
//! - Bearer token issuing and verification (HS256, no database lookup)
//! - AES-256-GCM encryption of medical-record text and uploaded files
//! - A role-based access policy over patient-owned resources
//! - Resource mediators that combine ownership lookups with the policy
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (identities, resources, access policy, appointment lifecycle)
//! - `ports`: Trait definitions for the store, the cipher and the credential verifier
//! - `adapters`: Concrete implementations (SQLite, AES-GCM, JWT, Argon2, log sanitizing)
//! - `application`: Mediators and account services orchestrating domain and ports
//! - `config`: Process configuration and secret loading

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{AppointmentStatus, Identity, PatientId, ResourceKind, Role, UserId};

/// Result type for Clinivault operations
pub type Result<T> = std::result::Result<T, ClinicError>;

/// Tagged outcome of every core operation.
///
/// Authorization, integrity and availability failures are distinct variants;
/// none of them is retried or downgraded inside the core.
#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    /// Also returned when the caller may not see the resource.
    #[error("Not found: {0}")]
    NotFound(&'static str),

    #[error("Stored content failed integrity check")]
    DecryptionFailed,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ClinicError {
    /// Stable machine-readable name of the outcome.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::DecryptionFailed => "decryption_failed",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Validation(_) => "validation_error",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl From<domain::CryptoError> for ClinicError {
    fn from(err: domain::CryptoError) -> Self {
        match err {
            domain::CryptoError::DecryptionFailed => Self::DecryptionFailed,
            other => Self::Unavailable(other.to_string()),
        }
    }
}
