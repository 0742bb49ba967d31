//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the core and its collaborators (store, cipher, credentials).

mod cipher;
mod credentials;
mod store;

pub use cipher::PayloadCipher;
pub use credentials::{CredentialVerifier, IssuedToken, PasswordHashing, TokenIssuer};
pub use store::{ListFilter, NewRecord, Store, Stored, Transaction};
