//! Identity Issuer
//!
//! Owns credentials and mints identity tokens with the active signing key.

pub mod service;
pub mod store;

pub use service::{IdentityIssuer, IssuerConfig, Session};
pub use store::{CredentialRecord, CredentialStore, Identity, MemoryCredentialStore};
