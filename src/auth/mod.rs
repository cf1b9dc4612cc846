//! Authentication primitives for Lintel
//!
//! Provides:
//! - Identity token generation and validation (HS256 JWT)
//! - Versioned signing key registry with rotation overlap
//! - Password hashing with Argon2
//! - Identifier normalization and secret-strength policy

pub mod clock;
pub mod jwt;
pub mod keys;
pub mod password;
pub mod policy;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use jwt::{extract_token_from_header, Claims, IssuedToken, TokenIssuer, TokenVerifier};
pub use keys::{
    spawn_refresh_task, KeyEntry, KeyRegistry, KeySecret, KeySet, KeyStatus, KeysFile, SigningKey,
};
pub use password::{hash_password, verify_password, HashParams};
pub use policy::{normalize_identifier, SecretPolicy};
