//! Shared types for Lintel

pub mod error;

pub use error::{AuthError, LintelError, Result};
