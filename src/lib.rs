//! Lintel - stateless token gateway
//!
//! Lintel authenticates every request at the edge without calling back to
//! the service that issued the caller's credentials, then tells the services
//! behind it who the caller is.
//!
//! ## Components
//!
//! - **Issuer**: registers credentials and mints HS256 identity tokens
//! - **Gateway**: verifies bearer tokens locally and forwards requests with a
//!   trusted identity assertion
//! - **Dashboard**: a trusting service that scopes its data to the asserted
//!   identity and never sees a token

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod gateway;
pub mod issuer;
pub mod logging;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{AuthError, LintelError, Result};
