//! Dashboard service
//!
//! A trusting service: it reads the caller's identity from the gateway's
//! assertion headers and performs no token verification of its own. It must
//! only be reachable from the gateway.

pub mod context;
pub mod store;

pub use context::IdentityContext;
pub use store::{Entry, EntryStore, NewEntry};
