//! Gateway Verifier
//!
//! Verifies bearer tokens locally, rewrites verified requests with the
//! trusted identity assertion and forwards them to the route's upstream.

pub mod assertion;
pub mod proxy;
pub mod routing;
pub mod verifier;

pub use assertion::{
    strip_assertion_headers, TrustedIdentityAssertion, ASSERTION_PREFIX, IDENTIFIER_HEADER,
    SUBJECT_HEADER,
};
pub use proxy::{strip_hop_by_hop, HttpUpstream, Upstream};
pub use routing::{RouteTable, RouteTarget, ISSUER_PREFIX};
pub use verifier::GatewayVerifier;
