//! Gateway verification
//!
//! Every request to a protected route passes through
//! [`GatewayVerifier::verify_and_forward`]: the bearer token is verified
//! locally against the cached key set, then replaced by the trusted identity
//! assertion before the request is forwarded. A rejected request is never
//! forwarded.

use bytes::Bytes;
use hyper::header::{HeaderMap, AUTHORIZATION};
use hyper::{Request, Response};
use std::sync::Arc;
use tracing::debug;

use super::assertion::{strip_assertion_headers, TrustedIdentityAssertion};
use super::proxy::{strip_hop_by_hop, Upstream};
use crate::auth::{extract_token_from_header, KeyRegistry, SharedClock, TokenVerifier};
use crate::logging::{SecurityEvent, SecurityEventKind};
use crate::types::{AuthError, LintelError};

pub struct GatewayVerifier {
    verifier: TokenVerifier,
    upstream: Arc<dyn Upstream>,
}

impl GatewayVerifier {
    pub fn new(
        keys: Arc<KeyRegistry>,
        clock: SharedClock,
        skew_seconds: u64,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            verifier: TokenVerifier::new(keys, clock, skew_seconds),
            upstream,
        }
    }

    /// Verify the bearer token in `headers` and produce the assertion to
    /// inject. Pure local computation; nothing is forwarded.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<TrustedIdentityAssertion, AuthError> {
        let header = match headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| {
                AuthError::MalformedToken("authorization header is not ASCII".into())
            })?),
            None => None,
        };
        let token = extract_token_from_header(header).ok_or(AuthError::MissingCredential)?;
        let claims = self.verifier.verify(token)?;
        Ok(TrustedIdentityAssertion::from_claims(&claims))
    }

    /// Verify the caller and forward the rewritten request to `base_url`.
    pub async fn verify_and_forward(
        &self,
        base_url: &str,
        mut req: Request<Bytes>,
    ) -> Result<Response<Bytes>, LintelError> {
        let assertion = match self.authorize(req.headers()) {
            Ok(assertion) => assertion,
            Err(err) => {
                SecurityEvent::new(SecurityEventKind::TokenRejected)
                    .with_code(err.code())
                    .with_path(req.uri().path())
                    .with_detail(err.to_string())
                    .emit();
                return Err(err.into());
            }
        };

        let headers = req.headers_mut();
        sanitize(headers);
        headers.remove(AUTHORIZATION);
        assertion.inject(headers)?;

        debug!(subject = %assertion.subject, path = %req.uri().path(), "Asserting identity upstream");
        self.upstream.forward(base_url, req).await
    }

    /// Forward a request on the public allowlist. No verification happens,
    /// but client-supplied assertion headers are still removed.
    pub async fn forward_public(
        &self,
        base_url: &str,
        mut req: Request<Bytes>,
    ) -> Result<Response<Bytes>, LintelError> {
        sanitize(req.headers_mut());
        self.upstream.forward(base_url, req).await
    }
}

fn sanitize(headers: &mut HeaderMap) {
    let forged = strip_assertion_headers(headers);
    if forged > 0 {
        debug!(count = forged, "Stripped client-supplied assertion headers");
    }
    strip_hop_by_hop(headers);
}
