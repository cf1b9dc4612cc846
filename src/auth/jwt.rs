//! Identity token issuance and verification
//!
//! Tokens are compact JWS (JWT) signed with HS256. The header carries the
//! `kid` of the signing key; the claim set is exactly
//! `{sub, identifier, iat, exp}` and anything else is malformed.
//!
//! Verification is local and stateless: it needs only the current
//! [`KeySet`](crate::auth::keys::KeySet) snapshot and a clock. Checks run in
//! a fixed order so each failure maps to one error code:
//!
//! 1. structure (three segments, JSON object payload, header, `alg`, `kid`) -
//!    `MalformedToken`
//! 2. signature against the key named by `kid` - `InvalidSignature`
//! 3. claim shape - `MalformedToken`
//! 4. `now < exp + skew` - `TokenExpired`
//! 5. `iat <= now + skew` - `TokenNotYetValid`

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::auth::clock::SharedClock;
use crate::auth::keys::KeyRegistry;
use crate::types::{AuthError, LintelError};

/// Longest token the verifier will look at
pub const MAX_TOKEN_BYTES: usize = 8 * 1024;

/// Payload stored in the identity token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claims {
    /// Identity ID
    pub sub: String,
    /// User identifier (email/username), denormalized for downstream use
    pub identifier: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// A freshly minted token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub kid: String,
    pub claims: Claims,
}

/// Mints tokens with the active signing key
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyRegistry>,
    clock: SharedClock,
    ttl_seconds: u64,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyRegistry>, clock: SharedClock, ttl_seconds: u64) -> Self {
        Self {
            keys,
            clock,
            ttl_seconds,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Generate a token for an authenticated identity
    pub fn issue(&self, subject: &str, identifier: &str) -> Result<IssuedToken, LintelError> {
        let keys = self.keys.snapshot();
        let key = keys.active();
        let now = self.clock.now();

        let exp = now.checked_add(self.ttl_seconds).ok_or_else(|| {
            LintelError::Config(format!("token lifetime {}s is out of range", self.ttl_seconds))
        })?;

        let claims = Claims {
            sub: subject.to_string(),
            identifier: identifier.to_string(),
            iat: now,
            exp,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(key.kid.clone());

        let token = encode(&header, &claims, &key.encoding_key())?;

        Ok(IssuedToken {
            token,
            kid: key.kid.clone(),
            claims,
        })
    }
}

/// Verifies tokens against the trusted key set
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<KeyRegistry>,
    clock: SharedClock,
    skew_seconds: u64,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeyRegistry>, clock: SharedClock, skew_seconds: u64) -> Self {
        // Time checks are done here with the injected clock and skew, and the
        // claim set is enforced by `Claims` itself.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        Self {
            keys,
            clock,
            skew_seconds,
            validation,
        }
    }

    pub fn skew_seconds(&self) -> u64 {
        self.skew_seconds
    }

    /// Verify and decode a token
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.len() > MAX_TOKEN_BYTES {
            return Err(AuthError::MalformedToken("token too large".into()));
        }
        check_structure(token)?;

        let header = decode_header(token)
            .map_err(|e| AuthError::MalformedToken(format!("unreadable header: {e}")))?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthError::MalformedToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::MalformedToken("missing key id".into()))?;

        let now = self.clock.now();
        let keys = self.keys.snapshot();
        let key = keys
            .verification_key(&kid, now)
            .ok_or(AuthError::InvalidSignature)?;

        let claims = decode::<Claims>(token, &key.decoding_key(), &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                _ => AuthError::MalformedToken(err.to_string()),
            })?
            .claims;

        if claims.exp <= claims.iat {
            return Err(AuthError::MalformedToken(
                "expiry does not follow issue time".into(),
            ));
        }
        if now >= claims.exp.saturating_add(self.skew_seconds) {
            return Err(AuthError::TokenExpired);
        }
        if claims.iat > now.saturating_add(self.skew_seconds) {
            return Err(AuthError::TokenNotYetValid);
        }

        Ok(claims)
    }
}

/// Reject anything that is not three segments with a JSON object payload.
///
/// The claim set itself is only checked once the signature holds.
fn check_structure(token: &str) -> Result<(), AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {e}")))?;
    match serde_json::from_slice::<serde_json::Value>(&payload) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        Ok(_) => Err(AuthError::MalformedToken("payload is not a JSON object".into())),
        Err(e) => Err(AuthError::MalformedToken(format!("payload is not JSON: {e}"))),
    }
}

/// Extract token from an Authorization header value.
/// Only the `Bearer <token>` form is accepted; the scheme is case-insensitive.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?.trim();
    let (scheme, token) = header.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}
