//! Caller identity inside the trusting service
//!
//! The dashboard never sees a token. Its only source of identity is the
//! assertion the gateway injected, taken as ground truth.

use hyper::header::HeaderMap;
use uuid::Uuid;

use crate::gateway::TrustedIdentityAssertion;
use crate::logging::{SecurityEvent, SecurityEventKind};
use crate::types::AuthError;

/// Identity every dashboard operation is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    pub subject: Uuid,
    pub identifier: String,
}

impl IdentityContext {
    /// Build the context from gateway assertion headers.
    ///
    /// A request without a well-formed assertion did not come through the
    /// gateway: it fails closed with `InternalTrustViolation`.
    pub fn from_headers(headers: &HeaderMap, path: &str) -> Result<Self, AuthError> {
        let context = TrustedIdentityAssertion::from_headers(headers).and_then(|assertion| {
            let subject = Uuid::parse_str(&assertion.subject).ok()?;
            Some(Self {
                subject,
                identifier: assertion.identifier,
            })
        });

        context.ok_or_else(|| {
            SecurityEvent::new(SecurityEventKind::TrustViolation)
                .with_code(AuthError::InternalTrustViolation.code())
                .with_path(path)
                .with_detail("request reached the dashboard without an identity assertion")
                .emit();
            AuthError::InternalTrustViolation
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{IDENTIFIER_HEADER, SUBJECT_HEADER};
    use hyper::header::HeaderValue;

    #[test]
    fn test_from_assertion() {
        let subject = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        TrustedIdentityAssertion {
            subject: subject.to_string(),
            identifier: "a@x.com".into(),
        }
        .inject(&mut headers)
        .unwrap();

        let context = IdentityContext::from_headers(&headers, "/dashboard/entries").unwrap();
        assert_eq!(context.subject, subject);
        assert_eq!(context.identifier, "a@x.com");
    }

    #[test]
    fn test_missing_assertion_fails_closed() {
        let headers = HeaderMap::new();
        assert_eq!(
            IdentityContext::from_headers(&headers, "/dashboard/entries"),
            Err(AuthError::InternalTrustViolation)
        );
    }

    #[test]
    fn test_non_uuid_subject_fails_closed() {
        let mut headers = HeaderMap::new();
        headers.insert(SUBJECT_HEADER, HeaderValue::from_static("admin"));
        headers.insert(IDENTIFIER_HEADER, HeaderValue::from_static("a%40x.com"));
        assert_eq!(
            IdentityContext::from_headers(&headers, "/dashboard/entries"),
            Err(AuthError::InternalTrustViolation)
        );
    }
}
