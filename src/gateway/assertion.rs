//! Trusted identity assertion headers
//!
//! After a token verifies, the gateway replaces it with two internal headers
//! naming the caller. Services behind the gateway read these as ground
//! truth, so every client-supplied header with the same prefix is removed
//! before forwarding.

use hyper::header::{HeaderMap, HeaderName, HeaderValue};

use crate::auth::Claims;
use crate::types::LintelError;

/// Prefix reserved for gateway-injected headers
pub const ASSERTION_PREFIX: &str = "x-lintel-";
/// Identity ID of the verified caller
pub const SUBJECT_HEADER: &str = "x-lintel-subject";
/// Percent-encoded identifier of the verified caller
pub const IDENTIFIER_HEADER: &str = "x-lintel-identifier";

/// Verified caller identity as asserted to downstream services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedIdentityAssertion {
    pub subject: String,
    pub identifier: String,
}

impl TrustedIdentityAssertion {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            subject: claims.sub.clone(),
            identifier: claims.identifier.clone(),
        }
    }

    /// Write the assertion headers, replacing any existing values
    pub fn inject(&self, headers: &mut HeaderMap) -> Result<(), LintelError> {
        let subject = HeaderValue::from_str(&self.subject)
            .map_err(|e| LintelError::Internal(format!("Invalid subject header: {e}")))?;
        let identifier = HeaderValue::from_str(&urlencoding::encode(&self.identifier))
            .map_err(|e| LintelError::Internal(format!("Invalid identifier header: {e}")))?;

        headers.insert(HeaderName::from_static(SUBJECT_HEADER), subject);
        headers.insert(HeaderName::from_static(IDENTIFIER_HEADER), identifier);
        Ok(())
    }

    /// Read an assertion. Missing, repeated, empty or undecodable headers
    /// yield `None`.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let subject = single_value(headers, SUBJECT_HEADER)?;
        let identifier = single_value(headers, IDENTIFIER_HEADER)?;
        let identifier = urlencoding::decode(identifier).ok()?.into_owned();

        if subject.is_empty() || identifier.is_empty() {
            return None;
        }

        Some(Self {
            subject: subject.to_string(),
            identifier,
        })
    }
}

fn single_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let mut values = headers.get_all(name).iter();
    let value = values.next()?;
    if values.next().is_some() {
        return None;
    }
    value.to_str().ok()
}

/// Remove every header in the reserved `x-lintel-` namespace
pub fn strip_assertion_headers(headers: &mut HeaderMap) -> usize {
    let reserved: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with(ASSERTION_PREFIX))
        .cloned()
        .collect();

    for name in &reserved {
        headers.remove(name);
    }
    reserved.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assertion() -> TrustedIdentityAssertion {
        TrustedIdentityAssertion {
            subject: "0b6f1c1e-5d8e-4a53-9d55-6a0e1f3c2b11".into(),
            identifier: "a+b@x.com".into(),
        }
    }

    #[test]
    fn test_inject_and_read() {
        let mut headers = HeaderMap::new();
        assertion().inject(&mut headers).unwrap();

        assert_eq!(
            headers.get(IDENTIFIER_HEADER).unwrap(),
            "a%2Bb%40x.com"
        );
        assert_eq!(TrustedIdentityAssertion::from_headers(&headers), Some(assertion()));
    }

    #[test]
    fn test_inject_replaces_existing() {
        let mut headers = HeaderMap::new();
        headers.append(SUBJECT_HEADER, HeaderValue::from_static("forged"));
        headers.append(SUBJECT_HEADER, HeaderValue::from_static("forged-2"));
        assertion().inject(&mut headers).unwrap();

        assert_eq!(headers.get_all(SUBJECT_HEADER).iter().count(), 1);
        assert_eq!(
            TrustedIdentityAssertion::from_headers(&headers).unwrap().subject,
            assertion().subject
        );
    }

    #[test]
    fn test_missing_or_ambiguous_is_none() {
        let mut headers = HeaderMap::new();
        assert!(TrustedIdentityAssertion::from_headers(&headers).is_none());

        headers.insert(SUBJECT_HEADER, HeaderValue::from_static("abc"));
        assert!(TrustedIdentityAssertion::from_headers(&headers).is_none());

        headers.insert(IDENTIFIER_HEADER, HeaderValue::from_static("a%40x.com"));
        assert!(TrustedIdentityAssertion::from_headers(&headers).is_some());

        headers.append(SUBJECT_HEADER, HeaderValue::from_static("def"));
        assert!(TrustedIdentityAssertion::from_headers(&headers).is_none());
    }

    #[test]
    fn test_strip_assertion_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(SUBJECT_HEADER, HeaderValue::from_static("forged"));
        headers.insert("x-lintel-role", HeaderValue::from_static("admin"));
        headers.insert("x-request-id", HeaderValue::from_static("r1"));

        assert_eq!(strip_assertion_headers(&mut headers), 2);
        assert!(headers.get(SUBJECT_HEADER).is_none());
        assert!(headers.get("x-lintel-role").is_none());
        assert!(headers.get("x-request-id").is_some());
    }
}
