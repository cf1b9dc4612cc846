//! Security event logging
//!
//! Authentication outcomes, token rejections, trust-boundary violations and
//! key lifecycle changes are emitted as structured `tracing` events on the
//! `security` target, so they can be routed separately from request logs
//! (e.g. `RUST_LOG=security=info`).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

/// Security event types
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    /// New identity registered
    Registered,
    /// Credentials accepted, token issued
    LoginSucceeded,
    /// Credentials rejected
    LoginFailed,
    /// Gateway refused a bearer token
    TokenRejected,
    /// A trusting service saw a request without an identity assertion
    TrustViolation,
    /// Secret changed for an identity
    SecretChanged,
    /// New active signing key
    KeyRotated,
    /// Retiring key dropped after its overlap window
    KeyRetired,
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Registered => "registered",
            Self::LoginSucceeded => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::TokenRejected => "token_rejected",
            Self::TrustViolation => "trust_violation",
            Self::SecretChanged => "secret_changed",
            Self::KeyRotated => "key_rotated",
            Self::KeyRetired => "key_retired",
        };
        f.write_str(name)
    }
}

/// Structured security event
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event type
    pub kind: SecurityEventKind,
    /// Identity ID (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Identifier as presented (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Error code for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    /// Request path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Free-form detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SecurityEvent {
    /// Create a new security event
    pub fn new(kind: SecurityEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            subject: None,
            identifier: None,
            code: None,
            path: None,
            detail: None,
        }
    }

    /// Set the subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the identifier
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Set the error code
    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Set the request path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the detail text
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Convert to a JSON line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Emit on the `security` target at a level matching the event kind
    pub fn emit(&self) {
        let subject = self.subject.as_deref().unwrap_or("-");
        let identifier = self.identifier.as_deref().unwrap_or("-");
        let code = self.code.unwrap_or("-");
        let path = self.path.as_deref().unwrap_or("-");
        let detail = self.detail.as_deref().unwrap_or("");

        match self.kind {
            SecurityEventKind::TrustViolation => error!(
                target: "security",
                event = %self.kind, subject, identifier, code, path,
                "{}", detail
            ),
            SecurityEventKind::LoginFailed | SecurityEventKind::TokenRejected => warn!(
                target: "security",
                event = %self.kind, subject, identifier, code, path,
                "{}", detail
            ),
            _ => info!(
                target: "security",
                event = %self.kind, subject, identifier, code, path,
                "{}", detail
            ),
        }
    }
}
