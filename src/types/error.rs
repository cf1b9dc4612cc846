//! Error types for Lintel
//!
//! `AuthError` is the authentication taxonomy surfaced to clients with a
//! stable code. `LintelError` wraps it together with infrastructure failures.

use hyper::StatusCode;

/// Authentication and trust failures.
///
/// The variant name doubles as the wire error code (see [`AuthError::code`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Identifier is already registered")]
    DuplicateIdentifier,

    #[error("Secret does not meet the strength policy: {0}")]
    WeakSecret(String),

    /// Unknown identifier and wrong secret are deliberately indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No bearer token was presented")]
    MissingCredential,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token signature is not trusted")]
    InvalidSignature,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is not yet valid")]
    TokenNotYetValid,

    #[error("Request reached a trusting service without an identity assertion")]
    InternalTrustViolation,

    /// Issuer-side wrapper for any verification failure on self-service routes.
    #[error("Invalid token: {0}")]
    InvalidToken(Box<AuthError>),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AuthError {
    /// Stable error code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateIdentifier => "DuplicateIdentifier",
            Self::WeakSecret(_) => "WeakSecret",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::MissingCredential => "MissingCredential",
            Self::MalformedToken(_) => "MalformedToken",
            Self::InvalidSignature => "InvalidSignature",
            Self::TokenExpired => "TokenExpired",
            Self::TokenNotYetValid => "TokenNotYetValid",
            Self::InternalTrustViolation => "InternalTrustViolation",
            Self::InvalidToken(_) => "InvalidToken",
            Self::InvalidRequest(_) => "InvalidRequest",
        }
    }

    /// Underlying verification code for `InvalidToken`
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::InvalidToken(inner) => Some(inner.code()),
            _ => None,
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DuplicateIdentifier => StatusCode::CONFLICT,
            Self::WeakSecret(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials
            | Self::MissingCredential
            | Self::MalformedToken(_)
            | Self::InvalidSignature
            | Self::TokenExpired
            | Self::TokenNotYetValid
            | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::InternalTrustViolation => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this is a bearer-token failure (drives `WWW-Authenticate`)
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential
                | Self::MalformedToken(_)
                | Self::InvalidSignature
                | Self::TokenExpired
                | Self::TokenNotYetValid
                | Self::InvalidToken(_)
        )
    }

    /// Wrap a verification failure for issuer self-service routes
    pub fn into_invalid_token(self) -> Self {
        match self {
            Self::InvalidToken(_) => self,
            other => Self::InvalidToken(Box::new(other)),
        }
    }
}

/// Main error type for Lintel operations
#[derive(Debug, thiserror::Error)]
pub enum LintelError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LintelError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(e) => e.status_code(),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.code(),
            Self::BadRequest(_) | Self::Http(_) => "InvalidRequest",
            Self::NotFound(_) => "NotFound",
            Self::PayloadTooLarge(_) => "PayloadTooLarge",
            Self::Upstream(_) => "UpstreamUnavailable",
            Self::Internal(_) | Self::Config(_) => "InternalError",
        }
    }

    /// The authentication failure, if this is one
    pub fn as_auth(&self) -> Option<&AuthError> {
        match self {
            Self::Auth(e) => Some(e),
            _ => None,
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for LintelError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for LintelError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for LintelError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<reqwest::Error> for LintelError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for LintelError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Internal(format!("JWT error: {}", err))
    }
}

/// Result type alias for Lintel operations
pub type Result<T> = std::result::Result<T, LintelError>;
