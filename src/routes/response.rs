//! Response helpers shared by the gateway and dashboard routes

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE, WWW_AUTHENTICATE,
};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::types::{AuthError, LintelError};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    /// Underlying verification code for `InvalidToken`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

fn with_cors(response: &mut Response<BoxBody>) {
    let headers = response.headers_mut();
    headers
        .entry(ACCESS_CONTROL_ALLOW_ORIGIN)
        .or_insert(HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    with_cors(&mut response);
    response
}

/// Map an error to its status, JSON body and, for bearer failures, the
/// `WWW-Authenticate` challenge
pub fn error_response(err: &LintelError) -> Response<BoxBody> {
    let auth = err.as_auth();
    let error = match err {
        // Infrastructure detail stays in the logs
        LintelError::Internal(_) | LintelError::Config(_) => "Internal server error".to_string(),
        other => other.to_string(),
    };

    let mut response = json_response(
        err.status_code(),
        &ErrorResponse {
            error,
            code: err.code(),
            reason: auth.and_then(AuthError::reason),
        },
    );

    if let Some(auth) = auth.filter(|a| a.is_token_rejection()) {
        let missing = matches!(auth, AuthError::MissingCredential)
            || auth.reason() == Some(AuthError::MissingCredential.code());
        let challenge = if missing {
            HeaderValue::from_static("Bearer")
        } else {
            HeaderValue::from_static(r#"Bearer error="invalid_token""#)
        };
        response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
    }

    response
}

pub fn no_content() -> Response<BoxBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NO_CONTENT;
    with_cors(&mut response);
    response
}

pub fn cors_preflight() -> Response<BoxBody> {
    let mut response = no_content();
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

pub fn not_found(path: &str) -> Response<BoxBody> {
    error_response(&LintelError::NotFound(format!("No route for {path}")))
}

pub fn method_not_allowed() -> Response<BoxBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorResponse {
            error: "Method not allowed".into(),
            code: "MethodNotAllowed",
            reason: None,
        },
    )
}

/// Wrap a buffered upstream response
pub fn from_upstream(response: Response<Bytes>) -> Response<BoxBody> {
    let mut response = response.map(|body| full_body(body));
    response
        .headers_mut()
        .entry(ACCESS_CONTROL_ALLOW_ORIGIN)
        .or_insert(HeaderValue::from_static("*"));
    response
}
