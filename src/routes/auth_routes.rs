//! HTTP Routes for Authentication
//!
//! Issuer endpoints, served in-process by the gateway:
//! - POST /auth/register - Create an identity
//! - POST /auth/login    - Authenticate and get a token
//! - GET  /auth/me       - Identity named by the bearer token
//! - POST /auth/refresh  - Fresh token for a still-valid one
//! - POST /auth/password - Change the caller's secret
//!
//! `/auth/me`, `/auth/refresh` and `/auth/password` authenticate themselves
//! through the issuer and report every token problem as `InvalidToken`.

use bytes::Bytes;
use hyper::header::AUTHORIZATION;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::response::{error_response, json_response, method_not_allowed, no_content, not_found, BoxBody};
use crate::auth::extract_token_from_header;
use crate::issuer::{Identity, IdentityIssuer, Session};
use crate::types::{AuthError, LintelError};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub identifier: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSecretRequest {
    pub current_secret: String,
    pub new_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: u64,
    pub identity: Identity,
}

impl From<Session> for TokenResponse {
    fn from(session: Session) -> Self {
        Self {
            token: session.token.token,
            token_type: "Bearer",
            expires_at: session.token.claims.exp,
            identity: session.identity,
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_json_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, LintelError> {
    serde_json::from_slice(body)
        .map_err(|e| LintelError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Bearer token for the self-authenticating endpoints
fn bearer_token(req: &Request<Bytes>) -> Result<&str, LintelError> {
    let header = match req.headers().get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| {
            AuthError::MalformedToken("authorization header is not ASCII".into())
                .into_invalid_token()
        })?),
        None => None,
    };

    extract_token_from_header(header)
        .ok_or_else(|| AuthError::MissingCredential.into_invalid_token().into())
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /auth/register
async fn handle_register(
    req: Request<Bytes>,
    issuer: &IdentityIssuer,
) -> Result<Response<BoxBody>, LintelError> {
    let body: CredentialsRequest = parse_json_body(req.body())?;
    let identity = issuer.register(&body.identifier, &body.secret).await?;
    Ok(json_response(StatusCode::CREATED, &identity))
}

/// POST /auth/login
async fn handle_login(
    req: Request<Bytes>,
    issuer: &IdentityIssuer,
) -> Result<Response<BoxBody>, LintelError> {
    let body: CredentialsRequest = parse_json_body(req.body())?;
    let session = issuer.authenticate(&body.identifier, &body.secret).await?;
    Ok(json_response(StatusCode::OK, &TokenResponse::from(session)))
}

/// GET /auth/me
async fn handle_me(
    req: Request<Bytes>,
    issuer: &IdentityIssuer,
) -> Result<Response<BoxBody>, LintelError> {
    let identity = issuer.whoami(bearer_token(&req)?).await?;
    Ok(json_response(StatusCode::OK, &identity))
}

/// POST /auth/refresh
///
/// The previous token is not revoked; it stays valid until it expires.
async fn handle_refresh(
    req: Request<Bytes>,
    issuer: &IdentityIssuer,
) -> Result<Response<BoxBody>, LintelError> {
    let session = issuer.refresh(bearer_token(&req)?).await?;
    Ok(json_response(StatusCode::OK, &TokenResponse::from(session)))
}

/// POST /auth/password
async fn handle_change_secret(
    req: Request<Bytes>,
    issuer: &IdentityIssuer,
) -> Result<Response<BoxBody>, LintelError> {
    let token = bearer_token(&req)?;
    let body: ChangeSecretRequest = parse_json_body(req.body())?;
    issuer
        .change_secret(token, &body.current_secret, &body.new_secret)
        .await?;
    Ok(no_content())
}

/// Dispatch an `/auth/*` request to the issuer
pub async fn handle_auth_request(req: Request<Bytes>, issuer: &IdentityIssuer) -> Response<BoxBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let result = match (&method, path.as_str()) {
        (&Method::POST, "/auth/register") => handle_register(req, issuer).await,
        (&Method::POST, "/auth/login") => handle_login(req, issuer).await,
        (&Method::GET, "/auth/me") => handle_me(req, issuer).await,
        (&Method::POST, "/auth/refresh") => handle_refresh(req, issuer).await,
        (&Method::POST, "/auth/password") => handle_change_secret(req, issuer).await,

        // Method not allowed
        (_, "/auth/register")
        | (_, "/auth/login")
        | (_, "/auth/me")
        | (_, "/auth/refresh")
        | (_, "/auth/password") => return method_not_allowed(),

        _ => return not_found(&path),
    };

    result.unwrap_or_else(|e| error_response(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{HashParams, KeyRegistry, KeySecret, SecretPolicy, SigningKey, SystemClock};
    use crate::issuer::{IssuerConfig, MemoryCredentialStore};
    use http_body_util::BodyExt;
    use std::sync::Arc;

    const SECRET_A: &str = "secret-a-that-is-at-least-32-characters-long";

    fn issuer() -> IdentityIssuer {
        let keys = Arc::new(KeyRegistry::new(SigningKey::new(
            "k1",
            KeySecret::new(SECRET_A.as_bytes().to_vec()).unwrap(),
        )));
        IdentityIssuer::new(
            Arc::new(MemoryCredentialStore::new()),
            keys,
            Arc::new(SystemClock),
            IssuerConfig {
                token_ttl_secs: 3600,
                clock_skew_secs: 5,
                hash_params: HashParams::minimal(),
                policy: SecretPolicy::default(),
            },
        )
        .unwrap()
    }

    fn request(method: Method, path: &str, token: Option<&str>, body: &str) -> Request<Bytes> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Bytes::from(body.to_string())).unwrap()
    }

    async fn call(
        issuer: &IdentityIssuer,
        req: Request<Bytes>,
    ) -> (StatusCode, serde_json::Value) {
        let response = handle_auth_request(req, issuer).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    const CREDS: &str = r#"{"identifier":"a@x.com","secret":"S3cur3Pass!"}"#;

    async fn login(issuer: &IdentityIssuer) -> String {
        call(issuer, request(Method::POST, "/auth/register", None, CREDS)).await;
        let (status, json) = call(issuer, request(Method::POST, "/auth/login", None, CREDS)).await;
        assert_eq!(status, StatusCode::OK);
        json["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let issuer = issuer();
        let (status, json) = call(&issuer, request(Method::POST, "/auth/register", None, CREDS)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["identifier"], "a@x.com");
        assert!(json["identityId"].is_string());

        let (status, json) = call(&issuer, request(Method::POST, "/auth/register", None, CREDS)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], "DuplicateIdentifier");
    }

    #[tokio::test]
    async fn test_login_response_shape() {
        let issuer = issuer();
        call(&issuer, request(Method::POST, "/auth/register", None, CREDS)).await;
        let (status, json) = call(&issuer, request(Method::POST, "/auth/login", None, CREDS)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tokenType"], "Bearer");
        assert!(json["expiresAt"].is_u64());
        assert_eq!(json["identity"]["identifier"], "a@x.com");
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let issuer = issuer();
        call(&issuer, request(Method::POST, "/auth/register", None, CREDS)).await;
        let (status, json) = call(
            &issuer,
            request(
                Method::POST,
                "/auth/login",
                None,
                r#"{"identifier":"a@x.com","secret":"Wr0ngPass!!"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["code"], "InvalidCredentials");
    }

    #[tokio::test]
    async fn test_me() {
        let issuer = issuer();
        let token = login(&issuer).await;

        let (status, json) = call(&issuer, request(Method::GET, "/auth/me", Some(&token), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["identifier"], "a@x.com");

        let (status, json) = call(&issuer, request(Method::GET, "/auth/me", None, "")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["code"], "InvalidToken");
        assert_eq!(json["reason"], "MissingCredential");

        let (status, json) = call(&issuer, request(Method::GET, "/auth/me", Some("x.y.z"), "")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["reason"], "MalformedToken");
    }

    #[tokio::test]
    async fn test_refresh() {
        let issuer = issuer();
        let token = login(&issuer).await;

        let (status, json) =
            call(&issuer, request(Method::POST, "/auth/refresh", Some(&token), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["token"].is_string());
    }

    #[tokio::test]
    async fn test_change_secret() {
        let issuer = issuer();
        let token = login(&issuer).await;

        let (status, _) = call(
            &issuer,
            request(
                Method::POST,
                "/auth/password",
                Some(&token),
                r#"{"currentSecret":"S3cur3Pass!","newSecret":"N3w-Secret!"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&issuer, request(Method::POST, "/auth/login", None, CREDS)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bad_json_and_unknown_routes() {
        let issuer = issuer();
        let (status, json) = call(&issuer, request(Method::POST, "/auth/login", None, "{")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "InvalidRequest");

        let (status, _) = call(&issuer, request(Method::GET, "/auth/login", None, "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, json) = call(&issuer, request(Method::GET, "/auth/nope", None, "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "NotFound");
    }
}
