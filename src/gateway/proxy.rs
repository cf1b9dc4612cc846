//! Upstream forwarding
//!
//! Forwards a fully buffered request to an upstream base URL over HTTP and
//! buffers the response. The path and query of the inbound request are
//! appended to the base URL unchanged.

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, CONNECTION, CONTENT_LENGTH, HOST};
use hyper::{Request, Response};
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::LintelError;

/// Headers that describe a single hop and are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Something requests can be forwarded to
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(
        &self,
        base_url: &str,
        req: Request<Bytes>,
    ) -> Result<Response<Bytes>, LintelError>;
}

/// Forwards over HTTP with reqwest
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self, LintelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| LintelError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Upstream for HttpUpstream {
    async fn forward(
        &self,
        base_url: &str,
        req: Request<Bytes>,
    ) -> Result<Response<Bytes>, LintelError> {
        let (parts, body) = req.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target_url = format!("{}{}", base_url.trim_end_matches('/'), path);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);

        debug!(url = %target_url, method = %parts.method, "Forwarding to upstream");

        let response = self
            .client
            .request(parts.method, &target_url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, url = %target_url, "Failed to reach upstream");
                LintelError::Upstream(format!("Failed to reach upstream: {e}"))
            })?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(CONTENT_LENGTH);

        let body = response.bytes().await.map_err(|e| {
            warn!(error = %e, url = %target_url, "Failed to read upstream response");
            LintelError::Upstream(format!("Failed to read upstream response: {e}"))
        })?;

        debug!(status = %status, size = body.len(), "Forwarded upstream response");

        let mut forwarded = Response::new(body);
        *forwarded.status_mut() = status;
        *forwarded.headers_mut() = headers;
        Ok(forwarded)
    }
}

/// Remove hop-by-hop headers, including any the `Connection` header names
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
