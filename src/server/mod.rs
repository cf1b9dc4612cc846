//! HTTP servers
//!
//! Two listeners share one accept loop:
//! - the public gateway ([`http`])
//! - the internal dashboard service ([`internal`])

pub mod http;
pub mod internal;

pub use http::{run, serve, AppState};
pub use internal::{run_dashboard, serve_dashboard, DashboardState};

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error};

use crate::routes::BoxBody;
use crate::types::LintelError;

/// Accept connections forever, serving each on its own task
pub(crate) async fn accept_loop<S, F, Fut>(listener: TcpListener, state: Arc<S>, handler: F)
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, SocketAddr, Request<Incoming>) -> Fut + Copy + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<BoxBody>, Infallible>> + Send + 'static,
{
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| handler(Arc::clone(&state), addr, req));

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Buffer a request body, refusing anything over `limit` bytes
pub(crate) async fn collect_body(
    req: Request<Incoming>,
    limit: usize,
) -> Result<Request<Bytes>, LintelError> {
    let (parts, body) = req.into_parts();
    let bytes = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                LintelError::PayloadTooLarge(limit)
            } else {
                LintelError::Http(format!("Failed to read body: {}", e))
            }
        })?
        .to_bytes();

    Ok(Request::from_parts(parts, bytes))
}
