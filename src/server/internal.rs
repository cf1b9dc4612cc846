//! Internal listener for the dashboard service
//!
//! Binds a private address (loopback by default). Nothing on this listener
//! verifies tokens; it trusts the gateway's assertion headers, so it must
//! only be reachable from the gateway.

use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::{accept_loop, collect_body};
use crate::dashboard::EntryStore;
use crate::routes::{self, BoxBody};
use crate::types::LintelError;

const DASHBOARD_PREFIX: &str = "/dashboard";

pub struct DashboardState {
    pub entries: EntryStore,
    pub max_body_bytes: usize,
    pub started_at: Instant,
}

impl DashboardState {
    pub fn new(max_body_bytes: usize) -> Self {
        Self {
            entries: EntryStore::new(),
            max_body_bytes,
            started_at: Instant::now(),
        }
    }
}

/// Bind `addr` and serve the dashboard
pub async fn run_dashboard(addr: SocketAddr, state: Arc<DashboardState>) -> Result<(), LintelError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Dashboard service listening on {}", listener.local_addr()?);

    if !addr.ip().is_loopback() {
        warn!(
            "Dashboard bound to non-loopback address {}; it must only be reachable from the gateway",
            addr
        );
    }

    serve_dashboard(listener, state).await;
    Ok(())
}

/// Serve the dashboard on an already-bound listener
pub async fn serve_dashboard(listener: TcpListener, state: Arc<DashboardState>) {
    accept_loop(listener, state, handle_request).await
}

async fn handle_request(
    state: Arc<DashboardState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, Infallible> {
    let path = req.uri().path().to_string();
    debug!("[{}] {} {}", addr, req.method(), path);

    if req.method() == Method::GET && path == "/health" {
        return Ok(routes::health_check("dashboard", state.started_at, None));
    }

    let under_dashboard = path
        .strip_prefix(DASHBOARD_PREFIX)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with('/'));
    if !under_dashboard {
        return Ok(routes::not_found(&path));
    }

    let req = match collect_body(req, state.max_body_bytes).await {
        Ok(req) => req,
        Err(e) => return Ok(routes::error_response(&e)),
    };

    Ok(routes::handle_dashboard_request(req, &state.entries).await)
}
