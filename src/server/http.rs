//! Gateway HTTP server
//!
//! Uses hyper http1 with TokioIo for async handling. Every request is
//! routed by path prefix: `/auth/*` to the in-process issuer, configured
//! prefixes through the gateway verifier to their upstream.

use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{accept_loop, collect_body};
use crate::auth::{KeyRegistry, SharedClock, SystemClock};
use crate::config::Args;
use crate::gateway::{GatewayVerifier, HttpUpstream, RouteTable, RouteTarget, Upstream};
use crate::issuer::{CredentialStore, IdentityIssuer, IssuerConfig, MemoryCredentialStore};
use crate::routes::{self, BoxBody};
use crate::types::LintelError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Identity issuer serving `/auth/*`
    pub issuer: IdentityIssuer,
    /// Token verification and forwarding for upstream routes
    pub gateway: GatewayVerifier,
    /// Signing keys shared by issuer and gateway
    pub keys: Arc<KeyRegistry>,
    pub routes: RouteTable,
    pub clock: SharedClock,
    pub started_at: Instant,
}

impl AppState {
    /// State with the system clock, in-memory credentials and HTTP upstreams
    pub fn new(args: Args) -> Result<Self, LintelError> {
        let clock: SharedClock = Arc::new(SystemClock);
        let keys = Arc::new(KeyRegistry::from_entries(&args.key_entries()?, clock.now())?);
        let store = Arc::new(MemoryCredentialStore::new());
        let upstream = Arc::new(HttpUpstream::new(args.request_timeout())?);
        Self::build(args, clock, keys, store, upstream)
    }

    /// State from explicit parts
    pub fn build(
        args: Args,
        clock: SharedClock,
        keys: Arc<KeyRegistry>,
        store: Arc<dyn CredentialStore>,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, LintelError> {
        let routes = args.route_table()?;
        let issuer = IdentityIssuer::new(
            store,
            Arc::clone(&keys),
            clock.clone(),
            IssuerConfig {
                token_ttl_secs: args.token_ttl_secs,
                clock_skew_secs: args.clock_skew_secs,
                hash_params: args.hash_params(),
                policy: args.secret_policy(),
            },
        )?;
        let gateway = GatewayVerifier::new(
            Arc::clone(&keys),
            clock.clone(),
            args.clock_skew_secs,
            upstream,
        );

        Ok(Self {
            args,
            issuer,
            gateway,
            keys,
            routes,
            clock,
            started_at: Instant::now(),
        })
    }
}

/// Bind the configured address and serve the gateway
pub async fn run(state: Arc<AppState>) -> Result<(), LintelError> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Lintel gateway listening on {}", listener.local_addr()?);

    if state.args.dev_mode {
        warn!("Development mode enabled - signing key may be ephemeral");
    }

    serve(listener, state).await;
    Ok(())
}

/// Serve the gateway on an already-bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) {
    accept_loop(listener, state, handle_request).await
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(routes::cors_preflight());
    }

    match (&method, path.as_str()) {
        // Liveness probe
        (&Method::GET, "/health") => {
            return Ok(routes::health_check(
                "gateway",
                state.started_at,
                Some(state.keys.as_ref()),
            ))
        }
        // Version info for deployment verification
        (&Method::GET, "/version") => return Ok(routes::version_info()),
        _ => {}
    }

    let target = match state.routes.resolve(&path) {
        Some(target) => target.clone(),
        None => return Ok(routes::not_found(&path)),
    };

    let req = match collect_body(req, state.args.max_body_bytes).await {
        Ok(req) => req,
        Err(e) => return Ok(routes::error_response(&e)),
    };

    let response = match target {
        RouteTarget::Issuer => routes::handle_auth_request(req, &state.issuer).await,
        RouteTarget::Upstream(base_url) => {
            let result = if state.routes.is_public(&path) {
                state.gateway.forward_public(&base_url, req).await
            } else {
                state.gateway.verify_and_forward(&base_url, req).await
            };

            match result {
                Ok(response) => routes::from_upstream(response),
                Err(e) => routes::error_response(&e),
            }
        }
    };

    Ok(response)
}
