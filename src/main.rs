//! Lintel - stateless token gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use lintel::{
    auth::spawn_refresh_task,
    config::Args,
    logging,
    server::{self, AppState, DashboardState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    logging::init(&args.log_level, &args.log_format);

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let state = Arc::new(AppState::new(args.clone())?);
    let key_set = state.keys.snapshot();

    // Print startup banner
    info!("======================================");
    info!("  Lintel - stateless token gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!(
        "Signing key: {} (set v{}, fingerprint {})",
        key_set.active().kid,
        key_set.version,
        key_set.active().fingerprint()
    );
    if let Some(retiring) = key_set.retiring() {
        info!(
            "Retiring key: {} (trusted until {})",
            retiring.kid,
            retiring.retire_at.unwrap_or_default()
        );
    }
    info!("Token TTL: {}s, clock skew: {}s", args.token_ttl_secs, args.clock_skew_secs);
    for (prefix, url) in state.routes.upstreams() {
        info!("Upstream: {} -> {}", prefix, url);
    }
    if !args.public_routes.trim().is_empty() {
        info!("Public routes: {}", args.public_routes);
    }
    if args.dashboard_enabled {
        info!("Dashboard: {} (internal)", args.dashboard_listen);
    }
    info!("======================================");

    // Reload keys file and close overlap windows in the background
    spawn_refresh_task(
        Arc::clone(&state.keys),
        args.keys_file.clone(),
        args.key_refresh_interval(),
        state.clock.clone(),
    );

    if args.dashboard_enabled {
        let dashboard = Arc::new(DashboardState::new(args.max_body_bytes));
        let addr = args.dashboard_listen;
        tokio::spawn(async move {
            if let Err(e) = server::run_dashboard(addr, dashboard).await {
                error!("Dashboard service failed: {}", e);
            }
        });
    }

    tokio::select! {
        result = server::run(state) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
