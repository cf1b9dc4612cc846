//! Health check endpoints
//!
//! - /health  - Liveness probe (is the service running?)
//! - /version - Build information for deployment verification
//!
//! The gateway's health body also reports the signing key set in use, so an
//! operator can confirm a rotation has been picked up.

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::time::Instant;

use super::response::{json_response, BoxBody};
use crate::auth::KeyRegistry;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall health status (true if service is running)
    pub healthy: bool,
    /// Which listener answered
    pub service: &'static str,
    /// Service version
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    /// Current timestamp
    pub timestamp: String,
    /// Signing key status (gateway only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<KeyHealth>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyHealth {
    pub version: u64,
    pub active_kid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retiring_kid: Option<String>,
}

fn build_health_response(
    service: &'static str,
    started_at: Instant,
    keys: Option<&KeyRegistry>,
) -> HealthResponse {
    let keys = keys.map(|registry| {
        let set = registry.snapshot();
        KeyHealth {
            version: set.version,
            active_kid: set.active().kid.clone(),
            retiring_kid: set.retiring().map(|key| key.kid.clone()),
        }
    });

    HealthResponse {
        healthy: true,
        service,
        version: env!("CARGO_PKG_VERSION"),
        uptime: started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        keys,
    }
}

/// Handle liveness probe (/health)
pub fn health_check(
    service: &'static str,
    started_at: Instant,
    keys: Option<&KeyRegistry>,
) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &build_health_response(service, started_at, keys),
    )
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    /// Build timestamp
    pub build_time: &'static str,
    /// Service name
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<BoxBody> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "lintel",
    };

    json_response(StatusCode::OK, &response)
}
