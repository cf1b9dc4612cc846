//! Logging infrastructure for Lintel
//!
//! Provides structured security event logging and subscriber setup.

pub mod security;

pub use security::{SecurityEvent, SecurityEventKind};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
///
/// `RUST_LOG` wins when set; otherwise `lintel=<level>,security=info,info`.
/// `format = "json"` selects the JSON formatter.
pub fn init(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("lintel={},security=info,info", level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
