//! Configuration for Lintel
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use rand::RngCore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{HashParams, KeyEntry, KeysFile, SecretPolicy};
use crate::gateway::RouteTable;
use crate::types::LintelError;

/// Hard ceiling for the clock skew tolerance
pub const MAX_CLOCK_SKEW_SECS: u64 = 60;

/// Longest token lifetime accepted (30 days)
pub const MAX_TOKEN_TTL_SECS: u64 = 30 * 86_400;

/// Lintel - stateless token gateway
///
/// Verifies bearer identity tokens locally and asserts the caller's identity
/// to services behind it.
#[derive(Parser, Debug, Clone)]
#[command(name = "lintel")]
#[command(about = "Stateless token gateway for identity-asserting services")]
pub struct Args {
    /// Public gateway address
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Internal address for the dashboard service.
    /// Must only be reachable from the gateway.
    #[arg(long, env = "DASHBOARD_LISTEN", default_value = "127.0.0.1:8081")]
    pub dashboard_listen: SocketAddr,

    /// Run the dashboard service in this process
    #[arg(long, env = "DASHBOARD_ENABLED", default_value = "true", action = clap::ArgAction::Set)]
    pub dashboard_enabled: bool,

    /// Comma-separated `prefix=url` upstream routes
    #[arg(long, env = "UPSTREAMS", default_value = "/dashboard=http://127.0.0.1:8081")]
    pub upstreams: String,

    /// Comma-separated upstream path prefixes that skip token verification.
    /// `/auth/*` and `/health` are always reachable without a token; `/auth`
    /// prefixes are rejected here.
    #[arg(long, env = "PUBLIC_ROUTES", default_value = "")]
    pub public_routes: String,

    /// Active signing secret (at least 32 bytes)
    #[arg(long, env = "SIGNING_KEY", hide_env_values = true)]
    pub signing_key: Option<String>,

    /// Key id for the active signing secret
    #[arg(long, env = "SIGNING_KEY_ID", default_value = "k1")]
    pub signing_key_id: String,

    /// Previous signing secret, still trusted until RETIRING_KEY_UNTIL
    #[arg(long, env = "RETIRING_KEY", hide_env_values = true)]
    pub retiring_key: Option<String>,

    /// Key id for the retiring secret
    #[arg(long, env = "RETIRING_KEY_ID")]
    pub retiring_key_id: Option<String>,

    /// End of the retiring key's overlap window (epoch seconds)
    #[arg(long, env = "RETIRING_KEY_UNTIL")]
    pub retiring_key_until: Option<u64>,

    /// JSON keys file; takes precedence over the SIGNING_KEY variables
    #[arg(long, env = "KEYS_FILE")]
    pub keys_file: Option<PathBuf>,

    /// How often the keys file is reloaded
    #[arg(long, env = "KEY_REFRESH_SECS", default_value = "300")]
    pub key_refresh_secs: u64,

    /// Token lifetime in seconds
    #[arg(long, env = "TOKEN_TTL_SECS", default_value = "86400")]
    pub token_ttl_secs: u64,

    /// Clock skew tolerance applied to iat/exp checks
    #[arg(long, env = "CLOCK_SKEW_SECS", default_value = "5")]
    pub clock_skew_secs: u64,

    /// Argon2 memory cost in KiB
    #[arg(long, env = "HASH_MEMORY_KIB", default_value = "19456")]
    pub hash_memory_kib: u32,

    /// Argon2 iterations
    #[arg(long, env = "HASH_ITERATIONS", default_value = "2")]
    pub hash_iterations: u32,

    /// Argon2 lanes
    #[arg(long, env = "HASH_PARALLELISM", default_value = "1")]
    pub hash_parallelism: u32,

    /// Minimum secret length at registration
    #[arg(long, env = "MIN_SECRET_LENGTH", default_value = "10")]
    pub min_secret_length: usize,

    /// Upstream request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Maximum request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (plain or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "plain")]
    pub log_format: String,

    /// Enable development mode (ephemeral signing key when none configured)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,
}

impl Args {
    /// Parsed upstream and public routes
    pub fn route_table(&self) -> Result<RouteTable, LintelError> {
        RouteTable::parse(&self.upstreams, &self.public_routes)
    }

    /// Signing keys from the keys file, the environment, or (dev mode only)
    /// a freshly generated ephemeral key.
    pub fn key_entries(&self) -> Result<Vec<KeyEntry>, LintelError> {
        if let Some(ref path) = self.keys_file {
            return Ok(KeysFile::load(path)?.keys);
        }

        let mut entries = Vec::new();
        match self.signing_key {
            Some(ref secret) => entries.push(KeyEntry::active(&self.signing_key_id, secret)),
            None if self.dev_mode => {
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                let kid = format!("dev-{}", hex::encode(&bytes[..4]));
                entries.push(KeyEntry::active(kid, hex::encode(bytes)));
            }
            None => {
                return Err(LintelError::Config(
                    "SIGNING_KEY or KEYS_FILE is required outside dev mode".into(),
                ))
            }
        }

        if let (Some(secret), Some(kid), Some(until)) = (
            self.retiring_key.as_ref(),
            self.retiring_key_id.as_ref(),
            self.retiring_key_until,
        ) {
            entries.push(KeyEntry::retiring(kid, secret, until));
        }

        Ok(entries)
    }

    pub fn hash_params(&self) -> HashParams {
        HashParams {
            memory_kib: self.hash_memory_kib,
            iterations: self.hash_iterations,
            parallelism: self.hash_parallelism,
        }
    }

    pub fn secret_policy(&self) -> SecretPolicy {
        SecretPolicy::with_min_length(self.min_secret_length)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn key_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.key_refresh_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.signing_key.is_none() && self.keys_file.is_none() {
            return Err("SIGNING_KEY or KEYS_FILE is required in production mode".to_string());
        }

        let retiring = [
            self.retiring_key.is_some(),
            self.retiring_key_id.is_some(),
            self.retiring_key_until.is_some(),
        ];
        if retiring.iter().any(|set| *set) && !retiring.iter().all(|set| *set) {
            return Err(
                "RETIRING_KEY, RETIRING_KEY_ID and RETIRING_KEY_UNTIL must be set together"
                    .to_string(),
            );
        }
        if self.retiring_key_id.as_deref() == Some(self.signing_key_id.as_str()) {
            return Err("RETIRING_KEY_ID must differ from SIGNING_KEY_ID".to_string());
        }

        if self.token_ttl_secs == 0 || self.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(format!(
                "TOKEN_TTL_SECS must be between 1 and {}",
                MAX_TOKEN_TTL_SECS
            ));
        }
        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(format!(
                "CLOCK_SKEW_SECS must be at most {}",
                MAX_CLOCK_SKEW_SECS
            ));
        }
        if self.key_refresh_secs == 0 {
            return Err("KEY_REFRESH_SECS must be greater than zero".to_string());
        }
        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than zero".to_string());
        }
        if self.min_secret_length < 8 {
            return Err("MIN_SECRET_LENGTH must be at least 8".to_string());
        }

        self.hash_params().hasher().map_err(|e| e.to_string())?;
        self.route_table().map_err(|e| e.to_string())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["lintel"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_production_requires_signing_key() {
        let parsed = args(&[]);
        assert!(parsed.validate().is_err());
        assert!(parsed.key_entries().is_err());

        let parsed = args(&["--signing-key", SECRET]);
        assert!(parsed.validate().is_ok());
        let entries = parsed.key_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kid, "k1");
    }

    #[test]
    fn test_dev_mode_generates_key() {
        let parsed = args(&["--dev-mode"]);
        assert!(parsed.validate().is_ok());
        let entries = parsed.key_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].kid.starts_with("dev-"));
        assert_eq!(entries[0].secret.len(), 64);
    }

    #[test]
    fn test_retiring_key_must_be_complete() {
        let parsed = args(&["--signing-key", SECRET, "--retiring-key", SECRET]);
        assert!(parsed.validate().is_err());

        let parsed = args(&[
            "--signing-key",
            SECRET,
            "--signing-key-id",
            "k2",
            "--retiring-key",
            "old-secret-that-is-at-least-32-characters",
            "--retiring-key-id",
            "k1",
            "--retiring-key-until",
            "2000000000",
        ]);
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.key_entries().unwrap().len(), 2);
    }

    #[test]
    fn test_skew_ceiling() {
        let parsed = args(&["--signing-key", SECRET, "--clock-skew-secs", "61"]);
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn test_ttl_bounds() {
        let parsed = args(&["--signing-key", SECRET, "--token-ttl-secs", "0"]);
        assert!(parsed.validate().is_err());
        let parsed = args(&["--signing-key", SECRET, "--token-ttl-secs", "2592001"]);
        assert!(parsed.validate().is_err());
        let parsed = args(&["--signing-key", SECRET, "--token-ttl-secs", "18446744073709551615"]);
        assert!(parsed.validate().is_err());
        let parsed = args(&["--signing-key", SECRET, "--token-ttl-secs", "2592000"]);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_bad_upstreams_rejected() {
        let parsed = args(&["--signing-key", SECRET, "--upstreams", "dashboard"]);
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn test_public_routes_exclude_issuer() {
        let parsed = args(&["--signing-key", SECRET, "--public-routes", "/auth/login"]);
        assert!(parsed.validate().is_err());

        let parsed = args(&["--signing-key", SECRET, "--public-routes", "/dashboard/about"]);
        assert!(parsed.validate().is_ok());
        assert!(parsed.route_table().unwrap().is_public("/dashboard/about"));
    }

    #[test]
    fn test_defaults() {
        let parsed = args(&["--signing-key", SECRET]);
        assert_eq!(parsed.listen.port(), 8080);
        assert!(parsed.dashboard_listen.ip().is_loopback());
        assert!(parsed.dashboard_enabled);
        assert_eq!(parsed.token_ttl_secs, 86_400);
        assert_eq!(parsed.max_body_bytes, 1_048_576);

        let routes = parsed.route_table().unwrap();
        assert!(!routes.is_public("/dashboard/entries"));
    }
}
