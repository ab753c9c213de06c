//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use grindhub_shared::constants::DEFAULT_HTTP_PORT;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5001`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./grindhub.db`
    pub database_path: PathBuf,

    /// Origins allowed by CORS. Empty means any origin.
    /// Env: `ALLOWED_ORIGINS` (comma separated)
    pub allowed_origins: Vec<String>,

    /// Fold presence changes already queued at the hub into one broadcast.
    /// With `false` every register/unregister emits its own broadcast.
    /// Env: `PRESENCE_COALESCE` (true/false)
    /// Default: `true`
    pub presence_coalesce: bool,

    /// Env: `WS_PING_INTERVAL_SECS`, default 30.
    pub ping_interval: Duration,

    /// Env: `WS_PONG_TIMEOUT_SECS`, default 10.
    pub pong_timeout: Duration,

    /// Sustained chat messages per second per user.
    /// Env: `MESSAGE_RATE_PER_SEC`, default 5.
    pub message_rate: f64,

    /// Env: `MESSAGE_BURST`, default 20.
    pub message_burst: f64,

    /// Sustained HTTP requests per second per client IP.
    /// Env: `HTTP_RATE_PER_SEC`, default 20.
    pub http_rate: f64,

    /// Env: `HTTP_BURST`, default 60.
    pub http_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./grindhub.db"),
            allowed_origins: Vec::new(),
            presence_coalesce: true,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            message_rate: 5.0,
            message_burst: 20.0,
            http_rate: 20.0,
            http_burst: 60.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            config.allowed_origins = parse_origins(&origins);
        }

        if let Ok(val) = std::env::var("PRESENCE_COALESCE") {
            config.presence_coalesce = val != "false" && val != "0";
        }

        if let Some(secs) = parse_var::<u64>("WS_PING_INTERVAL_SECS") {
            config.ping_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_var::<u64>("WS_PONG_TIMEOUT_SECS") {
            config.pong_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(rate) = parse_var("MESSAGE_RATE_PER_SEC") {
            config.message_rate = rate;
        }
        if let Some(burst) = parse_var("MESSAGE_BURST") {
            config.message_burst = burst;
        }
        if let Some(rate) = parse_var("HTTP_RATE_PER_SEC") {
            config.http_rate = rate;
        }
        if let Some(burst) = parse_var("HTTP_BURST") {
            config.http_burst = burst;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Read and parse an environment variable, warning on malformed values.
fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
