use std::time::Duration;

use reqwest::Url;
use tracing::warn;

use grindhub_shared::constants::{DEFAULT_HTTP_PORT, WS_PATH, WS_USER_QUERY};
use grindhub_shared::UserId;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base HTTP URL of the server; the WebSocket URL is derived from it.
    pub server_url: String,

    /// Fixed delay between reconnection attempts.
    pub reconnect_interval: Duration,

    /// Attempts made after an unintended drop before giving up.
    pub max_reconnect_attempts: u32,

    /// Timeout for REST backfill requests.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `GRINDHUB_*` environment variables, falling
    /// back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("GRINDHUB_SERVER_URL") {
            config.server_url = url;
        }
        if let Some(ms) = parse_var::<u64>("GRINDHUB_RECONNECT_INTERVAL_MS") {
            config.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var("GRINDHUB_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = attempts;
        }

        config
    }

    /// WebSocket endpoint for `user`: `http` becomes `ws`, `https` becomes
    /// `wss`, and the user id travels as a query parameter.
    pub fn ws_url(&self, user: &UserId) -> Result<String> {
        let mut url = Url::parse(&self.server_url)
            .map_err(|e| ClientError::Config(format!("server_url: {e}")))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::Config(format!(
                    "unsupported server_url scheme: {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Config("cannot switch to a WebSocket scheme".into()))?;
        url.set_path(WS_PATH);
        url.query_pairs_mut()
            .clear()
            .append_pair(WS_USER_QUERY, user.as_str());

        Ok(url.into())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring invalid value");
            None
        }
    }
}
