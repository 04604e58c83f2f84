//! Channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ChannelError, Result};

/// Endpoint used when nothing else is configured.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/alerts/";

/// Environment variable holding the endpoint URL.
pub const ENV_WS_URL: &str = "ALERTS_WS_URL";

/// Endpoint variable understood by the web frontend, read as a fallback.
pub const ENV_WS_URL_FALLBACK: &str = "REACT_APP_WS_URL";

pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
pub const DEFAULT_PING_INTERVAL_MS: u64 = 30_000;

/// Query parameter carrying the bearer token on the WebSocket upgrade.
pub const TOKEN_QUERY_PARAM: &str = "token";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Consecutive automatic reconnects before giving up.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Heartbeat period once [`crate::AlertChannel::start_ping`] is called.
    pub ping_interval_ms: u64,
    /// Bearer token sent as the `token` query parameter.
    pub access_token: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            access_token: None,
        }
    }
}

impl std::fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("url", &self.url)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("ping_interval_ms", &self.ping_interval_ms)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Default configuration with the endpoint taken from the environment.
    pub fn from_env() -> Self {
        let url = std::env::var(ENV_WS_URL)
            .or_else(|_| std::env::var(ENV_WS_URL_FALLBACK))
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_WS_URL.to_string());
        Self::new(url)
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_reconnect(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_delay_ms = saturating_millis(delay);
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval_ms = saturating_millis(interval);
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Check the configuration and return the parsed endpoint.
    pub fn validate(&self) -> Result<Url> {
        let url = Url::parse(self.url.trim())?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ChannelError::config(format!(
                "unsupported scheme `{}` (expected ws or wss)",
                url.scheme()
            )));
        }
        if self.ping_interval_ms == 0 {
            return Err(ChannelError::config("ping interval must be non-zero"));
        }
        Ok(url)
    }

    /// The URL actually dialed: the endpoint plus the token query parameter.
    pub fn endpoint(&self) -> Result<Url> {
        let mut url = self.validate()?;
        if let Some(token) = self.access_token.as_deref().filter(|t| !t.is_empty()) {
            let retained: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != TOKEN_QUERY_PARAM)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            {
                let mut pairs = url.query_pairs_mut();
                pairs.clear();
                for (k, v) in &retained {
                    pairs.append_pair(k, v);
                }
                pairs.append_pair(TOKEN_QUERY_PARAM, token);
            }
        }
        Ok(url)
    }
}

/// Whole milliseconds in `duration`, clamped to `u64::MAX`.
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
