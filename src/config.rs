//! Client configuration.
//!
//! The only externally supplied settings are the two base URLs: the API
//! origin for the bootstrap fetch and the channel origin for the persistent
//! WebSocket. Everything else is an in-process tuning knob with a default.
//!
//! # Example
//!
//! ```
//! use connect4_client::config::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::new("https://api.example.com/", "wss://ws.example.com")
//!     .with_shutdown_timeout(Duration::from_secs(2));
//! assert_eq!(config.snapshot_url("abc"), "https://api.example.com/games/abc/");
//! assert_eq!(config.channel_url("abc"), "wss://ws.example.com/games/ws/abc/");
//! ```

use std::time::Duration;

use crate::error::{Connect4Error, Result};

/// Environment variable holding the API origin.
pub const API_BASE_URL_VAR: &str = "CONNECT4_API_BASE_URL";

/// Environment variable holding the channel origin.
pub const WS_BASE_URL_VAR: &str = "CONNECT4_WS_BASE_URL";

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default deadline for the channel handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for the bootstrap fetch.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration shared by every match view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Origin of the request/response API, without trailing slash.
    pub api_base_url: String,
    /// Origin of the persistent channel, without trailing slash.
    pub ws_base_url: String,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events other than the final
    /// [`Closed`](crate::event::MatchEvent::Closed) are dropped with a warning.
    /// The board model itself is never dropped; it lives in a watch channel.
    ///
    /// Defaults to **64**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`MatchClient::close`](crate::client::MatchClient::close) waits
    /// for the event processor before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Handshake deadline for the persistent channel. Defaults to **10 seconds**.
    pub connect_timeout: Duration,
    /// Deadline for the bootstrap fetch. Defaults to **10 seconds**.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration from the two base URLs, with default tuning.
    pub fn new(api_base_url: impl Into<String>, ws_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: trim_base(api_base_url.into()),
            ws_base_url: trim_base(ws_base_url.into()),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Read both base URLs from [`API_BASE_URL_VAR`] and [`WS_BASE_URL_VAR`].
    ///
    /// # Errors
    ///
    /// Returns [`Connect4Error::Config`] if either variable is unset or blank.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Connect4Error::Config`] if either value is missing or blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| Connect4Error::Config(format!("{key} is not set")))
        };
        Ok(Self::new(
            require(API_BASE_URL_VAR)?,
            require(WS_BASE_URL_VAR)?,
        ))
    }

    /// Set the capacity of the bounded event channel (clamped to at least 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the channel handshake deadline.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the bootstrap fetch deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// `GET` endpoint of the bootstrap snapshot.
    pub fn snapshot_url(&self, match_id: &str) -> String {
        format!("{}/games/{match_id}/", self.api_base_url)
    }

    /// Endpoint of the persistent channel.
    pub fn channel_url(&self, match_id: &str) -> String {
        format!("{}/games/ws/{match_id}/", self.ws_base_url)
    }
}

/// Link a second player opens to join the match served at `origin`.
pub fn share_link(origin: &str, match_id: &str) -> String {
    format!("{}/games/{match_id}/join/", origin.trim_end_matches('/'))
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_owned()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("http://api", "ws://ws");
        assert_eq!(config.event_channel_capacity, 64);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_methods() {
        let config = ClientConfig::new("http://api", "ws://ws")
            .with_event_channel_capacity(0)
            .with_shutdown_timeout(Duration::from_millis(5))
            .with_connect_timeout(Duration::from_millis(6))
            .with_request_timeout(Duration::from_millis(7));
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(5));
        assert_eq!(config.connect_timeout, Duration::from_millis(6));
        assert_eq!(config.request_timeout, Duration::from_millis(7));
    }

    #[test]
    fn urls_trim_trailing_slashes() {
        let config = ClientConfig::new("http://api.test//", "ws://ws.test/");
        assert_eq!(config.api_base_url, "http://api.test");
        assert_eq!(config.snapshot_url("g1"), "http://api.test/games/g1/");
        assert_eq!(config.channel_url("g1"), "ws://ws.test/games/ws/g1/");
    }

    #[test]
    fn share_link_format() {
        assert_eq!(
            share_link("http://localhost:3000/", "g1"),
            "http://localhost:3000/games/g1/join/"
        );
    }

    #[test]
    fn from_lookup_reads_both_urls() {
        let vars: HashMap<&str, &str> = [
            (API_BASE_URL_VAR, "http://api.test"),
            (WS_BASE_URL_VAR, " ws://ws.test "),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.api_base_url, "http://api.test");
        assert_eq!(config.ws_base_url, "ws://ws.test");
    }

    #[test]
    fn from_lookup_rejects_missing_or_blank() {
        let err = ClientConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, Connect4Error::Config(ref m) if m.contains(API_BASE_URL_VAR)));

        let err = ClientConfig::from_lookup(|k| {
            (k == API_BASE_URL_VAR)
                .then(|| "http://api".to_string())
                .or_else(|| Some("   ".into()))
        })
        .unwrap_err();
        assert!(matches!(err, Connect4Error::Config(ref m) if m.contains(WS_BASE_URL_VAR)));
    }
}
