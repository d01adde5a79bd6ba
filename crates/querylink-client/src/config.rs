//! Runtime configuration for the connection manager and client.
//!
//! These are plain structs with `Duration` fields. They are built from
//! [`ClientSettings`] via `From` so this crate never touches the filesystem.

use std::time::Duration;

use querylink_settings::ClientSettings;
use url::Url;

use crate::backoff::ReconnectPolicy;
use crate::errors::ClientError;

/// Default endpoint.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:5000/ws";
/// Default accept timeout for `runQuery`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default keep-alive interval.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Default outbound queue capacity.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Connection manager configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Base endpoint URL, without the token.
    pub endpoint: String,
    /// Keep-alive ping interval; `None` disables pings.
    pub keepalive_interval: Option<Duration>,
    /// Outbound frame queue capacity.
    pub outbound_buffer: usize,
    /// Reconnect policy.
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ConnectionConfig {
    /// Config for `endpoint` with all other values at their defaults.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Resolve the URL to dial, appending `?token=` when a token is given.
    pub fn endpoint_url(&self, token: Option<&str>) -> Result<Url, ClientError> {
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason,
        };
        let mut url = Url::parse(&self.endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if let Some(token) = token {
            let _ = url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }
}

impl From<&ClientSettings> for ConnectionConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            keepalive_interval: (settings.keepalive_interval_ms > 0)
                .then(|| Duration::from_millis(settings.keepalive_interval_ms)),
            outbound_buffer: settings.outbound_buffer.max(1),
            reconnect: ReconnectPolicy::from(&settings.reconnect),
        }
    }
}

/// Full client configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Connection settings.
    pub connection: ConnectionConfig,
    /// How long `runQuery` waits for `queryAccepted`.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl From<&ClientSettings> for ClientConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            connection: ConnectionConfig::from(settings),
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
        }
    }
}

/// Endpoint URL with the `token` query parameter masked, for logs and errors.
pub(crate) fn redact(url: &Url) -> String {
    if url.query_pairs().all(|(k, _)| k != "token") {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    let _ = masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
