//! Settings types.

use serde::{Deserialize, Serialize};

/// Top-level client settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// WebSocket endpoint (`ws://` or `wss://`, path normally `/ws`).
    pub endpoint: String,
    /// Opaque auth token appended as `?token=` on connect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// How long a `runQuery` waits for `queryAccepted`.
    pub request_timeout_ms: u64,
    /// Keep-alive ping interval; `0` disables pings.
    pub keepalive_interval_ms: u64,
    /// Capacity of the outbound frame queue.
    pub outbound_buffer: usize,
    /// Reconnect policy.
    pub reconnect: ReconnectSettings,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:5000/ws".to_string(),
            token: None,
            request_timeout_ms: 5000,
            keepalive_interval_ms: 30_000,
            outbound_buffer: 256,
            reconnect: ReconnectSettings::default(),
            log_level: "warn".to_string(),
        }
    }
}

/// Automatic reconnect with capped exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Whether to reconnect after an unexpected close.
    pub enabled: bool,
    /// Delay before the first reconnect attempt.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Attempts before giving up for good.
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            max_attempts: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(ClientSettings::default()).unwrap();
        assert_eq!(v["requestTimeoutMs"], 5000);
        assert_eq!(v["keepaliveIntervalMs"], 30_000);
        assert_eq!(v["reconnect"]["maxAttempts"], 5);
        assert!(v.get("token").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: ClientSettings =
            serde_json::from_str(r#"{"reconnect": {"maxAttempts": 2}}"#).unwrap();
        assert_eq!(s.reconnect.max_attempts, 2);
        assert_eq!(s.reconnect.base_delay_ms, 1000);
        assert_eq!(s.request_timeout_ms, 5000);
    }

    #[test]
    fn serde_roundtrip() {
        let s = ClientSettings {
            token: Some("abc".into()),
            ..ClientSettings::default()
        };
        let json = serde_json::to_string(&s).unwrap();
        let back: ClientSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
