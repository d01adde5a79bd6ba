//! # querylink-settings
//!
//! Client configuration for querylink. Each layer overrides the one before:
//!
//! - compiled [`ClientSettings::default()`]
//! - the JSON file at [`settings_path()`], merged per key
//! - `QUERYLINK_*` environment variables
//!
//! The result is validated before it is returned. The client crate never reads
//! files itself; it converts a loaded [`ClientSettings`] into its own config
//! types.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_env_overrides_from, deep_merge, load_settings,
    load_settings_from_path, parse_flag, parse_in_range, settings_path, validate,
};
pub use types::{ClientSettings, ReconnectSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_ends_in_settings_json() {
        assert!(settings_path().ends_with("settings.json"));
    }

    #[test]
    fn default_settings_match_protocol_constants() {
        let settings = ClientSettings::default();
        assert_eq!(settings.endpoint, "ws://127.0.0.1:5000/ws");
        assert!(settings.token.is_none());
        assert_eq!(settings.request_timeout_ms, 5000);
        assert_eq!(settings.keepalive_interval_ms, 30_000);
        assert!(settings.reconnect.enabled);
        assert_eq!(settings.reconnect.base_delay_ms, 1000);
        assert_eq!(settings.reconnect.max_delay_ms, 10_000);
        assert_eq!(settings.reconnect.max_attempts, 5);
    }
}
