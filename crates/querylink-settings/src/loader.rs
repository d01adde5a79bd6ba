//! Layered loading: compiled defaults, then the JSON file, then `QUERYLINK_*`
//! environment variables, then validation.
//!
//! The file layer is merged key by key: nested objects merge recursively,
//! anything else in the file replaces the default, and `null` leaves the
//! default in place.

use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::ClientSettings;

const SETTINGS_FILE: &str = "settings.json";

/// Where the settings file lives.
///
/// `$QUERYLINK_HOME/settings.json` when set, else `~/.querylink/settings.json`.
pub fn settings_path() -> PathBuf {
    let base = non_empty_var("QUERYLINK_HOME").map_or_else(
        || {
            non_empty_var("HOME")
                .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
                .join(".querylink")
        },
        PathBuf::from,
    );
    base.join(SETTINGS_FILE)
}

/// Load from [`settings_path`] and the process environment.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` and the process environment.
///
/// A missing file is not an error: the defaults stand in for it.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    let mut layered = serde_json::to_value(ClientSettings::default())?;
    if let Some(file) = read_file_layer(path)? {
        layered = deep_merge(layered, file);
    }

    let mut settings: ClientSettings = serde_json::from_value(layered)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<Option<Value>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(None);
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    debug!(path = %path.display(), "read settings file");
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Merge `overlay` onto `base`.
///
/// Two objects merge per key; otherwise `overlay` wins. `null` values inside
/// an overlay object are skipped.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let slot = base.entry(key).or_insert(Value::Null);
                *slot = deep_merge(slot.take(), value);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `QUERYLINK_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut ClientSettings) {
    apply_env_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply `QUERYLINK_*` overrides read through `lookup`.
///
/// Empty values are treated as unset. A value that fails to parse, or falls
/// outside its range, is logged and skipped so the file/default value stays.
pub fn apply_env_overrides_from<F>(settings: &mut ClientSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = Overrides { lookup };

    env.text("QUERYLINK_ENDPOINT", |v| settings.endpoint = v);
    env.text("QUERYLINK_TOKEN", |v| settings.token = Some(v));
    env.number("QUERYLINK_REQUEST_TIMEOUT_MS", 100..=600_000, |v| {
        settings.request_timeout_ms = v;
    });
    env.number("QUERYLINK_KEEPALIVE_MS", 0..=3_600_000, |v| {
        settings.keepalive_interval_ms = v;
    });
    env.flag("QUERYLINK_RECONNECT", |v| settings.reconnect.enabled = v);
    env.number("QUERYLINK_RECONNECT_MAX_ATTEMPTS", 0..=100, |v| {
        settings.reconnect.max_attempts = v;
    });
    env.text("QUERYLINK_LOG_LEVEL", |v| settings.log_level = v);
}

/// Reject settings the client cannot run with.
pub fn validate(settings: &ClientSettings) -> Result<()> {
    if !["ws://", "wss://"]
        .iter()
        .any(|scheme| settings.endpoint.starts_with(scheme))
    {
        return Err(SettingsError::Invalid {
            field: "endpoint",
            reason: format!("expected a ws:// or wss:// URL, got '{}'", settings.endpoint),
        });
    }
    if settings.outbound_buffer == 0 {
        return Err(SettingsError::Invalid {
            field: "outboundBuffer",
            reason: "must be at least 1".into(),
        });
    }
    let reconnect = &settings.reconnect;
    if reconnect.base_delay_ms > reconnect.max_delay_ms {
        return Err(SettingsError::Invalid {
            field: "reconnect.baseDelayMs",
            reason: format!(
                "{} is larger than reconnect.maxDelayMs ({})",
                reconnect.base_delay_ms, reconnect.max_delay_ms
            ),
        });
    }
    Ok(())
}

/// Parse an on/off switch. Accepts `true`/`false`, `1`/`0`, `yes`/`no` and
/// `on`/`off`, in any case.
pub fn parse_flag(raw: &str) -> Option<bool> {
    const ON: [&str; 4] = ["true", "1", "yes", "on"];
    const OFF: [&str; 4] = ["false", "0", "no", "off"];
    let raw = raw.trim();
    if ON.iter().any(|s| s.eq_ignore_ascii_case(raw)) {
        Some(true)
    } else if OFF.iter().any(|s| s.eq_ignore_ascii_case(raw)) {
        Some(false)
    } else {
        None
    }
}

/// Parse a number and require it to fall inside `range`.
pub fn parse_in_range<T>(raw: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    raw.trim().parse().ok().filter(|n| range.contains(n))
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

struct Overrides<F> {
    lookup: F,
}

impl<F> Overrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn text(&self, name: &str, apply: impl FnOnce(String)) {
        if let Some(v) = self.raw(name) {
            apply(v);
        }
    }

    fn flag(&self, name: &str, apply: impl FnOnce(bool)) {
        let Some(raw) = self.raw(name) else { return };
        match parse_flag(&raw) {
            Some(v) => apply(v),
            None => warn!(var = name, value = %raw, "not an on/off value, ignoring"),
        }
    }

    fn number<T>(&self, name: &str, range: RangeInclusive<T>, apply: impl FnOnce(T))
    where
        T: FromStr + PartialOrd + std::fmt::Display,
    {
        let Some(raw) = self.raw(name) else { return };
        let (lo, hi) = (range.start().to_string(), range.end().to_string());
        match parse_in_range(&raw, range) {
            Some(v) => apply(v),
            None => warn!(var = name, value = %raw, min = %lo, max = %hi, "out of range, ignoring"),
        }
    }
}
