//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ChatHubSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `CHATHUB_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{ChatHubSettings, DuplicatePolicy};

/// Resolve the default settings path (`~/.chathub/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chathub").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ChatHubSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or a settings combination
/// that fails validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ChatHubSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<ChatHubSettings> {
    let defaults = serde_json::to_value(ChatHubSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CHATHUB_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut ChatHubSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning and the file/default value stays.
pub fn apply_overrides_from(
    settings: &mut ChatHubSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CHATHUB_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("CHATHUB_PORT", |s| parse_range::<u16>(s, 0, u16::MAX)) {
        settings.server.port = v;
    }

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = env.parsed("CHATHUB_SEND_QUEUE_CAPACITY", |s| {
        parse_range::<usize>(s, 1, 1_000_000)
    }) {
        settings.hub.send_queue_capacity = v;
    }
    if let Some(v) = env.parsed("CHATHUB_MAX_MESSAGE_SIZE", |s| {
        parse_range::<usize>(s, 1, 64 * 1024 * 1024)
    }) {
        settings.hub.max_message_size = v;
    }
    if let Some(v) = env.parsed("CHATHUB_PONG_WAIT_MS", |s| {
        parse_range::<u64>(s, 100, 3_600_000)
    }) {
        settings.hub.pong_wait_ms = v;
    }
    if let Some(v) = env.parsed("CHATHUB_PING_INTERVAL_MS", |s| {
        parse_range::<u64>(s, 50, 3_600_000)
    }) {
        settings.hub.ping_interval_ms = Some(v);
    }
    if let Some(v) = env.parsed("CHATHUB_WRITE_WAIT_MS", |s| {
        parse_range::<u64>(s, 10, 600_000)
    }) {
        settings.hub.write_wait_ms = v;
    }
    if let Some(v) = env.parsed("CHATHUB_DUPLICATE_POLICY", DuplicatePolicy::parse) {
        settings.hub.duplicate_policy = v;
    }

    // ── Auth / logging ──────────────────────────────────────────────
    if let Some(v) = env.string("CHATHUB_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = env.string("CHATHUB_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("CHATHUB_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an integer within an inclusive range.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}
