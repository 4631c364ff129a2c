//! INI config file loading.
//!
//! `parse_ini` is the single place where INI keys are mapped to
//! `NavigationConfig` fields. Every value starts from the default and is
//! overlaid only when the key is present.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use super::size::parse_size;
use super::{EngineKind, NavigationConfig};

/// Errors loading a config file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse the file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// A key has an unusable value.
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Default config file location (`~/.config/navloop/config.ini`).
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("navloop")
        .join("config.ini")
}

impl NavigationConfig {
    /// Load from the default path, or defaults if the file does not exist.
    pub fn load() -> Result<Self, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an INI file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_file(path)?;
        let config = parse_ini(&ini)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(text).map_err(ini::Error::Parse)?;
        parse_ini(&ini)
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse `key` of `section` with `FromStr`, if present.
fn parse_key<T: FromStr>(
    props: &Properties,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigFileError> {
    match props.get(key) {
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(section, key, v, reason)),
        None => Ok(None),
    }
}

fn parse_bool(
    props: &Properties,
    section: &str,
    key: &str,
) -> Result<Option<bool>, ConfigFileError> {
    match props.get(key) {
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(Some(true)),
            "false" | "no" | "0" | "off" => Ok(Some(false)),
            _ => Err(invalid(section, key, v, "must be true or false")),
        },
        None => Ok(None),
    }
}

fn parse_positive_f64(
    props: &Properties,
    section: &str,
    key: &str,
) -> Result<Option<f64>, ConfigFileError> {
    match parse_key::<f64>(props, section, key, "must be a positive number")? {
        Some(v) if v.is_finite() && v > 0.0 => Ok(Some(v)),
        Some(_) => Err(invalid(
            section,
            key,
            props.get(key).unwrap_or_default(),
            "must be a positive number",
        )),
        None => Ok(None),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

fn non_empty(props: &Properties, key: &str) -> Option<String> {
    props
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(super) fn parse_ini(ini: &Ini) -> Result<NavigationConfig, ConfigFileError> {
    let mut config = NavigationConfig::default();
    const ENGINE: &str = "must be 'native' or 'fallback'";
    const MILLIS: &str = "must be a positive integer (milliseconds)";
    const SECONDS: &str = "must be a positive integer (seconds)";
    const COUNT: &str = "must be a positive integer";

    // [navigation] section
    if let Some(s) = ini.section(Some("navigation")) {
        let name = "navigation";
        if let Some(v) = parse_key::<u64>(s, name, "tick_interval_ms", MILLIS)? {
            if v == 0 {
                return Err(invalid(name, "tick_interval_ms", "0", MILLIS));
            }
            config.tick_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_key::<u64>(s, name, "location_lag_ms", MILLIS)? {
            config.location_lag = Duration::from_millis(v);
        }
        if let Some(v) = parse_key::<EngineKind>(s, name, "off_route_engine", ENGINE)? {
            config.off_route_engine = v;
        }
        if let Some(v) = parse_key::<EngineKind>(s, name, "snap_engine", ENGINE)? {
            config.snap_engine = v;
        }
        if let Some(v) = parse_key::<EngineKind>(s, name, "faster_route_engine", ENGINE)? {
            config.faster_route_engine = v;
        }
        if let Some(v) = parse_bool(s, name, "faster_route_enabled")? {
            config.faster_route_enabled = v;
        }
    }

    // [off_route] section
    if let Some(s) = ini.section(Some("off_route")) {
        let name = "off_route";
        if let Some(v) = parse_positive_f64(s, name, "max_distance_m")? {
            config.off_route.max_distance_m = v;
        }
        if let Some(v) = parse_key::<usize>(s, name, "min_samples", COUNT)? {
            config.off_route.min_off_route_samples = v.max(1);
        }
    }

    // [faster_route] section
    if let Some(s) = ini.section(Some("faster_route")) {
        let name = "faster_route";
        if let Some(v) = parse_key::<u64>(s, name, "check_interval_s", SECONDS)? {
            config.faster_route.check_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse_key::<u64>(s, name, "min_duration_remaining_s", SECONDS)? {
            config.faster_route.min_duration_remaining = Duration::from_secs(v);
        }
        if let Some(v) = parse_positive_f64(s, name, "min_distance_between_checks_m")? {
            config.faster_route.min_distance_between_checks_m = v;
        }
    }

    // [voice] section
    if let Some(s) = ini.section(Some("voice")) {
        let name = "voice";
        if let Some(v) = parse_bool(s, name, "enabled")? {
            config.voice.enabled = v;
        }
        if let Some(v) = non_empty(s, "language") {
            config.voice.language = v;
        }
        if let Some(v) = non_empty(s, "base_url") {
            config.voice.base_url = v;
        }
        if let Some(v) = non_empty(s, "access_token") {
            config.voice.access_token = Some(v);
        }
        if let Some(v) = non_empty(s, "cache_dir") {
            config.voice.cache_dir = expand_tilde(&v);
        }
        if let Some(v) = s.get("cache_size") {
            config.voice.max_size_bytes = parse_size(v)
                .map_err(|_| invalid(name, "cache_size", v, "expected format like '10MB' or '512KB'"))?;
        }
        if let Some(v) = parse_key::<usize>(s, name, "batch_size", COUNT)? {
            config.voice.batch_size = v.max(1);
        }
        if let Some(v) = parse_key::<usize>(s, name, "eviction_threshold", COUNT)? {
            config.voice.eviction_threshold = v.max(1);
        }
        if let Some(v) = parse_key::<usize>(s, name, "evict_count", COUNT)? {
            config.voice.evict_count = v;
        }
        if let Some(v) = parse_key::<u64>(s, name, "max_stale_hours", "must be a positive integer (hours)")? {
            config.voice.max_stale = Duration::from_secs(v * 3600);
        }
        if let Some(v) = parse_key::<u64>(s, name, "fresh_for_hours", "must be a positive integer (hours)")? {
            config.voice.fresh_for = Duration::from_secs(v * 3600);
        }
    }

    Ok(config)
}
