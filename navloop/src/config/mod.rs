//! Navigation configuration.
//!
//! `NavigationConfig` is the single configuration surface passed to
//! [`Navigation`](crate::Navigation). It can be built in code with the
//! `with_*` setters or loaded from an INI file:
//!
//! ```ini
//! [navigation]
//! tick_interval_ms = 1000
//! location_lag_ms = 1500
//! off_route_engine = fallback
//! snap_engine = native
//! faster_route_engine = native
//! faster_route_enabled = true
//!
//! [off_route]
//! max_distance_m = 50
//! min_samples = 3
//!
//! [faster_route]
//! check_interval_s = 120
//! min_duration_remaining_s = 600
//! min_distance_between_checks_m = 2000
//!
//! [voice]
//! enabled = true
//! language = en-US
//! access_token = pk.xxx
//! cache_dir = ~/.cache/navloop/voice
//! cache_size = 10MB
//! ```

mod file;
mod size;

pub use file::{config_file_path, ConfigFileError};
pub use size::{format_size, parse_size, SizeParseError};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::decision::{FasterRouteConfig, OffRouteConfig};
use crate::milestone::DEFAULT_EVICTION_THRESHOLD;
use crate::voice::{DEFAULT_BATCH_SIZE, DEFAULT_EVICT_COUNT, DEFAULT_FRESH_FOR, DEFAULT_MAX_STALE};

/// Default tick cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

/// Shortest tick cadence the scheduler runs at.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Default lag applied when asking the route engine for a status.
pub const DEFAULT_LOCATION_LAG: Duration = Duration::from_millis(1500);

/// Default byte budget of the voice response store.
pub const DEFAULT_VOICE_CACHE_SIZE: u64 = 10 * 1024 * 1024;

/// Default speech endpoint.
pub const DEFAULT_VOICE_BASE_URL: &str = "https://api.mapbox.com";

/// Default announcement language.
pub const DEFAULT_VOICE_LANGUAGE: &str = "en-US";

/// Which variant of a decision engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    /// Trust the route engine's own evaluation.
    #[default]
    Native,
    /// Compute the decision from geometry and progress.
    Fallback,
}

impl EngineKind {
    /// Lowercase name as used in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Native => "native",
            EngineKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(EngineKind::Native),
            "fallback" => Ok(EngineKind::Fallback),
            other => Err(format!("unknown engine kind '{}'", other)),
        }
    }
}

/// Default directory of the voice response store.
pub fn default_voice_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("navloop")
        .join("voice")
}

/// Voice instruction prefetch settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceCacheConfig {
    /// Prefetch upcoming instructions. Requires an access token.
    pub enabled: bool,
    /// Announcement language.
    pub language: String,
    /// Speech endpoint base URL.
    pub base_url: String,
    /// Access token appended to every request.
    pub access_token: Option<String>,
    /// Directory of the response store.
    pub cache_dir: PathBuf,
    /// Byte budget of the response store.
    pub max_size_bytes: u64,
    /// Requests issued per priming pass.
    pub batch_size: usize,
    /// Voice announcements between evictions.
    pub eviction_threshold: usize,
    /// Resident instructions removed per eviction.
    pub evict_count: usize,
    /// Staleness accepted while offline.
    pub max_stale: Duration,
    /// Freshness lifetime of stored responses.
    pub fresh_for: Duration,
}

impl Default for VoiceCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: DEFAULT_VOICE_LANGUAGE.to_string(),
            base_url: DEFAULT_VOICE_BASE_URL.to_string(),
            access_token: None,
            cache_dir: default_voice_cache_dir(),
            max_size_bytes: DEFAULT_VOICE_CACHE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
            evict_count: DEFAULT_EVICT_COUNT,
            max_stale: DEFAULT_MAX_STALE,
            fresh_for: DEFAULT_FRESH_FOR,
        }
    }
}

impl VoiceCacheConfig {
    /// Enable or disable prefetching.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the announcement language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the speech endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the response store directory.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Set the response store budget.
    pub fn with_max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }
}

/// Complete configuration of a navigation session.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationConfig {
    /// Off-route engine variant.
    pub off_route_engine: EngineKind,
    /// Snap engine variant.
    pub snap_engine: EngineKind,
    /// Faster-route engine variant.
    pub faster_route_engine: EngineKind,
    /// Whether faster-route probing runs at all.
    pub faster_route_enabled: bool,
    /// Tick cadence.
    pub tick_interval: Duration,
    /// Lag passed to the route engine with each status query.
    pub location_lag: Duration,
    /// Geometric off-route thresholds.
    pub off_route: OffRouteConfig,
    /// Faster-route cooldowns.
    pub faster_route: FasterRouteConfig,
    /// Voice instruction prefetch.
    pub voice: VoiceCacheConfig,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            off_route_engine: EngineKind::Native,
            snap_engine: EngineKind::Native,
            faster_route_engine: EngineKind::Native,
            faster_route_enabled: true,
            tick_interval: DEFAULT_TICK_INTERVAL,
            location_lag: DEFAULT_LOCATION_LAG,
            off_route: OffRouteConfig::default(),
            faster_route: FasterRouteConfig::default(),
            voice: VoiceCacheConfig::default(),
        }
    }
}

impl NavigationConfig {
    /// Select the off-route engine.
    pub fn with_off_route_engine(mut self, kind: EngineKind) -> Self {
        self.off_route_engine = kind;
        self
    }

    /// Select the snap engine.
    pub fn with_snap_engine(mut self, kind: EngineKind) -> Self {
        self.snap_engine = kind;
        self
    }

    /// Select the faster-route engine.
    pub fn with_faster_route_engine(mut self, kind: EngineKind) -> Self {
        self.faster_route_engine = kind;
        self
    }

    /// Enable or disable faster-route probing.
    pub fn with_faster_route_enabled(mut self, enabled: bool) -> Self {
        self.faster_route_enabled = enabled;
        self
    }

    /// Set the tick cadence. Zero is clamped to one millisecond.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(MIN_TICK_INTERVAL);
        self
    }

    /// Set the route engine lag.
    pub fn with_location_lag(mut self, lag: Duration) -> Self {
        self.location_lag = lag;
        self
    }

    /// Set the geometric off-route thresholds.
    pub fn with_off_route(mut self, off_route: OffRouteConfig) -> Self {
        self.off_route = off_route;
        self
    }

    /// Set the faster-route cooldowns.
    pub fn with_faster_route(mut self, faster_route: FasterRouteConfig) -> Self {
        self.faster_route = faster_route;
        self
    }

    /// Set the voice prefetch settings.
    pub fn with_voice(mut self, voice: VoiceCacheConfig) -> Self {
        self.voice = voice;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NavigationConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.location_lag, Duration::from_millis(1500));
        assert!(config.faster_route_enabled);
        assert_eq!(config.voice.max_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.voice.batch_size, 10);
        assert_eq!(config.voice.eviction_threshold, 5);
        assert_eq!(config.voice.evict_count, 4);
        assert_eq!(config.voice.max_stale, Duration::from_secs(3 * 86_400));
        assert!(config.voice.cache_dir.ends_with("navloop/voice"));
    }

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!("Native".parse::<EngineKind>().unwrap(), EngineKind::Native);
        assert_eq!(" fallback ".parse::<EngineKind>().unwrap(), EngineKind::Fallback);
        assert!("magic".parse::<EngineKind>().is_err());
        assert_eq!(EngineKind::Fallback.to_string(), "fallback");
    }

    #[test]
    fn test_builders() {
        let config = NavigationConfig::default()
            .with_off_route_engine(EngineKind::Fallback)
            .with_tick_interval(Duration::ZERO)
            .with_voice(VoiceCacheConfig::default().with_access_token("tok"));

        assert_eq!(config.off_route_engine, EngineKind::Fallback);
        assert_eq!(config.tick_interval, Duration::from_millis(1));
        assert_eq!(config.voice.access_token.as_deref(), Some("tok"));
    }
}
