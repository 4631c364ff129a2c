//! Faster-route probing.
//!
//! Decides when the surrounding application should launch an out-of-band
//! request for a faster alternative. The request itself is outside this
//! crate; each engine only owns its cooldown so probing stays rare.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::DecisionError;
use crate::location::Location;
use crate::progress::RouteProgress;

/// Default minimum time between faster-route checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(120);

/// Default minimum route duration remaining for a check to be worthwhile.
pub const DEFAULT_MIN_DURATION_REMAINING: Duration = Duration::from_secs(600);

/// Default distance traveled between checks for the distance-based engine.
pub const DEFAULT_MIN_DISTANCE_BETWEEN_CHECKS_M: f64 = 2000.0;

/// Cooldown thresholds for faster-route probing.
#[derive(Debug, Clone, PartialEq)]
pub struct FasterRouteConfig {
    /// Minimum time between checks (timer-based engine).
    pub check_interval: Duration,
    /// Skip checks when less than this much travel time remains.
    pub min_duration_remaining: Duration,
    /// Minimum distance traveled between checks (distance-based engine).
    pub min_distance_between_checks_m: f64,
}

impl Default for FasterRouteConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            min_duration_remaining: DEFAULT_MIN_DURATION_REMAINING,
            min_distance_between_checks_m: DEFAULT_MIN_DISTANCE_BETWEEN_CHECKS_M,
        }
    }
}

/// Timer-based detector driven by location timestamps.
///
/// The first sample arms the timer; a check fires once `check_interval` has
/// elapsed since the last armed sample, and the timer re-arms.
#[derive(Debug)]
pub struct FasterRouteDetector {
    config: FasterRouteConfig,
    last_check: Option<DateTime<Utc>>,
}

impl FasterRouteDetector {
    /// Create a detector with the given thresholds.
    pub fn new(config: FasterRouteConfig) -> Self {
        Self {
            config,
            last_check: None,
        }
    }

    /// Decide whether to check for a faster route.
    pub fn should_check_faster_route(
        &mut self,
        location: Option<&Location>,
        progress: &RouteProgress,
    ) -> Result<bool, DecisionError> {
        let Some(location) = location else {
            return Ok(false);
        };

        let Some(last_check) = self.last_check else {
            self.last_check = Some(location.timestamp);
            return Ok(false);
        };

        let elapsed = location.timestamp - last_check;
        if elapsed < chrono::Duration::zero() {
            // Re-arm so a clock jump does not wedge the detector
            self.last_check = Some(location.timestamp);
            return Err(DecisionError::TimeWentBackwards(-elapsed.num_milliseconds()));
        }

        let interval = chrono::Duration::from_std(self.config.check_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        if elapsed < interval {
            return Ok(false);
        }

        self.last_check = Some(location.timestamp);

        let enough_remaining =
            progress.duration_remaining() > self.config.min_duration_remaining.as_secs_f64();
        if !enough_remaining {
            tracing::debug!(
                duration_remaining_s = progress.duration_remaining(),
                "Skipping faster-route check near destination"
            );
        }
        Ok(enough_remaining)
    }

    /// Forget the armed timer.
    pub fn reset(&mut self) {
        self.last_check = None;
    }
}

/// Distance-based detector driven by route progress.
///
/// Fires each time `min_distance_between_checks_m` more of the route has been
/// traveled since the previous check.
#[derive(Debug)]
pub struct DistanceFasterRoute {
    config: FasterRouteConfig,
    traveled_at_last_check: Option<f64>,
}

impl DistanceFasterRoute {
    /// Create a detector with the given thresholds.
    pub fn new(config: FasterRouteConfig) -> Self {
        Self {
            config,
            traveled_at_last_check: None,
        }
    }

    /// Decide whether to check for a faster route.
    pub fn should_check_faster_route(
        &mut self,
        location: Option<&Location>,
        progress: &RouteProgress,
    ) -> Result<bool, DecisionError> {
        if location.is_none() {
            return Ok(false);
        }

        let traveled = progress.distance_traveled();
        let Some(previous) = self.traveled_at_last_check else {
            self.traveled_at_last_check = Some(traveled);
            return Ok(false);
        };

        if traveled < previous {
            // Progress moved backwards, likely a new route: re-arm
            self.traveled_at_last_check = Some(traveled);
            return Ok(false);
        }

        if traveled - previous >= self.config.min_distance_between_checks_m {
            self.traveled_at_last_check = Some(traveled);
            return Ok(true);
        }

        Ok(false)
    }

    /// Forget the armed distance.
    pub fn reset(&mut self) {
        self.traveled_at_last_check = None;
    }
}

/// Faster-route engine selected by configuration.
#[derive(Debug)]
pub enum FasterRouteEngine {
    /// Timer-based detector.
    Native(FasterRouteDetector),
    /// Distance-based detector.
    Fallback(DistanceFasterRoute),
}

impl FasterRouteEngine {
    /// Create the timer-based variant.
    pub fn native(config: FasterRouteConfig) -> Self {
        FasterRouteEngine::Native(FasterRouteDetector::new(config))
    }

    /// Create the distance-based variant.
    pub fn fallback(config: FasterRouteConfig) -> Self {
        FasterRouteEngine::Fallback(DistanceFasterRoute::new(config))
    }

    /// Decide whether to check for a faster route this tick.
    pub fn should_check_faster_route(
        &mut self,
        location: Option<&Location>,
        progress: &RouteProgress,
    ) -> Result<bool, DecisionError> {
        match self {
            FasterRouteEngine::Native(detector) => {
                detector.should_check_faster_route(location, progress)
            }
            FasterRouteEngine::Fallback(detector) => {
                detector.should_check_faster_route(location, progress)
            }
        }
    }

    /// Reset per-route cooldown state.
    pub fn reset(&mut self) {
        match self {
            FasterRouteEngine::Native(detector) => detector.reset(),
            FasterRouteEngine::Fallback(detector) => detector.reset(),
        }
    }

    /// Get a human-readable name for this engine.
    pub fn name(&self) -> &'static str {
        match self {
            FasterRouteEngine::Native(_) => "timer",
            FasterRouteEngine::Fallback(_) => "distance",
        }
    }
}
