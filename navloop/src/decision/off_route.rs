//! Off-route detection.
//!
//! # Fallback Detection Logic
//!
//! ```text
//! distance(raw, leg geometry) > max_distance_m   for min_off_route_samples
//! consecutive new samples                        ──► off-route
//! any sample within max_distance_m               ──► run resets
//! ```
//!
//! Only samples with a new timestamp are counted, so a tick that re-reads the
//! same location does not extend the run.

use chrono::{DateTime, Utc};

use super::DecisionError;
use crate::engine::{NavigationStatus, RouteState};
use crate::geo::project_onto_line;
use crate::location::Location;
use crate::progress::RouteProgress;

/// Default distance from the route line before a sample counts as off-route.
pub const DEFAULT_MAX_DISTANCE_M: f64 = 50.0;

/// Default number of consecutive off-route samples required.
pub const DEFAULT_MIN_OFF_ROUTE_SAMPLES: usize = 3;

/// Thresholds for the geometric off-route check.
#[derive(Debug, Clone, PartialEq)]
pub struct OffRouteConfig {
    /// Maximum distance from the route line in metres.
    pub max_distance_m: f64,
    /// Consecutive samples beyond `max_distance_m` needed to report off-route.
    pub min_off_route_samples: usize,
}

impl Default for OffRouteConfig {
    fn default() -> Self {
        Self {
            max_distance_m: DEFAULT_MAX_DISTANCE_M,
            min_off_route_samples: DEFAULT_MIN_OFF_ROUTE_SAMPLES,
        }
    }
}

/// Geometric off-route detector.
#[derive(Debug)]
pub struct GeometricOffRoute {
    config: OffRouteConfig,
    /// Consecutive samples beyond the threshold.
    off_route_run: usize,
    /// Timestamp of the last sample counted.
    last_sample: Option<DateTime<Utc>>,
    /// Last decision, repeated for ticks without a new sample.
    last_decision: bool,
}

impl GeometricOffRoute {
    /// Create a detector with the given thresholds.
    pub fn new(config: OffRouteConfig) -> Self {
        Self {
            config,
            off_route_run: 0,
            last_sample: None,
            last_decision: false,
        }
    }

    /// Current run of consecutive off-route samples.
    pub fn off_route_run(&self) -> usize {
        self.off_route_run
    }

    /// Evaluate a raw sample against the current leg's geometry.
    pub fn is_user_off_route(
        &mut self,
        location: Option<&Location>,
        progress: &RouteProgress,
    ) -> Result<bool, DecisionError> {
        let Some(location) = location else {
            return Ok(false);
        };

        if !location.has_valid_coordinates() {
            return Err(DecisionError::InvalidLocation {
                latitude: location.latitude,
                longitude: location.longitude,
            });
        }

        if self.last_sample == Some(location.timestamp) {
            return Ok(self.last_decision);
        }

        let geometry = progress.route().leg_geometry(progress.leg_index());
        let projection = project_onto_line(location.point(), &geometry)
            .ok_or(DecisionError::MissingGeometry(progress.leg_index()))?;

        self.last_sample = Some(location.timestamp);

        if projection.distance_m > self.config.max_distance_m {
            self.off_route_run += 1;
            tracing::debug!(
                distance_m = format!("{:.1}", projection.distance_m),
                run = self.off_route_run,
                "Sample beyond off-route threshold"
            );
        } else {
            self.off_route_run = 0;
        }

        self.last_decision = self.off_route_run >= self.config.min_off_route_samples;
        Ok(self.last_decision)
    }

    /// Forget accumulated samples (e.g. after a reroute).
    pub fn reset(&mut self) {
        self.off_route_run = 0;
        self.last_sample = None;
        self.last_decision = false;
    }
}

/// Off-route engine selected by configuration.
#[derive(Debug)]
pub enum OffRouteEngine {
    /// Trust the route engine's state.
    Native,
    /// Geometric check against the raw location.
    Fallback(GeometricOffRoute),
}

impl OffRouteEngine {
    /// Create the fallback variant.
    pub fn fallback(config: OffRouteConfig) -> Self {
        OffRouteEngine::Fallback(GeometricOffRoute::new(config))
    }

    /// Decide whether the user is off route this tick.
    pub fn is_user_off_route(
        &mut self,
        status: &NavigationStatus,
        location: Option<&Location>,
        progress: &RouteProgress,
    ) -> Result<bool, DecisionError> {
        match self {
            OffRouteEngine::Native => Ok(status.route_state == RouteState::OffRoute),
            OffRouteEngine::Fallback(detector) => detector.is_user_off_route(location, progress),
        }
    }

    /// Reset per-route state.
    pub fn reset(&mut self) {
        if let OffRouteEngine::Fallback(detector) = self {
            detector.reset();
        }
    }

    /// Get a human-readable name for this engine.
    pub fn name(&self) -> &'static str {
        match self {
            OffRouteEngine::Native => "native",
            OffRouteEngine::Fallback(_) => "geometric",
        }
    }
}
