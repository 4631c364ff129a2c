//! Per-tick navigation status snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Point;

/// Route-tracking state reported by the route engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    /// No route loaded or no status could be produced.
    #[default]
    Invalid,
    /// Route loaded, no location matched yet.
    Initialized,
    /// Following the route.
    Tracking,
    /// Arrived at the final destination.
    Complete,
    /// Deviated from the route.
    OffRoute,
    /// No recent location samples.
    Stale,
    /// Location matched with low confidence.
    Uncertain,
}

impl RouteState {
    /// Get a short description for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteState::Invalid => "invalid",
            RouteState::Initialized => "initialized",
            RouteState::Tracking => "tracking",
            RouteState::Complete => "complete",
            RouteState::OffRoute => "off-route",
            RouteState::Stale => "stale",
            RouteState::Uncertain => "uncertain",
        }
    }

    /// Whether the status carries usable progress data.
    pub fn is_valid(&self) -> bool {
        !matches!(self, RouteState::Invalid)
    }
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot produced by the route engine once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationStatus {
    /// Tracking state.
    pub route_state: RouteState,
    /// Time the status was evaluated for.
    pub timestamp: DateTime<Utc>,
    /// Index of the current leg.
    #[serde(default)]
    pub leg_index: usize,
    /// Index of the current step within the leg.
    #[serde(default)]
    pub step_index: usize,
    /// Distance remaining on the current leg, in metres.
    #[serde(default)]
    pub remaining_leg_distance: f64,
    /// Time remaining on the current leg, in seconds.
    #[serde(default)]
    pub remaining_leg_duration: f64,
    /// Distance remaining on the current step, in metres.
    #[serde(default)]
    pub remaining_step_distance: f64,
    /// Location matched onto the route.
    #[serde(default)]
    pub snapped_point: Option<Point>,
    /// Bearing of the route at the snapped point.
    #[serde(default)]
    pub snapped_bearing_deg: Option<f64>,
    /// SSML of the voice instruction due at this tick, if any.
    #[serde(default)]
    pub voice_instruction: Option<String>,
}

impl NavigationStatus {
    /// Status returned when the engine cannot evaluate anything.
    pub fn invalid(timestamp: DateTime<Utc>) -> Self {
        Self {
            route_state: RouteState::Invalid,
            timestamp,
            leg_index: 0,
            step_index: 0,
            remaining_leg_distance: 0.0,
            remaining_leg_duration: 0.0,
            remaining_step_distance: 0.0,
            snapped_point: None,
            snapped_bearing_deg: None,
            voice_instruction: None,
        }
    }

    /// Create a tracking status at the given position on the route.
    pub fn tracking(
        timestamp: DateTime<Utc>,
        leg_index: usize,
        step_index: usize,
        remaining_leg_distance: f64,
        remaining_step_distance: f64,
    ) -> Self {
        Self {
            route_state: RouteState::Tracking,
            leg_index,
            step_index,
            remaining_leg_distance,
            remaining_step_distance,
            ..Self::invalid(timestamp)
        }
    }

    /// Set the route state.
    pub fn with_state(mut self, route_state: RouteState) -> Self {
        self.route_state = route_state;
        self
    }

    /// Set the remaining leg duration.
    pub fn with_leg_duration(mut self, seconds: f64) -> Self {
        self.remaining_leg_duration = seconds;
        self
    }

    /// Set the snapped point and bearing.
    pub fn with_snapped(mut self, point: Point, bearing_deg: f64) -> Self {
        self.snapped_point = Some(point);
        self.snapped_bearing_deg = Some(bearing_deg);
        self
    }

    /// Attach the voice instruction due this tick.
    pub fn with_voice_instruction(mut self, ssml: impl Into<String>) -> Self {
        self.voice_instruction = Some(ssml.into());
        self
    }
}
