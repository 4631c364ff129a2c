//! Route progress snapshots.
//!
//! [`build_route_progress`] turns the engine's [`NavigationStatus`] and the
//! active [`Route`] into an immutable [`RouteProgress`]. The function is pure
//! and total: every route state, including invalid ones, yields a progress
//! value, so it can be unit tested with synthetic statuses.

use std::sync::Arc;

use crate::engine::{NavigationStatus, RouteState};
use crate::route::{LegStep, Route};

/// Immutable progress snapshot for one tick.
///
/// Two snapshots compare equal when the route and every derived metric match.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteProgress {
    route: Arc<Route>,
    route_state: RouteState,
    leg_index: usize,
    step_index: usize,
    distance_remaining: f64,
    duration_remaining: f64,
    leg_distance_remaining: f64,
    step_distance_remaining: f64,
    voice_announcement: Option<String>,
}

impl RouteProgress {
    /// The route this progress refers to.
    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    /// Tracking state reported for this tick.
    pub fn route_state(&self) -> RouteState {
        self.route_state
    }

    /// Index of the current leg.
    pub fn leg_index(&self) -> usize {
        self.leg_index
    }

    /// Index of the current step within the leg.
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// The current step, if the route has one at the current indices.
    pub fn current_step(&self) -> Option<&LegStep> {
        self.route.step(self.leg_index, self.step_index)
    }

    /// Distance remaining to the final destination, in metres.
    pub fn distance_remaining(&self) -> f64 {
        self.distance_remaining
    }

    /// Time remaining to the final destination, in seconds.
    pub fn duration_remaining(&self) -> f64 {
        self.duration_remaining
    }

    /// Distance remaining on the current leg, in metres.
    pub fn leg_distance_remaining(&self) -> f64 {
        self.leg_distance_remaining
    }

    /// Distance remaining on the current step, in metres.
    pub fn step_distance_remaining(&self) -> f64 {
        self.step_distance_remaining
    }

    /// Distance traveled along the route, in metres.
    pub fn distance_traveled(&self) -> f64 {
        (self.route.distance - self.distance_remaining).max(0.0)
    }

    /// Fraction of the route traveled, in `[0, 1]`.
    pub fn fraction_traveled(&self) -> f64 {
        if self.route.distance <= 0.0 {
            return 0.0;
        }
        (1.0 - self.distance_remaining / self.route.distance).clamp(0.0, 1.0)
    }

    /// SSML of the voice instruction due at this tick.
    pub fn voice_announcement(&self) -> Option<&str> {
        self.voice_announcement.as_deref()
    }
}

/// Build the progress snapshot for one tick.
///
/// Indices are clamped into the route and non-finite or negative metrics are
/// read as zero. An invalid status, or a route without legs, produces a
/// minimal progress with zero remaining distance.
pub fn build_route_progress(status: &NavigationStatus, route: Arc<Route>) -> RouteProgress {
    if !status.route_state.is_valid() || route.legs.is_empty() {
        return RouteProgress {
            route,
            route_state: status.route_state,
            leg_index: 0,
            step_index: 0,
            distance_remaining: 0.0,
            duration_remaining: 0.0,
            leg_distance_remaining: 0.0,
            step_distance_remaining: 0.0,
            voice_announcement: None,
        };
    }

    let leg_index = status.leg_index.min(route.legs.len() - 1);
    let step_count = route.legs[leg_index].steps.len();
    let step_index = status.step_index.min(step_count.saturating_sub(1));

    let leg_distance_remaining = sanitize(status.remaining_leg_distance);
    let leg_duration_remaining = sanitize(status.remaining_leg_duration);
    let step_distance_remaining = sanitize(status.remaining_step_distance);

    RouteProgress {
        distance_remaining: leg_distance_remaining + route.distance_after_leg(leg_index),
        duration_remaining: leg_duration_remaining + route.duration_after_leg(leg_index),
        route,
        route_state: status.route_state,
        leg_index,
        step_index,
        leg_distance_remaining,
        step_distance_remaining,
        voice_announcement: status.voice_instruction.clone(),
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
