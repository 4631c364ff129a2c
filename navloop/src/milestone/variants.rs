//! Built-in milestone variants.

use std::sync::Arc;

use super::Milestone;
use crate::progress::RouteProgress;

/// Triggers when a new step begins, and once on the first tick.
#[derive(Debug, Clone)]
pub struct StepMilestone {
    identifier: u32,
}

impl StepMilestone {
    /// Create a step milestone.
    pub fn new(identifier: u32) -> Self {
        Self { identifier }
    }
}

impl Milestone for StepMilestone {
    fn identifier(&self) -> u32 {
        self.identifier
    }

    fn is_occurring(&self, previous: &RouteProgress, current: &RouteProgress) -> bool {
        if !current.route_state().is_valid() {
            return false;
        }
        // (current, current) is only ever passed on the first tick
        std::ptr::eq(previous, current)
            || previous.leg_index() != current.leg_index()
            || previous.step_index() != current.step_index()
            || !same_route(previous, current)
    }
}

fn same_route(previous: &RouteProgress, current: &RouteProgress) -> bool {
    Arc::ptr_eq(previous.route(), current.route()) || previous.route() == current.route()
}

/// Triggers when step distance remaining drops to or below a threshold.
///
/// Fires once per step: the previous tick must have been above the threshold
/// on the same step.
#[derive(Debug, Clone)]
pub struct DistanceMilestone {
    identifier: u32,
    threshold_m: f64,
}

impl DistanceMilestone {
    /// Create a distance milestone firing at `threshold_m` before the maneuver.
    pub fn new(identifier: u32, threshold_m: f64) -> Self {
        Self {
            identifier,
            threshold_m,
        }
    }

    /// Distance before the maneuver at which the milestone fires.
    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }
}

impl Milestone for DistanceMilestone {
    fn identifier(&self) -> u32 {
        self.identifier
    }

    fn is_occurring(&self, previous: &RouteProgress, current: &RouteProgress) -> bool {
        let same_step = previous.leg_index() == current.leg_index()
            && previous.step_index() == current.step_index();

        current.route_state().is_valid()
            && same_step
            && previous.step_distance_remaining() > self.threshold_m
            && current.step_distance_remaining() <= self.threshold_m
    }
}

/// Triggers when the route engine has a voice instruction due.
#[derive(Debug, Clone)]
pub struct VoiceInstructionMilestone {
    identifier: u32,
}

impl VoiceInstructionMilestone {
    /// Create a voice-instruction milestone.
    pub fn new(identifier: u32) -> Self {
        Self { identifier }
    }
}

impl Milestone for VoiceInstructionMilestone {
    fn identifier(&self) -> u32 {
        self.identifier
    }

    fn is_occurring(&self, _previous: &RouteProgress, current: &RouteProgress) -> bool {
        current.voice_announcement().is_some()
    }

    fn announcement(&self, _previous: &RouteProgress, current: &RouteProgress) -> Option<String> {
        current.voice_announcement().map(str::to_string)
    }
}
