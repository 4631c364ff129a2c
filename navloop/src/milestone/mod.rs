//! Milestones evaluated against consecutive progress snapshots.
//!
//! A milestone is a predicate over `(previous, current)` progress. Milestones
//! are registered once per session and evaluated every tick in registration
//! order. Voice-instruction milestones additionally yield the literal SSML to
//! announce, which also drives the voice cache's eviction throttle.
//!
//! # Available Milestones
//!
//! - [`StepMilestone`]: a new step started
//! - [`DistanceMilestone`]: step distance remaining crossed a threshold
//! - [`VoiceInstructionMilestone`]: the route engine has an announcement due

mod evaluator;
mod variants;

pub use evaluator::{EvaluationOutcome, MilestoneEvaluator, DEFAULT_EVICTION_THRESHOLD};
pub use variants::{DistanceMilestone, StepMilestone, VoiceInstructionMilestone};

use crate::progress::RouteProgress;

/// A registered navigation milestone.
///
/// Implementations must be `Send + Sync` so the milestone set can move onto
/// the tick worker.
pub trait Milestone: Send + Sync {
    /// Caller-chosen identifier reported when the milestone triggers.
    fn identifier(&self) -> u32;

    /// Whether the milestone occurs between `previous` and `current`.
    fn is_occurring(&self, previous: &RouteProgress, current: &RouteProgress) -> bool;

    /// Instruction text to announce when this milestone triggers.
    ///
    /// Only voice-instruction milestones return `Some`.
    fn announcement(&self, _previous: &RouteProgress, _current: &RouteProgress) -> Option<String> {
        None
    }
}

/// A milestone that triggered on a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredMilestone {
    /// Identifier of the registered milestone.
    pub identifier: u32,
    /// SSML to announce, for voice-instruction milestones.
    pub instruction: Option<String>,
}

impl TriggeredMilestone {
    /// Whether this is a voice-instruction milestone.
    pub fn is_voice_instruction(&self) -> bool {
        self.instruction.is_some()
    }
}
