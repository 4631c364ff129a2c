//! Milestone evaluation for one tick.

use super::{Milestone, TriggeredMilestone};
use crate::processor::SessionCounters;
use crate::progress::RouteProgress;

/// Default number of voice announcements between cache evictions.
pub const DEFAULT_EVICTION_THRESHOLD: usize = 5;

/// Result of evaluating every milestone for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationOutcome {
    /// Triggered milestones in registration order.
    pub triggered: Vec<TriggeredMilestone>,
    /// Whether this tick's announcements made a cache eviction due.
    pub eviction_due: bool,
}

/// Evaluates registered milestones in registration order.
pub struct MilestoneEvaluator {
    milestones: Vec<Box<dyn Milestone>>,
    eviction_threshold: usize,
}

impl std::fmt::Debug for MilestoneEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MilestoneEvaluator")
            .field("milestones", &self.milestones.len())
            .field("eviction_threshold", &self.eviction_threshold)
            .finish()
    }
}

impl MilestoneEvaluator {
    /// Create an evaluator over the given milestones.
    ///
    /// # Arguments
    ///
    /// * `milestones` - Milestones in registration order
    /// * `eviction_threshold` - Voice announcements between cache evictions
    pub fn new(milestones: Vec<Box<dyn Milestone>>, eviction_threshold: usize) -> Self {
        Self {
            milestones,
            eviction_threshold: eviction_threshold.max(1),
        }
    }

    /// Number of registered milestones.
    pub fn len(&self) -> usize {
        self.milestones.len()
    }

    /// Whether no milestones are registered.
    pub fn is_empty(&self) -> bool {
        self.milestones.is_empty()
    }

    /// Evaluate every milestone against `(previous, current)`.
    ///
    /// Each triggered voice-instruction milestone increments the announced
    /// counter; every `eviction_threshold`-th announcement sets the
    /// eviction-due flag on `counters`.
    pub fn evaluate(
        &self,
        previous: &RouteProgress,
        current: &RouteProgress,
        counters: &mut SessionCounters,
    ) -> EvaluationOutcome {
        let mut outcome = EvaluationOutcome::default();

        for milestone in &self.milestones {
            if !milestone.is_occurring(previous, current) {
                continue;
            }

            let instruction = milestone.announcement(previous, current);
            if instruction.is_some() && counters.record_announcement(self.eviction_threshold) {
                tracing::debug!(
                    announced = counters.announced(),
                    "Voice announcement threshold reached, eviction due"
                );
                outcome.eviction_due = true;
            }

            outcome.triggered.push(TriggeredMilestone {
                identifier: milestone.identifier(),
                instruction,
            });
        }

        outcome
    }
}
