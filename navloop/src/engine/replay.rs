//! Replay route engine.
//!
//! Returns pre-recorded statuses one per call. Used by the integration tests
//! and the CLI simulator in place of a real evaluator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{NavigationStatus, RouteEngine};
use crate::location::Location;

/// One recorded tick: the raw sample fed in and the status the engine produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayFrame {
    /// Raw location sample, if one arrived before this tick.
    #[serde(default)]
    pub location: Option<Location>,
    /// Status produced for this tick.
    pub status: NavigationStatus,
}

#[derive(Debug)]
struct ReplayCursor {
    next: usize,
    locations_seen: usize,
}

/// Route engine that replays recorded statuses.
///
/// Each [`status`](RouteEngine::status) call returns the next recorded
/// status, re-stamped with the requested time. Once exhausted the last status
/// repeats. An empty recording always yields invalid statuses.
#[derive(Debug)]
pub struct ReplayRouteEngine {
    statuses: Vec<NavigationStatus>,
    cursor: Mutex<ReplayCursor>,
}

impl ReplayRouteEngine {
    /// Create an engine over the given statuses.
    pub fn new(statuses: Vec<NavigationStatus>) -> Self {
        Self {
            statuses,
            cursor: Mutex::new(ReplayCursor {
                next: 0,
                locations_seen: 0,
            }),
        }
    }

    /// Create an engine from recorded frames, keeping only their statuses.
    pub fn from_frames(frames: &[ReplayFrame]) -> Self {
        Self::new(frames.iter().map(|f| f.status.clone()).collect())
    }

    /// Number of recorded statuses.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Whether the recording is empty.
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Whether every recorded status has been returned at least once.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.lock().next >= self.statuses.len()
    }

    /// Number of location samples pushed into the engine.
    pub fn locations_seen(&self) -> usize {
        self.cursor.lock().locations_seen
    }
}

impl RouteEngine for ReplayRouteEngine {
    fn status(&self, now: DateTime<Utc>, _lag: Duration) -> NavigationStatus {
        let mut cursor = self.cursor.lock();

        let Some(last) = self.statuses.len().checked_sub(1) else {
            return NavigationStatus::invalid(now);
        };

        let index = cursor.next.min(last);
        cursor.next = cursor.next.saturating_add(1);

        let mut status = self.statuses[index].clone();
        status.timestamp = now;
        status
    }

    fn update_location(&self, _location: &Location) {
        self.cursor.lock().locations_seen += 1;
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RouteState;

    #[test]
    fn test_empty_replay_is_invalid() {
        let engine = ReplayRouteEngine::new(vec![]);
        let status = engine.status(Utc::now(), Duration::ZERO);
        assert_eq!(status.route_state, RouteState::Invalid);
        assert!(engine.is_exhausted());
    }

    #[test]
    fn test_replay_advances_then_repeats_last() {
        let t = Utc::now();
        let engine = ReplayRouteEngine::new(vec![
            NavigationStatus::tracking(t, 0, 0, 300.0, 100.0),
            NavigationStatus::tracking(t, 0, 1, 200.0, 200.0),
        ]);

        assert_eq!(engine.status(t, Duration::ZERO).step_index, 0);
        assert!(!engine.is_exhausted());
        assert_eq!(engine.status(t, Duration::ZERO).step_index, 1);
        assert!(engine.is_exhausted());
        assert_eq!(engine.status(t, Duration::ZERO).step_index, 1);
    }

    #[test]
    fn test_replay_restamps_timestamp() {
        let recorded = Utc::now() - chrono::Duration::hours(1);
        let engine = ReplayRouteEngine::new(vec![NavigationStatus::invalid(recorded)]);
        let now = Utc::now();
        assert_eq!(engine.status(now, Duration::ZERO).timestamp, now);
    }

    #[test]
    fn test_replay_counts_locations() {
        let engine = ReplayRouteEngine::new(vec![]);
        engine.update_location(&Location::new(0.0, 0.0));
        engine.update_location(&Location::new(0.0, 0.0));
        assert_eq!(engine.locations_seen(), 2);
    }
}
