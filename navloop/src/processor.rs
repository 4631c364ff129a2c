//! Per-tick processing pipeline.
//!
//! # Tick Order
//!
//! ```text
//! status ─► progress ─► off-route ─► snap ─► faster-route
//!        ─► voice cache maintenance ─► milestones ─► TickResult
//! ```
//!
//! Voice cache maintenance runs before milestone evaluation, so an eviction
//! made due by this tick's announcements is serviced on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{EngineKind, NavigationConfig};
use crate::decision::{FasterRouteEngine, OffRouteEngine, SnapEngine};
use crate::engine::RouteEngine;
use crate::location::Location;
use crate::milestone::{Milestone, MilestoneEvaluator, TriggeredMilestone};
use crate::progress::{build_route_progress, RouteProgress};
use crate::route::Route;
use crate::voice::{FetchOutcome, VoiceInstructionCacheManager};

/// Counters of one route session, reset together on route change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCounters {
    announced: usize,
    total: usize,
    cursor: usize,
    eviction_due: bool,
}

impl SessionCounters {
    /// Reset for a route with `total` voice instructions.
    pub fn reset(&mut self, total: usize) {
        *self = Self {
            total,
            ..Self::default()
        };
    }

    /// Voice announcements made this session.
    pub fn announced(&self) -> usize {
        self.announced
    }

    /// Voice instructions in the current route.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Next instruction index to prefetch.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether a cache eviction is pending.
    pub fn eviction_due(&self) -> bool {
        self.eviction_due
    }

    /// Count one announcement. Returns true when it made an eviction due.
    pub fn record_announcement(&mut self, threshold: usize) -> bool {
        self.announced += 1;
        if self.announced % threshold.max(1) == 0 {
            self.eviction_due = true;
            return true;
        }
        false
    }

    /// Clear the pending eviction.
    pub fn clear_eviction_due(&mut self) {
        self.eviction_due = false;
    }

    /// Take the cursor index and advance, or `None` once all are issued.
    pub fn advance_cursor(&mut self) -> Option<usize> {
        if self.cursor >= self.total {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        Some(index)
    }
}

/// Result of one tick, delivered to the listener in this field order.
#[derive(Debug, Clone)]
pub struct TickResult {
    /// Location snapped to the route, if any location is known.
    pub snapped_location: Option<Location>,
    /// Progress snapshot of this tick.
    pub progress: RouteProgress,
    /// Whether the user is off route.
    pub off_route: bool,
    /// Triggered milestones in registration order.
    pub milestones: Vec<TriggeredMilestone>,
    /// Whether the application should check for a faster route.
    pub check_faster_route: bool,
}

/// Runs one tick at a time and owns all mutable tick state.
pub struct RouteProcessor {
    engine: Arc<dyn RouteEngine>,
    location_lag: Duration,
    off_route: OffRouteEngine,
    snap: SnapEngine,
    faster_route: FasterRouteEngine,
    faster_route_enabled: bool,
    evaluator: MilestoneEvaluator,
    voice: Option<VoiceInstructionCacheManager>,
    counters: SessionCounters,
    route: Option<Arc<Route>>,
    previous: Option<RouteProgress>,
}

impl std::fmt::Debug for RouteProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteProcessor")
            .field("engine", &self.engine.name())
            .field("off_route", &self.off_route.name())
            .field("snap", &self.snap.name())
            .field("faster_route", &self.faster_route.name())
            .field("counters", &self.counters)
            .finish()
    }
}

impl RouteProcessor {
    /// Create a processor with engines selected by `config`.
    pub fn new(
        config: &NavigationConfig,
        engine: Arc<dyn RouteEngine>,
        milestones: Vec<Box<dyn Milestone>>,
    ) -> Self {
        let off_route = match config.off_route_engine {
            EngineKind::Native => OffRouteEngine::Native,
            EngineKind::Fallback => OffRouteEngine::fallback(config.off_route.clone()),
        };
        let snap = match config.snap_engine {
            EngineKind::Native => SnapEngine::Native,
            EngineKind::Fallback => SnapEngine::fallback(),
        };
        let faster_route = match config.faster_route_engine {
            EngineKind::Native => FasterRouteEngine::native(config.faster_route.clone()),
            EngineKind::Fallback => FasterRouteEngine::fallback(config.faster_route.clone()),
        };

        tracing::debug!(
            engine = engine.name(),
            off_route = off_route.name(),
            snap = snap.name(),
            faster_route = faster_route.name(),
            milestones = milestones.len(),
            "Route processor configured"
        );

        Self {
            engine,
            location_lag: config.location_lag,
            off_route,
            snap,
            faster_route,
            faster_route_enabled: config.faster_route_enabled,
            evaluator: MilestoneEvaluator::new(milestones, config.voice.eviction_threshold),
            voice: None,
            counters: SessionCounters::default(),
            route: None,
            previous: None,
        }
    }

    /// Attach a voice instruction cache manager.
    pub fn with_voice_cache(mut self, voice: VoiceInstructionCacheManager) -> Self {
        self.voice = Some(voice);
        self
    }

    /// Session counters.
    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    /// The voice cache manager, if attached.
    pub fn voice_cache(&self) -> Option<&VoiceInstructionCacheManager> {
        self.voice.as_ref()
    }

    /// Progress of the last tick.
    pub fn previous_progress(&self) -> Option<&RouteProgress> {
        self.previous.as_ref()
    }

    /// Run one tick.
    pub fn process(
        &mut self,
        now: DateTime<Utc>,
        location: Option<Location>,
        route: &Arc<Route>,
    ) -> TickResult {
        if self.is_new_route(route) {
            self.start_route(route);
        }

        let status = self.engine.status(now, self.location_lag);
        let progress = build_route_progress(&status, Arc::clone(route));
        let location = location.as_ref();

        // An invalid status is a no-op tick for the decision engines
        let tracking = status.route_state.is_valid();

        let off_route = tracking
            && self
                .off_route
                .is_user_off_route(&status, location, &progress)
                .unwrap_or_else(|e| {
                    tracing::warn!(engine = self.off_route.name(), error = %e, "Off-route check failed");
                    false
                });

        let snapped_location = if tracking {
            self.snap.snapped_location(&status, location, &progress)
        } else {
            location.cloned()
        };

        let check_faster_route = if tracking && self.faster_route_enabled && !off_route {
            self.faster_route
                .should_check_faster_route(snapped_location.as_ref(), &progress)
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        engine = self.faster_route.name(),
                        error = %e,
                        "Faster-route check failed"
                    );
                    false
                })
        } else {
            false
        };

        if let Some(voice) = self.voice.as_mut() {
            voice.maintain(&mut self.counters);
        }

        let previous = self.previous.as_ref().unwrap_or(&progress);
        let outcome = self.evaluator.evaluate(previous, &progress, &mut self.counters);

        tracing::trace!(
            state = %progress.route_state(),
            leg = progress.leg_index(),
            step = progress.step_index(),
            distance_remaining = progress.distance_remaining(),
            off_route,
            milestones = outcome.triggered.len(),
            "Tick processed"
        );

        self.previous = Some(progress.clone());

        TickResult {
            snapped_location,
            progress,
            off_route,
            milestones: outcome.triggered,
            check_faster_route,
        }
    }

    /// Forward a prefetch completion to the voice cache.
    pub fn on_fetch_complete(&mut self, outcome: FetchOutcome) {
        if let Some(voice) = self.voice.as_mut() {
            voice.on_fetch_complete(outcome);
        }
    }

    /// Cancel in-flight voice prefetches.
    pub fn shutdown(&mut self) {
        if let Some(voice) = self.voice.as_mut() {
            voice.cancel();
        }
    }

    fn is_new_route(&self, route: &Arc<Route>) -> bool {
        match &self.route {
            Some(current) => !Arc::ptr_eq(current, route) && **current != **route,
            None => true,
        }
    }

    fn start_route(&mut self, route: &Arc<Route>) {
        tracing::info!(
            legs = route.legs.len(),
            distance_m = route.distance,
            voice_instructions = route.voice_instruction_count(),
            "New route session"
        );

        self.off_route.reset();
        self.faster_route.reset();
        self.route = Some(Arc::clone(route));

        match self.voice.as_mut() {
            Some(voice) => voice.start_session(Arc::clone(route), &mut self.counters),
            None => self.counters.reset(route.voice_instruction_count()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NavigationStatus, ReplayRouteEngine, RouteState};
    use crate::geo::Point;
    use crate::milestone::{StepMilestone, VoiceInstructionMilestone};
    use crate::route::tests::equator_route;
    use chrono::TimeZone;

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
    }

    fn processor(statuses: Vec<NavigationStatus>, config: &NavigationConfig) -> RouteProcessor {
        RouteProcessor::new(
            config,
            Arc::new(ReplayRouteEngine::new(statuses)),
            vec![
                Box::new(StepMilestone::new(1)),
                Box::new(VoiceInstructionMilestone::new(2)),
            ],
        )
    }

    #[test]
    fn test_counters_reset_as_unit() {
        let mut counters = SessionCounters::default();
        counters.reset(3);
        counters.advance_cursor();
        for _ in 0..5 {
            counters.record_announcement(5);
        }
        assert!(counters.eviction_due());

        counters.reset(7);
        assert_eq!(counters, SessionCounters { total: 7, ..SessionCounters::default() });
    }

    #[test]
    fn test_cursor_never_passes_total() {
        let mut counters = SessionCounters::default();
        counters.reset(2);
        assert_eq!(counters.advance_cursor(), Some(0));
        assert_eq!(counters.advance_cursor(), Some(1));
        assert_eq!(counters.advance_cursor(), None);
        assert_eq!(counters.cursor(), 2);
    }

    #[test]
    fn test_first_tick_fires_step_milestone() {
        let route = Arc::new(equator_route(&[1, 1]));
        let mut p = processor(
            vec![NavigationStatus::tracking(t(0), 0, 0, 2000.0, 1000.0)],
            &NavigationConfig::default(),
        );

        let result = p.process(t(0), None, &route);

        assert_eq!(result.milestones.len(), 1);
        assert_eq!(result.milestones[0].identifier, 1);
        assert!(!result.off_route);
        assert_eq!(p.counters().total(), 2);
    }

    #[test]
    fn test_invalid_status_is_noop_progress() {
        let route = Arc::new(equator_route(&[1]));
        let mut p = processor(vec![NavigationStatus::invalid(t(0))], &NavigationConfig::default());

        let result = p.process(t(0), Some(Location::with_timestamp(0.0, 0.001, t(0))), &route);

        assert_eq!(result.progress.route_state(), RouteState::Invalid);
        assert_eq!(result.progress.distance_remaining(), 0.0);
        assert!(result.milestones.is_empty());
        assert!(!result.off_route);
    }

    #[test]
    fn test_invalid_status_skips_decision_engines() {
        let route = Arc::new(equator_route(&[0; 5]));
        let config = NavigationConfig::default()
            .with_off_route_engine(EngineKind::Fallback)
            .with_snap_engine(EngineKind::Fallback)
            .with_faster_route_engine(EngineKind::Fallback);
        let mut p = processor(
            vec![
                NavigationStatus::tracking(t(0), 0, 0, 4900.0, 900.0),
                NavigationStatus::invalid(t(1)),
                NavigationStatus::tracking(t(2), 0, 1, 3900.0, 900.0),
            ],
            &config,
        );
        // ~111 m north of the route line
        let raw = |s| Location::with_timestamp(0.001, 0.004, t(s));

        let first = p.process(t(0), Some(raw(0)), &route);
        assert!(!first.check_faster_route);
        assert!(first.snapped_location.unwrap().latitude.abs() < 1e-9);

        let dropout = p.process(t(1), Some(raw(1)), &route);
        assert!(!dropout.off_route);
        assert!(!dropout.check_faster_route);
        assert_eq!(dropout.snapped_location, Some(raw(1)));

        let resumed = p.process(t(2), Some(raw(2)), &route);
        assert!(!resumed.check_faster_route);
    }

    #[test]
    fn test_faster_route_uses_snapped_location() {
        let route = Arc::new(equator_route(&[0; 5]));
        let status = NavigationStatus::tracking(t(0), 0, 0, 5000.0, 1000.0)
            .with_leg_duration(1800.0)
            .with_snapped(Point::new(0.0, 0.001), 90.0);
        let mut p = processor(vec![status], &NavigationConfig::default());

        // No raw sample: the native snap still yields a location
        let armed = p.process(t(0), None, &route);
        assert!(armed.snapped_location.is_some());
        assert!(!armed.check_faster_route);

        let due = p.process(t(121), None, &route);
        assert!(due.check_faster_route);
    }

    #[test]
    fn test_voice_announcement_counted() {
        let route = Arc::new(equator_route(&[1]));
        let status = NavigationStatus::tracking(t(0), 0, 0, 1000.0, 1000.0)
            .with_voice_instruction("<speak>Go</speak>");
        let mut p = processor(vec![status], &NavigationConfig::default());

        let result = p.process(t(0), None, &route);

        let voice: Vec<_> = result.milestones.iter().filter(|m| m.is_voice_instruction()).collect();
        assert_eq!(voice.len(), 1);
        assert_eq!(voice[0].instruction.as_deref(), Some("<speak>Go</speak>"));
        assert_eq!(p.counters().announced(), 1);
    }

    #[test]
    fn test_decision_error_becomes_safe_default() {
        let route = Arc::new(equator_route(&[1]));
        let config = NavigationConfig::default().with_off_route_engine(EngineKind::Fallback);
        let mut p = processor(
            vec![NavigationStatus::tracking(t(0), 0, 0, 1000.0, 1000.0)],
            &config,
        );

        let result = p.process(t(0), Some(Location::with_timestamp(f64::NAN, 0.0, t(0))), &route);
        assert!(!result.off_route);
    }

    #[test]
    fn test_off_route_suppresses_faster_route() {
        let route = Arc::new(equator_route(&[0; 30]));
        let off = NavigationStatus::tracking(t(0), 0, 0, 30_000.0, 1000.0)
            .with_leg_duration(1800.0)
            .with_state(RouteState::OffRoute);
        let config = NavigationConfig::default().with_faster_route_engine(EngineKind::Fallback);
        let mut p = processor(vec![off], &config);

        let location = Location::with_timestamp(0.0, 0.0, t(0));
        for _ in 0..5 {
            let result = p.process(t(0), Some(location.clone()), &route);
            assert!(result.off_route);
            assert!(!result.check_faster_route);
        }
    }

    #[test]
    fn test_equal_route_is_not_a_new_session() {
        let mut p = processor(
            vec![NavigationStatus::tracking(t(0), 0, 0, 1000.0, 1000.0)],
            &NavigationConfig::default(),
        );

        p.process(t(0), None, &Arc::new(equator_route(&[2])));
        let result = p.process(t(1), None, &Arc::new(equator_route(&[2])));
        // Same route by value, same step: no step milestone
        assert!(result.milestones.is_empty());

        let result = p.process(t(2), None, &Arc::new(equator_route(&[3])));
        assert_eq!(result.milestones.len(), 1);
        assert_eq!(p.counters().total(), 3);
    }
}
