//! The tick worker.
//!
//! A single task owns the [`RouteProcessor`] and runs ticks serially. Prefetch
//! completions arrive on a second channel and are applied between ticks, so
//! every piece of tick state is touched from this task only.
//!
//! ```text
//! loop {
//!     shutdown cancelled   ──► cancel prefetches, exit
//!     fetch completion     ──► processor.on_fetch_complete
//!     interval tick        ──► read slot + route, process, send TickResult
//! }
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::location::LocationSlot;
use crate::processor::{RouteProcessor, TickResult};
use crate::route::Route;
use crate::voice::FetchOutcome;

/// Serial tick loop over a [`RouteProcessor`].
pub struct TickWorker {
    processor: RouteProcessor,
    tick_interval: Duration,
    slot: Arc<LocationSlot>,
    route: watch::Receiver<Option<Arc<Route>>>,
    results: mpsc::UnboundedSender<TickResult>,
    completions: mpsc::UnboundedReceiver<FetchOutcome>,
    ticks: u64,
    panics: u64,
}

impl TickWorker {
    /// Create a worker.
    ///
    /// # Arguments
    ///
    /// * `processor` - Per-tick pipeline, moved onto the worker
    /// * `tick_interval` - Tick cadence
    /// * `slot` - Latest-location slot written by the application
    /// * `route` - Current route, replaced wholesale on reroute
    /// * `results` - FIFO towards the dispatcher
    /// * `completions` - Prefetch completions from the voice cache
    pub fn new(
        processor: RouteProcessor,
        tick_interval: Duration,
        slot: Arc<LocationSlot>,
        route: watch::Receiver<Option<Arc<Route>>>,
        results: mpsc::UnboundedSender<TickResult>,
        completions: mpsc::UnboundedReceiver<FetchOutcome>,
    ) -> Self {
        Self {
            processor,
            tick_interval,
            slot,
            route,
            results,
            completions,
            ticks: 0,
            panics: 0,
        }
    }

    /// Run one tick. Returns false when no route is loaded.
    pub fn tick(&mut self) -> bool {
        let Some(route) = self.route.borrow().clone() else {
            tracing::trace!("No route loaded, skipping tick");
            return false;
        };

        let location = self.slot.latest();
        let now = Utc::now();
        let processor = &mut self.processor;

        match catch_unwind(AssertUnwindSafe(|| processor.process(now, location, &route))) {
            Ok(result) => {
                self.ticks += 1;
                if self.results.send(result).is_err() {
                    tracing::debug!("Dispatcher gone, dropping tick result");
                }
            }
            Err(_) => {
                self.panics += 1;
                tracing::error!(panics = self.panics, "Tick panicked, continuing with next tick");
            }
        }
        true
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            "Tick worker started"
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                Some(outcome) = self.completions.recv() => {
                    self.processor.on_fetch_complete(outcome);
                }

                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        self.processor.shutdown();
        tracing::info!(ticks = self.ticks, panics = self.panics, "Tick worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavigationConfig;
    use crate::engine::{NavigationStatus, RouteEngine};
    use crate::location::Location;
    use crate::milestone::Milestone;
    use crate::progress::RouteProgress;
    use crate::route::tests::equator_route;
    use chrono::DateTime;

    struct StaticEngine;

    impl RouteEngine for StaticEngine {
        fn status(&self, now: DateTime<Utc>, _lag: Duration) -> NavigationStatus {
            NavigationStatus::tracking(now, 0, 0, 1000.0, 1000.0)
        }

        fn name(&self) -> &'static str {
            "static"
        }
    }

    /// Panics on the first evaluation only.
    struct PanicOnce {
        fired: parking_lot::Mutex<bool>,
    }

    impl Milestone for PanicOnce {
        fn identifier(&self) -> u32 {
            9
        }

        fn is_occurring(&self, _: &RouteProgress, _: &RouteProgress) -> bool {
            let mut fired = self.fired.lock();
            if !*fired {
                *fired = true;
                drop(fired);
                panic!("milestone bug");
            }
            false
        }
    }

    fn worker(
        milestones: Vec<Box<dyn Milestone>>,
        route: Option<Arc<Route>>,
    ) -> (TickWorker, mpsc::UnboundedReceiver<TickResult>, Arc<LocationSlot>) {
        let processor = RouteProcessor::new(
            &NavigationConfig::default(),
            Arc::new(StaticEngine),
            milestones,
        );
        let slot = Arc::new(LocationSlot::new());
        let (_route_tx, route_rx) = watch::channel(route);
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (_completions_tx, completions_rx) = mpsc::unbounded_channel();
        let worker = TickWorker::new(
            processor,
            Duration::from_millis(10),
            slot.clone(),
            route_rx,
            results_tx,
            completions_rx,
        );
        (worker, results_rx, slot)
    }

    #[test]
    fn test_tick_without_route_is_skipped() {
        let (mut worker, mut results, _) = worker(vec![], None);
        assert!(!worker.tick());
        assert!(results.try_recv().is_err());
    }

    #[test]
    fn test_tick_reads_latest_location() {
        let route = Arc::new(equator_route(&[1]));
        let (mut worker, mut results, slot) = worker(vec![], Some(route));

        slot.update(Location::new(0.0, 0.001));
        slot.update(Location::new(0.0, 0.002));
        assert!(worker.tick());

        let result = results.try_recv().unwrap();
        assert_eq!(result.snapped_location.unwrap().longitude, 0.002);
    }

    #[test]
    fn test_panicking_tick_is_survived() {
        let route = Arc::new(equator_route(&[1]));
        let panicking: Box<dyn Milestone> = Box::new(PanicOnce {
            fired: parking_lot::Mutex::new(false),
        });
        let (mut worker, mut results, _) = worker(vec![panicking], Some(route));

        worker.tick();
        assert!(results.try_recv().is_err());

        worker.tick();
        assert!(results.try_recv().is_ok());
        assert_eq!(worker.panics, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let route = Arc::new(equator_route(&[1]));
        let (worker, mut results, _) = worker(vec![], Some(route));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(worker.run(shutdown.clone()));
        let first = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .unwrap();
        assert!(first.is_some());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
