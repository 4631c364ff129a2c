//! Ordered delivery of tick results to the application.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::location::Location;
use crate::milestone::TriggeredMilestone;
use crate::processor::TickResult;
use crate::progress::RouteProgress;

/// Receives tick results.
///
/// All four hooks are called for every tick, in declaration order, on the
/// dispatcher task. Implementations should return quickly; a slow listener
/// delays delivery but never the tick loop.
pub trait NavigationListener: Send + Sync {
    /// New progress for this tick.
    fn on_progress(&self, _location: Option<&Location>, _progress: &RouteProgress) {}

    /// Milestones triggered this tick (possibly none).
    fn on_milestones(&self, _milestones: &[TriggeredMilestone], _progress: &RouteProgress) {}

    /// Off-route decision for this tick.
    fn on_off_route(&self, _location: Option<&Location>, _off_route: bool) {}

    /// Whether to check for a faster route.
    fn on_check_faster_route(
        &self,
        _location: Option<&Location>,
        _progress: &RouteProgress,
        _check: bool,
    ) {
    }
}

/// Drains tick results in FIFO order and calls the listener.
pub struct Dispatcher {
    listener: Arc<dyn NavigationListener>,
    delivered: u64,
}

impl Dispatcher {
    /// Create a dispatcher for `listener`.
    pub fn new(listener: Arc<dyn NavigationListener>) -> Self {
        Self {
            listener,
            delivered: 0,
        }
    }

    /// Deliver one result through all four hooks.
    pub fn dispatch(&self, result: &TickResult) {
        let location = result.snapped_location.as_ref();
        self.listener.on_progress(location, &result.progress);
        self.listener.on_milestones(&result.milestones, &result.progress);
        self.listener.on_off_route(location, result.off_route);
        self.listener
            .on_check_faster_route(location, &result.progress, result.check_faster_route);
    }

    /// Run until `shutdown` is cancelled or the worker hangs up.
    pub async fn run(
        mut self,
        mut results: mpsc::UnboundedReceiver<TickResult>,
        shutdown: CancellationToken,
    ) {
        tracing::debug!("Dispatcher started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                result = results.recv() => {
                    let Some(result) = result else { break };
                    if catch_unwind(AssertUnwindSafe(|| self.dispatch(&result))).is_err() {
                        tracing::error!("Navigation listener panicked, continuing");
                    }
                    self.delivered += 1;
                }
            }
        }

        tracing::debug!(delivered = self.delivered, "Dispatcher stopped");
    }
}
