//! Route engine adapter.
//!
//! The route engine is the opaque evaluator that matches location samples
//! against the loaded route. This module only defines the seam the tick loop
//! talks to; real evaluators live outside this crate.
//!
//! # Contract
//!
//! - [`RouteEngine::status`] never blocks on network I/O.
//! - When no status can be produced (e.g. no route loaded) the engine returns
//!   [`NavigationStatus::invalid`], which callers treat as a no-op tick.
//!
//! # Implementors
//!
//! - [`ReplayRouteEngine`] - Replays recorded statuses (tests, simulation)

mod replay;
mod status;

pub use replay::{ReplayFrame, ReplayRouteEngine};
pub use status::{NavigationStatus, RouteState};

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::location::Location;

/// Interface over the route-state evaluator.
///
/// Implementations must be `Send + Sync`: locations are pushed from the
/// sensor side while the tick worker pulls statuses.
pub trait RouteEngine: Send + Sync {
    /// Evaluate the route state at `now`.
    ///
    /// # Arguments
    ///
    /// * `now` - Evaluation time
    /// * `lag` - How far behind `now` the location source is expected to run
    fn status(&self, now: DateTime<Utc>, lag: Duration) -> NavigationStatus;

    /// Feed a raw location sample to the engine.
    fn update_location(&self, _location: &Location) {}

    /// Get a human-readable name for this engine.
    fn name(&self) -> &'static str;
}
