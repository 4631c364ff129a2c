//! Decision engines evaluated once per tick.
//!
//! Each engine kind is a closed set of two variants selected at configuration
//! time: a native variant that trusts the route engine's status, and a
//! fallback variant that works geometrically from the raw location and the
//! route.
//!
//! | Engine | Native | Fallback |
//! |---|---|---|
//! | [`OffRouteEngine`] | `route_state == OffRoute` | distance run over [`GeometricOffRoute`] |
//! | [`SnapEngine`] | status snapped point | projection by [`GeometricSnap`] |
//! | [`FasterRouteEngine`] | time cooldown in [`FasterRouteDetector`] | distance cooldown in [`DistanceFasterRoute`] |
//!
//! Errors are engine-local: the tick boundary logs them and substitutes the
//! safe value (`false`).

mod faster_route;
mod off_route;
mod snap;

pub use faster_route::{DistanceFasterRoute, FasterRouteConfig, FasterRouteDetector, FasterRouteEngine};
pub use off_route::{GeometricOffRoute, OffRouteConfig, OffRouteEngine};
pub use snap::{GeometricSnap, SnapEngine};

use thiserror::Error;

/// Errors raised by a decision engine for a single tick.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecisionError {
    /// The raw location has non-finite or out-of-range coordinates.
    #[error("Invalid location: lat={latitude}, lon={longitude}")]
    InvalidLocation { latitude: f64, longitude: f64 },

    /// The route has no geometry to compare against.
    #[error("Route has no geometry for leg {0}")]
    MissingGeometry(usize),

    /// Location timestamps went backwards.
    #[error("Location timestamp went backwards by {0} ms")]
    TimeWentBackwards(i64),
}
