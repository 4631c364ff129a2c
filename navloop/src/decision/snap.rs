//! Snap-to-route.
//!
//! Both variants share one guarantee: snapping never introduces non-finite
//! coordinates. When in doubt the raw location is returned as-is.

use crate::engine::NavigationStatus;
use crate::geo::project_onto_line;
use crate::location::Location;
use crate::progress::RouteProgress;

/// Geometric snapper projecting onto the route polyline.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeometricSnap;

impl GeometricSnap {
    /// Project `location` onto the current step, or the whole route when the
    /// step has no geometry.
    pub fn snapped_location(&self, location: &Location, progress: &RouteProgress) -> Location {
        if !location.has_valid_coordinates() {
            return location.clone();
        }

        let geometry = match progress.current_step() {
            Some(step) if !step.geometry.is_empty() => step.geometry.clone(),
            _ => progress.route().geometry(),
        };

        match project_onto_line(location.point(), &geometry) {
            Some(projection) if projection.point.is_valid() => {
                let mut snapped = location.clone();
                snapped.latitude = projection.point.latitude;
                snapped.longitude = projection.point.longitude;
                if geometry.len() > 1 {
                    snapped.bearing_deg = Some(projection.bearing_deg);
                }
                snapped
            }
            _ => location.clone(),
        }
    }
}

/// Snap engine selected by configuration.
#[derive(Debug, Clone, Copy)]
pub enum SnapEngine {
    /// Use the route engine's matched location.
    Native,
    /// Project the raw location onto the route geometry.
    Fallback(GeometricSnap),
}

impl SnapEngine {
    /// Create the fallback variant.
    pub fn fallback() -> Self {
        SnapEngine::Fallback(GeometricSnap)
    }

    /// Compute the snapped location for this tick.
    ///
    /// Without a raw sample the native variant builds a location from a valid
    /// status; the fallback variant has nothing to snap and returns `None`.
    pub fn snapped_location(
        &self,
        status: &NavigationStatus,
        location: Option<&Location>,
        progress: &RouteProgress,
    ) -> Option<Location> {
        match self {
            SnapEngine::Native => native_snap(status, location),
            SnapEngine::Fallback(snap) => location.map(|l| snap.snapped_location(l, progress)),
        }
    }

    /// Get a human-readable name for this engine.
    pub fn name(&self) -> &'static str {
        match self {
            SnapEngine::Native => "native",
            SnapEngine::Fallback(_) => "geometric",
        }
    }
}

fn native_snap(status: &NavigationStatus, location: Option<&Location>) -> Option<Location> {
    let snapped_point = status
        .snapped_point
        .filter(|p| status.route_state.is_valid() && p.is_valid());

    match (location, snapped_point) {
        (Some(raw), Some(point)) => {
            let mut snapped = raw.clone();
            snapped.latitude = point.latitude;
            snapped.longitude = point.longitude;
            if let Some(bearing) = status.snapped_bearing_deg.filter(|b| b.is_finite()) {
                snapped.bearing_deg = Some(bearing);
            }
            Some(snapped)
        }
        (Some(raw), None) => Some(raw.clone()),
        (None, Some(point)) => {
            let mut snapped =
                Location::with_timestamp(point.latitude, point.longitude, status.timestamp);
            snapped.bearing_deg = status.snapped_bearing_deg.filter(|b| b.is_finite());
            Some(snapped)
        }
        (None, None) => None,
    }
}
