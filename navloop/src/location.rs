//! Raw location samples and the latest-location slot.
//!
//! Location updates arrive from an external sensor source at any time. The
//! tick loop only ever needs the most recent one, so samples are written into
//! a single guarded slot (last write wins) that the worker reads once per
//! tick.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::geo::Point;

/// A single location sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Horizontal accuracy radius in metres.
    #[serde(default)]
    pub accuracy_m: f32,
    /// Course over ground in degrees true, if known.
    #[serde(default)]
    pub bearing_deg: Option<f64>,
}

impl Location {
    /// Create a location sample taken now.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::with_timestamp(latitude, longitude, Utc::now())
    }

    /// Create a location sample with an explicit timestamp.
    pub fn with_timestamp(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy_m: 0.0,
            bearing_deg: None,
        }
    }

    /// Set the accuracy radius.
    pub fn with_accuracy(mut self, accuracy_m: f32) -> Self {
        self.accuracy_m = accuracy_m;
        self
    }

    /// Set the bearing.
    pub fn with_bearing(mut self, bearing_deg: f64) -> Self {
        self.bearing_deg = Some(bearing_deg);
        self
    }

    /// The sample's coordinates as a [`Point`].
    pub fn point(&self) -> Point {
        Point::new(self.latitude, self.longitude)
    }

    /// Check that the coordinates are finite and in range.
    pub fn has_valid_coordinates(&self) -> bool {
        self.point().is_valid()
    }
}

/// Single-slot holder for the latest known location.
///
/// Shared between the sensor thread (writer) and the tick worker (reader).
///
/// # Example
///
/// ```
/// use navloop::{Location, LocationSlot};
/// use std::sync::Arc;
///
/// let slot = Arc::new(LocationSlot::new());
/// slot.update(Location::new(52.52, 13.40));
/// slot.update(Location::new(52.53, 13.41));
///
/// // Only the last write is kept
/// assert_eq!(slot.latest().unwrap().latitude, 52.53);
/// ```
#[derive(Debug, Default)]
pub struct LocationSlot {
    latest: Mutex<Option<Location>>,
}

impl LocationSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(None),
        }
    }

    /// Replace the stored location.
    pub fn update(&self, location: Location) {
        *self.latest.lock() = Some(location);
    }

    /// Clone out the latest location, if any.
    pub fn latest(&self) -> Option<Location> {
        self.latest.lock().clone()
    }

    /// Remove the stored location.
    pub fn clear(&self) {
        self.latest.lock().take();
    }
}
