//! Geodesic helpers for route matching.
//!
//! Distances use the haversine formula on a spherical earth. Projection onto
//! a polyline uses a local equirectangular approximation around the query
//! point, which is accurate to well under a metre for the segment lengths
//! found in route geometry.
//!
//! # Coordinate System
//!
//! - Latitude: degrees north (-90 to 90)
//! - Longitude: degrees east (-180 to 180)
//! - Bearing: degrees true (0-360, 0=north, 90=east)
//! - Distance: metres

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

const DEG_TO_RAD: f64 = PI / 180.0;
const RAD_TO_DEG: f64 = 180.0 / PI;

/// A geographic point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Point {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both coordinates are finite and inside their valid ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Great-circle distance between two points in metres.
///
/// # Example
///
/// ```
/// use navloop::geo::{distance_m, Point};
///
/// // One degree of latitude is roughly 111 km
/// let d = distance_m(Point::new(0.0, 0.0), Point::new(1.0, 0.0));
/// assert!((d - 111_195.0).abs() < 100.0);
/// ```
pub fn distance_m(from: Point, to: Point) -> f64 {
    let lat1 = from.latitude * DEG_TO_RAD;
    let lat2 = to.latitude * DEG_TO_RAD;
    let delta_lat = (to.latitude - from.latitude) * DEG_TO_RAD;
    let delta_lon = (to.longitude - from.longitude) * DEG_TO_RAD;

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Initial bearing from one point towards another, in degrees true.
pub fn bearing_deg(from: Point, to: Point) -> f64 {
    let lat1 = from.latitude * DEG_TO_RAD;
    let lat2 = to.latitude * DEG_TO_RAD;
    let delta_lon = (to.longitude - from.longitude) * DEG_TO_RAD;

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

    (y.atan2(x) * RAD_TO_DEG + 360.0) % 360.0
}

/// Result of projecting a point onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Closest point on the line.
    pub point: Point,
    /// Distance from the query point to `point` in metres.
    pub distance_m: f64,
    /// Bearing of the segment the projection landed on.
    pub bearing_deg: f64,
    /// Index of the segment's first vertex.
    pub segment_index: usize,
}

/// Project `point` onto the nearest segment of `line`.
///
/// Returns `None` for an empty line or when the query point is not finite.
/// A single-vertex line projects onto that vertex.
pub fn project_onto_line(point: Point, line: &[Point]) -> Option<Projection> {
    if line.is_empty() || !point.latitude.is_finite() || !point.longitude.is_finite() {
        return None;
    }

    if line.len() == 1 {
        return Some(Projection {
            point: line[0],
            distance_m: distance_m(point, line[0]),
            bearing_deg: 0.0,
            segment_index: 0,
        });
    }

    // Local planar frame centred on the query point
    let cos_lat = (point.latitude * DEG_TO_RAD).cos();
    let to_xy = |p: Point| {
        (
            (p.longitude - point.longitude) * cos_lat,
            p.latitude - point.latitude,
        )
    };

    let mut best: Option<Projection> = None;
    for (index, pair) in line.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let (ax, ay) = to_xy(a);
        let (bx, by) = to_xy(b);
        let (dx, dy) = (bx - ax, by - ay);
        let len_sq = dx * dx + dy * dy;

        let t = if len_sq > 0.0 {
            (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let candidate = Point::new(
            a.latitude + t * (b.latitude - a.latitude),
            a.longitude + t * (b.longitude - a.longitude),
        );
        let distance = distance_m(point, candidate);

        if best.map_or(true, |p| distance < p.distance_m) {
            best = Some(Projection {
                point: candidate,
                distance_m: distance,
                bearing_deg: bearing_deg(a, b),
                segment_index: index,
            });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero_for_same_point() {
        let p = Point::new(52.52, 13.40);
        assert!(distance_m(p, p).abs() < 1e-9);
    }

    #[test]
    fn test_distance_one_degree_longitude_at_equator() {
        let d = distance_m(Point::new(0.0, 0.0), Point::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 100.0, "got {}", d);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = Point::new(0.0, 0.0);
        assert!((bearing_deg(origin, Point::new(1.0, 0.0)) - 0.0).abs() < 1e-6);
        assert!((bearing_deg(origin, Point::new(0.0, 1.0)) - 90.0).abs() < 1e-6);
        assert!((bearing_deg(origin, Point::new(-1.0, 0.0)) - 180.0).abs() < 1e-6);
        assert!((bearing_deg(origin, Point::new(0.0, -1.0)) - 270.0).abs() < 1e-6);
    }

    #[test]
    fn test_project_onto_segment_midpoint() {
        let line = [Point::new(0.0, 0.0), Point::new(0.0, 0.01)];
        let query = Point::new(0.001, 0.005);

        let projection = project_onto_line(query, &line).unwrap();

        assert!(projection.point.latitude.abs() < 1e-9);
        assert!((projection.point.longitude - 0.005).abs() < 1e-6);
        // 0.001 degrees of latitude is ~111 m
        assert!((projection.distance_m - 111.2).abs() < 1.0);
        assert!((projection.bearing_deg - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_project_clamps_to_endpoints() {
        let line = [Point::new(0.0, 0.0), Point::new(0.0, 0.01)];
        let query = Point::new(0.0, 0.02);

        let projection = project_onto_line(query, &line).unwrap();
        assert!((projection.point.longitude - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_project_picks_nearest_segment() {
        let line = [
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.01),
            Point::new(0.01, 0.01),
        ];
        let query = Point::new(0.005, 0.0101);

        let projection = project_onto_line(query, &line).unwrap();
        assert_eq!(projection.segment_index, 1);
    }

    #[test]
    fn test_project_empty_line_or_nan() {
        assert!(project_onto_line(Point::new(0.0, 0.0), &[]).is_none());
        let line = [Point::new(0.0, 0.0), Point::new(0.0, 0.01)];
        assert!(project_onto_line(Point::new(f64::NAN, 0.0), &line).is_none());
    }

    #[test]
    fn test_point_validity() {
        assert!(Point::new(45.0, 90.0).is_valid());
        assert!(!Point::new(f64::NAN, 0.0).is_valid());
        assert!(!Point::new(91.0, 0.0).is_valid());
        assert!(!Point::new(0.0, f64::INFINITY).is_valid());
    }
}
