//! # Geographic Utilities
//!
//! Distance and extent helpers shared by the session controller, ranking and
//! the routing fallback.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_km`] | Great-circle distance in kilometres (R = 6371 km) |
//! | [`straight_line_meters`] | Haversine distance rounded to whole metres |
//! | [`polyline_length_km`] | Total length of a path in kilometres |
//! | [`compute_bounds`] | Bounding box of a set of coordinates |
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! ```text
//! a = sin²(Δlat/2) + cos(lat1)·cos(lat2)·sin²(Δlon/2)
//! d = 2 · R · atan2(√a, √(1−a))
//! ```
//!
//! `Δlon` is always `lon2 − lon1`. The sign has no effect on the result since
//! it is squared, but every call site goes through this one function.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)

use geo::{BoundingRect, MultiPoint, Point};

use crate::{Bounds, Coordinate};

/// Mean Earth radius used by every distance in this crate.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two coordinates in kilometres.
///
/// # Example
///
/// ```rust
/// use map_session::{Coordinate, geo_utils};
///
/// let london = Coordinate::new(51.5074, -0.1278);
/// let paris = Coordinate::new(48.8566, 2.3522);
///
/// let km = geo_utils::haversine_km(&london, &paris);
/// assert!((km - 343.5).abs() < 1.0);
/// ```
#[inline]
pub fn haversine_km(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let sin_lat = (d_lat / 2.0).sin();
    let sin_lon = (d_lon / 2.0).sin();
    let a = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lon * sin_lon;

    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Haversine distance in metres, rounded to the nearest integer.
///
/// This is the figure shown in the straight-line fallback popup.
#[inline]
pub fn straight_line_meters(from: &Coordinate, to: &Coordinate) -> u64 {
    (haversine_km(from, to) * 1000.0).round() as u64
}

/// Total length of a path in kilometres. Paths with fewer than two points
/// have zero length.
pub fn polyline_length_km(points: &[Coordinate]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_km(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a set of coordinates.
///
/// Returns `None` for empty input.
pub fn compute_bounds(points: &[Coordinate]) -> Option<Bounds> {
    let multi: MultiPoint<f64> = points
        .iter()
        .map(|p| Point::new(p.longitude, p.latitude))
        .collect::<Vec<_>>()
        .into();

    multi.bounding_rect().map(|rect| Bounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lng: rect.min().x,
        max_lng: rect.max().x,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
