//! # Map Session
//!
//! Marker and session state for an interactive map used to pick a point,
//! search around it and draw a route to one of the results.
//!
//! This library provides:
//! - A [`MarkerSessionController`] that keeps the current-location marker,
//!   the selected-location marker, the search result markers and the route
//!   overlay consistent while asynchronous lookups resolve
//! - Gateway traits for geocoding, nearby search, routing and device location
//! - Haversine distance and result ranking helpers
//!
//! ## Features
//!
//! - **`http`** - Enable HTTP gateways (Nominatim, OSRM, location backend)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use map_session::{Coordinate, geo_utils};
//!
//! let district_1 = Coordinate::new(10.762622, 106.660172);
//! let ben_thanh = Coordinate::new(10.772431, 106.698055);
//!
//! let km = geo_utils::haversine_km(&district_1, &ben_thanh);
//! assert!(km > 4.0 && km < 4.5);
//! ```

use std::fmt;

pub mod canvas;
pub mod controller;
pub mod gateway;
pub mod geo_utils;
pub mod ranking;
pub mod session;
pub mod suggest;

// HTTP gateways for Nominatim, OSRM and the location backend
#[cfg(feature = "http")]
pub mod http;

pub use canvas::{
    LineStyle, MapCanvas, MarkerHandle, MarkerKind, MarkerSpec, PolylineHandle, RecordingCanvas,
};
pub use controller::{
    LocationListener, MarkerSessionController, PlacementOutcome, RouteOutcome, SearchOutcome,
    SessionConfig, SessionError,
};
pub use gateway::{
    DeviceLocator, FixedLocation, GatewayError, GeocodingGateway, NearbySearchGateway,
    NoDeviceLocation, Place, Recommendation, Route, RoutingGateway, SearchCategory,
};
pub use ranking::{rank_locations, RankingMode};
pub use session::{MarkerSession, SessionState};
pub use suggest::SuggestionDebouncer;

#[cfg(feature = "http")]
pub use http::{HttpConfig, LocationApiClient, NominatimGeocoder, OsrmRouter};

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use map_session::Coordinate;
/// let point = Coordinate::new(10.762622, 106.660172);
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the coordinate is finite and within WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Placeholder label shown while a name is unresolved, e.g. `(10.5, 106.25)`.
    pub fn placeholder_label(&self) -> String {
        format!("({}, {})", self.latitude, self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// A coordinate with a human-readable label and optional place metadata.
///
/// `name` may be empty while a reverse geocode is still pending.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NamedLocation {
    pub coordinate: Coordinate,
    pub name: String,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub activities: Vec<String>,
    pub visit_count: u32,
}

impl NamedLocation {
    /// Create a location with only a coordinate and a name.
    pub fn new(coordinate: Coordinate, name: impl Into<String>) -> Self {
        Self {
            coordinate,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_visit_count(mut self, visit_count: u32) -> Self {
        self.visit_count = visit_count;
        self
    }

    pub fn with_activities(mut self, activities: Vec<String>) -> Self {
        self.activities = activities;
        self
    }

    /// Name to display, falling back to the coordinate placeholder.
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            self.coordinate.placeholder_label()
        } else {
            self.name.clone()
        }
    }
}

impl Default for Coordinate {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A location ranked against a reference point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RankedLocation {
    pub location: NamedLocation,
    /// Great-circle distance from the reference point in kilometres
    pub distance_km: f64,
}

impl RankedLocation {
    pub fn coordinate(&self) -> Coordinate {
        self.location.coordinate
    }
}

/// Bounding box over a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Check whether a coordinate lies inside the bounds (edges included).
    pub fn contains(&self, point: &Coordinate) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(10.762622, 106.660172).is_valid());
        assert!(Coordinate::new(-90.0, 180.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_placeholder_label_keeps_input_precision() {
        let point = Coordinate::new(10.762622, 106.660172);
        assert_eq!(point.placeholder_label(), "(10.762622, 106.660172)");
        assert_eq!(Coordinate::new(10.0, 106.0).placeholder_label(), "(10, 106)");
    }

    #[test]
    fn test_display_name_falls_back_to_placeholder() {
        let pending = NamedLocation::new(Coordinate::new(1.5, 2.5), "");
        assert_eq!(pending.display_name(), "(1.5, 2.5)");

        let named = NamedLocation::new(Coordinate::new(1.5, 2.5), "Cafe");
        assert_eq!(named.display_name(), "Cafe");
    }

    #[test]
    fn test_bounds_contains_edges() {
        let bounds = Bounds { min_lat: 10.0, max_lat: 11.0, min_lng: 106.0, max_lng: 107.0 };
        assert!(bounds.contains(&Coordinate::new(10.0, 107.0)));
        assert!(!bounds.contains(&Coordinate::new(9.99, 106.5)));
    }
}
