//! Gateway traits for the external services the controller depends on.
//!
//! Every gateway is async and object safe so the controller can hold them as
//! `Arc<dyn ...>`. Concrete HTTP implementations live in [`crate::http`]
//! behind the `http` feature; tests use in-memory stubs.

use std::fmt;

use async_trait::async_trait;

use crate::{Coordinate, NamedLocation};

/// Errors raised by gateway implementations.
///
/// The controller never surfaces these as fatal: geocoding failures keep the
/// placeholder label, routing failures fall back to a straight line and
/// search failures produce an empty result set.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
    /// The service answered with an explicit `error` field
    #[error("{0}")]
    Api(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transport(_) | GatewayError::Unavailable(_) => true,
            GatewayError::Status(code) => *code == 429 || *code >= 500,
            GatewayError::Decode(_) | GatewayError::Api(_) => false,
        }
    }
}

/// A forward-geocoding candidate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Place {
    pub coordinate: Coordinate,
    pub name: String,
}

impl From<Place> for NamedLocation {
    fn from(place: Place) -> Self {
        NamedLocation::new(place.coordinate, place.name)
    }
}

/// A driving route between two points.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Path in `[lat, lng]` order, ready for drawing
    pub path_points: Vec<Coordinate>,
    pub distance_km: f64,
    pub duration_min: f64,
}

/// Category filter for a nearby search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCategory {
    /// Every kind of place (served by a dedicated endpoint)
    All,
    /// Places offering a specific activity, e.g. `restaurant`
    Activity(String),
}

impl SearchCategory {
    /// Parse a UI category value; `"all"` and the empty string mean [`SearchCategory::All`].
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            SearchCategory::All
        } else {
            SearchCategory::Activity(trimmed.to_string())
        }
    }
}

impl From<&str> for SearchCategory {
    fn from(value: &str) -> Self {
        SearchCategory::parse(value)
    }
}

impl fmt::Display for SearchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchCategory::All => f.write_str("all"),
            SearchCategory::Activity(name) => f.write_str(name),
        }
    }
}

/// Recommendation flavours served by the location backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    /// Popular places near the location, ranked by visit count
    Hot,
    /// Places visited by users whose trajectories resemble this user's
    SimilarTo { user_id: String },
}

/// Coordinate ↔ place name resolution.
#[async_trait]
pub trait GeocodingGateway: Send + Sync {
    /// Resolve a coordinate to a display name.
    async fn reverse(&self, at: Coordinate) -> Result<String, GatewayError>;

    /// Resolve free text to candidate places.
    async fn forward(&self, query: &str) -> Result<Vec<Place>, GatewayError>;
}

/// Points of interest around a location.
#[async_trait]
pub trait NearbySearchGateway: Send + Sync {
    async fn search(
        &self,
        location: Coordinate,
        category: &SearchCategory,
    ) -> Result<Vec<NamedLocation>, GatewayError>;

    async fn recommend(
        &self,
        location: Coordinate,
        kind: &Recommendation,
    ) -> Result<Vec<NamedLocation>, GatewayError>;
}

/// Driving routes between two points.
#[async_trait]
pub trait RoutingGateway: Send + Sync {
    /// `Ok(None)` means the service found no route; it is not an error.
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<Option<Route>, GatewayError>;
}

/// Device geolocation.
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    /// Whether the device can provide a position at all.
    fn is_available(&self) -> bool;

    async fn locate(&self) -> Result<Coordinate, GatewayError>;
}

/// Locator for environments without positioning hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeviceLocation;

#[async_trait]
impl DeviceLocator for NoDeviceLocation {
    fn is_available(&self) -> bool {
        false
    }

    async fn locate(&self) -> Result<Coordinate, GatewayError> {
        Err(GatewayError::Unavailable("geolocation is not supported".to_string()))
    }
}

/// Locator that always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinate);

#[async_trait]
impl DeviceLocator for FixedLocation {
    fn is_available(&self) -> bool {
        true
    }

    async fn locate(&self) -> Result<Coordinate, GatewayError> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!(SearchCategory::parse("all"), SearchCategory::All);
        assert_eq!(SearchCategory::parse(" ALL "), SearchCategory::All);
        assert_eq!(SearchCategory::parse(""), SearchCategory::All);
        assert_eq!(
            SearchCategory::parse("restaurant"),
            SearchCategory::Activity("restaurant".to_string())
        );
        assert_eq!(SearchCategory::from("cafe").to_string(), "cafe");
    }

    #[test]
    fn test_transient_errors() {
        assert!(GatewayError::Transport("reset".into()).is_transient());
        assert!(GatewayError::Status(503).is_transient());
        assert!(GatewayError::Status(429).is_transient());
        assert!(!GatewayError::Status(404).is_transient());
        assert!(!GatewayError::Api("no data".into()).is_transient());
    }

    #[tokio::test]
    async fn test_builtin_locators() {
        assert!(!NoDeviceLocation.is_available());
        assert!(NoDeviceLocation.locate().await.is_err());

        let fixed = FixedLocation(Coordinate::new(10.0, 106.0));
        assert!(fixed.is_available());
        assert_eq!(fixed.locate().await.unwrap(), Coordinate::new(10.0, 106.0));
    }
}
