//! HTTP gateways for geocoding, routing and the location backend.
//!
//! This module provides:
//! - [`NominatimGeocoder`] - forward and reverse geocoding
//! - [`OsrmRouter`] - driving routes, swapped to `[lat, lng]` order
//! - [`LocationApiClient`] - nearby search and recommendations
//!
//! All three share one request loop that retries with exponential backoff on
//! transport errors, 429 and 5xx. Response parsing is kept in plain
//! functions so it can be tested without a network.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;

use crate::gateway::{
    GatewayError, GeocodingGateway, NearbySearchGateway, Place, Recommendation, Route,
    RoutingGateway, SearchCategory,
};
use crate::{Coordinate, NamedLocation};

/// Endpoints and client settings for the HTTP gateways
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL of the location backend
    pub api_base_url: String,
    /// Base URL of the Nominatim instance
    pub nominatim_url: String,
    /// Base URL of the OSRM instance
    pub osrm_url: String,
    /// OSRM routing profile
    pub osrm_profile: String,
    /// Nominatim requires an identifying user agent
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Number of forward-geocoding candidates requested
    pub suggestion_limit: usize,
    /// Bearer token sent to the location backend
    pub auth_token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            osrm_url: "https://router.project-osrm.org".to_string(),
            osrm_profile: "driving".to_string(),
            user_agent: concat!("map-session/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 15,
            max_retries: 1,
            suggestion_limit: 5,
            auth_token: None,
        }
    }
}

fn build_client(config: &HttpConfig) -> Result<Client, GatewayError> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| GatewayError::Transport(format!("failed to create HTTP client: {}", e)))
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Send a GET with retries and return the body of a successful response.
///
/// Non-retryable error statuses carrying an `{"error": ...}` body become
/// [`GatewayError::Api`].
async fn fetch(request: RequestBuilder, max_retries: u32, tag: &str) -> Result<Vec<u8>, GatewayError> {
    let mut retries = 0;
    let start = Instant::now();

    loop {
        let attempt = request
            .try_clone()
            .ok_or_else(|| GatewayError::Transport("request cannot be retried".to_string()))?;

        let failure = match attempt.send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| GatewayError::Transport(format!("body download error: {}", e)))?;
                    debug!(
                        "[{}] {} bytes in {:?} ({} retries)",
                        tag,
                        bytes.len(),
                        start.elapsed(),
                        retries
                    );
                    return Ok(bytes.to_vec());
                }

                if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                    let body = resp.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
                    return Err(match error_message(&body) {
                        Some(message) => GatewayError::Api(message),
                        None => GatewayError::Status(status.as_u16()),
                    });
                }
                GatewayError::Status(status.as_u16())
            }
            Err(e) => GatewayError::Transport(e.to_string()),
        };

        retries += 1;
        if retries > max_retries {
            warn!("[{}] giving up after {} attempts: {}", tag, retries, failure);
            return Err(failure);
        }

        let wait = Duration::from_millis(200 * (1 << retries.min(4)));
        warn!("[{}] {}, retry {} after {:?}", tag, failure, retries, wait);
        tokio::time::sleep(wait).await;
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body).ok().map(|b| b.error)
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(body).map_err(|e| GatewayError::Decode(e.to_string()))
}

// ============================================================================
// Nominatim
// ============================================================================

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    display_name: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

/// Parse a Nominatim `/reverse` response into a display name.
pub fn parse_reverse(body: &[u8]) -> Result<String, GatewayError> {
    let data: NominatimReverse = decode(body)?;
    if let Some(error) = data.error {
        return Err(GatewayError::Api(error));
    }
    data.display_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| GatewayError::Decode("missing display_name".to_string()))
}

/// Parse a Nominatim `/search` response. Entries with unparsable or
/// out-of-range coordinates are skipped.
pub fn parse_forward(body: &[u8]) -> Result<Vec<Place>, GatewayError> {
    let data: Vec<NominatimPlace> = decode(body)?;
    Ok(data
        .into_iter()
        .filter_map(|p| {
            let coordinate = Coordinate::new(p.lat.parse().ok()?, p.lon.parse().ok()?);
            coordinate.is_valid().then_some(Place { coordinate, name: p.display_name })
        })
        .collect())
}

/// Forward and reverse geocoding against a Nominatim instance.
///
/// Reverse lookups are sent once: [`crate::MarkerSessionController`] already
/// retries them on transient failure. Forward lookups use `max_retries`.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    limit: usize,
    max_retries: u32,
}

impl NominatimGeocoder {
    pub fn new(config: &HttpConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: trim_base(&config.nominatim_url),
            limit: config.suggestion_limit,
            max_retries: config.max_retries,
        })
    }

    fn reverse_request(&self, at: Coordinate) -> RequestBuilder {
        self.client
            .get(format!("{}/reverse", self.base_url))
            .query(&[("format", "json")])
            .query(&[("lat", at.latitude), ("lon", at.longitude)])
    }

    fn forward_request(&self, query: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/search", self.base_url))
            .query(&[("format", "json"), ("q", query)])
            .query(&[("limit", self.limit)])
    }
}

#[async_trait]
impl GeocodingGateway for NominatimGeocoder {
    async fn reverse(&self, at: Coordinate) -> Result<String, GatewayError> {
        let body = fetch(self.reverse_request(at), 0, "Nominatim").await?;
        parse_reverse(&body)
    }

    async fn forward(&self, query: &str) -> Result<Vec<Place>, GatewayError> {
        let body = fetch(self.forward_request(query), self.max_retries, "Nominatim").await?;
        let places = parse_forward(&body)?;
        debug!("[Nominatim] '{}' -> {} candidates", query, places.len());
        Ok(places)
    }
}

// ============================================================================
// OSRM
// ============================================================================

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    /// Metres
    distance: f64,
    /// Seconds
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

/// Parse an OSRM `/route` response.
///
/// `NoRoute` and an empty route list both yield `Ok(None)`. GeoJSON
/// coordinates arrive as `[lng, lat]` and are swapped.
pub fn parse_route(body: &[u8]) -> Result<Option<Route>, GatewayError> {
    let data: OsrmResponse = decode(body)?;
    match data.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Ok(None),
        other => {
            return Err(GatewayError::Api(
                data.message.unwrap_or_else(|| other.to_string()),
            ))
        }
    }

    Ok(data.routes.into_iter().next().map(|route| Route {
        path_points: route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lng, lat]| Coordinate::new(lat, lng))
            .collect(),
        distance_km: route.distance / 1000.0,
        duration_min: route.duration / 60.0,
    }))
}

/// Driving routes from an OSRM instance.
pub struct OsrmRouter {
    client: Client,
    base_url: String,
    profile: String,
    max_retries: u32,
}

impl OsrmRouter {
    pub fn new(config: &HttpConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: trim_base(&config.osrm_url),
            profile: config.osrm_profile.clone(),
            max_retries: config.max_retries,
        })
    }

    fn route_request(&self, from: Coordinate, to: Coordinate) -> RequestBuilder {
        let url = format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.base_url, self.profile, from.longitude, from.latitude, to.longitude, to.latitude
        );
        self.client
            .get(url)
            .query(&[("overview", "full"), ("geometries", "geojson")])
    }
}

#[async_trait]
impl RoutingGateway for OsrmRouter {
    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<Option<Route>, GatewayError> {
        let body = fetch(self.route_request(from, to), self.max_retries, "OSRM").await?;
        let route = parse_route(&body)?;
        if let Some(route) = &route {
            debug!(
                "[OSRM] {} -> {}: {:.2} km, {:.0} min, {} points",
                from,
                to,
                route.distance_km,
                route.duration_min,
                route.path_points.len()
            );
        }
        Ok(route)
    }
}

// ============================================================================
// Location backend
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LocationsResponse {
    Failure { error: String },
    Locations(Vec<ApiLocation>),
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    #[serde(default, alias = "locationName")]
    name: String,
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "longitude", alias = "lon")]
    lng: f64,
    category: Option<String>,
    tag: Option<String>,
    #[serde(default)]
    activities: Vec<String>,
    #[serde(default, rename = "visitCount", alias = "visit_count")]
    visit_count: u32,
}

/// Parse a backend location list. An `{"error": ...}` body becomes
/// [`GatewayError::Api`]; entries with invalid coordinates are skipped.
pub fn parse_locations(body: &[u8]) -> Result<Vec<NamedLocation>, GatewayError> {
    match decode::<LocationsResponse>(body)? {
        LocationsResponse::Failure { error } => Err(GatewayError::Api(error)),
        LocationsResponse::Locations(items) => Ok(items
            .into_iter()
            .filter_map(|item| {
                let coordinate = Coordinate::new(item.lat, item.lng);
                if !coordinate.is_valid() {
                    warn!("[LocationApi] skipping '{}' with invalid coordinate", item.name);
                    return None;
                }
                Some(NamedLocation {
                    coordinate,
                    name: item.name,
                    category: item.category,
                    tag: item.tag,
                    activities: item.activities,
                    visit_count: item.visit_count,
                })
            })
            .collect()),
    }
}

/// Nearby search and recommendations from the location backend.
pub struct LocationApiClient {
    client: Client,
    base_url: Url,
    auth_header: Option<String>,
    max_retries: u32,
}

impl LocationApiClient {
    pub fn new(config: &HttpConfig) -> Result<Self, GatewayError> {
        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| GatewayError::Transport(format!("invalid API base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Transport(format!(
                "API base URL cannot carry a path: {}",
                base_url
            )));
        }
        Ok(Self {
            client: build_client(config)?,
            base_url,
            auth_header: config.auth_token.as_ref().map(|t| format!("Bearer {}", t)),
            max_retries: config.max_retries,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, segments: &[&str]) -> RequestBuilder {
        let request = self.client.get(self.endpoint(segments));
        match &self.auth_header {
            Some(auth) => request.header("Authorization", auth),
            None => request,
        }
    }

    fn search_request(&self, location: Coordinate, category: &SearchCategory) -> RequestBuilder {
        let at = [("lat", location.latitude), ("lng", location.longitude)];
        match category {
            SearchCategory::All => self.get(&["api", "location", "search", "activity"]).query(&at),
            SearchCategory::Activity(activity) => self
                .get(&["api", "location", "search", "place"])
                .query(&at)
                .query(&[("activity", activity)]),
        }
    }

    fn recommend_request(&self, location: Coordinate, kind: &Recommendation) -> RequestBuilder {
        match kind {
            Recommendation::Hot => self
                .get(&["api", "location", "rcm", "hot"])
                .query(&[("lat", location.latitude), ("lng", location.longitude)]),
            Recommendation::SimilarTo { user_id } => {
                self.get(&["api", "location", "rcm", "same", user_id.as_str()])
            }
        }
    }

    async fn fetch_locations(&self, request: RequestBuilder) -> Result<Vec<NamedLocation>, GatewayError> {
        let start = Instant::now();
        let body = fetch(request, self.max_retries, "LocationApi").await?;
        let locations = parse_locations(&body)?;
        info!("[LocationApi] {} locations in {:?}", locations.len(), start.elapsed());
        Ok(locations)
    }
}

#[async_trait]
impl NearbySearchGateway for LocationApiClient {
    async fn search(
        &self,
        location: Coordinate,
        category: &SearchCategory,
    ) -> Result<Vec<NamedLocation>, GatewayError> {
        self.fetch_locations(self.search_request(location, category)).await
    }

    async fn recommend(
        &self,
        location: Coordinate,
        kind: &Recommendation,
    ) -> Result<Vec<NamedLocation>, GatewayError> {
        self.fetch_locations(self.recommend_request(location, kind)).await
    }
}
