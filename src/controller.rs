//! Marker session controller.
//!
//! Reacts to user events (map click, suggestion pick, "use my location",
//! nearby search, result activation, teardown) and to gateway completions,
//! keeping the [`MarkerSession`] invariants:
//!
//! - at most one current-location marker and one selected-location marker;
//!   a new one always removes the previous one first
//! - a new search clears every marker group and the route before rendering
//! - result marker `i` carries the label `i + 1` of the ranked result list
//!
//! Markers are placed immediately with a provisional label and relabelled in
//! place when geocoding resolves. Every clearing event starts a new session
//! generation; a completion carrying an older generation is dropped and
//! reported as `Superseded`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};

use crate::canvas::{LineStyle, MapCanvas, MarkerHandle, MarkerKind, MarkerSpec};
use crate::gateway::{
    DeviceLocator, GatewayError, GeocodingGateway, NearbySearchGateway, NoDeviceLocation, Place,
    Recommendation, Route, RoutingGateway, SearchCategory,
};
use crate::geo_utils::{compute_bounds, polyline_length_km, straight_line_meters};
use crate::ranking::{rank_locations, RankingMode};
use crate::session::{MarkerSession, PlacedResult, SessionState, Slot};
use crate::{Coordinate, NamedLocation, RankedLocation};

/// Callback invoked whenever the selected or current location settles.
pub type LocationListener = Arc<dyn Fn(&NamedLocation) + Send + Sync>;

/// Configuration for the session controller
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Zoom used when centering on a picked or selected location
    pub focus_zoom: u8,
    /// Zoom used when centering on the device position
    pub current_location_zoom: u8,
    /// Minimum trimmed query length before forward geocoding is attempted
    pub min_suggestion_chars: usize,
    /// Idle time after the last keystroke before a suggestion query fires
    pub suggestion_idle: Duration,
    /// Maximum number of suggestions returned to the caller
    pub max_suggestions: usize,
    /// Extra reverse-geocoding attempts after a transient failure. The HTTP
    /// geocoder sends each reverse lookup once and leaves retries to this.
    pub geocode_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            focus_zoom: 15,
            current_location_zoom: 16,
            min_suggestion_chars: 3,
            suggestion_idle: Duration::from_millis(300),
            max_suggestions: 5,
            geocode_retries: 1,
        }
    }
}

/// Input rejected before any network call is made.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("no location selected")]
    NoLocationSelected,
    #[error("invalid coordinate ({}, {})", .0.latitude, .0.longitude)]
    InvalidCoordinate(Coordinate),
    #[error("device location unavailable: {0}")]
    GeolocationUnavailable(String),
    #[error("no search results are shown")]
    NoResultsShown,
    #[error("result index {index} out of range ({len} results)")]
    ResultIndexOutOfRange { index: usize, len: usize },
}

/// Outcome of placing a marker whose name resolves asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    /// The geocoder supplied a name
    Resolved(NamedLocation),
    /// Geocoding failed; the placeholder label was kept
    Fallback(NamedLocation),
    /// A newer event replaced the marker before the name arrived
    Superseded,
}

/// Outcome of a nearby search or recommendation request.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Rendered {
        results: Vec<RankedLocation>,
        /// User-facing message when the backend reported an error
        notice: Option<String>,
    },
    Superseded,
}

/// Outcome of drawing a route to a result.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Routed { distance_km: f64, duration_min: f64 },
    /// No route was available; a dashed straight line was drawn instead
    StraightLine { distance_m: u64 },
    Superseded,
}

/// Owns the marker session and drives a canvas through the gateways.
///
/// Methods take `&self`; state lives behind mutexes that are never held
/// across an `.await`, so several requests can be in flight at once.
pub struct MarkerSessionController<C: MapCanvas> {
    canvas: Mutex<C>,
    session: Mutex<MarkerSession>,
    geocoder: Arc<dyn GeocodingGateway>,
    nearby: Arc<dyn NearbySearchGateway>,
    router: Arc<dyn RoutingGateway>,
    locator: Arc<dyn DeviceLocator>,
    listeners: Mutex<Vec<LocationListener>>,
    config: SessionConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn validate(at: Coordinate) -> Result<Coordinate, SessionError> {
    if at.is_valid() {
        Ok(at)
    } else {
        Err(SessionError::InvalidCoordinate(at))
    }
}

fn result_popup(rank: usize, result: &RankedLocation) -> String {
    let location = &result.location;
    let mut popup = format!("{}. {}\n{:.2} km", rank, location.display_name(), result.distance_km);
    if let Some(category) = &location.category {
        popup.push_str(&format!("\n{}", category));
    }
    if !location.activities.is_empty() {
        popup.push_str(&format!("\n{}", location.activities.join(", ")));
    }
    popup
}

fn route_popup(distance_km: f64, duration_min: f64) -> String {
    format!("Distance: {:.2} km\nDuration: {:.0} min", distance_km, duration_min)
}

/// Router distance, or the path length when the router reports none.
fn routed_distance_km(route: &Route) -> f64 {
    if route.distance_km.is_finite() && route.distance_km > 0.0 {
        route.distance_km
    } else {
        polyline_length_km(&route.path_points)
    }
}

fn straight_line_popup(distance_m: u64) -> String {
    format!("Straight-line distance: {} m", distance_m)
}

impl<C: MapCanvas> MarkerSessionController<C> {
    /// Create a controller for a canvas that has finished initializing.
    pub fn new(
        canvas: C,
        geocoder: Arc<dyn GeocodingGateway>,
        nearby: Arc<dyn NearbySearchGateway>,
        router: Arc<dyn RoutingGateway>,
    ) -> Self {
        Self {
            canvas: Mutex::new(canvas),
            session: Mutex::new(MarkerSession::new()),
            geocoder,
            nearby,
            router,
            locator: Arc::new(NoDeviceLocation),
            listeners: Mutex::new(Vec::new()),
            config: SessionConfig::default(),
        }
    }

    pub fn with_locator(mut self, locator: Arc<dyn DeviceLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Observers and accessors
    // ------------------------------------------------------------------------

    /// Register a callback for settled selected/current locations.
    pub fn on_location_selected<F>(&self, callback: F)
    where
        F: Fn(&NamedLocation) + Send + Sync + 'static,
    {
        lock(&self.listeners).push(Arc::new(callback));
    }

    pub fn state(&self) -> SessionState {
        lock(&self.session).state()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.session).generation()
    }

    pub fn selected_location(&self) -> Option<NamedLocation> {
        lock(&self.session).selected().map(|p| p.location.clone())
    }

    pub fn current_location(&self) -> Option<NamedLocation> {
        lock(&self.session).current().map(|p| p.location.clone())
    }

    /// Ranked results currently shown, in label order.
    pub fn results(&self) -> Vec<RankedLocation> {
        lock(&self.session).results().iter().map(|p| p.result.clone()).collect()
    }

    pub fn has_route(&self) -> bool {
        lock(&self.session).route_overlay().is_some()
    }

    /// Distance and duration of the route on the canvas, if one is drawn.
    pub fn route_summary(&self) -> Option<RouteOutcome> {
        lock(&self.session).route_summary().cloned()
    }

    /// Borrow the canvas, e.g. to inspect what is drawn.
    pub fn canvas(&self) -> MutexGuard<'_, C> {
        lock(&self.canvas)
    }

    /// Lock session then canvas, always in that order.
    fn with_state<R>(&self, f: impl FnOnce(&mut MarkerSession, &mut C) -> R) -> R {
        let mut session = lock(&self.session);
        let mut canvas = lock(&self.canvas);
        f(&mut session, &mut canvas)
    }

    fn notify(&self, location: &NamedLocation) {
        let listeners: Vec<LocationListener> = lock(&self.listeners).clone();
        for listener in listeners {
            listener(location);
        }
    }

    // ------------------------------------------------------------------------
    // Singleton markers
    // ------------------------------------------------------------------------

    fn place_singleton(
        session: &mut MarkerSession,
        canvas: &mut C,
        slot: Slot,
        location: NamedLocation,
    ) -> (MarkerHandle, u64) {
        let kind = match slot {
            Slot::Current => MarkerKind::Current,
            Slot::Selected => MarkerKind::Selected,
        };
        let marker = canvas.add_marker(MarkerSpec {
            kind,
            position: location.coordinate,
            label: location.display_name(),
            popup: None,
        });
        let placement = session.replace(canvas, slot, marker, location);
        (marker, placement)
    }

    /// Replace the selected-location marker, leaving the current-location
    /// marker in place. Results and route belong to the old selection and
    /// are cleared; pending searches become stale.
    pub fn set_location_marker(&self, location: NamedLocation) -> Result<MarkerHandle, SessionError> {
        validate(location.coordinate)?;
        let zoom = self.config.focus_zoom;
        let marker = self.with_state(|session, canvas| {
            session.clear_results(canvas);
            session.advance_generation();
            let (marker, _) = Self::place_singleton(session, canvas, Slot::Selected, location.clone());
            canvas.set_view(location.coordinate, zoom);
            marker
        });
        self.notify(&location);
        Ok(marker)
    }

    /// Replace the current-location marker, leaving the selected-location
    /// marker in place.
    pub fn set_current_location_marker(
        &self,
        location: NamedLocation,
    ) -> Result<MarkerHandle, SessionError> {
        validate(location.coordinate)?;
        let zoom = self.config.current_location_zoom;
        let marker = self.with_state(|session, canvas| {
            let (marker, _) = Self::place_singleton(session, canvas, Slot::Current, location.clone());
            canvas.set_view(location.coordinate, zoom);
            marker
        });
        self.notify(&location);
        Ok(marker)
    }

    /// Reverse geocode with one retry on transient failure.
    async fn reverse_name(&self, at: Coordinate) -> Result<String, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.geocoder.reverse(at).await {
                Ok(name) => return Ok(name),
                Err(e) if e.is_transient() && attempt < self.config.geocode_retries => {
                    attempt += 1;
                    debug!("[MarkerSession] reverse geocode of {} failed ({}), retry {}", at, e, attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply a resolved (or failed) name to a placement if it is still live.
    fn settle_name(
        &self,
        slot: Slot,
        placement: u64,
        resolved: Result<String, GatewayError>,
    ) -> PlacementOutcome {
        let outcome = self.with_state(|session, canvas| {
            let Some(placed) = session.placement_mut(slot, placement) else {
                return PlacementOutcome::Superseded;
            };
            match resolved {
                Ok(name) if !name.trim().is_empty() => {
                    canvas.set_marker_label(placed.marker, &name);
                    placed.location.name = name;
                    PlacementOutcome::Resolved(placed.location.clone())
                }
                Ok(_) => {
                    placed.location.name = placed.location.coordinate.placeholder_label();
                    PlacementOutcome::Fallback(placed.location.clone())
                }
                Err(e) => {
                    warn!(
                        "[MarkerSession] reverse geocode of {} failed: {}",
                        placed.location.coordinate, e
                    );
                    placed.location.name = placed.location.coordinate.placeholder_label();
                    PlacementOutcome::Fallback(placed.location.clone())
                }
            }
        });

        match &outcome {
            PlacementOutcome::Resolved(location) | PlacementOutcome::Fallback(location) => {
                self.notify(location)
            }
            PlacementOutcome::Superseded => {
                debug!("[MarkerSession] dropping late geocode result for placement {}", placement)
            }
        }
        outcome
    }

    /// The user clicked the map: select that point and resolve its name.
    ///
    /// The marker appears immediately labelled `"(lat, lng)"` and is
    /// relabelled in place once the geocoder answers.
    pub async fn map_clicked(&self, lat: f64, lng: f64) -> Result<PlacementOutcome, SessionError> {
        let at = validate(Coordinate::new(lat, lng))?;

        let placement = self.with_state(|session, canvas| {
            session.clear_all(canvas);
            let (_, placement) =
                Self::place_singleton(session, canvas, Slot::Selected, NamedLocation::new(at, ""));
            placement
        });
        debug!("[MarkerSession] map clicked at {}", at);

        let resolved = self.reverse_name(at).await;
        Ok(self.settle_name(Slot::Selected, placement, resolved))
    }

    /// A type-ahead suggestion was picked; its name is already known.
    pub fn suggestion_picked(&self, place: Place) -> Result<NamedLocation, SessionError> {
        let location: NamedLocation = place.into();
        validate(location.coordinate)?;
        let zoom = self.config.focus_zoom;

        self.with_state(|session, canvas| {
            session.clear_all(canvas);
            Self::place_singleton(session, canvas, Slot::Selected, location.clone());
            canvas.set_view(location.coordinate, zoom);
        });
        debug!("[MarkerSession] suggestion picked: {}", location.name);

        self.notify(&location);
        Ok(location)
    }

    /// Show the device position as the current-location marker.
    pub async fn use_current_location(&self) -> Result<PlacementOutcome, SessionError> {
        if !self.locator.is_available() {
            return Err(SessionError::GeolocationUnavailable(
                "geolocation is not supported".to_string(),
            ));
        }

        let token = self.with_state(|session, canvas| session.clear_all(canvas));

        let at = self
            .locator
            .locate()
            .await
            .map_err(|e| SessionError::GeolocationUnavailable(e.to_string()))?;
        let at = validate(at)?;

        let zoom = self.config.current_location_zoom;
        let placement = self.with_state(|session, canvas| {
            if session.generation() != token {
                return None;
            }
            let (_, placement) =
                Self::place_singleton(session, canvas, Slot::Current, NamedLocation::new(at, ""));
            canvas.set_view(at, zoom);
            Some(placement)
        });
        let Some(placement) = placement else {
            debug!("[MarkerSession] device position arrived after a newer event");
            return Ok(PlacementOutcome::Superseded);
        };
        info!("[MarkerSession] device located at {}", at);

        let resolved = self.reverse_name(at).await;
        Ok(self.settle_name(Slot::Current, placement, resolved))
    }

    // ------------------------------------------------------------------------
    // Search and recommendations
    // ------------------------------------------------------------------------

    /// Search around the session's own anchor: the selected location, or the
    /// current location when nothing is selected.
    pub async fn search_nearby(
        &self,
        category: SearchCategory,
    ) -> Result<SearchOutcome, SessionError> {
        let anchor = {
            let session = lock(&self.session);
            session
                .selected()
                .or_else(|| session.current())
                .map(|p| p.location.clone())
        };
        let location = anchor.ok_or(SessionError::NoLocationSelected)?;
        self.search_nearby_places(location, category).await
    }

    /// Search for places of `category` around `location`, closest first.
    pub async fn search_nearby_places(
        &self,
        location: NamedLocation,
        category: SearchCategory,
    ) -> Result<SearchOutcome, SessionError> {
        validate(location.coordinate)?;
        info!(
            "[MarkerSession] nearby search '{}' around {}",
            category, location.coordinate
        );
        let fetch = self.nearby.search(location.coordinate, &category);
        Ok(self.run_search(location, RankingMode::Distance, fetch).await)
    }

    /// Show recommendations around `location`.
    pub async fn recommend(
        &self,
        location: NamedLocation,
        kind: Recommendation,
    ) -> Result<SearchOutcome, SessionError> {
        validate(location.coordinate)?;
        let mode = match kind {
            Recommendation::Hot => RankingMode::Popularity,
            Recommendation::SimilarTo { .. } => RankingMode::Preserve,
        };
        info!("[MarkerSession] recommendations {:?} around {}", kind, location.coordinate);
        let fetch = self.nearby.recommend(location.coordinate, &kind);
        Ok(self.run_search(location, mode, fetch).await)
    }

    async fn run_search<F>(&self, location: NamedLocation, mode: RankingMode, fetch: F) -> SearchOutcome
    where
        F: std::future::Future<Output = Result<Vec<NamedLocation>, GatewayError>>,
    {
        let zoom = self.config.focus_zoom;
        let token = self.with_state(|session, canvas| {
            let token = session.clear_all(canvas);
            Self::place_singleton(session, canvas, Slot::Selected, location.clone());
            canvas.set_view(location.coordinate, zoom);
            token
        });

        let response = fetch.await;

        let outcome = self.with_state(|session, canvas| {
            if session.generation() != token {
                return SearchOutcome::Superseded;
            }

            let (items, notice) = match response {
                Ok(items) => (items, None),
                Err(GatewayError::Api(message)) => {
                    warn!("[MarkerSession] search rejected by backend: {}", message);
                    (Vec::new(), Some(message))
                }
                Err(e) => {
                    warn!("[MarkerSession] search failed: {}", e);
                    (Vec::new(), Some(e.to_string()))
                }
            };

            let ranked = rank_locations(items, &location.coordinate, mode);
            for (index, result) in ranked.iter().enumerate() {
                let rank = index + 1;
                let marker = canvas.add_marker(MarkerSpec {
                    kind: MarkerKind::Result { rank },
                    position: result.coordinate(),
                    label: rank.to_string(),
                    popup: Some(result_popup(rank, result)),
                });
                session.push_result(PlacedResult { marker, result: result.clone() });
            }

            if !ranked.is_empty() {
                let mut extent: Vec<Coordinate> = ranked.iter().map(|r| r.coordinate()).collect();
                extent.push(location.coordinate);
                if let Some(bounds) = compute_bounds(&extent) {
                    canvas.fit_bounds(bounds);
                }
            }

            SearchOutcome::Rendered { results: ranked, notice }
        });

        match &outcome {
            SearchOutcome::Rendered { results, .. } => {
                info!("[MarkerSession] rendered {} results", results.len())
            }
            SearchOutcome::Superseded => {
                debug!("[MarkerSession] dropping stale search results (generation {})", token)
            }
        }
        outcome
    }

    // ------------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------------

    /// A result list item was activated by its 0-based index.
    pub async fn activate_result(&self, index: usize) -> Result<RouteOutcome, SessionError> {
        let target = {
            let session = lock(&self.session);
            let results = session.results();
            if results.is_empty() {
                return Err(SessionError::NoResultsShown);
            }
            results
                .get(index)
                .map(|p| p.result.clone())
                .ok_or(SessionError::ResultIndexOutOfRange { index, len: results.len() })?
        };
        self.focus_location_and_draw_route(&target).await
    }

    /// Draw the path from the selected location to `target`.
    ///
    /// Falls back to a dashed straight line when the router fails or finds
    /// no route.
    pub async fn focus_location_and_draw_route(
        &self,
        target: &RankedLocation,
    ) -> Result<RouteOutcome, SessionError> {
        let to = validate(target.coordinate())?;

        let (from, seq) = self.with_state(|session, canvas| -> Result<(Coordinate, u64), SessionError> {
            if session.state() != SessionState::HasSelectedAndResults {
                return Err(SessionError::NoResultsShown);
            }
            let from = session
                .selected()
                .map(|p| p.location.coordinate)
                .ok_or(SessionError::NoLocationSelected)?;
            let seq = session.clear_route(canvas);
            if let Some(placed) = session.results().iter().find(|p| p.result.coordinate() == to) {
                canvas.open_marker_popup(placed.marker);
            }
            Ok((from, seq))
        })?;

        let routed = self.router.route(from, to).await;

        let outcome = self.with_state(|session, canvas| {
            if session.route_seq() != seq {
                return RouteOutcome::Superseded;
            }

            match routed {
                Ok(Some(route)) if route.path_points.len() >= 2 => {
                    let distance_km = routed_distance_km(&route);
                    let summary = RouteOutcome::Routed { distance_km, duration_min: route.duration_min };
                    let line = canvas.draw_polyline(&route.path_points, LineStyle::Route);
                    session.set_route_overlay(canvas, line, summary.clone());
                    if let Some(bounds) = compute_bounds(&route.path_points) {
                        canvas.fit_bounds(bounds);
                    }
                    canvas.open_popup(to, &route_popup(distance_km, route.duration_min));
                    summary
                }
                other => {
                    match other {
                        Err(e) => warn!("[MarkerSession] routing failed, drawing straight line: {}", e),
                        _ => debug!("[MarkerSession] no route found, drawing straight line"),
                    }
                    let distance_m = straight_line_meters(&from, &to);
                    let summary = RouteOutcome::StraightLine { distance_m };
                    let line = canvas.draw_polyline(&[from, to], LineStyle::StraightFallback);
                    session.set_route_overlay(canvas, line, summary.clone());
                    if let Some(bounds) = compute_bounds(&[from, to]) {
                        canvas.fit_bounds(bounds);
                    }
                    canvas.open_popup(to, &straight_line_popup(distance_m));
                    summary
                }
            }
        });
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Suggestions and teardown
    // ------------------------------------------------------------------------

    /// Forward geocode a type-ahead query. Short queries return nothing.
    pub async fn suggest(&self, query: &str) -> Result<Vec<Place>, GatewayError> {
        let query = query.trim();
        if query.chars().count() < self.config.min_suggestion_chars {
            return Ok(Vec::new());
        }
        let mut places = self.geocoder.forward(query).await?;
        places.retain(|p| p.coordinate.is_valid());
        places.truncate(self.config.max_suggestions);
        Ok(places)
    }

    /// The canvas is going away: remove and release everything.
    pub fn canvas_torn_down(&self) {
        self.with_state(|session, canvas| {
            session.clear_all(canvas);
        });
        info!("[MarkerSession] canvas torn down");
    }
}

// ============================================================================
// Tests
// ============================================================================
