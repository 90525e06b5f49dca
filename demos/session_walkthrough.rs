//! Walk a marker session through click, search and route with offline gateways.
//!
//! Run with: cargo run --example session_walkthrough

use std::sync::Arc;

use async_trait::async_trait;
use map_session::{
    Coordinate, GatewayError, GeocodingGateway, MarkerSessionController, NamedLocation,
    NearbySearchGateway, Place, Recommendation, RecordingCanvas, Route, RoutingGateway,
    SearchCategory, SearchOutcome,
};

struct CannedGeocoder;

#[async_trait]
impl GeocodingGateway for CannedGeocoder {
    async fn reverse(&self, _at: Coordinate) -> Result<String, GatewayError> {
        Ok("District 1, Ho Chi Minh City".to_string())
    }

    async fn forward(&self, _query: &str) -> Result<Vec<Place>, GatewayError> {
        Ok(Vec::new())
    }
}

struct CannedPlaces;

#[async_trait]
impl NearbySearchGateway for CannedPlaces {
    async fn search(
        &self,
        _location: Coordinate,
        _category: &SearchCategory,
    ) -> Result<Vec<NamedLocation>, GatewayError> {
        Ok(vec![
            NamedLocation::new(Coordinate::new(10.7769, 106.7009), "Opera House")
                .with_category("landmark"),
            NamedLocation::new(Coordinate::new(10.7724, 106.6980), "Ben Thanh Market")
                .with_category("market")
                .with_activities(vec!["shopping".to_string(), "street food".to_string()]),
            NamedLocation::new(Coordinate::new(10.7880, 106.7050), "Saigon Zoo")
                .with_category("park"),
        ])
    }

    async fn recommend(
        &self,
        _location: Coordinate,
        _kind: &Recommendation,
    ) -> Result<Vec<NamedLocation>, GatewayError> {
        Ok(Vec::new())
    }
}

/// Router that never finds a road, so every route falls back to a straight line.
struct NoRoads;

#[async_trait]
impl RoutingGateway for NoRoads {
    async fn route(&self, _from: Coordinate, _to: Coordinate) -> Result<Option<Route>, GatewayError> {
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let session = MarkerSessionController::new(
        RecordingCanvas::new(),
        Arc::new(CannedGeocoder),
        Arc::new(CannedPlaces),
        Arc::new(NoRoads),
    );
    session.on_location_selected(|location| println!("   -> location selected: {}", location.name));

    println!("Marker Session Walkthrough\n");

    println!("1. Click the map at (10.762622, 106.660172)");
    let outcome = session.map_clicked(10.762622, 106.660172).await?;
    println!("   {:?}\n   state: {:?}\n", outcome, session.state());

    println!("2. Search for places around the selection");
    match session.search_nearby(SearchCategory::All).await? {
        SearchOutcome::Rendered { results, .. } => {
            for (i, result) in results.iter().enumerate() {
                println!("   {}. {} ({:.2} km)", i + 1, result.location.name, result.distance_km);
            }
        }
        SearchOutcome::Superseded => println!("   superseded"),
    }
    println!("   state: {:?}\n", session.state());

    println!("3. Activate the first result");
    let route = session.activate_result(0).await?;
    println!("   {:?}", route);
    if let Some(popup) = session.canvas().last_popup() {
        println!("   popup: {}\n", popup.content);
    }

    println!("4. Tear down the canvas");
    session.canvas_torn_down();
    println!("   state: {:?}, markers left: {}", session.state(), session.canvas().marker_count());

    Ok(())
}
