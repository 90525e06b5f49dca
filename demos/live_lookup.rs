//! Reverse geocode a point and route to a second one against the public
//! Nominatim and OSRM services.
//!
//! Run with: cargo run --example live_lookup --features http

use map_session::{
    geo_utils, Coordinate, GeocodingGateway, HttpConfig, NominatimGeocoder, OsrmRouter,
    RoutingGateway,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = HttpConfig::default();
    let geocoder = NominatimGeocoder::new(&config)?;
    let router = OsrmRouter::new(&config)?;

    let from = Coordinate::new(10.762622, 106.660172);
    let to = Coordinate::new(10.7724, 106.6980);

    println!("Live lookup");
    println!("===========");

    match geocoder.reverse(from).await {
        Ok(name) => println!("From: {}", name),
        Err(e) => println!("From: {} (geocoding failed: {})", from.placeholder_label(), e),
    }

    let suggestions = geocoder.forward("Ben Thanh Market").await?;
    for place in &suggestions {
        println!("  suggestion: {} @ {}", place.name, place.coordinate);
    }

    match router.route(from, to).await {
        Ok(Some(route)) => println!(
            "Route: {:.2} km, {:.0} min, {} points",
            route.distance_km,
            route.duration_min,
            route.path_points.len()
        ),
        Ok(None) => println!("No route"),
        Err(e) => println!("Routing failed: {}", e),
    }
    println!(
        "Straight line: {} m",
        geo_utils::straight_line_meters(&from, &to)
    );

    Ok(())
}
