//! Result ranking.
//!
//! Attaches a haversine distance to every returned place and orders the set
//! according to the kind of search that produced it.

use std::cmp::Ordering;

use crate::geo_utils::haversine_km;
use crate::{Coordinate, NamedLocation, RankedLocation};

/// Ordering applied to a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMode {
    /// Closest first (generic and category searches)
    Distance,
    /// Most visited first ("popular" recommendations)
    Popularity,
    /// Keep the order the server returned (similarity recommendations)
    Preserve,
}

/// Compute `distance_km` for every location relative to `reference` and sort.
///
/// Sorting is stable, so ties keep the server's order.
///
/// # Example
///
/// ```rust
/// use map_session::{Coordinate, NamedLocation, RankingMode, rank_locations};
///
/// let here = Coordinate::new(0.0, 0.0);
/// let items = vec![
///     NamedLocation::new(Coordinate::new(0.02, 0.0), "far"),
///     NamedLocation::new(Coordinate::new(0.01, 0.0), "near"),
/// ];
/// let ranked = rank_locations(items, &here, RankingMode::Distance);
/// assert_eq!(ranked[0].location.name, "near");
/// ```
pub fn rank_locations(
    locations: Vec<NamedLocation>,
    reference: &Coordinate,
    mode: RankingMode,
) -> Vec<RankedLocation> {
    let mut ranked: Vec<RankedLocation> = locations
        .into_iter()
        .map(|location| RankedLocation {
            distance_km: haversine_km(reference, &location.coordinate),
            location,
        })
        .collect();

    match mode {
        RankingMode::Distance => {
            ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        }
        RankingMode::Popularity => {
            ranked.sort_by(|a, b| match b.location.visit_count.cmp(&a.location.visit_count) {
                Ordering::Equal => a.distance_km.total_cmp(&b.distance_km),
                other => other,
            });
        }
        RankingMode::Preserve => {}
    }

    ranked
}
