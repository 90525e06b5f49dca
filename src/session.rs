//! Marker session state.
//!
//! [`MarkerSession`] is the single owner of every handle the controller has
//! placed on the canvas. Its mutators keep the singleton markers exclusive
//! and release handles through the canvas they were issued by.

use crate::canvas::{MapCanvas, MarkerHandle, PolylineHandle};
use crate::controller::RouteOutcome;
use crate::{NamedLocation, RankedLocation};

/// What is currently shown, derived from the session contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    HasCurrent,
    HasSelected,
    HasSelectedAndResults,
    HasCurrentAndSelected,
}

/// The two singleton marker slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Current,
    Selected,
}

/// A singleton marker together with the location it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLocation {
    pub marker: MarkerHandle,
    pub location: NamedLocation,
    /// Session-unique id of this placement, used to match late label updates
    pub placement: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedResult {
    pub marker: MarkerHandle,
    pub result: RankedLocation,
}

/// Mutable marker state owned by the controller.
#[derive(Debug, Default)]
pub struct MarkerSession {
    current: Option<PlacedLocation>,
    selected: Option<PlacedLocation>,
    results: Vec<PlacedResult>,
    route_overlay: Option<PolylineHandle>,
    route_summary: Option<RouteOutcome>,
    generation: u64,
    route_seq: u64,
    next_placement: u64,
}

impl MarkerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        match (&self.current, &self.selected, self.results.is_empty()) {
            (_, Some(_), false) => SessionState::HasSelectedAndResults,
            (Some(_), Some(_), true) => SessionState::HasCurrentAndSelected,
            (None, Some(_), true) => SessionState::HasSelected,
            (Some(_), None, _) => SessionState::HasCurrent,
            (None, None, _) => SessionState::Empty,
        }
    }

    /// Token identifying the latest clearing event.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current(&self) -> Option<&PlacedLocation> {
        self.current.as_ref()
    }

    pub fn selected(&self) -> Option<&PlacedLocation> {
        self.selected.as_ref()
    }

    pub fn results(&self) -> &[PlacedResult] {
        &self.results
    }

    pub fn route_overlay(&self) -> Option<PolylineHandle> {
        self.route_overlay
    }

    /// How the shown route was drawn, while it is on the canvas.
    pub fn route_summary(&self) -> Option<&RouteOutcome> {
        self.route_summary.as_ref()
    }

    /// Remove every marker group and the route, and start a new generation.
    ///
    /// Any continuation holding an older generation becomes stale.
    pub fn clear_all<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C) -> u64 {
        if let Some(current) = self.current.take() {
            canvas.remove_marker(current.marker);
        }
        if let Some(selected) = self.selected.take() {
            canvas.remove_marker(selected.marker);
        }
        self.clear_results(canvas);
        self.generation += 1;
        self.generation
    }

    /// Remove result markers and the route, leaving the singletons alone.
    pub fn clear_results<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C) {
        for placed in self.results.drain(..) {
            canvas.remove_marker(placed.marker);
        }
        self.clear_route(canvas);
    }

    /// Remove the route overlay and invalidate pending route requests.
    pub fn clear_route<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C) -> u64 {
        if let Some(line) = self.route_overlay.take() {
            canvas.remove_polyline(line);
        }
        self.route_summary = None;
        self.route_seq += 1;
        self.route_seq
    }

    pub fn route_seq(&self) -> u64 {
        self.route_seq
    }

    /// Start a new generation without touching the canvas.
    pub fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Install a marker into a singleton slot, removing the previous occupant.
    ///
    /// Returns the placement id of the new occupant.
    pub fn replace<C: MapCanvas + ?Sized>(
        &mut self,
        canvas: &mut C,
        slot: Slot,
        marker: MarkerHandle,
        location: NamedLocation,
    ) -> u64 {
        self.next_placement += 1;
        let placed = PlacedLocation { marker, location, placement: self.next_placement };
        let previous = match slot {
            Slot::Current => self.current.replace(placed),
            Slot::Selected => self.selected.replace(placed),
        };
        if let Some(previous) = previous {
            canvas.remove_marker(previous.marker);
        }
        self.next_placement
    }

    /// The occupant of a slot, only if it is still the given placement.
    pub fn placement_mut(&mut self, slot: Slot, placement: u64) -> Option<&mut PlacedLocation> {
        let placed = match slot {
            Slot::Current => self.current.as_mut(),
            Slot::Selected => self.selected.as_mut(),
        };
        placed.filter(|p| p.placement == placement)
    }

    pub fn push_result(&mut self, placed: PlacedResult) {
        self.results.push(placed);
    }

    pub fn set_route_overlay<C: MapCanvas + ?Sized>(
        &mut self,
        canvas: &mut C,
        line: PolylineHandle,
        summary: RouteOutcome,
    ) {
        if let Some(previous) = self.route_overlay.replace(line) {
            canvas.remove_polyline(previous);
        }
        self.route_summary = Some(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{MarkerKind, MarkerSpec, RecordingCanvas};
    use crate::Coordinate;

    fn place(
        session: &mut MarkerSession,
        canvas: &mut RecordingCanvas,
        slot: Slot,
        name: &str,
    ) -> (MarkerHandle, u64) {
        let location = NamedLocation::new(Coordinate::new(10.0, 106.0), name);
        let kind = match slot {
            Slot::Current => MarkerKind::Current,
            Slot::Selected => MarkerKind::Selected,
        };
        let marker = canvas.add_marker(MarkerSpec {
            kind,
            position: location.coordinate,
            label: name.to_string(),
            popup: None,
        });
        let placement = session.replace(canvas, slot, marker, location);
        (marker, placement)
    }

    #[test]
    fn test_state_derivation() {
        let mut canvas = RecordingCanvas::new();
        let mut session = MarkerSession::new();
        assert_eq!(session.state(), SessionState::Empty);

        place(&mut session, &mut canvas, Slot::Current, "me");
        assert_eq!(session.state(), SessionState::HasCurrent);

        place(&mut session, &mut canvas, Slot::Selected, "there");
        assert_eq!(session.state(), SessionState::HasCurrentAndSelected);

        session.clear_all(&mut canvas);
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(canvas.marker_count(), 0);
    }

    #[test]
    fn test_replace_removes_previous_marker() {
        let mut canvas = RecordingCanvas::new();
        let mut session = MarkerSession::new();

        let (first_handle, first_placement) = place(&mut session, &mut canvas, Slot::Selected, "first");
        let (_, second_placement) = place(&mut session, &mut canvas, Slot::Selected, "second");

        assert!(canvas.marker(first_handle).is_none());
        assert_eq!(canvas.markers_of_kind(MarkerKind::Selected).len(), 1);
        assert_eq!(session.selected().unwrap().location.name, "second");

        // A late update addressed to the first placement finds nothing
        assert!(session.placement_mut(Slot::Selected, first_placement).is_none());
        assert!(session.placement_mut(Slot::Selected, second_placement).is_some());
        assert!(session.placement_mut(Slot::Current, second_placement).is_none());
    }

    #[test]
    fn test_clear_all_advances_generation() {
        let mut canvas = RecordingCanvas::new();
        let mut session = MarkerSession::new();
        let before = session.generation();
        let after = session.clear_all(&mut canvas);
        assert_eq!(after, before + 1);
        assert_eq!(session.generation(), after);
    }

    #[test]
    fn test_route_overlay_replacement() {
        let mut canvas = RecordingCanvas::new();
        let mut session = MarkerSession::new();
        let points = [Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)];

        let first = canvas.draw_polyline(&points, crate::canvas::LineStyle::Route);
        session.set_route_overlay(&mut canvas, first, RouteOutcome::StraightLine { distance_m: 157 });
        let second = canvas.draw_polyline(&points, crate::canvas::LineStyle::Route);
        let routed = RouteOutcome::Routed { distance_km: 0.2, duration_min: 1.0 };
        session.set_route_overlay(&mut canvas, second, routed.clone());
        assert_eq!(canvas.polyline_count(), 1);
        assert_eq!(session.route_summary(), Some(&routed));

        let seq = session.route_seq();
        assert_eq!(session.clear_route(&mut canvas), seq + 1);
        assert_eq!(canvas.polyline_count(), 0);
        assert!(session.route_overlay().is_none());
        assert!(session.route_summary().is_none());
    }
}
