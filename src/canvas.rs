//! Rendering surface abstraction.
//!
//! [`MapCanvas`] is the small set of primitives the session controller needs
//! from a map widget: place and relabel markers, draw polylines, move the
//! viewport and open popups. Handles are issued by the canvas and stay valid
//! until removed.
//!
//! [`RecordingCanvas`] is an in-memory implementation that keeps every live
//! marker and polyline. It backs headless use and the test suites.

use std::collections::BTreeMap;

use crate::{Bounds, Coordinate};

/// Opaque identifier of a marker placed on a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerHandle(u64);

impl MarkerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Opaque identifier of a polyline drawn on a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolylineHandle(u64);

impl PolylineHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Which marker group a marker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// The device's geolocated position
    Current,
    /// The point the user explicitly chose
    Selected,
    /// A search result; `rank` is the 1-based label shown on the pin
    Result { rank: usize },
}

/// Everything needed to place a marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub kind: MarkerKind,
    pub position: Coordinate,
    pub label: String,
    pub popup: Option<String>,
}

/// Visual style of a polyline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    /// A road path returned by the routing service
    Route,
    /// Dashed two-point line used when no route is available
    StraightFallback,
}

/// Map widget primitives consumed by the session controller.
pub trait MapCanvas {
    /// Place a marker and return its handle.
    fn add_marker(&mut self, spec: MarkerSpec) -> MarkerHandle;

    /// Replace the label of an existing marker in place.
    fn set_marker_label(&mut self, marker: MarkerHandle, label: &str);

    fn remove_marker(&mut self, marker: MarkerHandle);

    fn draw_polyline(&mut self, points: &[Coordinate], style: LineStyle) -> PolylineHandle;

    fn remove_polyline(&mut self, line: PolylineHandle);

    /// Center the viewport on a point at the given zoom level.
    fn set_view(&mut self, center: Coordinate, zoom: u8);

    /// Adjust the viewport so the bounds are fully visible.
    fn fit_bounds(&mut self, bounds: Bounds);

    /// Open a free-standing popup anchored at a coordinate.
    fn open_popup(&mut self, at: Coordinate, content: &str);

    /// Open the popup attached to a marker. Canvases without marker popups
    /// can ignore this.
    fn open_marker_popup(&mut self, _marker: MarkerHandle) {}
}

// ============================================================================
// In-memory canvas
// ============================================================================

/// A marker as currently shown on a [`RecordingCanvas`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMarker {
    pub spec: MarkerSpec,
    /// Number of in-place label updates since the marker was placed
    pub relabel_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPolyline {
    pub points: Vec<Coordinate>,
    pub style: LineStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPopup {
    pub at: Coordinate,
    pub content: String,
}

/// Canvas that records its state instead of rendering it.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    next_id: u64,
    markers: BTreeMap<MarkerHandle, RecordedMarker>,
    polylines: BTreeMap<PolylineHandle, RecordedPolyline>,
    popups: Vec<RecordedPopup>,
    opened_marker_popups: Vec<MarkerHandle>,
    view: Option<(Coordinate, u8)>,
    fitted_bounds: Option<Bounds>,
    markers_added: u64,
    markers_removed: u64,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&RecordedMarker> {
        self.markers.get(&handle)
    }

    /// All live markers in placement order.
    pub fn markers(&self) -> impl Iterator<Item = (MarkerHandle, &RecordedMarker)> {
        self.markers.iter().map(|(h, m)| (*h, m))
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// Live markers of a given kind, in placement order.
    pub fn markers_of_kind(&self, kind: MarkerKind) -> Vec<&RecordedMarker> {
        self.markers
            .values()
            .filter(|m| m.spec.kind == kind)
            .collect()
    }

    /// Live result markers sorted by their rank label.
    pub fn result_markers(&self) -> Vec<&RecordedMarker> {
        let mut results: Vec<&RecordedMarker> = self
            .markers
            .values()
            .filter(|m| matches!(m.spec.kind, MarkerKind::Result { .. }))
            .collect();
        results.sort_by_key(|m| match m.spec.kind {
            MarkerKind::Result { rank } => rank,
            _ => 0,
        });
        results
    }

    pub fn polylines(&self) -> impl Iterator<Item = &RecordedPolyline> {
        self.polylines.values()
    }

    pub fn polyline_count(&self) -> usize {
        self.polylines.len()
    }

    pub fn popups(&self) -> &[RecordedPopup] {
        &self.popups
    }

    pub fn last_popup(&self) -> Option<&RecordedPopup> {
        self.popups.last()
    }

    pub fn opened_marker_popups(&self) -> &[MarkerHandle] {
        &self.opened_marker_popups
    }

    pub fn view(&self) -> Option<(Coordinate, u8)> {
        self.view
    }

    pub fn fitted_bounds(&self) -> Option<Bounds> {
        self.fitted_bounds
    }

    /// Total markers ever placed, including removed ones.
    pub fn markers_added(&self) -> u64 {
        self.markers_added
    }

    pub fn markers_removed(&self) -> u64 {
        self.markers_removed
    }
}

impl MapCanvas for RecordingCanvas {
    fn add_marker(&mut self, spec: MarkerSpec) -> MarkerHandle {
        let handle = MarkerHandle::new(self.next_id());
        self.markers.insert(handle, RecordedMarker { spec, relabel_count: 0 });
        self.markers_added += 1;
        handle
    }

    fn set_marker_label(&mut self, marker: MarkerHandle, label: &str) {
        if let Some(recorded) = self.markers.get_mut(&marker) {
            recorded.spec.label = label.to_string();
            recorded.relabel_count += 1;
        }
    }

    fn remove_marker(&mut self, marker: MarkerHandle) {
        if self.markers.remove(&marker).is_some() {
            self.markers_removed += 1;
        }
    }

    fn draw_polyline(&mut self, points: &[Coordinate], style: LineStyle) -> PolylineHandle {
        let handle = PolylineHandle::new(self.next_id());
        self.polylines.insert(
            handle,
            RecordedPolyline { points: points.to_vec(), style },
        );
        handle
    }

    fn remove_polyline(&mut self, line: PolylineHandle) {
        self.polylines.remove(&line);
    }

    fn set_view(&mut self, center: Coordinate, zoom: u8) {
        self.view = Some((center, zoom));
    }

    fn fit_bounds(&mut self, bounds: Bounds) {
        self.fitted_bounds = Some(bounds);
    }

    fn open_popup(&mut self, at: Coordinate, content: &str) {
        self.popups.push(RecordedPopup { at, content: content.to_string() });
    }

    fn open_marker_popup(&mut self, marker: MarkerHandle) {
        if self.markers.contains_key(&marker) {
            self.opened_marker_popups.push(marker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: MarkerKind, label: &str) -> MarkerSpec {
        MarkerSpec {
            kind,
            position: Coordinate::new(10.0, 106.0),
            label: label.to_string(),
            popup: None,
        }
    }

    #[test]
    fn test_relabel_keeps_marker_instance() {
        let mut canvas = RecordingCanvas::new();
        let handle = canvas.add_marker(spec(MarkerKind::Selected, "(10, 106)"));
        canvas.set_marker_label(handle, "Somewhere");

        let marker = canvas.marker(handle).unwrap();
        assert_eq!(marker.spec.label, "Somewhere");
        assert_eq!(marker.relabel_count, 1);
        assert_eq!(canvas.markers_added(), 1);
    }

    #[test]
    fn test_remove_unknown_handle_is_noop() {
        let mut canvas = RecordingCanvas::new();
        let handle = canvas.add_marker(spec(MarkerKind::Current, "here"));
        canvas.remove_marker(handle);
        canvas.remove_marker(handle);
        assert_eq!(canvas.marker_count(), 0);
        assert_eq!(canvas.markers_removed(), 1);
    }

    #[test]
    fn test_result_markers_sorted_by_rank() {
        let mut canvas = RecordingCanvas::new();
        canvas.add_marker(spec(MarkerKind::Result { rank: 2 }, "2"));
        canvas.add_marker(spec(MarkerKind::Selected, "anchor"));
        canvas.add_marker(spec(MarkerKind::Result { rank: 1 }, "1"));

        let labels: Vec<&str> = canvas
            .result_markers()
            .iter()
            .map(|m| m.spec.label.as_str())
            .collect();
        assert_eq!(labels, vec!["1", "2"]);
    }

    #[test]
    fn test_polyline_lifecycle() {
        let mut canvas = RecordingCanvas::new();
        let line = canvas.draw_polyline(
            &[Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)],
            LineStyle::StraightFallback,
        );
        assert_eq!(canvas.polyline_count(), 1);
        canvas.remove_polyline(line);
        assert_eq!(canvas.polyline_count(), 0);
    }
}
