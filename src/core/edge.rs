//! Resize-edge hit testing
//!
//! Client-decorated windows have no frame to grab, so the outer band of the
//! surface doubles as the resize handle. Corner zones win over edge zones.

use cursor_icon::CursorIcon;
use serde::{Deserialize, Serialize};

use super::geometry::{Geometry, Position};
use crate::input::MouseButton;

/// Default width of the hit-test band, in logical pixels
pub const DEFAULT_BORDER: u32 = 8;

/// Window edge or corner; discriminants follow `xdg_toplevel.resize_edge`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum ResizeEdge {
    #[default]
    None = 0,
    Top = 1,
    Bottom = 2,
    Left = 4,
    TopLeft = 5,
    BottomLeft = 6,
    Right = 8,
    TopRight = 9,
    BottomRight = 10,
}

impl ResizeEdge {
    pub fn is_none(self) -> bool {
        self == ResizeEdge::None
    }

    /// Cursor shape advertising a resize from this edge
    pub fn cursor(self) -> CursorIcon {
        match self {
            ResizeEdge::None => CursorIcon::Default,
            ResizeEdge::Top => CursorIcon::NResize,
            ResizeEdge::Bottom => CursorIcon::SResize,
            ResizeEdge::Left => CursorIcon::WResize,
            ResizeEdge::Right => CursorIcon::EResize,
            ResizeEdge::TopLeft => CursorIcon::NwResize,
            ResizeEdge::TopRight => CursorIcon::NeResize,
            ResizeEdge::BottomLeft => CursorIcon::SwResize,
            ResizeEdge::BottomRight => CursorIcon::SeResize,
        }
    }

    /// `_NET_WM_MOVERESIZE` direction for this edge
    pub fn net_wm_direction(self) -> Option<u32> {
        match self {
            ResizeEdge::None => None,
            ResizeEdge::TopLeft => Some(0),
            ResizeEdge::Top => Some(1),
            ResizeEdge::TopRight => Some(2),
            ResizeEdge::Right => Some(3),
            ResizeEdge::BottomRight => Some(4),
            ResizeEdge::Bottom => Some(5),
            ResizeEdge::BottomLeft => Some(6),
            ResizeEdge::Left => Some(7),
        }
    }
}

/// Resolve the edge under `(x, y)` for a `width`×`height` surface
///
/// `border` is already in the surface's pixel units (border width times
/// scale). Returns `None` outside every band, and for surfaces whose width
/// or height is at most twice the border.
pub fn detect_edge(x: f64, y: f64, width: u32, height: u32, border: f64) -> ResizeEdge {
    let (w, h) = (width as f64, height as f64);
    if w <= 2.0 * border || h <= 2.0 * border {
        return ResizeEdge::None;
    }
    if x < 0.0 || y < 0.0 || x >= w || y >= h {
        return ResizeEdge::None;
    }

    let left = x < border;
    let right = x >= w - border;
    let top = y < border;
    let bottom = y >= h - border;

    match (top, bottom, left, right) {
        (true, _, true, _) => ResizeEdge::TopLeft,
        (true, _, _, true) => ResizeEdge::TopRight,
        (_, true, true, _) => ResizeEdge::BottomLeft,
        (_, true, _, true) => ResizeEdge::BottomRight,
        (true, _, _, _) => ResizeEdge::Top,
        (_, true, _, _) => ResizeEdge::Bottom,
        (_, _, true, _) => ResizeEdge::Left,
        (_, _, _, true) => ResizeEdge::Right,
        _ => ResizeEdge::None,
    }
}

/// An interactive resize or move handed to the platform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Resize(ResizeEdge),
    Move,
}

/// Per-window resize/move bookkeeping
#[derive(Debug, Clone)]
pub struct ResizeState {
    /// Hit-test band width, logical pixels
    pub border: u32,
    /// Last edge shown through cursor feedback
    pub hovered: ResizeEdge,
    pub active: Option<Gesture>,
    pub drag_start: Position,
    pub start_geometry: Geometry,
    /// Button whose press started a gesture; its release is not reported
    pub swallow_release: Option<MouseButton>,
}

impl ResizeState {
    pub fn new(border: u32) -> Self {
        Self {
            border,
            hovered: ResizeEdge::None,
            active: None,
            drag_start: Position::default(),
            start_geometry: Geometry::default(),
            swallow_release: None,
        }
    }

    /// Record a new gesture; any previous one is replaced
    pub fn begin(&mut self, gesture: Gesture, at: Position, geometry: Geometry) {
        self.active = Some(gesture);
        self.drag_start = at;
        self.start_geometry = geometry;
    }

    pub fn finish(&mut self) -> Option<Gesture> {
        self.active.take()
    }

    /// A press that reached the application
    ///
    /// Any gesture still recorded was never acknowledged and is dropped. A
    /// new press of the swallowed button means its release got lost.
    pub fn press_passed(&mut self, button: MouseButton) {
        self.active = None;
        if self.swallow_release == Some(button) {
            self.swallow_release = None;
        }
    }

    /// Whether the release of `button` belongs to a consumed press
    pub fn take_release(&mut self, button: MouseButton) -> bool {
        if self.swallow_release != Some(button) {
            return false;
        }
        self.swallow_release = None;
        self.active = None;
        true
    }

    /// Update the hovered edge, returning the new cursor when it changed
    pub fn hover(&mut self, edge: ResizeEdge) -> Option<CursorIcon> {
        if edge == self.hovered {
            return None;
        }
        self.hovered = edge;
        Some(edge.cursor())
    }
}

impl Default for ResizeState {
    fn default() -> Self {
        Self::new(DEFAULT_BORDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_scenario() {
        assert_eq!(detect_edge(4.0, 300.0, 800, 600, 8.0), ResizeEdge::Left);
        assert_eq!(detect_edge(796.0, 4.0, 800, 600, 8.0), ResizeEdge::TopRight);
        assert_eq!(detect_edge(400.0, 300.0, 800, 600, 8.0), ResizeEdge::None);
    }

    #[test]
    fn corners_take_priority() {
        assert_eq!(detect_edge(0.0, 0.0, 800, 600, 8.0), ResizeEdge::TopLeft);
        assert_eq!(detect_edge(7.9, 7.9, 800, 600, 8.0), ResizeEdge::TopLeft);
        assert_eq!(detect_edge(2.0, 597.0, 800, 600, 8.0), ResizeEdge::BottomLeft);
        assert_eq!(detect_edge(799.0, 599.0, 800, 600, 8.0), ResizeEdge::BottomRight);
    }

    #[test]
    fn single_edges() {
        assert_eq!(detect_edge(400.0, 2.0, 800, 600, 8.0), ResizeEdge::Top);
        assert_eq!(detect_edge(400.0, 595.0, 800, 600, 8.0), ResizeEdge::Bottom);
        assert_eq!(detect_edge(793.0, 300.0, 800, 600, 8.0), ResizeEdge::Right);
    }

    #[test]
    fn scaled_border_widens_band() {
        assert_eq!(detect_edge(12.0, 300.0, 1600, 1200, 8.0), ResizeEdge::None);
        assert_eq!(detect_edge(12.0, 300.0, 1600, 1200, 16.0), ResizeEdge::Left);
    }

    #[test]
    fn tiny_and_outside_surfaces_have_no_edges() {
        assert_eq!(detect_edge(1.0, 1.0, 16, 600, 8.0), ResizeEdge::None);
        assert_eq!(detect_edge(1.0, 1.0, 600, 10, 8.0), ResizeEdge::None);
        assert_eq!(detect_edge(-1.0, 300.0, 800, 600, 8.0), ResizeEdge::None);
        assert_eq!(detect_edge(800.0, 300.0, 800, 600, 8.0), ResizeEdge::None);
    }

    #[test]
    fn hover_reports_changes_only() {
        let mut state = ResizeState::default();
        assert_eq!(state.hover(ResizeEdge::None), None);
        assert_eq!(state.hover(ResizeEdge::Left), Some(CursorIcon::WResize));
        assert_eq!(state.hover(ResizeEdge::Left), None);
        assert_eq!(state.hover(ResizeEdge::None), Some(CursorIcon::Default));
    }

    #[test]
    fn only_the_consumed_button_release_is_swallowed() {
        let mut state = ResizeState::default();
        state.begin(Gesture::Move, Position::default(), Geometry::default());
        state.swallow_release = Some(MouseButton::Left);
        assert!(!state.take_release(MouseButton::Right));
        assert!(state.take_release(MouseButton::Left));
        assert!(!state.take_release(MouseButton::Left));
        assert_eq!(state.active, None);
    }

    #[test]
    fn passing_press_drops_stale_gesture() {
        let mut state = ResizeState::default();
        state.begin(Gesture::Move, Position::default(), Geometry::default());
        state.press_passed(MouseButton::Left);
        assert_eq!(state.active, None);
        assert!(!state.take_release(MouseButton::Left));
    }

    #[test]
    fn edge_values_match_xdg() {
        assert_eq!(ResizeEdge::TopLeft as u32, 5);
        assert_eq!(ResizeEdge::BottomRight as u32, 10);
        assert_eq!(ResizeEdge::Right.net_wm_direction(), Some(3));
    }
}
