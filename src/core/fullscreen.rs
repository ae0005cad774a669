//! Fullscreen-exclusive lifecycle
//!
//! Entering captures the windowed geometry, optionally switches the display
//! mode and covers the screen. Leaving undoes each step that happened.

use super::geometry::Geometry;
use super::scale::Units;
use super::window::Window;
use crate::backend::{Backend, SavedMode};

#[derive(Debug, Default)]
pub struct FullscreenState {
    pub exclusive: bool,
    /// Windowed content geometry, physical pixels
    pub saved_geometry: Option<Geometry>,
    pub saved_mode: Option<SavedMode>,
}

/// Geometry to come back to, preferring what the platform reports
fn capture_geometry(window: &Window, backend: &mut dyn Backend) -> Option<Geometry> {
    let units = Units::new(&backend.capabilities(), window.scale);
    let band = window.title_bar_height();
    match backend.window_geometry(window.id) {
        Some(native) => {
            let surface = units.size_from_native(native.size());
            Some(Geometry::new(
                native.x,
                native.y,
                surface.width,
                surface.height.saturating_sub(band),
            ))
        }
        None => window.configured.then(|| window.geometry()),
    }
}

pub fn enter(window: &mut Window, backend: &mut dyn Backend) {
    if window.fullscreen.exclusive {
        return;
    }

    window.fullscreen.saved_geometry = capture_geometry(window, backend);
    window.fullscreen.saved_mode = backend.switch_display_mode(window.id);
    backend.set_wm_fullscreen(window.id, true);
    window.fullscreen.exclusive = true;

    if let Some(screen) = backend.screen_size() {
        let units = Units::new(&backend.capabilities(), window.scale);
        window.position = Default::default();
        window.set_content(screen);
        let native = units.size_to_native(window.surface);
        backend.set_position_and_size(window.id, Geometry::new(0, 0, native.width, native.height));
    }
    tracing::debug!(
        "Window {:?} entered fullscreen (saved geometry {:?}, mode switched: {})",
        window.id,
        window.fullscreen.saved_geometry,
        window.fullscreen.saved_mode.is_some()
    );
}

pub fn exit(window: &mut Window, backend: &mut dyn Backend) {
    if !window.fullscreen.exclusive {
        return;
    }

    backend.set_wm_fullscreen(window.id, false);
    if let Some(mode) = window.fullscreen.saved_mode.take() {
        backend.restore_display_mode(window.id, mode);
    }
    window.fullscreen.exclusive = false;

    match window.fullscreen.saved_geometry.take() {
        Some(saved) => {
            let units = Units::new(&backend.capabilities(), window.scale);
            window.position = saved.position();
            window.set_content(saved.size());
            let native = units.size_to_native(window.surface);
            backend.set_position_and_size(
                window.id,
                Geometry::new(saved.x, saved.y, native.width, native.height),
            );
        }
        // The title bar band comes back even when the size stays
        None => window.set_content(window.content),
    }
    tracing::debug!("Window {:?} left fullscreen", window.id);
}

/// Mirror a fullscreen change the compositor made on its own
pub fn sync(window: &mut Window, fullscreen: bool) {
    if window.fullscreen.exclusive == fullscreen {
        return;
    }
    window.fullscreen.exclusive = fullscreen;
    window.set_content(window.content);
}
