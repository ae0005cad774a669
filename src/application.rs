//! Public façade: backend selection, the application and its windows
//!
//! Every public operation lands here, is checked against the window
//! registry, runs through the core where the core has an opinion, and is
//! forwarded to the active backend.

use std::cell::OnceCell;
use std::collections::VecDeque;

use cursor_icon::CursorIcon;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::backend::{
    self, Backend, BackendKind, BackendPreference, NativeEvent, SessionProbe, WaylandHandles,
    X11Handles,
};
use crate::config::Config;
use crate::core::cursor::{self, LockState};
use crate::core::edge::{Gesture, ResizeEdge};
use crate::core::fullscreen;
use crate::core::geometry::{Geometry, Point, Position, Size};
use crate::core::normalize::{self, start_gesture};
use crate::core::registry::{AppId, WindowId, WindowRegistry};
use crate::core::scale::Units;
use crate::core::window::Window;
use crate::error::{Error, Result};
use crate::event::{Event, EventKind};

/// Backend selection and configuration shared by applications
///
/// The backend is resolved once, when the first application is created,
/// and stays fixed until [`Context::reset`].
#[derive(Debug, Default)]
pub struct Context {
    preference: BackendPreference,
    selected: OnceCell<BackendKind>,
    config: Config,
}

impl Context {
    /// Context with configuration read from the environment
    pub fn new() -> Self {
        Self::with_config(Config::from_env())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            preference: config.backend,
            selected: OnceCell::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Request a backend; ignored once one has been selected
    pub fn set_backend(&mut self, preference: BackendPreference) {
        if let Some(kind) = self.selected.get() {
            tracing::warn!(
                "Backend already selected ({}), ignoring request for {}",
                kind,
                preference.name()
            );
            return;
        }
        self.preference = preference;
    }

    /// The selected backend, or the preference while none is selected
    pub fn backend(&self) -> BackendPreference {
        self.selected
            .get()
            .map(|&kind| kind.into())
            .unwrap_or(self.preference)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend().name()
    }

    /// Resolve the backend against `probe`; the first call wins
    pub fn select(&self, probe: &SessionProbe) -> BackendKind {
        *self.selected.get_or_init(|| resolve_logged(self.preference, probe))
    }

    /// Forget the selected backend
    pub fn reset(&mut self) {
        self.selected = OnceCell::new();
    }

    /// Connect to the window system and create an application
    pub fn create_application(&self) -> Result<Application> {
        let probe = SessionProbe::from_env();
        let kind = self.select(&probe);
        let backend = backend::connect(kind, &self.config).map_err(|err| {
            if probe.wayland_display || probe.x_display {
                return err;
            }
            tracing::debug!("{} connection failed without a display: {}", kind, err);
            Error::NoDisplay
        })?;
        Ok(Application::with_backend(backend, self.config.clone()))
    }
}

fn resolve_logged(preference: BackendPreference, probe: &SessionProbe) -> BackendKind {
    let kind = backend::resolve(preference, probe);
    tracing::info!("Selected {} backend (preference {})", kind, preference.name());
    kind
}

/// An application: one window system connection and the windows on it
///
/// Dropping the application destroys its remaining windows first.
pub struct Application {
    id: AppId,
    backend: Box<dyn Backend>,
    config: Config,
    windows: WindowRegistry,
    native: VecDeque<NativeEvent>,
    events: VecDeque<Event>,
    should_close: bool,
}

impl Application {
    /// Build an application on an already connected backend
    pub fn with_backend(backend: Box<dyn Backend>, config: Config) -> Self {
        let id = AppId::next();
        tracing::debug!(
            "Application {:?} on {} ({:?})",
            id,
            backend.kind(),
            backend.capabilities()
        );
        Self {
            id,
            backend,
            config,
            windows: WindowRegistry::new(id),
            native: VecDeque::new(),
            events: VecDeque::new(),
            should_close: false,
        }
    }

    pub fn id(&self) -> AppId {
        self.id
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn should_close(&self) -> bool {
        self.should_close
    }

    /// Ask the application to close; the event loop decides when
    pub fn close(&mut self) {
        self.should_close = true;
    }

    pub fn display_scale(&self) -> f32 {
        self.backend.display_scale()
    }

    /// Next event, or `None` when nothing is pending
    ///
    /// Never blocks. Reads the connection at most once per call, and only
    /// when no buffered native event is left.
    pub fn poll_event(&mut self) -> Option<Event> {
        if self.events.is_empty() && self.native.is_empty() {
            if let Err(err) = self.backend.dispatch(&mut self.native) {
                tracing::warn!("Event dispatch failed: {}", err);
                if err.is_fatal() {
                    self.should_close = true;
                }
            }
        }
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            let native = self.native.pop_front()?;
            normalize::normalize(native, &mut self.windows, self.backend.as_mut(), &mut self.events);
        }
    }

    /// Window handles in creation order
    pub fn windows(&self) -> &[WindowId] {
        self.windows.ids()
    }

    /// Core state of a window
    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(id)
    }

    /// Open a window with a content area of `width`×`height` physical pixels
    pub fn create_window(&mut self, title: &str, width: u32, height: u32) -> Result<WindowId> {
        let caps = self.backend.capabilities();
        let scale = self.backend.display_scale();
        let app = self.id;
        let config = &self.config;
        let id = self.windows.insert_with(|id| {
            let mut window = Window::new(id, app, title, Size::new(width, height), config);
            window.scale = scale;
            window.decoration.server_side = !caps.decoration_negotiation;
            window.set_content(window.content);
            window
        })?;

        let (surface, min_size) = match self.windows.get(id) {
            Some(window) => (window.surface, window.min_size),
            None => return Err(Error::UnknownWindow),
        };
        let units = Units::new(&caps, scale);
        let setup = match self.backend.create_window(id, title, units.size_to_native(surface)) {
            Ok(setup) => setup,
            Err(err) => {
                self.windows.remove(id);
                return Err(err);
            }
        };
        self.backend.set_min_size(id, units.size_to_native(min_size));

        if let Some(window) = self.windows.get_mut(id) {
            window.scale = setup.scale;
            window.decoration.server_side = setup.server_decorations;
            window.set_content(window.content);
            tracing::info!(
                "Created window {:?} \"{}\" {}x{} (scale {}, {} decorations)",
                id,
                title,
                window.content.width,
                window.content.height,
                window.scale,
                if window.decoration.server_side { "server" } else { "client" }
            );
        }
        Ok(id)
    }

    /// Destroy a window; unknown or already destroyed handles are ignored
    pub fn destroy_window(&mut self, id: WindowId) {
        let Some(window) = self.windows.get_mut(id) else {
            return;
        };
        cursor::unlock(window, self.backend.as_mut());
        fullscreen::exit(window, self.backend.as_mut());
        self.backend.destroy_window(id);
        self.windows.remove(id);
        self.events.retain(|event| event.window != id);
        self.native.retain(|event| event.window != id);
        tracing::debug!("Destroyed window {:?}", id);
    }

    /// Mark a window as wanting to close
    pub fn close_window(&mut self, id: WindowId) {
        if let Some(window) = self.windows.get_mut(id) {
            window.should_close = true;
        }
    }

    /// Whether a window wants to close; unknown handles always do
    pub fn window_should_close(&self, id: WindowId) -> bool {
        self.windows.get(id).is_none_or(|window| window.should_close)
    }

    pub fn set_title(&mut self, id: WindowId, title: &str) {
        let Some(window) = self.windows.get_mut(id) else {
            return;
        };
        window.title = title.to_string();
        self.backend.set_title(id, title);
    }

    /// Resize the content area, in physical pixels
    pub fn set_size(&mut self, id: WindowId, width: u32, height: u32) {
        let Some(window) = self.windows.get_mut(id) else {
            return;
        };
        window.set_content(Size::new(width, height));
        let units = Units::new(&self.backend.capabilities(), window.scale);
        let surface = window.surface;
        self.backend.set_size(id, units.size_to_native(surface));
    }

    pub fn set_position_and_size(&mut self, id: WindowId, x: i32, y: i32, width: u32, height: u32) {
        let Some(window) = self.windows.get_mut(id) else {
            return;
        };
        window.position = Point::new(x, y);
        window.set_content(Size::new(width, height));
        let units = Units::new(&self.backend.capabilities(), window.scale);
        let native = units.size_to_native(window.surface);
        self.backend
            .set_position_and_size(id, Geometry::new(x, y, native.width, native.height));
    }

    /// Content size in physical pixels
    pub fn size(&self, id: WindowId) -> Option<Size> {
        self.windows.get(id).map(|window| window.content)
    }

    /// Content size in logical pixels
    pub fn logical_size(&self, id: WindowId) -> Option<Size> {
        self.windows.get(id).map(Window::logical_size)
    }

    pub fn framebuffer_size(&self, id: WindowId) -> Option<Size> {
        self.windows.get(id).map(Window::framebuffer_size)
    }

    pub fn surface_size(&self, id: WindowId) -> Option<Size> {
        self.windows.get(id).map(Window::surface_size)
    }

    pub fn scale_factor(&self, id: WindowId) -> Option<f32> {
        self.windows.get(id).map(|window| window.scale)
    }

    /// Height of the client-drawn title bar in physical pixels
    pub fn title_bar_height(&self, id: WindowId) -> Option<u32> {
        self.windows.get(id).map(Window::title_bar_height)
    }

    pub fn begin_resize(&mut self, id: WindowId, edge: ResizeEdge) {
        if edge.is_none() {
            return;
        }
        if let Some(window) = self.windows.get_mut(id) {
            start_gesture(window, self.backend.as_mut(), Gesture::Resize(edge));
        }
    }

    pub fn begin_move(&mut self, id: WindowId) {
        if let Some(window) = self.windows.get_mut(id) {
            start_gesture(window, self.backend.as_mut(), Gesture::Move);
        }
    }

    pub fn set_cursor(&mut self, id: WindowId, icon: CursorIcon) {
        if self.windows.contains(id) {
            self.backend.set_cursor(id, icon);
        }
    }

    /// Lock or release the pointer and set its visibility
    ///
    /// A locked pointer is always hidden; `visible` takes effect once the
    /// lock is released.
    pub fn set_cursor_mode(&mut self, id: WindowId, locked: bool, visible: bool) {
        let Some(window) = self.windows.get_mut(id) else {
            return;
        };
        let backend = self.backend.as_mut();
        if locked {
            cursor::request_lock(window, backend, visible);
        } else {
            window.cursor.visible = visible;
            cursor::unlock(window, backend);
            backend.set_cursor_visible(id, visible);
        }
    }

    pub fn lock_state(&self, id: WindowId) -> Option<LockState> {
        self.windows.get(id).map(|window| window.cursor.lock)
    }

    /// Pointer position relative to the window, physical pixels
    pub fn cursor_position(&mut self, id: WindowId) -> Option<Position> {
        let window = self.windows.get(id)?;
        let units = Units::new(&self.backend.capabilities(), window.scale);
        let fallback = window.pointer;
        let position = self
            .backend
            .cursor_position(id)
            .map(|pos| units.position_from_native(pos))
            .unwrap_or(fallback);
        Some(position)
    }

    pub fn set_fullscreen_exclusive(&mut self, id: WindowId, enabled: bool) {
        let Some(window) = self.windows.get_mut(id) else {
            return;
        };
        let before = window.content;
        if enabled {
            fullscreen::enter(window, self.backend.as_mut());
        } else {
            fullscreen::exit(window, self.backend.as_mut());
        }
        // Reported now; the confirming configure then matches and emits nothing
        let content = window.content;
        if content != before {
            self.events.push_back(Event::new(
                id,
                EventKind::WindowResize { width: content.width, height: content.height },
            ));
        }
    }

    pub fn is_fullscreen_exclusive(&self, id: WindowId) -> bool {
        self.windows
            .get(id)
            .is_some_and(|window| window.fullscreen.exclusive)
    }

    pub fn x11_handles(&self, id: WindowId) -> Option<X11Handles> {
        self.windows.contains(id).then(|| self.backend.x11_handles(id)).flatten()
    }

    pub fn wayland_handles(&self, id: WindowId) -> Option<WaylandHandles> {
        self.windows.contains(id).then(|| self.backend.wayland_handles(id)).flatten()
    }

    /// Handles for graphics API interop
    pub fn raw_handles(&self, id: WindowId) -> Option<(RawDisplayHandle, RawWindowHandle)> {
        if let Some(handles) = self.x11_handles(id) {
            return Some((handles.raw_display_handle(), handles.raw_window_handle()?));
        }
        self.wayland_handles(id)
            .map(|handles| (handles.raw_display_handle(), handles.raw_window_handle()))
    }

    /// Destroy the application and its windows
    pub fn destroy(self) {}
}

impl Drop for Application {
    fn drop(&mut self) {
        let ids = self.windows.ids().to_vec();
        for id in ids {
            self.destroy_window(id);
        }
        tracing::debug!("Application {:?} destroyed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(wayland: bool) -> SessionProbe {
        SessionProbe {
            backend_override: None,
            wayland_display: wayland,
            x_display: true,
        }
    }

    #[test]
    fn preference_reported_until_selected() {
        let mut ctx = Context::with_config(Config::default());
        assert_eq!(ctx.backend_name(), "Auto");
        ctx.set_backend(BackendPreference::Wayland);
        assert_eq!(ctx.backend(), BackendPreference::Wayland);
        assert_eq!(ctx.backend_name(), "Wayland");
    }

    #[test]
    fn first_selection_wins() {
        let mut ctx = Context::with_config(Config::default());
        assert_eq!(ctx.select(&session(false)), BackendKind::X11);
        assert_eq!(ctx.select(&session(true)), BackendKind::X11);
        ctx.set_backend(BackendPreference::Wayland);
        assert_eq!(ctx.backend(), BackendPreference::X11);
    }

    #[test]
    fn reset_allows_reselection() {
        let mut ctx = Context::with_config(Config::default());
        ctx.select(&session(false));
        ctx.reset();
        ctx.set_backend(BackendPreference::Wayland);
        assert_eq!(ctx.select(&session(false)), BackendKind::Wayland);
        assert_eq!(ctx.backend_name(), "Wayland");
    }
}
