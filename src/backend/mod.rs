//! Window system backends
//!
//! This module provides the platform-agnostic interface the core drives,
//! with implementations for X11 and Wayland. Backends speak their protocol's
//! native units; [`Capabilities::logical_coordinates`] tells the core when
//! sizes and positions need converting.

mod wayland;
mod x11;

use std::any::Any;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroU32;
use std::ptr::NonNull;
use std::str::FromStr;

use cursor_icon::CursorIcon;
use raw_window_handle::{
    RawDisplayHandle, RawWindowHandle, WaylandDisplayHandle, WaylandWindowHandle, XcbDisplayHandle,
    XcbWindowHandle,
};
use serde::{Deserialize, Serialize};

pub use self::wayland::WaylandBackend;
pub use self::x11::X11Backend;

use crate::config::Config;
use crate::core::edge::ResizeEdge;
use crate::core::geometry::{Geometry, Point, Position, Size};
use crate::core::registry::WindowId;
use crate::error::Result;
use crate::input::{Key, KeyText, Modifiers, MouseButton};

/// Environment variable forcing a backend when the preference is `Auto`
pub const BACKEND_ENV: &str = "CASEMENT_BACKEND";

/// A concrete window system protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    X11,
    Wayland,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::X11 => "X11",
            BackendKind::Wayland => "Wayland",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which backend the caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackendPreference {
    #[default]
    Auto,
    X11,
    Wayland,
}

impl BackendPreference {
    pub fn name(self) -> &'static str {
        match self {
            BackendPreference::Auto => "Auto",
            BackendPreference::X11 => "X11",
            BackendPreference::Wayland => "Wayland",
        }
    }
}

impl From<BackendKind> for BackendPreference {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::X11 => BackendPreference::X11,
            BackendKind::Wayland => BackendPreference::Wayland,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backend {0:?}, expected x11, wayland or auto")]
pub struct ParseBackendError(String);

impl FromStr for BackendPreference {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendPreference::Auto),
            "x11" => Ok(BackendPreference::X11),
            "wayland" => Ok(BackendPreference::Wayland),
            _ => Err(ParseBackendError(s.to_string())),
        }
    }
}

/// Snapshot of the session environment used for backend detection
#[derive(Debug, Clone, Default)]
pub struct SessionProbe {
    pub backend_override: Option<String>,
    pub wayland_display: bool,
    pub x_display: bool,
}

impl SessionProbe {
    pub fn from_env() -> Self {
        Self {
            backend_override: std::env::var(BACKEND_ENV).ok(),
            wayland_display: std::env::var_os("WAYLAND_DISPLAY").is_some(),
            x_display: std::env::var_os("DISPLAY").is_some(),
        }
    }
}

/// Pick the backend for `preference` in the given session
///
/// An explicit preference always wins. `Auto` consults the override
/// variable, then a running Wayland session, then the X display. X11 is the
/// last resort even without `DISPLAY`.
pub fn resolve(preference: BackendPreference, probe: &SessionProbe) -> BackendKind {
    let preference = match preference {
        BackendPreference::Auto => match probe.backend_override.as_deref().map(str::parse) {
            Some(Ok(pref)) => pref,
            Some(Err(err)) => {
                tracing::warn!("Ignoring {}: {}", BACKEND_ENV, err);
                BackendPreference::Auto
            }
            None => BackendPreference::Auto,
        },
        explicit => explicit,
    };

    match preference {
        BackendPreference::X11 => BackendKind::X11,
        BackendPreference::Wayland => BackendKind::Wayland,
        BackendPreference::Auto if probe.wayland_display => BackendKind::Wayland,
        BackendPreference::Auto => {
            if !probe.x_display {
                tracing::warn!("Neither WAYLAND_DISPLAY nor DISPLAY is set, trying X11 anyway");
            }
            BackendKind::X11
        }
    }
}

/// Open a connection for `kind`
pub fn connect(kind: BackendKind, config: &Config) -> Result<Box<dyn Backend>> {
    tracing::info!("Using {} backend", kind);
    match kind {
        BackendKind::X11 => Ok(Box::new(X11Backend::connect(config)?)),
        BackendKind::Wayland => Ok(Box::new(WaylandBackend::connect(config)?)),
    }
}

/// What a backend can do; the core adapts its algorithms to these
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The window manager owns resize and move gestures
    pub compositor_driven_resize: bool,
    /// The pointer can be warped to an arbitrary position
    pub pointer_warp: bool,
    /// Relative motion is delivered natively while the pointer is confined
    pub native_relative_motion: bool,
    /// Decoration mode is requested and granted asynchronously
    pub decoration_negotiation: bool,
    /// Sizes and positions on the wire are logical pixels
    pub logical_coordinates: bool,
}

/// What the backend decided while creating a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSetup {
    pub scale: f32,
    pub server_decorations: bool,
}

/// Outcome of a pointer confinement attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confinement {
    Granted,
    /// Another client holds the pointer; worth retrying shortly
    AlreadyGrabbed,
    /// The platform has no way to confine the pointer
    Unsupported,
}

/// Display configuration captured before a mode switch
pub struct SavedMode(Box<dyn Any>);

impl SavedMode {
    pub fn new<T: Any>(mode: T) -> Self {
        Self(Box::new(mode))
    }

    pub fn downcast<T: Any>(self) -> Option<T> {
        self.0.downcast::<T>().ok().map(|mode| *mode)
    }
}

impl fmt::Debug for SavedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SavedMode(..)")
    }
}

/// An event as the backend saw it, before normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeEvent {
    pub window: WindowId,
    pub kind: NativeEventKind,
}

impl NativeEvent {
    pub fn new(window: WindowId, kind: NativeEventKind) -> Self {
        Self { window, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeEventKind {
    CloseRequested,
    /// Configure from the window system; `size` is the new extent in
    /// native units, `None` when the platform leaves the size to the client
    Configure {
        size: Option<Size>,
        position: Option<Point>,
    },
    Mapped,
    Unmapped,
    Destroyed,
    FocusIn,
    FocusOut {
        /// False for transient focus shuffles such as grabs
        lost_to_other: bool,
    },
    Key {
        pressed: bool,
        key: Key,
        keycode: u32,
        text: Option<KeyText>,
        modifiers: Modifiers,
    },
    Button {
        pressed: bool,
        button: MouseButton,
        modifiers: Modifiers,
    },
    /// Absolute pointer position relative to the surface, native units
    Motion(Position),
    /// Unaccelerated pointer delta, physical pixels
    RelativeMotion {
        dx: f64,
        dy: f64,
    },
    Scroll {
        dx: f64,
        dy: f64,
    },
    PointerEnter(Position),
    PointerLeave,
    ScaleChanged(f32),
    DecorationMode {
        server_side: bool,
    },
    FullscreenChanged(bool),
}

/// Native handles of an X11 window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct X11Handles {
    /// `xcb_connection_t *`
    pub connection: NonNull<c_void>,
    pub screen: i32,
    pub window: u32,
}

impl X11Handles {
    pub fn raw_display_handle(&self) -> RawDisplayHandle {
        RawDisplayHandle::Xcb(XcbDisplayHandle::new(Some(self.connection), self.screen))
    }

    pub fn raw_window_handle(&self) -> Option<RawWindowHandle> {
        NonZeroU32::new(self.window).map(|window| RawWindowHandle::Xcb(XcbWindowHandle::new(window)))
    }
}

/// Native handles of a Wayland surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaylandHandles {
    /// `wl_display *`
    pub display: NonNull<c_void>,
    /// `wl_surface *`
    pub surface: NonNull<c_void>,
}

impl WaylandHandles {
    pub fn raw_display_handle(&self) -> RawDisplayHandle {
        RawDisplayHandle::Wayland(WaylandDisplayHandle::new(self.display))
    }

    pub fn raw_window_handle(&self) -> RawWindowHandle {
        RawWindowHandle::Wayland(WaylandWindowHandle::new(self.surface))
    }
}

/// Operations the core needs from a window system
///
/// Window operations on an id the backend does not know are no-ops.
/// Request failures are logged by the backend, not returned, except where
/// a window is being created.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> Capabilities;

    /// Scale new windows start with
    fn display_scale(&self) -> f32;

    /// Size of the screen in physical pixels, when known
    fn screen_size(&self) -> Option<Size>;

    /// Append buffered native events to `queue`
    ///
    /// Performs at most one non-blocking read from the connection.
    fn dispatch(&mut self, queue: &mut VecDeque<NativeEvent>) -> Result<()>;

    /// Create the native window for `id` with a surface of `size`
    fn create_window(&mut self, id: WindowId, title: &str, size: Size) -> Result<WindowSetup>;

    fn destroy_window(&mut self, id: WindowId);

    fn set_title(&mut self, id: WindowId, title: &str);

    fn set_size(&mut self, id: WindowId, size: Size);

    fn set_position_and_size(&mut self, id: WindowId, geometry: Geometry);

    fn set_min_size(&mut self, id: WindowId, size: Size);

    /// Current geometry as reported by the window system, if it reports one
    fn window_geometry(&mut self, id: WindowId) -> Option<Geometry>;

    fn begin_resize(&mut self, id: WindowId, edge: ResizeEdge);

    fn begin_move(&mut self, id: WindowId);

    fn set_cursor(&mut self, id: WindowId, icon: CursorIcon);

    fn set_cursor_visible(&mut self, id: WindowId, visible: bool);

    fn request_focus(&mut self, id: WindowId);

    fn warp_pointer(&mut self, id: WindowId, to: Point);

    fn confine_pointer(&mut self, id: WindowId) -> Confinement;

    fn release_pointer(&mut self, id: WindowId);

    /// Enable or disable the native relative-motion source
    ///
    /// Returns whether the source is active afterward.
    fn set_relative_motion(&mut self, id: WindowId, enabled: bool) -> bool;

    /// Pointer position relative to the window, native units
    fn cursor_position(&mut self, id: WindowId) -> Option<Position>;

    fn set_wm_fullscreen(&mut self, id: WindowId, fullscreen: bool);

    /// Switch the output under `id` to its preferred mode
    ///
    /// Returns the previous configuration when a switch happened.
    fn switch_display_mode(&mut self, id: WindowId) -> Option<SavedMode>;

    fn restore_display_mode(&mut self, id: WindowId, mode: SavedMode);

    fn x11_handles(&self, _id: WindowId) -> Option<X11Handles> {
        None
    }

    fn wayland_handles(&self, _id: WindowId) -> Option<WaylandHandles> {
        None
    }
}
