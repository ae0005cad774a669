//! Unified events delivered by [`Application::poll_event`](crate::Application::poll_event)
//!
//! Positions and sizes are physical pixels; pointer positions are relative
//! to the window surface.

use serde::Serialize;

use crate::core::registry::WindowId;
use crate::input::{Key, KeyText, Modifiers, MouseButton};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Event {
    pub window: WindowId,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(window: WindowId, kind: EventKind) -> Self {
        Self { window, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    WindowClose,
    WindowResize { width: u32, height: u32 },
    WindowFocus,
    WindowUnfocus,
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    MouseButtonDown { button: MouseButton },
    MouseButtonUp { button: MouseButton },
    MouseMove { x: f64, y: f64, dx: f64, dy: f64 },
    MouseScroll { x: f64, y: f64 },
    MouseEnter,
    MouseLeave,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyEvent {
    pub key: Key,
    /// Keycode as reported by the window system
    pub keycode: u32,
    /// Text produced by the press, if any
    pub text: Option<KeyText>,
    pub modifiers: Modifiers,
}
