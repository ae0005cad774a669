//! Event normalization
//!
//! Turns one backend event into zero or more unified events, running the
//! shared algorithms on the way: unit conversion, resize-edge dispatch,
//! cursor-lock bookkeeping, decoration and fullscreen tracking.

use std::collections::VecDeque;

use super::cursor::{self, LockState};
use super::edge::{Gesture, ResizeEdge, detect_edge};
use super::fullscreen;
use super::geometry::{Position, Size};
use super::registry::WindowRegistry;
use super::scale::{self, Units};
use super::window::Window;
use crate::backend::{Backend, Capabilities, NativeEvent, NativeEventKind};
use crate::event::{Event, EventKind, KeyEvent};
use crate::input::{Modifiers, MouseButton};

/// Normalize `native`, appending whatever it produces to `out`
///
/// Events for windows that no longer exist are dropped.
pub fn normalize(
    native: NativeEvent,
    windows: &mut WindowRegistry,
    backend: &mut dyn Backend,
    out: &mut VecDeque<Event>,
) {
    let Some(window) = windows.get_mut(native.window) else {
        tracing::debug!("Dropping {:?} for unknown window", native.kind);
        return;
    };
    let caps = backend.capabilities();
    let units = Units::new(&caps, window.scale);
    let id = window.id;
    let mut emit = |kind| out.push_back(Event::new(id, kind));

    match native.kind {
        NativeEventKind::CloseRequested => {
            window.should_close = true;
            emit(EventKind::WindowClose);
        }

        NativeEventKind::Configure { size, position } => {
            window.configured = true;
            window.resize.finish();
            if let Some(position) = position {
                window.position = position;
            }
            if let Some(size) = size
                && let Some(resize) = apply_content(window, units.size_from_native(size))
            {
                emit(resize);
            }
        }

        NativeEventKind::Mapped => {
            window.mapped = true;
            cursor::lock_if_ready(window, backend);
        }

        NativeEventKind::Unmapped => {
            window.mapped = false;
            cursor::suspend(window, backend);
        }

        NativeEventKind::Destroyed => {
            window.mapped = false;
            window.should_close = true;
        }

        NativeEventKind::FocusIn => {
            window.focused = true;
            window.resize.finish();
            cursor::lock_if_ready(window, backend);
            emit(EventKind::WindowFocus);
        }

        NativeEventKind::FocusOut { lost_to_other } => {
            window.resize.finish();
            if lost_to_other {
                window.focused = false;
                cursor::suspend(window, backend);
            }
            emit(EventKind::WindowUnfocus);
        }

        NativeEventKind::Key { pressed, key, keycode, text, modifiers } => {
            let key = KeyEvent { key, keycode, text, modifiers };
            emit(if pressed { EventKind::KeyDown(key) } else { EventKind::KeyUp(key) });
        }

        NativeEventKind::Button { pressed: true, button, modifiers } => {
            if button == MouseButton::Left && !caps.compositor_driven_resize {
                if let Some(gesture) = press_gesture(window, modifiers) {
                    start_gesture(window, backend, gesture);
                    window.resize.swallow_release = Some(button);
                    return;
                }
            }
            window.resize.press_passed(button);
            window.press(button);
            emit(EventKind::MouseButtonDown { button });
        }

        NativeEventKind::Button { pressed: false, button, .. } => {
            window.release(button);
            if window.resize.take_release(button) {
                return;
            }
            emit(EventKind::MouseButtonUp { button });
        }

        NativeEventKind::Motion(pos) => {
            let pos = units.position_from_native(pos);
            window.pointer = pos;
            if window.cursor.warp_pending {
                window.cursor.warp_pending = false;
                window.cursor.last = pos;
                return;
            }
            if window.cursor.is_locked() && window.cursor.relative_active {
                window.cursor.last = pos;
                return;
            }

            let (dx, dy) = (pos.x - window.cursor.last.x, pos.y - window.cursor.last.y);
            window.cursor.last = pos;
            if window.cursor.is_locked() {
                cursor::enforce_bounds(window, backend);
            } else {
                hover_feedback(window, backend, &caps);
            }
            emit(EventKind::MouseMove { x: pos.x, y: pos.y, dx, dy });
        }

        NativeEventKind::RelativeMotion { dx, dy } => {
            if !(window.cursor.is_locked() && window.cursor.relative_active) {
                return;
            }
            let center = Position::from(window.cursor.center);
            emit(EventKind::MouseMove { x: center.x, y: center.y, dx, dy });
            if caps.pointer_warp {
                cursor::enforce_bounds(window, backend);
            }
        }

        NativeEventKind::Scroll { dx, dy } => {
            emit(EventKind::MouseScroll { x: dx, y: dy });
        }

        NativeEventKind::PointerEnter(pos) => {
            let pos = units.position_from_native(pos);
            window.pointer = pos;
            window.cursor.last = pos;
            window.clear_buttons();
            window.resize.finish();
            if window.cursor.lock != LockState::Locked {
                emit(EventKind::MouseEnter);
            }
        }

        NativeEventKind::PointerLeave => {
            window.resize.hovered = ResizeEdge::None;
            if window.cursor.lock != LockState::Locked {
                emit(EventKind::MouseLeave);
            }
        }

        NativeEventKind::ScaleChanged(new_scale) => {
            if new_scale <= 0.0 || new_scale == window.scale {
                return;
            }
            let old_scale = window.scale;
            window.scale = new_scale;
            let content = if caps.logical_coordinates {
                // The compositor keeps the logical size; the pixels change
                let logical = scale::to_logical_size(window.content, old_scale);
                scale::to_physical_size(logical, new_scale)
            } else {
                window.content
            };
            tracing::debug!("Window {:?} scale {} -> {}", id, old_scale, new_scale);
            if let Some(resize) = apply_content(window, content) {
                emit(resize);
            }
        }

        NativeEventKind::DecorationMode { server_side } => {
            tracing::debug!(
                "Window {:?} decorations: {}",
                id,
                if server_side { "server-side" } else { "client-side" }
            );
            window.decoration.server_side = server_side;
            window.set_content(window.content);
        }

        NativeEventKind::FullscreenChanged(state) => {
            fullscreen::sync(window, state);
        }
    }
}

/// Store a new content size, reporting a resize only when it changed
fn apply_content(window: &mut Window, content: Size) -> Option<EventKind> {
    let changed = content != window.content;
    window.set_content(content);
    changed.then_some(EventKind::WindowResize {
        width: content.width,
        height: content.height,
    })
}

/// Decide whether a primary press starts a resize or move
fn press_gesture(window: &Window, modifiers: Modifiers) -> Option<Gesture> {
    if window.cursor.lock_wanted() {
        return None;
    }
    if modifiers.contains(Modifiers::ALT) {
        return Some(Gesture::Move);
    }
    let fullscreen = window.fullscreen.exclusive;
    if !fullscreen {
        let edge = surface_edge(window);
        if !edge.is_none() {
            return Some(Gesture::Resize(edge));
        }
    }
    window
        .decoration
        .in_title_bar(window.pointer.y, window.scale, fullscreen)
        .then_some(Gesture::Move)
}

fn surface_edge(window: &Window) -> ResizeEdge {
    let border = window.resize.border as f64 * window.scale as f64;
    detect_edge(
        window.pointer.x,
        window.pointer.y,
        window.surface.width,
        window.surface.height,
        border,
    )
}

/// Hand a gesture to the platform and remember it
pub fn start_gesture(window: &mut Window, backend: &mut dyn Backend, gesture: Gesture) {
    match gesture {
        Gesture::Resize(edge) => backend.begin_resize(window.id, edge),
        Gesture::Move => backend.begin_move(window.id),
    }
    let at = window.pointer;
    let geometry = window.geometry();
    window.resize.begin(gesture, at, geometry);
    tracing::debug!("Window {:?} began {:?}", window.id, gesture);
}

/// Show a resize cursor while hovering an edge
fn hover_feedback(window: &mut Window, backend: &mut dyn Backend, caps: &Capabilities) {
    if caps.compositor_driven_resize
        || window.cursor.lock_wanted()
        || window.any_button_held()
        || window.fullscreen.exclusive
    {
        return;
    }
    let edge = surface_edge(window);
    if let Some(icon) = window.resize.hover(edge) {
        backend.set_cursor(window.id, icon);
    }
}
