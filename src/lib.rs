//! Casement - windowing and input for Linux over X11 and Wayland
//!
//! This library opens top-level windows on whichever display server the
//! session provides and delivers their input through one event model, so
//! an application can drive a renderer without caring which protocol sits
//! underneath.
//!
//! ## Features
//!
//! - Backend selection (X11, Wayland, or auto-detected)
//! - Unified, `Copy` events polled without blocking
//! - Client-side resize edges and title-bar moves on Wayland
//! - Cursor lock with relative motion, emulated where the platform lacks it
//! - Exclusive fullscreen with geometry and display-mode restore
//! - HiDPI scale discovery and buffer-scale alignment
//! - Native handles for graphics API interop via `raw-window-handle`
//!
//! ## Example
//!
//! ```no_run
//! use casement::{Context, EventKind, Key};
//!
//! let ctx = Context::new();
//! let code = casement::run(&ctx, |app| {
//!     let Ok(window) = app.create_window("Hello", 800, 600) else {
//!         return 1;
//!     };
//!     while !app.should_close() && !app.window_should_close(window) {
//!         while let Some(event) = app.poll_event() {
//!             if let EventKind::KeyDown(key) = event.kind
//!                 && key.key == Key::Escape
//!             {
//!                 app.close();
//!             }
//!         }
//!     }
//!     0
//! });
//! std::process::exit(code);
//! ```

pub mod application;
pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod input;

pub use crate::application::{Application, Context};
pub use crate::backend::{BackendKind, BackendPreference};
pub use crate::config::Config;
pub use crate::core::cursor::LockState;
pub use crate::core::edge::ResizeEdge;
pub use crate::core::geometry::{Geometry, Point, Position, Size};
pub use crate::core::registry::{AppId, WindowId};
pub use crate::error::{Error, Result};
pub use crate::event::{Event, EventKind, KeyEvent};
pub use crate::input::{Key, KeyText, Modifiers, MouseButton};
pub use cursor_icon::CursorIcon;

/// Exit code returned by [`run`] when the application cannot be created
pub const EXIT_CREATE_FAILED: i32 = -1;

/// Create an application, hand it to `f`, then tear it down
///
/// Returns the callback's exit code, or [`EXIT_CREATE_FAILED`] when no
/// display server could be reached.
pub fn run<F>(ctx: &Context, f: F) -> i32
where
    F: FnOnce(&mut Application) -> i32,
{
    let mut app = match ctx.create_application() {
        Ok(app) => app,
        Err(err) => {
            tracing::error!("Failed to create application: {}", err);
            return EXIT_CREATE_FAILED;
        }
    };
    let code = f(&mut app);
    app.destroy();
    code
}
