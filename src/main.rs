//! casement-demo - opens a window and logs every event as JSON
//!
//! Escape closes, F toggles exclusive fullscreen, L toggles cursor lock.
//! Typed text accumulates in the title; Enter clears it, Backspace deletes.

use anyhow::Context as _;
use casement::{Application, Context, EventKind, Key, LockState, WindowId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TITLE: &str = "casement demo";

fn main() -> anyhow::Result<()> {
    // Initialize tracing (stderr keeps stdout for the event log)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let ctx = Context::new();
    let mut app = ctx
        .create_application()
        .context("failed to connect to a display server")?;
    tracing::info!("Running on {} (scale {})", app.backend_kind(), app.display_scale());

    let window = app
        .create_window(TITLE, 800, 600)
        .context("failed to create window")?;

    let mut typed = String::new();
    while !app.should_close() && !app.window_should_close(window) {
        let mut idle = true;
        while let Some(event) = app.poll_event() {
            idle = false;
            println!("{}", serde_json::to_string(&event)?);
            if let EventKind::KeyDown(key) = event.kind {
                handle_key(&mut app, window, key, &mut typed);
            }
        }
        if idle {
            std::thread::sleep(std::time::Duration::from_millis(4));
        }
    }

    tracing::info!("Shutting down");
    app.destroy();
    Ok(())
}

fn handle_key(app: &mut Application, window: WindowId, key: casement::KeyEvent, typed: &mut String) {
    match key.key {
        Key::Escape => app.close_window(window),
        Key::F => {
            let enabled = !app.is_fullscreen_exclusive(window);
            app.set_fullscreen_exclusive(window, enabled);
        }
        Key::L => {
            let locked = app.lock_state(window).is_some_and(|state| state != LockState::Unlocked);
            app.set_cursor_mode(window, !locked, true);
        }
        Key::Enter => typed.clear(),
        Key::Backspace => {
            typed.pop();
        }
        _ => {
            if let Some(text) = key.text {
                typed.extend(text.as_str().chars().filter(|c| !c.is_control()));
            }
        }
    }
    let title = if typed.is_empty() {
        TITLE.to_string()
    } else {
        format!("{TITLE}: {typed}")
    };
    app.set_title(window, &title);
}
