mod common;

use casement::backend::{Confinement, NativeEventKind};
use casement::{EventKind, LockState, Point, Position, Size};

use common::{Call, Script, application, drain, ready_window};

#[test]
fn lock_round_trip_restores_visibility() {
    let (mut app, script) = application(Script::x11());
    let id = ready_window(&mut app, &script);

    app.set_cursor_mode(id, true, true);
    assert_eq!(app.lock_state(id), Some(LockState::Locked));
    assert_eq!(script.calls()[0], Call::CursorVisible(id, false));

    app.set_cursor_mode(id, false, true);
    assert_eq!(app.lock_state(id), Some(LockState::Unlocked));
    assert_eq!(script.count(&Call::Release(id)), 1);
    assert_eq!(script.calls().last(), Some(&Call::CursorVisible(id, true)));
    assert!(!app.window_should_close(id));
    assert_eq!(app.size(id), Some(Size::new(800, 600)));
}

#[test]
fn lock_waits_for_map_and_focus() {
    let (mut app, script) = application(Script::x11());
    let id = app.create_window("pending", 800, 600).unwrap();

    app.set_cursor_mode(id, true, false);
    assert_eq!(app.lock_state(id), Some(LockState::LockPending));

    script.push(id, NativeEventKind::Mapped);
    drain(&mut app);
    assert_eq!(app.lock_state(id), Some(LockState::LockPending));
    assert_eq!(script.count(&Call::RequestFocus(id)), 1);

    script.push(id, NativeEventKind::FocusIn);
    drain(&mut app);
    assert_eq!(app.lock_state(id), Some(LockState::Locked));
    assert_eq!(script.calls().last(), Some(&Call::Warp(id, Point::new(400, 300))));
}

#[test]
fn contended_pointer_retries_on_next_focus() {
    let (mut app, script) = application(Script::x11());
    let id = ready_window(&mut app, &script);
    script.with(|s| s.confinement.extend([Confinement::AlreadyGrabbed; 4]));

    app.set_cursor_mode(id, true, false);
    assert_eq!(app.lock_state(id), Some(LockState::LockPending));
    assert_eq!(script.count(&Call::Confine(id)), 4);

    script.push(id, NativeEventKind::FocusOut { lost_to_other: true });
    script.push(id, NativeEventKind::FocusIn);
    drain(&mut app);
    assert_eq!(app.lock_state(id), Some(LockState::Locked));
    assert_eq!(script.count(&Call::Confine(id)), 5);
}

#[test]
fn unconfinable_pointer_still_locks() {
    let (mut app, script) = application(Script::x11());
    let id = ready_window(&mut app, &script);
    script.with(|s| s.confinement.push_back(Confinement::Unsupported));

    app.set_cursor_mode(id, true, false);
    assert_eq!(app.lock_state(id), Some(LockState::Locked));
}

#[test]
fn warp_motion_is_absorbed() {
    let (mut app, script) = application(Script::x11());
    let id = ready_window(&mut app, &script);
    app.set_cursor_mode(id, true, false);
    script.clear_calls();

    script.push(id, NativeEventKind::Motion(Position::new(400.0, 300.0)));
    script.push(id, NativeEventKind::Motion(Position::new(410.0, 300.0)));
    script.push(id, NativeEventKind::Motion(Position::new(400.0, 300.0)));
    let events = drain(&mut app);

    assert_eq!(
        events.iter().map(|e| e.kind).collect::<Vec<_>>(),
        vec![EventKind::MouseMove { x: 410.0, y: 300.0, dx: 10.0, dy: 0.0 }]
    );
    assert_eq!(script.calls(), vec![Call::Warp(id, Point::new(400, 300))]);
}

#[test]
fn small_drift_is_not_recentered() {
    let (mut app, script) = application(Script::x11());
    let id = ready_window(&mut app, &script);
    app.set_cursor_mode(id, true, false);
    script.push(id, NativeEventKind::Motion(Position::new(400.0, 300.0)));
    drain(&mut app);
    script.clear_calls();

    script.with(|s| s.pointer = Some(Position::new(402.0, 299.0)));
    script.push(id, NativeEventKind::Motion(Position::new(402.0, 299.0)));
    let events = drain(&mut app);
    assert_eq!(events[0].kind, EventKind::MouseMove { x: 402.0, y: 299.0, dx: 2.0, dy: -1.0 });
    assert!(script.calls().is_empty());

    script.with(|s| s.pointer = Some(Position::new(795.0, 299.0)));
    script.push(id, NativeEventKind::Motion(Position::new(795.0, 299.0)));
    drain(&mut app);
    assert_eq!(script.calls(), vec![Call::Warp(id, Point::new(400, 300))]);
}

#[test]
fn warp_targets_content_below_title_bar() {
    let mut script = Script::x11();
    script.server_decorations = false;
    let (mut app, script) = application(script);
    let id = ready_window(&mut app, &script);

    app.set_cursor_mode(id, true, false);
    assert_eq!(script.calls().last(), Some(&Call::Warp(id, Point::new(400, 340))));

    script.push(id, NativeEventKind::Motion(Position::new(400.0, 340.0)));
    script.push(id, NativeEventKind::Motion(Position::new(403.0, 338.0)));
    let events = drain(&mut app);
    assert_eq!(
        events.iter().map(|e| e.kind).collect::<Vec<_>>(),
        vec![EventKind::MouseMove { x: 403.0, y: 338.0, dx: 3.0, dy: -2.0 }]
    );
}

#[test]
fn native_relative_motion_reports_deltas_at_content_center() {
    let (mut app, script) = application(Script::wayland(1.0));
    let id = ready_window(&mut app, &script);

    app.set_cursor_mode(id, true, false);
    assert_eq!(app.lock_state(id), Some(LockState::Locked));
    assert_eq!(script.count(&Call::RelativeMotion(id, true)), 1);
    assert!(!script.calls().iter().any(|c| matches!(c, Call::Warp(..))));

    script.push(id, NativeEventKind::Motion(Position::new(120.0, 80.0)));
    script.push(id, NativeEventKind::RelativeMotion { dx: 3.0, dy: -2.0 });
    let events = drain(&mut app);
    assert_eq!(
        events.iter().map(|e| e.kind).collect::<Vec<_>>(),
        vec![EventKind::MouseMove { x: 400.0, y: 340.0, dx: 3.0, dy: -2.0 }]
    );

    app.set_cursor_mode(id, false, true);
    assert_eq!(script.count(&Call::RelativeMotion(id, false)), 1);
    assert_eq!(script.count(&Call::Release(id)), 1);
}

#[test]
fn relative_motion_ignored_when_unlocked() {
    let (mut app, script) = application(Script::wayland(1.0));
    let id = ready_window(&mut app, &script);

    script.push(id, NativeEventKind::RelativeMotion { dx: 3.0, dy: -2.0 });
    assert_eq!(app.poll_event(), None);
}

#[test]
fn focus_loss_suspends_lock() {
    let (mut app, script) = application(Script::x11());
    let id = ready_window(&mut app, &script);
    app.set_cursor_mode(id, true, false);

    script.push(id, NativeEventKind::FocusOut { lost_to_other: false });
    drain(&mut app);
    assert_eq!(app.lock_state(id), Some(LockState::Locked));

    script.push(id, NativeEventKind::FocusOut { lost_to_other: true });
    let events = drain(&mut app);
    assert_eq!(events[0].kind, EventKind::WindowUnfocus);
    assert_eq!(app.lock_state(id), Some(LockState::LockPending));
    assert_eq!(script.count(&Call::Release(id)), 1);

    script.push(id, NativeEventKind::FocusIn);
    drain(&mut app);
    assert_eq!(app.lock_state(id), Some(LockState::Locked));
}

#[test]
fn unmap_suspends_lock() {
    let (mut app, script) = application(Script::x11());
    let id = ready_window(&mut app, &script);
    app.set_cursor_mode(id, true, false);

    script.push(id, NativeEventKind::Unmapped);
    drain(&mut app);
    assert_eq!(app.lock_state(id), Some(LockState::LockPending));

    script.push(id, NativeEventKind::Mapped);
    drain(&mut app);
    assert_eq!(app.lock_state(id), Some(LockState::Locked));
}

#[test]
fn crossing_events_hidden_while_locked() {
    let (mut app, script) = application(Script::x11());
    let id = ready_window(&mut app, &script);
    app.set_cursor_mode(id, true, false);

    script.push(id, NativeEventKind::PointerLeave);
    script.push(id, NativeEventKind::PointerEnter(Position::new(400.0, 300.0)));
    assert!(drain(&mut app).is_empty());

    app.set_cursor_mode(id, false, true);
    script.push(id, NativeEventKind::PointerLeave);
    assert_eq!(drain(&mut app)[0].kind, EventKind::MouseLeave);
}

#[test]
fn destroy_releases_lock_first() {
    let (mut app, script) = application(Script::x11());
    let id = ready_window(&mut app, &script);
    app.set_cursor_mode(id, true, false);
    script.clear_calls();

    app.destroy_window(id);
    let calls = script.calls();
    assert_eq!(calls.first(), Some(&Call::Release(id)));
    assert_eq!(calls.last(), Some(&Call::Destroy(id)));
}
