//! Cursor-lock emulation
//!
//! A locked cursor is hidden, confined to the window and reports deltas.
//! Backends with a native relative-motion source (XInput2 raw motion,
//! `zwp_relative_pointer_v1`) deliver deltas directly; otherwise deltas are
//! synthesized from absolute motion and the pointer is warped back to the
//! lock center before it can reach an edge.
//!
//! ```text
//! Unlocked --lock--> LockPending --focused && mapped--> Locked
//!    ^                   ^                                 |
//!    |                   +------focus lost / unmapped------+
//!    +--------------------unlock / destroy-----------------+
//! ```

use std::time::Duration;

use serde::Serialize;

use super::geometry::{Point, Position, Size};
use super::window::Window;
use super::scale::Units;
use crate::backend::{Backend, Confinement};

/// Confinement attempts before giving up until the next focus/map
pub const CONFINE_ATTEMPTS: u32 = 4;

/// Backoff step between confinement attempts; attempt `n` waits `n` steps
pub const CONFINE_BACKOFF: Duration = Duration::from_millis(2);

/// Distance from a window edge that triggers a re-center
pub const RECENTER_MARGIN: i32 = 10;

/// Drift from the lock center tolerated before re-centering
pub const CENTER_THRESHOLD: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LockState {
    #[default]
    Unlocked,
    /// Lock requested but not yet established
    LockPending,
    Locked,
}

#[derive(Debug, Clone)]
pub struct CursorState {
    pub lock: LockState,
    /// Visibility requested by the application, restored on unlock
    pub visible: bool,
    pub center: Point,
    /// Last absolute position seen, physical surface coordinates
    pub last: Position,
    pub relative_active: bool,
    /// Set by our own warps; the next absolute motion is swallowed
    pub warp_pending: bool,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            lock: LockState::Unlocked,
            visible: true,
            center: Point::default(),
            last: Position::default(),
            relative_active: false,
            warp_pending: false,
        }
    }
}

impl CursorState {
    /// Whether the application still wants the pointer locked
    pub fn lock_wanted(&self) -> bool {
        self.lock != LockState::Unlocked
    }

    pub fn is_locked(&self) -> bool {
        self.lock == LockState::Locked
    }
}

/// Center of the content area in surface coordinates
///
/// The content sits below a `band`-high title bar when the client draws one.
pub fn lock_center(content: Size, band: u32) -> Point {
    Point::new((content.width / 2) as i32, (band + content.height / 2) as i32)
}

/// Whether a confined pointer at `pos` should be warped back to `center`
///
/// True near any edge of `size`, or when the pointer has drifted past the
/// center threshold. Windows too small to have an inner zone never warp.
pub fn needs_recenter(pos: Point, center: Point, size: Size) -> bool {
    let (width, height) = (size.width as i32, size.height as i32);
    if width <= RECENTER_MARGIN * 2 || height <= RECENTER_MARGIN * 2 {
        return false;
    }
    if pos.x < RECENTER_MARGIN
        || pos.x > width - RECENTER_MARGIN
        || pos.y < RECENTER_MARGIN
        || pos.y > height - RECENTER_MARGIN
    {
        return true;
    }
    (pos.x - center.x).abs() > CENTER_THRESHOLD || (pos.y - center.y).abs() > CENTER_THRESHOLD
}

/// Try to confine the pointer, backing off while another client holds it
pub fn confine_with_retry(
    mut attempt: impl FnMut() -> Confinement,
    mut sleep: impl FnMut(Duration),
) -> Confinement {
    let mut result = Confinement::AlreadyGrabbed;
    for n in 1..=CONFINE_ATTEMPTS {
        result = attempt();
        if result != Confinement::AlreadyGrabbed {
            break;
        }
        tracing::warn!("Pointer already grabbed (attempt {} of {})", n, CONFINE_ATTEMPTS);
        sleep(CONFINE_BACKOFF * n);
    }
    result
}

/// Warp the pointer to the lock center and arm the warp guard
pub fn warp_to_center(window: &mut Window, backend: &mut dyn Backend) {
    let units = Units::new(&backend.capabilities(), window.scale);
    let center = window.cursor.center;
    window.cursor.warp_pending = true;
    window.cursor.last = center.into();
    backend.warp_pointer(window.id, units.point_to_native(center));
}

/// Handle a lock request
pub fn request_lock(window: &mut Window, backend: &mut dyn Backend, visible: bool) {
    window.cursor.visible = visible;
    if window.cursor.is_locked() {
        return;
    }
    window.cursor.lock = LockState::LockPending;
    window.cursor.center = lock_center(window.content, window.title_bar_height());
    backend.set_cursor_visible(window.id, false);
    lock_if_ready(window, backend);
}

/// Promote `LockPending` to `Locked` once the window can take the pointer
///
/// Leaves the state pending when unfocused (after asking for focus),
/// unmapped, or when every confinement attempt found the pointer grabbed.
pub fn lock_if_ready(window: &mut Window, backend: &mut dyn Backend) {
    if window.cursor.lock != LockState::LockPending || !window.mapped {
        return;
    }
    if !window.focused {
        tracing::debug!("Window {:?} unfocused, requesting focus before locking", window.id);
        backend.request_focus(window.id);
        return;
    }

    let caps = backend.capabilities();
    if caps.pointer_warp {
        warp_to_center(window, backend);
    }

    let id = window.id;
    let confinement = confine_with_retry(|| backend.confine_pointer(id), std::thread::sleep);
    match confinement {
        Confinement::AlreadyGrabbed => {
            tracing::warn!("Could not confine pointer, lock stays pending");
            return;
        }
        Confinement::Unsupported => {
            tracing::info!("Pointer confinement unsupported, synthesizing deltas");
        }
        Confinement::Granted => {}
    }

    window.cursor.relative_active =
        caps.native_relative_motion && backend.set_relative_motion(id, true);
    window.cursor.lock = LockState::Locked;
    if caps.pointer_warp {
        warp_to_center(window, backend);
    }
    tracing::debug!(
        "Pointer locked on {:?} (native relative motion {})",
        id,
        if window.cursor.relative_active { "enabled" } else { "disabled" }
    );
}

/// Drop platform pointer resources held for a lock
fn release(window: &mut Window, backend: &mut dyn Backend) {
    if window.cursor.relative_active {
        backend.set_relative_motion(window.id, false);
        window.cursor.relative_active = false;
    }
    if window.cursor.is_locked() {
        backend.release_pointer(window.id);
    }
    window.cursor.warp_pending = false;
}

/// Release the lock entirely and restore the requested visibility
pub fn unlock(window: &mut Window, backend: &mut dyn Backend) {
    if !window.cursor.lock_wanted() {
        return;
    }
    release(window, backend);
    window.cursor.lock = LockState::Unlocked;
    backend.set_cursor_visible(window.id, window.cursor.visible);
}

/// Release platform resources but keep the lock wanted
///
/// Used on focus loss and unmap; the lock is re-attempted on the next
/// focus or map notification.
pub fn suspend(window: &mut Window, backend: &mut dyn Backend) {
    if !window.cursor.is_locked() {
        return;
    }
    release(window, backend);
    window.cursor.lock = LockState::LockPending;
    tracing::debug!("Pointer lock on {:?} suspended", window.id);
}

/// Keep a synthesized-delta lock near the center
pub fn enforce_bounds(window: &mut Window, backend: &mut dyn Backend) {
    if !window.cursor.is_locked() {
        return;
    }
    let caps = backend.capabilities();
    if !caps.pointer_warp {
        return;
    }
    let units = Units::new(&caps, window.scale);
    let Some(pos) = backend.cursor_position(window.id) else {
        warp_to_center(window, backend);
        return;
    };
    let pos = units.position_from_native(pos);
    let pos = Point::new(pos.x as i32, pos.y as i32);
    if needs_recenter(pos, window.cursor.center, window.surface) {
        warp_to_center(window, backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_of_content() {
        assert_eq!(lock_center(Size::new(800, 600), 0), Point::new(400, 300));
        assert_eq!(lock_center(Size::new(801, 601), 0), Point::new(400, 300));
    }

    #[test]
    fn center_sits_below_title_bar() {
        assert_eq!(lock_center(Size::new(800, 600), 40), Point::new(400, 340));
    }

    #[test]
    fn recenter_near_edges() {
        let size = Size::new(800, 600);
        let center = lock_center(size, 0);
        assert!(needs_recenter(Point::new(5, 300), center, size));
        assert!(needs_recenter(Point::new(400, 595), center, size));
        assert!(!needs_recenter(Point::new(400, 300), center, size));
    }

    #[test]
    fn recenter_past_threshold() {
        let size = Size::new(800, 600);
        let center = lock_center(size, 0);
        assert!(!needs_recenter(Point::new(404, 296), center, size));
        assert!(needs_recenter(Point::new(405, 300), center, size));
        assert!(needs_recenter(Point::new(400, 295), center, size));
    }

    #[test]
    fn tiny_windows_never_recenter() {
        let size = Size::new(20, 600);
        assert!(!needs_recenter(Point::new(0, 0), lock_center(size, 0), size));
    }

    #[test]
    fn confinement_backs_off_linearly() {
        let mut results = vec![
            Confinement::AlreadyGrabbed,
            Confinement::AlreadyGrabbed,
            Confinement::Granted,
        ]
        .into_iter();
        let mut waits = Vec::new();
        let outcome = confine_with_retry(|| results.next().unwrap(), |d| waits.push(d));
        assert_eq!(outcome, Confinement::Granted);
        assert_eq!(waits, vec![Duration::from_millis(2), Duration::from_millis(4)]);
    }

    #[test]
    fn confinement_gives_up_after_four_attempts() {
        let mut attempts = 0;
        let mut waits = Vec::new();
        let outcome = confine_with_retry(
            || {
                attempts += 1;
                Confinement::AlreadyGrabbed
            },
            |d| waits.push(d.as_millis()),
        );
        assert_eq!(outcome, Confinement::AlreadyGrabbed);
        assert_eq!(attempts, 4);
        assert_eq!(waits, vec![2, 4, 6, 8]);
    }

    #[test]
    fn unsupported_is_not_retried() {
        let mut attempts = 0;
        let outcome = confine_with_retry(
            || {
                attempts += 1;
                Confinement::Unsupported
            },
            |_| panic!("no backoff expected"),
        );
        assert_eq!(outcome, Confinement::Unsupported);
        assert_eq!(attempts, 1);
    }
}
