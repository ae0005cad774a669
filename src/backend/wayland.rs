//! Wayland backend using wayland-client
//!
//! Sizes and positions on the wire are logical pixels. Windows draw their
//! own title bar unless the decoration manager grants server-side
//! decorations. Pointer lock maps onto `zwp_locked_pointer_v1` with a
//! persistent lifetime, deltas onto `zwp_relative_pointer_v1`.

use std::collections::{HashMap, VecDeque};
use std::ffi::{OsString, c_void};
use std::io::ErrorKind;
use std::ptr::NonNull;

use cursor_icon::CursorIcon;
use wayland_client::backend::WaylandError;
use wayland_client::globals::{GlobalListContents, registry_queue_init};
use wayland_client::protocol::{
    wl_compositor::WlCompositor, wl_keyboard, wl_output, wl_pointer, wl_registry,
    wl_seat::{self, WlSeat}, wl_shm::WlShm, wl_surface::WlSurface,
};
use wayland_client::{Connection, Dispatch, EventQueue, Proxy, QueueHandle, WEnum, delegate_noop};
use wayland_cursor::CursorTheme;
use wayland_protocols::wp::pointer_constraints::zv1::client::{
    zwp_locked_pointer_v1::{self, ZwpLockedPointerV1},
    zwp_pointer_constraints_v1::{Lifetime, ZwpPointerConstraintsV1},
};
use wayland_protocols::wp::relative_pointer::zv1::client::{
    zwp_relative_pointer_manager_v1::ZwpRelativePointerManagerV1,
    zwp_relative_pointer_v1::{self, ZwpRelativePointerV1},
};
use wayland_protocols::xdg::decoration::zv1::client::{
    zxdg_decoration_manager_v1::ZxdgDecorationManagerV1,
    zxdg_toplevel_decoration_v1::{self, ZxdgToplevelDecorationV1},
};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::{self, XdgToplevel},
    xdg_wm_base::{self, XdgWmBase},
};
use xkbcommon::xkb;

use super::{
    Backend, BackendKind, Capabilities, Confinement, NativeEvent, NativeEventKind, SavedMode,
    WaylandHandles, WindowSetup,
};
use crate::config::Config;
use crate::core::edge::ResizeEdge;
use crate::core::geometry::{Geometry, Point, Position, Size};
use crate::core::registry::WindowId;
use crate::error::{Error, Result};
use crate::input::{Key, KeyText, Modifiers, MouseButton};

/// Cursor size in logical pixels
const CURSOR_SIZE: u32 = 24;

/// Axis values are in surface pixels; one wheel notch is about ten
const AXIS_STEP: f64 = 10.0;

/// Wayland window backend
pub struct WaylandBackend {
    conn: Connection,
    event_queue: EventQueue<WaylandState>,
    qh: QueueHandle<WaylandState>,
    state: WaylandState,
}

/// Everything the protocol handlers touch
struct WaylandState {
    compositor: WlCompositor,
    wm_base: XdgWmBase,
    seat: Option<WlSeat>,
    decoration_manager: Option<ZxdgDecorationManagerV1>,
    pointer_constraints: Option<ZwpPointerConstraintsV1>,
    relative_manager: Option<ZwpRelativePointerManagerV1>,

    pointer: Option<wl_pointer::WlPointer>,
    keyboard: Option<wl_keyboard::WlKeyboard>,
    pointer_focus: Option<WindowId>,
    keyboard_focus: Option<WindowId>,
    enter_serial: u32,
    button_serial: u32,

    xkb_context: xkb::Context,
    xkb_state: Option<xkb::State>,
    compose: Option<xkb::compose::State>,
    modifiers: Modifiers,

    cursor_theme: Option<CursorTheme>,
    cursor_surface: WlSurface,

    outputs: HashMap<u32, OutputInfo>,
    /// Largest integer output scale
    scale: i32,

    windows: HashMap<WindowId, WaylandWindow>,
    pending: VecDeque<NativeEvent>,
}

#[derive(Debug, Clone, Copy)]
struct OutputInfo {
    scale: i32,
    mode: Option<Size>,
}

impl Default for OutputInfo {
    fn default() -> Self {
        Self { scale: 1, mode: None }
    }
}

struct WaylandWindow {
    surface: WlSurface,
    xdg_surface: XdgSurface,
    toplevel: XdgToplevel,
    decoration: Option<ZxdgToplevelDecorationV1>,
    locked_pointer: Option<ZwpLockedPointerV1>,
    relative_pointer: Option<ZwpRelativePointerV1>,
    /// Surface size, logical pixels
    size: Size,
    pending_size: Option<Size>,
    pending_fullscreen: bool,
    fullscreen: bool,
    configured: bool,
    pointer: Position,
    cursor: CursorIcon,
    cursor_visible: bool,
}

impl WaylandWindow {
    /// Declare the whole surface as window geometry
    fn apply_geometry(&self) {
        self.xdg_surface
            .set_window_geometry(0, 0, self.size.width as i32, self.size.height as i32);
    }

    fn destroy(self) {
        if let Some(locked) = self.locked_pointer {
            locked.destroy();
        }
        if let Some(relative) = self.relative_pointer {
            relative.destroy();
        }
        if let Some(decoration) = self.decoration {
            decoration.destroy();
        }
        self.toplevel.destroy();
        self.xdg_surface.destroy();
        self.surface.destroy();
    }
}

impl WaylandBackend {
    /// Connect to the compositor named by `WAYLAND_DISPLAY`
    pub fn connect(config: &Config) -> Result<Self> {
        let conn = Connection::connect_to_env()?;
        let (globals, mut event_queue) = registry_queue_init::<WaylandState>(&conn)?;
        let qh = event_queue.handle();

        let compositor: WlCompositor = globals
            .bind(&qh, 3..=4, ())
            .map_err(|_| Error::MissingGlobal("wl_compositor"))?;
        let shm: WlShm = globals
            .bind(&qh, 1..=1, ())
            .map_err(|_| Error::MissingGlobal("wl_shm"))?;
        let wm_base: XdgWmBase = globals
            .bind(&qh, 1..=2, ())
            .map_err(|_| Error::MissingGlobal("xdg_wm_base"))?;
        let seat: Option<WlSeat> = globals.bind(&qh, 1..=5, ()).ok();
        let decoration_manager = globals.bind(&qh, 1..=1, ()).ok();
        let pointer_constraints = globals.bind(&qh, 1..=1, ()).ok();
        let relative_manager = globals.bind(&qh, 1..=1, ()).ok();

        let outputs: Vec<(u32, u32)> = globals.contents().with_list(|list| {
            list.iter()
                .filter(|global| global.interface == wl_output::WlOutput::interface().name)
                .map(|global| (global.name, global.version))
                .collect()
        });
        for &(name, version) in &outputs {
            globals
                .registry()
                .bind::<wl_output::WlOutput, _, _>(name, version.min(2), &qh, name);
        }

        let xkb_context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let compose = compose_state(&xkb_context);
        let cursor_surface = compositor.create_surface(&qh, ());

        let mut state = WaylandState {
            compositor,
            wm_base,
            seat,
            decoration_manager,
            pointer_constraints,
            relative_manager,
            pointer: None,
            keyboard: None,
            pointer_focus: None,
            keyboard_focus: None,
            enter_serial: 0,
            button_serial: 0,
            xkb_context,
            xkb_state: None,
            compose,
            modifiers: Modifiers::empty(),
            cursor_theme: None,
            cursor_surface,
            outputs: outputs
                .iter()
                .map(|&(name, _)| (name, OutputInfo::default()))
                .collect(),
            scale: 1,
            windows: HashMap::new(),
            pending: VecDeque::new(),
        };

        // Collect output scales and seat capabilities
        event_queue.roundtrip(&mut state)?;

        if let Some(scale) = config.scale_override {
            tracing::debug!("Scale override {} ignored on Wayland, outputs report {}", scale, state.scale);
        }
        let cursor_size = CURSOR_SIZE * state.scale.max(1) as u32;
        state.cursor_theme = match CursorTheme::load(&conn, shm, cursor_size) {
            Ok(theme) => Some(theme),
            Err(err) => {
                tracing::warn!("Failed to load cursor theme: {}", err);
                None
            }
        };

        tracing::info!(
            "Connected to Wayland compositor: {} output(s), scale {}, decorations {}, pointer constraints {}, relative pointer {}",
            state.outputs.len(),
            state.scale,
            state.decoration_manager.is_some(),
            state.pointer_constraints.is_some(),
            state.relative_manager.is_some()
        );

        Ok(Self { conn, event_queue, qh, state })
    }

    fn window(&self, id: WindowId) -> Option<&WaylandWindow> {
        self.state.windows.get(&id)
    }
}

impl WaylandState {
    fn push(&mut self, window: WindowId, kind: NativeEventKind) {
        self.pending.push_back(NativeEvent::new(window, kind));
    }

    /// Show the window's cursor, or hide it, on the pointer
    fn apply_cursor(&mut self, id: WindowId) {
        if self.pointer_focus != Some(id) {
            return;
        }
        let (Some(pointer), Some(window)) = (self.pointer.as_ref(), self.windows.get(&id)) else {
            return;
        };
        if !window.cursor_visible {
            pointer.set_cursor(self.enter_serial, None, 0, 0);
            return;
        }
        let Some(theme) = self.cursor_theme.as_mut() else {
            return;
        };
        let icon = window.cursor;
        let mut names = std::iter::once(icon.name()).chain(icon.alt_names().iter().copied());
        let Some(name) = names.find(|name| theme.get_cursor(name).is_some()) else {
            tracing::debug!("No cursor for {:?}", icon);
            return;
        };
        let Some(cursor) = theme.get_cursor(name) else {
            return;
        };
        let image = &cursor[0];
        let (width, height) = image.dimensions();
        let (hx, hy) = image.hotspot();
        let scale = self.scale.max(1);
        self.cursor_surface.set_buffer_scale(scale);
        self.cursor_surface.attach(Some(&**image), 0, 0);
        self.cursor_surface.damage(0, 0, width as i32, height as i32);
        self.cursor_surface.commit();
        pointer.set_cursor(
            self.enter_serial,
            Some(&self.cursor_surface),
            hx as i32 / scale,
            hy as i32 / scale,
        );
    }

    /// Recompute the largest output scale and propagate changes
    fn update_scale(&mut self) {
        let scale = self
            .outputs
            .values()
            .map(|output| output.scale)
            .max()
            .unwrap_or(1)
            .max(1);
        if scale == self.scale {
            return;
        }
        tracing::info!("Output scale changed {} -> {}", self.scale, scale);
        self.scale = scale;
        let ids: Vec<WindowId> = self.windows.keys().copied().collect();
        for id in ids {
            if let Some(window) = self.windows.get(&id) {
                window.surface.set_buffer_scale(scale);
                window.surface.commit();
            }
            self.push(id, NativeEventKind::ScaleChanged(scale as f32));
        }
    }

    fn key_text(&mut self, keycode: xkb::Keycode) -> Option<KeyText> {
        let xkb_state = self.xkb_state.as_ref()?;
        let keysym = xkb_state.key_get_one_sym(keycode);
        if let Some(compose) = self.compose.as_mut() {
            compose.feed(keysym);
            match compose.status() {
                xkb::compose::Status::Composing => return None,
                xkb::compose::Status::Composed => {
                    let text = compose.utf8();
                    compose.reset();
                    return text.as_deref().and_then(text_for);
                }
                xkb::compose::Status::Cancelled => compose.reset(),
                xkb::compose::Status::Nothing => {}
            }
        }
        text_for(&xkb_state.key_get_utf8(keycode))
    }
}

impl Backend for WaylandBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Wayland
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            compositor_driven_resize: false,
            pointer_warp: false,
            native_relative_motion: self.state.relative_manager.is_some(),
            decoration_negotiation: true,
            logical_coordinates: true,
        }
    }

    fn display_scale(&self) -> f32 {
        self.state.scale.max(1) as f32
    }

    fn screen_size(&self) -> Option<Size> {
        self.state.outputs.values().find_map(|output| output.mode)
    }

    fn dispatch(&mut self, queue: &mut VecDeque<NativeEvent>) -> Result<()> {
        self.event_queue.dispatch_pending(&mut self.state)?;
        self.conn.flush()?;
        if let Some(guard) = self.event_queue.prepare_read() {
            match guard.read() {
                Ok(_) => {}
                Err(WaylandError::Io(err)) if err.kind() == ErrorKind::WouldBlock => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.event_queue.dispatch_pending(&mut self.state)?;
        queue.extend(self.state.pending.drain(..));
        Ok(())
    }

    fn create_window(&mut self, id: WindowId, title: &str, size: Size) -> Result<WindowSetup> {
        let qh = &self.qh;
        let state = &mut self.state;
        let surface = state.compositor.create_surface(qh, id);
        let xdg_surface = state.wm_base.get_xdg_surface(&surface, qh, id);
        let toplevel = xdg_surface.get_toplevel(qh, id);
        toplevel.set_title(title.to_string());

        // Client-decorated until the compositor says otherwise
        let decoration = state.decoration_manager.as_ref().map(|manager| {
            let decoration = manager.get_toplevel_decoration(&toplevel, qh, id);
            decoration.set_mode(zxdg_toplevel_decoration_v1::Mode::ServerSide);
            decoration
        });
        if state.scale > 1 {
            surface.set_buffer_scale(state.scale);
        }
        surface.commit();

        state.windows.insert(
            id,
            WaylandWindow {
                surface,
                xdg_surface,
                toplevel,
                decoration,
                locked_pointer: None,
                relative_pointer: None,
                size,
                pending_size: None,
                pending_fullscreen: false,
                fullscreen: false,
                configured: false,
                pointer: Position::default(),
                cursor: CursorIcon::Default,
                cursor_visible: true,
            },
        );

        while !self.window(id).is_some_and(|window| window.configured) {
            if let Err(err) = self.event_queue.blocking_dispatch(&mut self.state) {
                if let Some(window) = self.state.windows.remove(&id) {
                    window.destroy();
                }
                return Err(err.into());
            }
        }
        tracing::debug!("Wayland window {:?} configured", id);
        Ok(WindowSetup {
            scale: self.display_scale(),
            server_decorations: false,
        })
    }

    fn destroy_window(&mut self, id: WindowId) {
        let Some(window) = self.state.windows.remove(&id) else {
            return;
        };
        window.destroy();
        if self.state.pointer_focus == Some(id) {
            self.state.pointer_focus = None;
        }
        if self.state.keyboard_focus == Some(id) {
            self.state.keyboard_focus = None;
        }
        self.state.pending.retain(|event| event.window != id);
        if let Err(err) = self.conn.flush() {
            tracing::warn!("Failed to flush after destroying window: {}", err);
        }
    }

    fn set_title(&mut self, id: WindowId, title: &str) {
        if let Some(window) = self.window(id) {
            window.toplevel.set_title(title.to_string());
        }
    }

    fn set_size(&mut self, id: WindowId, size: Size) {
        // Double-buffered: takes effect with the application's next commit
        if let Some(window) = self.state.windows.get_mut(&id) {
            window.size = size;
            window.apply_geometry();
        }
    }

    fn set_position_and_size(&mut self, id: WindowId, geometry: Geometry) {
        // Clients cannot position toplevels
        self.set_size(id, geometry.size());
    }

    fn set_min_size(&mut self, id: WindowId, size: Size) {
        if let Some(window) = self.window(id) {
            window.toplevel.set_min_size(size.width as i32, size.height as i32);
            window.surface.commit();
        }
    }

    fn window_geometry(&mut self, id: WindowId) -> Option<Geometry> {
        // Toplevel positions are never disclosed to clients
        let window = self.state.windows.get(&id).filter(|window| window.configured)?;
        Some(Geometry::new(0, 0, window.size.width, window.size.height))
    }

    fn begin_resize(&mut self, id: WindowId, edge: ResizeEdge) {
        let (Some(window), Some(seat)) = (self.window(id), self.state.seat.as_ref()) else {
            return;
        };
        match xdg_toplevel::ResizeEdge::try_from(edge as u32) {
            Ok(edge) => window.toplevel.resize(seat, self.state.button_serial, edge),
            Err(_) => tracing::debug!("Ignoring resize from {:?}", edge),
        }
    }

    fn begin_move(&mut self, id: WindowId) {
        let (Some(window), Some(seat)) = (self.window(id), self.state.seat.as_ref()) else {
            return;
        };
        window.toplevel._move(seat, self.state.button_serial);
    }

    fn set_cursor(&mut self, id: WindowId, icon: CursorIcon) {
        let Some(window) = self.state.windows.get_mut(&id) else {
            return;
        };
        window.cursor = icon;
        self.state.apply_cursor(id);
    }

    fn set_cursor_visible(&mut self, id: WindowId, visible: bool) {
        let Some(window) = self.state.windows.get_mut(&id) else {
            return;
        };
        window.cursor_visible = visible;
        self.state.apply_cursor(id);
    }

    fn request_focus(&mut self, id: WindowId) {
        // Activation needs a token from the compositor; a lock waits for
        // the keyboard to arrive instead
        tracing::debug!("Focus requests are not supported on Wayland ({:?})", id);
    }

    fn warp_pointer(&mut self, id: WindowId, to: Point) {
        // No warping; hint where the cursor should reappear after unlock
        let Some(window) = self.window(id) else { return };
        if let Some(locked) = window.locked_pointer.as_ref() {
            locked.set_cursor_position_hint(to.x as f64, to.y as f64);
            window.surface.commit();
        }
    }

    fn confine_pointer(&mut self, id: WindowId) -> Confinement {
        let state = &mut self.state;
        let (Some(constraints), Some(pointer)) =
            (state.pointer_constraints.as_ref(), state.pointer.as_ref())
        else {
            return Confinement::Unsupported;
        };
        let Some(window) = state.windows.get_mut(&id) else {
            return Confinement::Unsupported;
        };
        if window.locked_pointer.is_none() {
            window.locked_pointer = Some(constraints.lock_pointer(
                &window.surface,
                pointer,
                None,
                Lifetime::Persistent,
                &self.qh,
                id,
            ));
        }
        Confinement::Granted
    }

    fn release_pointer(&mut self, id: WindowId) {
        let Some(window) = self.state.windows.get_mut(&id) else {
            return;
        };
        if let Some(locked) = window.locked_pointer.take() {
            locked.destroy();
        }
    }

    fn set_relative_motion(&mut self, id: WindowId, enabled: bool) -> bool {
        let state = &mut self.state;
        let Some(window) = state.windows.get_mut(&id) else {
            return false;
        };
        if !enabled {
            if let Some(relative) = window.relative_pointer.take() {
                relative.destroy();
            }
            return false;
        }
        if window.relative_pointer.is_none() {
            let (Some(manager), Some(pointer)) =
                (state.relative_manager.as_ref(), state.pointer.as_ref())
            else {
                return false;
            };
            window.relative_pointer = Some(manager.get_relative_pointer(pointer, &self.qh, id));
        }
        true
    }

    fn cursor_position(&mut self, id: WindowId) -> Option<Position> {
        if self.state.pointer_focus != Some(id) {
            return None;
        }
        self.window(id).map(|window| window.pointer)
    }

    fn set_wm_fullscreen(&mut self, id: WindowId, fullscreen: bool) {
        let Some(window) = self.window(id) else { return };
        if fullscreen {
            window.toplevel.set_fullscreen(None);
        } else {
            window.toplevel.unset_fullscreen();
        }
        window.surface.commit();
    }

    fn switch_display_mode(&mut self, _id: WindowId) -> Option<SavedMode> {
        // The compositor owns output modes
        None
    }

    fn restore_display_mode(&mut self, _id: WindowId, _mode: SavedMode) {}

    fn wayland_handles(&self, id: WindowId) -> Option<WaylandHandles> {
        let window = self.window(id)?;
        let display = NonNull::new(self.conn.backend().display_ptr() as *mut c_void)?;
        let surface = NonNull::new(window.surface.id().as_ptr() as *mut c_void)?;
        Some(WaylandHandles { display, surface })
    }
}

impl Drop for WaylandBackend {
    fn drop(&mut self) {
        for (_, window) in self.state.windows.drain() {
            window.destroy();
        }
        self.state.cursor_surface.destroy();
        let _ = self.conn.flush();
    }
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for WaylandState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &GlobalListContents,
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global { name, interface, version }
                if interface == wl_output::WlOutput::interface().name =>
            {
                registry.bind::<wl_output::WlOutput, _, _>(name, version.min(2), qh, name);
                state.outputs.insert(name, OutputInfo::default());
            }
            wl_registry::Event::GlobalRemove { name } => {
                if state.outputs.remove(&name).is_some() {
                    state.update_scale();
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, u32> for WaylandState {
    fn event(
        state: &mut Self,
        _: &wl_output::WlOutput,
        event: wl_output::Event,
        name: &u32,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let Some(output) = state.outputs.get_mut(name) else {
            return;
        };
        match event {
            wl_output::Event::Scale { factor } => output.scale = factor,
            wl_output::Event::Mode { flags: WEnum::Value(flags), width, height, .. }
                if flags.contains(wl_output::Mode::Current) =>
            {
                output.mode = Some(Size::new(width.max(0) as u32, height.max(0) as u32));
            }
            wl_output::Event::Done => state.update_scale(),
            _ => {}
        }
    }
}

impl Dispatch<WlSeat, ()> for WaylandState {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_seat::Event::Capabilities { capabilities: WEnum::Value(caps) } = event else {
            return;
        };
        if caps.contains(wl_seat::Capability::Pointer) && state.pointer.is_none() {
            state.pointer = Some(seat.get_pointer(qh, ()));
        }
        if caps.contains(wl_seat::Capability::Keyboard) && state.keyboard.is_none() {
            state.keyboard = Some(seat.get_keyboard(qh, ()));
        }
    }
}

impl Dispatch<wl_pointer::WlPointer, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _: &wl_pointer::WlPointer,
        event: wl_pointer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Enter { serial, surface, surface_x, surface_y } => {
                let Some(&id) = surface.data::<WindowId>() else {
                    return;
                };
                state.pointer_focus = Some(id);
                state.enter_serial = serial;
                let pos = Position::new(surface_x, surface_y);
                if let Some(window) = state.windows.get_mut(&id) {
                    window.pointer = pos;
                }
                state.apply_cursor(id);
                state.push(id, NativeEventKind::PointerEnter(pos));
            }
            wl_pointer::Event::Leave { .. } => {
                if let Some(id) = state.pointer_focus.take() {
                    state.push(id, NativeEventKind::PointerLeave);
                }
            }
            wl_pointer::Event::Motion { surface_x, surface_y, .. } => {
                let Some(id) = state.pointer_focus else { return };
                let pos = Position::new(surface_x, surface_y);
                if let Some(window) = state.windows.get_mut(&id) {
                    window.pointer = pos;
                }
                state.push(id, NativeEventKind::Motion(pos));
            }
            wl_pointer::Event::Button { serial, button, state: button_state, .. } => {
                let Some(id) = state.pointer_focus else { return };
                let Some(button) = MouseButton::from_evdev(button) else {
                    return;
                };
                let pressed = button_state == WEnum::Value(wl_pointer::ButtonState::Pressed);
                if pressed {
                    state.button_serial = serial;
                }
                let modifiers = state.modifiers;
                state.push(id, NativeEventKind::Button { pressed, button, modifiers });
            }
            wl_pointer::Event::Axis { axis: WEnum::Value(axis), value, .. } => {
                let Some(id) = state.pointer_focus else { return };
                let (dx, dy) = axis_delta(axis, value);
                state.push(id, NativeEventKind::Scroll { dx, dy });
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _: &wl_keyboard::WlKeyboard,
        event: wl_keyboard::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                if format != WEnum::Value(wl_keyboard::KeymapFormat::XkbV1) {
                    return;
                }
                // SAFETY: the compositor hands over a read-only keymap of `size` bytes
                let keymap = unsafe {
                    xkb::Keymap::new_from_fd(
                        &state.xkb_context,
                        fd,
                        size as usize,
                        xkb::KEYMAP_FORMAT_TEXT_V1,
                        xkb::KEYMAP_COMPILE_NO_FLAGS,
                    )
                };
                match keymap {
                    Ok(Some(keymap)) => state.xkb_state = Some(xkb::State::new(&keymap)),
                    Ok(None) => tracing::warn!("Compositor sent an unparseable keymap"),
                    Err(err) => tracing::warn!("Failed to map keymap: {}", err),
                }
            }
            wl_keyboard::Event::Enter { surface, .. } => {
                let Some(&id) = surface.data::<WindowId>() else {
                    return;
                };
                state.keyboard_focus = Some(id);
                state.push(id, NativeEventKind::FocusIn);
            }
            wl_keyboard::Event::Leave { .. } => {
                if let Some(id) = state.keyboard_focus.take() {
                    state.push(id, NativeEventKind::FocusOut { lost_to_other: true });
                }
            }
            wl_keyboard::Event::Key { key, state: key_state, .. } => {
                let Some(id) = state.keyboard_focus else { return };
                let pressed = key_state == WEnum::Value(wl_keyboard::KeyState::Pressed);
                let keycode = xkb::Keycode::new(key + 8);
                let text = if pressed { state.key_text(keycode) } else { None };
                if let Some(xkb_state) = state.xkb_state.as_mut() {
                    let direction = if pressed { xkb::KeyDirection::Down } else { xkb::KeyDirection::Up };
                    xkb_state.update_key(keycode, direction);
                }
                let modifiers = state.modifiers;
                state.push(
                    id,
                    NativeEventKind::Key {
                        pressed,
                        key: Key::from_evdev(key),
                        keycode: key,
                        text,
                        modifiers,
                    },
                );
            }
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => {
                let Some(xkb_state) = state.xkb_state.as_mut() else {
                    return;
                };
                xkb_state.update_mask(mods_depressed, mods_latched, mods_locked, 0, 0, group);
                let active = |name: &str| xkb_state.mod_name_is_active(name, xkb::STATE_MODS_EFFECTIVE);
                let mut modifiers = Modifiers::empty();
                modifiers.set(Modifiers::SHIFT, active(xkb::MOD_NAME_SHIFT));
                modifiers.set(Modifiers::CTRL, active(xkb::MOD_NAME_CTRL));
                modifiers.set(Modifiers::ALT, active(xkb::MOD_NAME_ALT));
                modifiers.set(Modifiers::SUPER, active(xkb::MOD_NAME_LOGO));
                state.modifiers = modifiers;
            }
            _ => {}
        }
    }
}

impl Dispatch<XdgWmBase, ()> for WaylandState {
    fn event(
        _: &mut Self,
        wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<XdgSurface, WindowId> for WaylandState {
    fn event(
        state: &mut Self,
        xdg_surface: &XdgSurface,
        event: xdg_surface::Event,
        id: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let xdg_surface::Event::Configure { serial } = event else {
            return;
        };
        xdg_surface.ack_configure(serial);
        let id = *id;
        let Some(window) = state.windows.get_mut(&id) else {
            return;
        };
        let first = !window.configured;
        window.configured = true;
        let size = window.pending_size.take();
        if let Some(size) = size {
            window.size = size;
            window.apply_geometry();
        }
        let fullscreen_changed = window.fullscreen != window.pending_fullscreen;
        window.fullscreen = window.pending_fullscreen;
        let fullscreen = window.fullscreen;
        window.surface.commit();

        state.push(id, NativeEventKind::Configure { size, position: None });
        if fullscreen_changed {
            state.push(id, NativeEventKind::FullscreenChanged(fullscreen));
        }
        if first {
            state.push(id, NativeEventKind::Mapped);
        }
    }
}

impl Dispatch<XdgToplevel, WindowId> for WaylandState {
    fn event(
        state: &mut Self,
        _: &XdgToplevel,
        event: xdg_toplevel::Event,
        id: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, states } => {
                let Some(window) = state.windows.get_mut(id) else {
                    return;
                };
                if width > 0 && height > 0 {
                    window.pending_size = Some(Size::new(width as u32, height as u32));
                }
                window.pending_fullscreen = has_state(&states, xdg_toplevel::State::Fullscreen);
            }
            xdg_toplevel::Event::Close => state.push(*id, NativeEventKind::CloseRequested),
            _ => {}
        }
    }
}

impl Dispatch<ZxdgToplevelDecorationV1, WindowId> for WaylandState {
    fn event(
        state: &mut Self,
        _: &ZxdgToplevelDecorationV1,
        event: zxdg_toplevel_decoration_v1::Event,
        id: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let zxdg_toplevel_decoration_v1::Event::Configure { mode } = event {
            let server_side =
                mode == WEnum::Value(zxdg_toplevel_decoration_v1::Mode::ServerSide);
            state.push(*id, NativeEventKind::DecorationMode { server_side });
        }
    }
}

impl Dispatch<ZwpLockedPointerV1, WindowId> for WaylandState {
    fn event(
        _: &mut Self,
        _: &ZwpLockedPointerV1,
        event: zwp_locked_pointer_v1::Event,
        id: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwp_locked_pointer_v1::Event::Locked => tracing::debug!("Pointer locked to {:?}", id),
            zwp_locked_pointer_v1::Event::Unlocked => {
                tracing::debug!("Pointer lock on {:?} deactivated", id)
            }
            _ => {}
        }
    }
}

impl Dispatch<ZwpRelativePointerV1, WindowId> for WaylandState {
    fn event(
        state: &mut Self,
        _: &ZwpRelativePointerV1,
        event: zwp_relative_pointer_v1::Event,
        id: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let zwp_relative_pointer_v1::Event::RelativeMotion { dx_unaccel, dy_unaccel, .. } = event {
            // Deltas arrive in surface coordinates
            let scale = state.scale.max(1) as f64;
            state.push(
                *id,
                NativeEventKind::RelativeMotion { dx: dx_unaccel * scale, dy: dy_unaccel * scale },
            );
        }
    }
}

impl Dispatch<WlSurface, WindowId> for WaylandState {
    fn event(
        _: &mut Self,
        _: &WlSurface,
        _: <WlSurface as Proxy>::Event,
        _: &WindowId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

delegate_noop!(WaylandState: WlCompositor);
delegate_noop!(WaylandState: ignore WlShm);
delegate_noop!(WaylandState: ignore WlSurface);
delegate_noop!(WaylandState: ZxdgDecorationManagerV1);
delegate_noop!(WaylandState: ZwpPointerConstraintsV1);
delegate_noop!(WaylandState: ZwpRelativePointerManagerV1);

/// Compose table for the user's locale, if one exists
fn compose_state(context: &xkb::Context) -> Option<xkb::compose::State> {
    let locale = ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .find_map(|var| std::env::var_os(var).filter(|value| !value.is_empty()))
        .unwrap_or_else(|| OsString::from("C"));
    match xkb::compose::Table::new_from_locale(context, &locale, xkb::compose::COMPILE_NO_FLAGS) {
        Ok(table) => Some(xkb::compose::State::new(&table, xkb::compose::STATE_NO_FLAGS)),
        Err(()) => {
            tracing::debug!("No compose table for locale {:?}", locale);
            None
        }
    }
}

/// Keep text an application would insert, plus the editing controls
fn text_for(text: &str) -> Option<KeyText> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (None, _) => None,
        (Some(c), None) if c.is_control() && !matches!(c, '\r' | '\t' | '\u{8}' | '\u{1b}') => None,
        _ => KeyText::new(text),
    }
}

fn axis_delta(axis: wl_pointer::Axis, value: f64) -> (f64, f64) {
    match axis {
        wl_pointer::Axis::VerticalScroll => (0.0, -value / AXIS_STEP),
        wl_pointer::Axis::HorizontalScroll => (value / AXIS_STEP, 0.0),
        _ => (0.0, 0.0),
    }
}

/// Whether a toplevel configure's state array contains `wanted`
fn has_state(states: &[u8], wanted: xdg_toplevel::State) -> bool {
    states
        .chunks_exact(4)
        .filter_map(|chunk| chunk.try_into().ok())
        .any(|bytes: [u8; 4]| u32::from_ne_bytes(bytes) == wanted as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_text_is_filtered() {
        assert_eq!(text_for("a").map(|t| t.to_string()), Some("a".to_string()));
        assert_eq!(text_for("\r").map(|t| t.to_string()), Some("\r".to_string()));
        assert_eq!(text_for("\u{7f}"), None);
        assert_eq!(text_for(""), None);
        assert_eq!(text_for("é").map(|t| t.to_string()), Some("é".to_string()));
    }

    #[test]
    fn vertical_axis_is_inverted() {
        assert_eq!(axis_delta(wl_pointer::Axis::VerticalScroll, 10.0), (0.0, -1.0));
        assert_eq!(axis_delta(wl_pointer::Axis::HorizontalScroll, -15.0), (-1.5, 0.0));
    }

    #[test]
    fn fullscreen_state_detected() {
        let mut states = Vec::new();
        states.extend_from_slice(&(xdg_toplevel::State::Activated as u32).to_ne_bytes());
        assert!(!has_state(&states, xdg_toplevel::State::Fullscreen));
        states.extend_from_slice(&(xdg_toplevel::State::Fullscreen as u32).to_ne_bytes());
        assert!(has_state(&states, xdg_toplevel::State::Fullscreen));
    }
}
