//! X11 backend using x11rb over libxcb
//!
//! The window manager owns decorations, resize and move. Raw pointer deltas
//! come from XInput2 when the server has it; RandR switches the output mode
//! for exclusive fullscreen.

use std::collections::{HashMap, VecDeque};
use std::ffi::c_void;
use std::ptr::NonNull;

use cursor_icon::CursorIcon;
use x11rb::connection::{Connection, RequestConnection};
use x11rb::cursor::Handle as CursorHandle;
use x11rb::properties::WmSizeHints;
use x11rb::protocol::Event as XEvent;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xinput::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    self, Atom, AtomEnum, ChangeWindowAttributesAux, ConfigureWindowAux, ConnectionExt as _,
    CreateWindowAux, EventMask, GrabMode, GrabStatus, NotifyDetail, NotifyMode, PropMode,
    WindowClass,
};
use x11rb::resource_manager;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::xcb_ffi::XCBConnection;

use super::{
    Backend, BackendKind, Capabilities, Confinement, NativeEvent, NativeEventKind, SavedMode,
    WindowSetup, X11Handles,
};
use crate::config::Config;
use crate::core::edge::ResizeEdge;
use crate::core::geometry::{Geometry, Point, Position, Size};
use crate::core::registry::WindowId;
use crate::core::scale;
use crate::error::Result;
use crate::input::{Key, Modifiers, MouseButton, keysym_text};

/// `_NET_WM_MOVERESIZE_MOVE`
const MOVERESIZE_MOVE: u32 = 8;

/// `XIAllMasterDevices`
const ALL_MASTER_DEVICES: u16 = 1;

const SHIFT_MASK: u32 = 0x1;
const LOCK_MASK: u32 = 0x2;

/// X11 window backend
pub struct X11Backend {
    conn: XCBConnection,
    screen_num: usize,
    root: xproto::Window,
    atoms: X11Atoms,
    scale: f32,
    keyboard: KeyboardMap,
    cursors: Option<CursorHandle>,
    cursor_cache: HashMap<CursorIcon, xproto::Cursor>,
    hidden_cursor: xproto::Cursor,
    xinput: bool,
    randr: bool,
    /// Window receiving raw motion deltas
    raw_target: Option<WindowId>,
    windows: HashMap<WindowId, X11Window>,
    by_xid: HashMap<xproto::Window, WindowId>,
}

struct X11Window {
    xid: xproto::Window,
    cursor: xproto::Cursor,
    cursor_visible: bool,
}

/// Cached X11 atoms
struct X11Atoms {
    wm_protocols: Atom,
    wm_delete_window: Atom,
    net_wm_name: Atom,
    utf8_string: Atom,
    net_wm_state: Atom,
    net_wm_state_fullscreen: Atom,
    net_wm_bypass_compositor: Atom,
    net_active_window: Atom,
    net_wm_moveresize: Atom,
}

/// Output configuration captured before a RandR mode switch
#[derive(Debug, Clone)]
struct SavedCrtc {
    crtc: randr::Crtc,
    mode: randr::Mode,
    rotation: randr::Rotation,
    x: i16,
    y: i16,
    outputs: Vec<randr::Output>,
}

impl X11Backend {
    /// Connect to the X server named by `DISPLAY`
    pub fn connect(config: &Config) -> Result<Self> {
        let (conn, screen_num) = XCBConnection::connect(None)?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let physical = (screen.width_in_pixels as u32, screen.width_in_millimeters as u32);

        let atoms = Self::intern_atoms(&conn)?;
        let keyboard = KeyboardMap::load(&conn)?;

        let database = resource_manager::new_from_default(&conn)?;
        let dpi = database.get_string("Xft.dpi", "");
        let scale = scale::discover(config.scale_override, dpi, Some(physical));

        let cursors = match CursorHandle::new(&conn, screen_num, &database) {
            Ok(cookie) => cookie.reply().ok(),
            Err(err) => {
                tracing::warn!("Cursor theme unavailable: {}", err);
                None
            }
        };
        let hidden_cursor = Self::create_hidden_cursor(&conn, root)?;

        let xinput = Self::init_xinput(&conn, root);
        let randr = conn.extension_information(randr::X11_EXTENSION_NAME)?.is_some();

        tracing::info!(
            "Connected to X server: screen {} ({}x{}), scale {}, XInput2 {}, RandR {}",
            screen_num,
            physical.0,
            screen.height_in_pixels,
            scale,
            xinput,
            randr
        );

        Ok(Self {
            conn,
            screen_num,
            root,
            atoms,
            scale,
            keyboard,
            cursors,
            cursor_cache: HashMap::new(),
            hidden_cursor,
            xinput,
            randr,
            raw_target: None,
            windows: HashMap::new(),
            by_xid: HashMap::new(),
        })
    }

    fn intern_atoms(conn: &XCBConnection) -> Result<X11Atoms> {
        let wm_protocols = conn.intern_atom(false, b"WM_PROTOCOLS")?.reply()?.atom;
        let wm_delete_window = conn.intern_atom(false, b"WM_DELETE_WINDOW")?.reply()?.atom;
        let net_wm_name = conn.intern_atom(false, b"_NET_WM_NAME")?.reply()?.atom;
        let utf8_string = conn.intern_atom(false, b"UTF8_STRING")?.reply()?.atom;
        let net_wm_state = conn.intern_atom(false, b"_NET_WM_STATE")?.reply()?.atom;
        let net_wm_state_fullscreen =
            conn.intern_atom(false, b"_NET_WM_STATE_FULLSCREEN")?.reply()?.atom;
        let net_wm_bypass_compositor =
            conn.intern_atom(false, b"_NET_WM_BYPASS_COMPOSITOR")?.reply()?.atom;
        let net_active_window = conn.intern_atom(false, b"_NET_ACTIVE_WINDOW")?.reply()?.atom;
        let net_wm_moveresize = conn.intern_atom(false, b"_NET_WM_MOVERESIZE")?.reply()?.atom;

        Ok(X11Atoms {
            wm_protocols,
            wm_delete_window,
            net_wm_name,
            utf8_string,
            net_wm_state,
            net_wm_state_fullscreen,
            net_wm_bypass_compositor,
            net_active_window,
            net_wm_moveresize,
        })
    }

    /// 1x1 cursor with an empty mask
    fn create_hidden_cursor(conn: &XCBConnection, root: xproto::Window) -> Result<xproto::Cursor> {
        let pixmap = conn.generate_id()?;
        conn.create_pixmap(1, pixmap, root, 1, 1)?;
        let cursor = conn.generate_id()?;
        conn.create_cursor(cursor, pixmap, pixmap, 0, 0, 0, 0, 0, 0, 0, 0)?;
        conn.free_pixmap(pixmap)?;
        Ok(cursor)
    }

    /// Select raw motion on the root window when XInput 2 is present
    fn init_xinput(conn: &XCBConnection, root: xproto::Window) -> bool {
        let available = conn
            .extension_information(xinput::X11_EXTENSION_NAME)
            .ok()
            .flatten()
            .is_some();
        if !available {
            return false;
        }
        let version = conn
            .xinput_xi_query_version(2, 0)
            .map_err(crate::error::Error::from)
            .and_then(|cookie| Ok(cookie.reply()?));
        match version {
            Ok(reply) if reply.major_version >= 2 => {}
            Ok(_) => return false,
            Err(err) => {
                tracing::debug!("XInput2 query failed: {}", err);
                return false;
            }
        }
        let mask = xinput::EventMask {
            deviceid: ALL_MASTER_DEVICES,
            mask: vec![xinput::XIEventMask::RAW_MOTION],
        };
        match conn.xinput_xi_select_events(root, &[mask]) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!("Failed to select raw motion: {}", err);
                false
            }
        }
    }

    fn xid(&self, id: WindowId) -> Option<xproto::Window> {
        self.windows.get(&id).map(|window| window.xid)
    }

    fn send_root_message(&self, xid: xproto::Window, atom: Atom, data: [u32; 5]) -> Result<()> {
        let event = xproto::ClientMessageEvent::new(32, xid, atom, data);
        self.conn.send_event(
            false,
            self.root,
            EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
            event,
        )?;
        self.conn.flush()?;
        Ok(())
    }

    fn try_create_window(&self, xid: xproto::Window, title: &str, size: Size) -> Result<()> {
        let screen = &self.conn.setup().roots[self.screen_num];
        let values = CreateWindowAux::new()
            .background_pixel(screen.black_pixel)
            .event_mask(
                EventMask::EXPOSURE
                    | EventMask::STRUCTURE_NOTIFY
                    | EventMask::KEY_PRESS
                    | EventMask::KEY_RELEASE
                    | EventMask::BUTTON_PRESS
                    | EventMask::BUTTON_RELEASE
                    | EventMask::POINTER_MOTION
                    | EventMask::ENTER_WINDOW
                    | EventMask::LEAVE_WINDOW
                    | EventMask::FOCUS_CHANGE
                    | EventMask::PROPERTY_CHANGE,
            );
        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            xid,
            self.root,
            0,
            0,
            clamp_u16(size.width),
            clamp_u16(size.height),
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &values,
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            xid,
            self.atoms.wm_protocols,
            AtomEnum::ATOM,
            &[self.atoms.wm_delete_window],
        )?;
        self.write_title(xid, title)?;
        self.conn.map_window(xid)?;
        self.conn.flush()?;
        Ok(())
    }

    fn write_title(&self, xid: xproto::Window, title: &str) -> Result<()> {
        self.conn.change_property8(
            PropMode::REPLACE,
            xid,
            self.atoms.net_wm_name,
            self.atoms.utf8_string,
            title.as_bytes(),
        )?;
        self.conn.change_property8(
            PropMode::REPLACE,
            xid,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            title.as_bytes(),
        )?;
        Ok(())
    }

    fn configure(&self, xid: xproto::Window, values: &ConfigureWindowAux) -> Result<()> {
        self.conn.configure_window(xid, values)?;
        self.conn.flush()?;
        Ok(())
    }

    fn query_geometry(&self, xid: xproto::Window) -> Result<Geometry> {
        let geom = self.conn.get_geometry(xid)?.reply()?;
        let translated = self.conn.translate_coordinates(xid, self.root, 0, 0)?.reply()?;
        Ok(Geometry::new(
            translated.dst_x as i32,
            translated.dst_y as i32,
            geom.width as u32,
            geom.height as u32,
        ))
    }

    /// Resolve a cursor from the theme, falling back on alternative names
    fn theme_cursor(&mut self, icon: CursorIcon) -> Option<xproto::Cursor> {
        if let Some(&cursor) = self.cursor_cache.get(&icon) {
            return Some(cursor);
        }
        let handle = self.cursors.as_ref()?;
        let names = std::iter::once(icon.name()).chain(icon.alt_names().iter().copied());
        for name in names {
            match handle.load_cursor(&self.conn, name) {
                Ok(cursor) if cursor != x11rb::NONE => {
                    self.cursor_cache.insert(icon, cursor);
                    return Some(cursor);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!("Failed to load cursor {}: {}", name, err);
                    return None;
                }
            }
        }
        None
    }

    fn apply_cursor(&self, xid: xproto::Window, cursor: xproto::Cursor) -> Result<()> {
        self.conn
            .change_window_attributes(xid, &ChangeWindowAttributesAux::new().cursor(cursor))?;
        self.conn.flush()?;
        Ok(())
    }

    fn moveresize(&self, xid: xproto::Window, direction: u32) -> Result<()> {
        let pointer = self.conn.query_pointer(self.root)?.reply()?;
        // The window manager takes its own grab
        self.conn.ungrab_pointer(x11rb::CURRENT_TIME)?;
        self.send_root_message(
            xid,
            self.atoms.net_wm_moveresize,
            [
                pointer.root_x as u32,
                pointer.root_y as u32,
                direction,
                1, // Button1
                1, // Source: application
            ],
        )
    }

    fn grab(&self, xid: xproto::Window) -> Result<GrabStatus> {
        let reply = self
            .conn
            .grab_pointer(
                true,
                xid,
                EventMask::POINTER_MOTION | EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                xid,
                self.hidden_cursor,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;
        Ok(reply.status)
    }

    fn fullscreen_state(&self, xid: xproto::Window, enabled: bool) -> Result<()> {
        let action = if enabled { 1 } else { 0 }; // _NET_WM_STATE_ADD / _REMOVE
        self.send_root_message(
            xid,
            self.atoms.net_wm_state,
            [action, self.atoms.net_wm_state_fullscreen, 0, 1, 0],
        )?;
        if enabled {
            self.conn.change_property32(
                PropMode::REPLACE,
                xid,
                self.atoms.net_wm_bypass_compositor,
                AtomEnum::CARDINAL,
                &[1],
            )?;
        } else {
            self.conn.delete_property(xid, self.atoms.net_wm_bypass_compositor)?;
        }
        self.conn.flush()?;
        Ok(())
    }

    fn is_fullscreen(&self, xid: xproto::Window) -> Result<bool> {
        let reply = self
            .conn
            .get_property(false, xid, self.atoms.net_wm_state, AtomEnum::ATOM, 0, 64)?
            .reply()?;
        Ok(reply
            .value32()
            .is_some_and(|mut atoms| atoms.any(|atom| atom == self.atoms.net_wm_state_fullscreen)))
    }

    /// Put the primary output in the mode matching the screen size
    fn switch_mode(&self) -> Result<Option<SavedCrtc>> {
        let resources = self.conn.randr_get_screen_resources_current(self.root)?.reply()?;
        let primary = self.conn.randr_get_output_primary(self.root)?.reply()?.output;

        let mut chosen = None;
        for output in output_candidates(primary, &resources.outputs) {
            let info = self
                .conn
                .randr_get_output_info(output, resources.config_timestamp)?
                .reply()?;
            if info.connection == randr::Connection::CONNECTED && info.crtc != 0 {
                chosen = Some((output, info));
                break;
            }
        }
        let Some((output, output_info)) = chosen else {
            tracing::debug!("No connected output with a CRTC");
            return Ok(None);
        };
        let crtc = output_info.crtc;
        let info = self
            .conn
            .randr_get_crtc_info(crtc, resources.config_timestamp)?
            .reply()?;

        let Some(screen) = self.screen_size() else {
            return Ok(None);
        };
        let table: Vec<_> = resources
            .modes
            .iter()
            .map(|mode| (mode.id, Size::new(mode.width.into(), mode.height.into())))
            .collect();
        let Some(mode) = matching_mode(&output_info.modes, &table, screen) else {
            return Ok(None);
        };
        if mode == info.mode {
            return Ok(None);
        }

        let saved = SavedCrtc {
            crtc,
            mode: info.mode,
            rotation: info.rotation,
            x: info.x,
            y: info.y,
            outputs: info.outputs.clone(),
        };
        let reply = self
            .conn
            .randr_set_crtc_config(
                crtc,
                x11rb::CURRENT_TIME,
                resources.config_timestamp,
                info.x,
                info.y,
                mode,
                info.rotation,
                &[output],
            )?
            .reply()?;
        if reply.status != randr::SetConfig::SUCCESS {
            tracing::warn!("RandR refused mode switch: {:?}", reply.status);
            return Ok(None);
        }
        tracing::info!(
            "Switched CRTC {} to mode {} ({}x{})",
            crtc,
            mode,
            screen.width,
            screen.height
        );
        Ok(Some(saved))
    }

    fn restore_mode(&self, saved: &SavedCrtc) -> Result<()> {
        let resources = self.conn.randr_get_screen_resources_current(self.root)?.reply()?;
        self.conn
            .randr_set_crtc_config(
                saved.crtc,
                x11rb::CURRENT_TIME,
                resources.config_timestamp,
                saved.x,
                saved.y,
                saved.mode,
                saved.rotation,
                &saved.outputs,
            )?
            .reply()?;
        Ok(())
    }

    /// Translate one X event, appending to `queue` when it concerns us
    fn translate(&mut self, event: XEvent, queue: &mut VecDeque<NativeEvent>) -> Result<()> {
        let mut push = |xid: xproto::Window, kind: NativeEventKind| {
            if let Some(&id) = self.by_xid.get(&xid) {
                queue.push_back(NativeEvent::new(id, kind));
            }
        };

        match event {
            XEvent::ClientMessage(ev) => {
                if ev.format == 32 && ev.data.as_data32()[0] == self.atoms.wm_delete_window {
                    push(ev.window, NativeEventKind::CloseRequested);
                }
            }
            XEvent::ConfigureNotify(ev) => {
                // Only synthetic configures carry root coordinates
                let synthetic = ev.response_type & 0x80 != 0;
                push(
                    ev.window,
                    NativeEventKind::Configure {
                        size: Some(Size::new(ev.width as u32, ev.height as u32)),
                        position: synthetic.then(|| Point::new(ev.x as i32, ev.y as i32)),
                    },
                );
            }
            XEvent::MapNotify(ev) => push(ev.window, NativeEventKind::Mapped),
            XEvent::UnmapNotify(ev) => push(ev.window, NativeEventKind::Unmapped),
            XEvent::DestroyNotify(ev) => push(ev.window, NativeEventKind::Destroyed),
            XEvent::FocusIn(ev) => {
                if !matches!(ev.detail, NotifyDetail::POINTER | NotifyDetail::INFERIOR) {
                    push(ev.event, NativeEventKind::FocusIn);
                }
            }
            XEvent::FocusOut(ev) => {
                if !matches!(ev.detail, NotifyDetail::POINTER | NotifyDetail::INFERIOR) {
                    push(
                        ev.event,
                        NativeEventKind::FocusOut {
                            lost_to_other: focus_lost_to_other(ev.mode, ev.detail),
                        },
                    );
                }
            }
            XEvent::KeyPress(ev) | XEvent::KeyRelease(ev) => {
                let pressed = ev.response_type & 0x7f == xproto::KEY_PRESS_EVENT;
                let state = u32::from(u16::from(ev.state));
                let keysym = self.keyboard.keysym(ev.detail, 0);
                let text = if pressed {
                    keysym_text(self.keyboard.text_keysym(ev.detail, state))
                } else {
                    None
                };
                push(
                    ev.event,
                    NativeEventKind::Key {
                        pressed,
                        key: Key::from_keysym(keysym),
                        keycode: ev.detail as u32,
                        text,
                        modifiers: Modifiers::from_core_mask(state),
                    },
                );
            }
            XEvent::ButtonPress(ev) | XEvent::ButtonRelease(ev) => {
                let pressed = ev.response_type & 0x7f == xproto::BUTTON_PRESS_EVENT;
                let modifiers = Modifiers::from_core_mask(u32::from(u16::from(ev.state)));
                if let Some(button) = MouseButton::from_x11(ev.detail) {
                    push(ev.event, NativeEventKind::Button { pressed, button, modifiers });
                } else if pressed && let Some((dx, dy)) = scroll_delta(ev.detail) {
                    push(ev.event, NativeEventKind::Scroll { dx, dy });
                }
            }
            XEvent::MotionNotify(ev) => push(
                ev.event,
                NativeEventKind::Motion(Position::new(ev.event_x as f64, ev.event_y as f64)),
            ),
            XEvent::EnterNotify(ev) => push(
                ev.event,
                NativeEventKind::PointerEnter(Position::new(ev.event_x as f64, ev.event_y as f64)),
            ),
            XEvent::LeaveNotify(ev) => push(ev.event, NativeEventKind::PointerLeave),
            XEvent::PropertyNotify(ev) if ev.atom == self.atoms.net_wm_state => {
                if self.by_xid.contains_key(&ev.window) {
                    let fullscreen = self.is_fullscreen(ev.window)?;
                    push(ev.window, NativeEventKind::FullscreenChanged(fullscreen));
                }
            }
            XEvent::XinputRawMotion(ev) => {
                if let Some(id) = self.raw_target {
                    let (dx, dy) = raw_delta(&ev.valuator_mask, &ev.axisvalues_raw);
                    if dx != 0.0 || dy != 0.0 {
                        queue.push_back(NativeEvent::new(id, NativeEventKind::RelativeMotion { dx, dy }));
                    }
                }
            }
            XEvent::MappingNotify(ev) if ev.request == xproto::Mapping::KEYBOARD => {
                self.keyboard = KeyboardMap::load(&self.conn)?;
                tracing::debug!("Reloaded keyboard mapping");
            }
            XEvent::Error(err) => {
                tracing::warn!("X11 error: {:?}", err);
            }
            _ => {}
        }
        Ok(())
    }
}

impl Backend for X11Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::X11
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            compositor_driven_resize: true,
            pointer_warp: true,
            native_relative_motion: self.xinput,
            decoration_negotiation: false,
            logical_coordinates: false,
        }
    }

    fn display_scale(&self) -> f32 {
        self.scale
    }

    fn screen_size(&self) -> Option<Size> {
        let screen = &self.conn.setup().roots[self.screen_num];
        Some(Size::new(screen.width_in_pixels as u32, screen.height_in_pixels as u32))
    }

    fn dispatch(&mut self, queue: &mut VecDeque<NativeEvent>) -> Result<()> {
        while let Some(event) = self.conn.poll_for_event()? {
            self.translate(event, queue)?;
        }
        Ok(())
    }

    fn create_window(&mut self, id: WindowId, title: &str, size: Size) -> Result<WindowSetup> {
        let xid = self.conn.generate_id()?;
        if let Err(err) = self.try_create_window(xid, title, size) {
            let _ = self.conn.destroy_window(xid);
            return Err(err);
        }
        let cursor = self.theme_cursor(CursorIcon::Default).unwrap_or(x11rb::NONE);
        self.windows.insert(
            id,
            X11Window { xid, cursor, cursor_visible: true },
        );
        self.by_xid.insert(xid, id);
        tracing::debug!("Created X11 window 0x{:x} for {:?}", xid, id);
        Ok(WindowSetup { scale: self.scale, server_decorations: true })
    }

    fn destroy_window(&mut self, id: WindowId) {
        let Some(window) = self.windows.remove(&id) else {
            return;
        };
        self.by_xid.remove(&window.xid);
        if self.raw_target == Some(id) {
            self.raw_target = None;
        }
        let result = self
            .conn
            .destroy_window(window.xid)
            .map_err(crate::error::Error::from)
            .and_then(|_| Ok(self.conn.flush()?));
        if let Err(err) = result {
            tracing::warn!("Failed to destroy X11 window 0x{:x}: {}", window.xid, err);
        }
    }

    fn set_title(&mut self, id: WindowId, title: &str) {
        let Some(xid) = self.xid(id) else { return };
        let result = self.write_title(xid, title).and_then(|_| Ok(self.conn.flush()?));
        if let Err(err) = result {
            tracing::warn!("Failed to set title: {}", err);
        }
    }

    fn set_size(&mut self, id: WindowId, size: Size) {
        let Some(xid) = self.xid(id) else { return };
        let values = ConfigureWindowAux::new().width(size.width).height(size.height);
        if let Err(err) = self.configure(xid, &values) {
            tracing::warn!("Failed to resize window: {}", err);
        }
    }

    fn set_position_and_size(&mut self, id: WindowId, geometry: Geometry) {
        let Some(xid) = self.xid(id) else { return };
        let values = ConfigureWindowAux::new()
            .x(geometry.x)
            .y(geometry.y)
            .width(geometry.width)
            .height(geometry.height);
        if let Err(err) = self.configure(xid, &values) {
            tracing::warn!("Failed to configure window: {}", err);
        }
    }

    fn set_min_size(&mut self, id: WindowId, size: Size) {
        let Some(xid) = self.xid(id) else { return };
        let mut hints = WmSizeHints::new();
        hints.min_size = Some((size.width as i32, size.height as i32));
        let result = hints
            .set_normal_hints(&self.conn, xid)
            .map_err(crate::error::Error::from)
            .and_then(|_| Ok(self.conn.flush()?));
        if let Err(err) = result {
            tracing::warn!("Failed to set size hints: {}", err);
        }
    }

    fn window_geometry(&mut self, id: WindowId) -> Option<Geometry> {
        let xid = self.xid(id)?;
        self.query_geometry(xid)
            .inspect_err(|err| tracing::debug!("Failed to query geometry: {}", err))
            .ok()
    }

    fn begin_resize(&mut self, id: WindowId, edge: ResizeEdge) {
        let (Some(xid), Some(direction)) = (self.xid(id), edge.net_wm_direction()) else {
            return;
        };
        if let Err(err) = self.moveresize(xid, direction) {
            tracing::warn!("Failed to start resize: {}", err);
        }
    }

    fn begin_move(&mut self, id: WindowId) {
        let Some(xid) = self.xid(id) else { return };
        if let Err(err) = self.moveresize(xid, MOVERESIZE_MOVE) {
            tracing::warn!("Failed to start move: {}", err);
        }
    }

    fn set_cursor(&mut self, id: WindowId, icon: CursorIcon) {
        if !self.windows.contains_key(&id) {
            return;
        }
        let Some(cursor) = self.theme_cursor(icon) else {
            tracing::debug!("No cursor for {:?}", icon);
            return;
        };
        let Some(window) = self.windows.get_mut(&id) else { return };
        window.cursor = cursor;
        if !window.cursor_visible {
            return;
        }
        let xid = window.xid;
        if let Err(err) = self.apply_cursor(xid, cursor) {
            tracing::warn!("Failed to set cursor: {}", err);
        }
    }

    fn set_cursor_visible(&mut self, id: WindowId, visible: bool) {
        let Some(window) = self.windows.get_mut(&id) else { return };
        window.cursor_visible = visible;
        let cursor = if visible { window.cursor } else { self.hidden_cursor };
        let xid = window.xid;
        if let Err(err) = self.apply_cursor(xid, cursor) {
            tracing::warn!("Failed to change cursor visibility: {}", err);
        }
    }

    fn request_focus(&mut self, id: WindowId) {
        let Some(xid) = self.xid(id) else { return };
        let result = self.send_root_message(
            xid,
            self.atoms.net_active_window,
            [1, x11rb::CURRENT_TIME, 0, 0, 0], // Source indication: 1 = application
        );
        if let Err(err) = result {
            tracing::warn!("Failed to request focus: {}", err);
        }
    }

    fn warp_pointer(&mut self, id: WindowId, to: Point) {
        let Some(xid) = self.xid(id) else { return };
        let result = self
            .conn
            .warp_pointer(x11rb::NONE, xid, 0, 0, 0, 0, clamp_i16(to.x), clamp_i16(to.y))
            .map_err(crate::error::Error::from)
            .and_then(|_| Ok(self.conn.flush()?));
        if let Err(err) = result {
            tracing::warn!("Failed to warp pointer: {}", err);
        }
    }

    fn confine_pointer(&mut self, id: WindowId) -> Confinement {
        let Some(xid) = self.xid(id) else {
            return Confinement::Unsupported;
        };
        match self.grab(xid) {
            Ok(GrabStatus::SUCCESS) => Confinement::Granted,
            Ok(status) => {
                tracing::debug!("Pointer grab failed: {:?}", status);
                Confinement::AlreadyGrabbed
            }
            Err(err) => {
                tracing::warn!("Pointer grab failed: {}", err);
                Confinement::AlreadyGrabbed
            }
        }
    }

    fn release_pointer(&mut self, id: WindowId) {
        if self.raw_target == Some(id) {
            self.raw_target = None;
        }
        let result = self
            .conn
            .ungrab_pointer(x11rb::CURRENT_TIME)
            .map_err(crate::error::Error::from)
            .and_then(|_| Ok(self.conn.flush()?));
        if let Err(err) = result {
            tracing::warn!("Failed to release pointer: {}", err);
        }
    }

    fn set_relative_motion(&mut self, id: WindowId, enabled: bool) -> bool {
        if !self.xinput || !self.windows.contains_key(&id) {
            return false;
        }
        if enabled {
            self.raw_target = Some(id);
        } else if self.raw_target == Some(id) {
            self.raw_target = None;
        }
        enabled
    }

    fn cursor_position(&mut self, id: WindowId) -> Option<Position> {
        let xid = self.xid(id)?;
        let reply = self.conn.query_pointer(xid).ok()?.reply().ok()?;
        reply
            .same_screen
            .then(|| Position::new(reply.win_x as f64, reply.win_y as f64))
    }

    fn set_wm_fullscreen(&mut self, id: WindowId, fullscreen: bool) {
        let Some(xid) = self.xid(id) else { return };
        if let Err(err) = self.fullscreen_state(xid, fullscreen) {
            tracing::warn!("Failed to change fullscreen state: {}", err);
        }
    }

    fn switch_display_mode(&mut self, id: WindowId) -> Option<SavedMode> {
        if !self.randr || self.xid(id).is_none() {
            return None;
        }
        match self.switch_mode() {
            Ok(saved) => saved.map(SavedMode::new),
            Err(err) => {
                tracing::warn!("Display mode switch failed: {}", err);
                None
            }
        }
    }

    fn restore_display_mode(&mut self, _id: WindowId, mode: SavedMode) {
        let Some(saved) = mode.downcast::<SavedCrtc>() else {
            return;
        };
        match self.restore_mode(&saved) {
            Ok(()) => tracing::info!("Restored CRTC {} to mode {}", saved.crtc, saved.mode),
            Err(err) => tracing::warn!("Failed to restore display mode: {}", err),
        }
    }

    fn x11_handles(&self, id: WindowId) -> Option<X11Handles> {
        let xid = self.xid(id)?;
        let connection = NonNull::new(self.conn.get_raw_xcb_connection() as *mut c_void)?;
        Some(X11Handles {
            connection,
            screen: self.screen_num as i32,
            window: xid,
        })
    }
}

impl Drop for X11Backend {
    fn drop(&mut self) {
        let _ = self.conn.free_cursor(self.hidden_cursor);
        let _ = self.conn.flush();
    }
}

/// Core keyboard mapping, keycode to keysyms
#[derive(Debug, Default)]
struct KeyboardMap {
    min_keycode: u8,
    per_keycode: u8,
    keysyms: Vec<u32>,
}

impl KeyboardMap {
    fn load(conn: &XCBConnection) -> Result<Self> {
        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = conn.get_keyboard_mapping(min, max - min + 1)?.reply()?;
        Ok(Self {
            min_keycode: min,
            per_keycode: reply.keysyms_per_keycode,
            keysyms: reply.keysyms,
        })
    }

    fn keysym(&self, keycode: u8, column: usize) -> u32 {
        if keycode < self.min_keycode || column >= self.per_keycode as usize {
            return 0;
        }
        let index = (keycode - self.min_keycode) as usize * self.per_keycode as usize + column;
        self.keysyms.get(index).copied().unwrap_or(0)
    }

    /// Keysym that produces text under the given core modifier state
    fn text_keysym(&self, keycode: u8, state: u32) -> u32 {
        let base = self.keysym(keycode, 0);
        let shifted = match self.keysym(keycode, 1) {
            0 => base,
            sym => sym,
        };
        let shift = state & SHIFT_MASK != 0;
        let caps = state & LOCK_MASK != 0;
        if (0x61..=0x7a).contains(&base) {
            // Caps lock only affects letters
            if shift != caps { shifted } else { base }
        } else if shift {
            shifted
        } else {
            base
        }
    }
}

/// Whether a FocusOut means another window took focus
fn focus_lost_to_other(mode: NotifyMode, detail: NotifyDetail) -> bool {
    matches!(mode, NotifyMode::NORMAL | NotifyMode::UNGRAB)
        && matches!(
            detail,
            NotifyDetail::ANCESTOR | NotifyDetail::NONLINEAR | NotifyDetail::NONLINEAR_VIRTUAL
        )
}

/// Wheel buttons 4-7 as scroll deltas
fn scroll_delta(button: u8) -> Option<(f64, f64)> {
    match button {
        4 => Some((0.0, 1.0)),
        5 => Some((0.0, -1.0)),
        6 => Some((1.0, 0.0)),
        7 => Some((-1.0, 0.0)),
        _ => None,
    }
}

/// Extract the x/y deltas from an XI2 raw event
///
/// Values are packed in valuator order, one per set bit in the mask.
fn raw_delta(mask: &[u32], values: &[xinput::Fp3232]) -> (f64, f64) {
    let mut values = values.iter();
    let (mut dx, mut dy) = (0.0, 0.0);
    for axis in 0..2 {
        let set = mask.first().is_some_and(|bits| bits & (1 << axis) != 0);
        if !set {
            continue;
        }
        let Some(value) = values.next() else { break };
        let value = value.integral as f64 + value.frac as f64 / 4_294_967_296.0;
        if axis == 0 { dx = value } else { dy = value }
    }
    (dx, dy)
}

/// Outputs to try for fullscreen: the primary first, then every output
fn output_candidates(primary: randr::Output, outputs: &[randr::Output]) -> Vec<randr::Output> {
    let primary = (primary != 0).then_some(primary);
    primary
        .into_iter()
        .chain(outputs.iter().copied().filter(|&output| Some(output) != primary))
        .collect()
}

/// First of an output's modes whose size is `screen`
///
/// `table` maps mode ids to sizes, as listed in the screen resources.
fn matching_mode(
    output_modes: &[randr::Mode],
    table: &[(randr::Mode, Size)],
    screen: Size,
) -> Option<randr::Mode> {
    output_modes
        .iter()
        .copied()
        .find(|&mode| table.iter().any(|&(id, size)| id == mode && size == screen))
}

fn clamp_u16(value: u32) -> u16 {
    value.clamp(1, u16::MAX as u32) as u16
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us_keyboard() -> KeyboardMap {
        // keycode 8: a/A, 9: 1/!, 10: Return
        KeyboardMap {
            min_keycode: 8,
            per_keycode: 2,
            keysyms: vec![0x61, 0x41, 0x31, 0x21, 0xff0d, 0],
        }
    }

    #[test]
    fn keysym_columns() {
        let map = us_keyboard();
        assert_eq!(map.keysym(8, 0), 0x61);
        assert_eq!(map.keysym(9, 1), 0x21);
        assert_eq!(map.keysym(7, 0), 0);
        assert_eq!(map.keysym(200, 0), 0);
    }

    #[test]
    fn text_respects_shift_and_caps_lock() {
        let map = us_keyboard();
        assert_eq!(map.text_keysym(8, 0), 0x61);
        assert_eq!(map.text_keysym(8, SHIFT_MASK), 0x41);
        assert_eq!(map.text_keysym(8, LOCK_MASK), 0x41);
        assert_eq!(map.text_keysym(8, SHIFT_MASK | LOCK_MASK), 0x61);
        // Caps lock leaves digits alone
        assert_eq!(map.text_keysym(9, LOCK_MASK), 0x31);
        assert_eq!(map.text_keysym(9, SHIFT_MASK), 0x21);
        // Missing shifted column falls back to the base keysym
        assert_eq!(map.text_keysym(10, SHIFT_MASK), 0xff0d);
    }

    #[test]
    fn focus_classification() {
        assert!(focus_lost_to_other(NotifyMode::NORMAL, NotifyDetail::NONLINEAR));
        assert!(focus_lost_to_other(NotifyMode::UNGRAB, NotifyDetail::ANCESTOR));
        assert!(!focus_lost_to_other(NotifyMode::GRAB, NotifyDetail::NONLINEAR));
        assert!(!focus_lost_to_other(NotifyMode::NORMAL, NotifyDetail::INFERIOR));
    }

    #[test]
    fn wheel_buttons_scroll() {
        assert_eq!(scroll_delta(4), Some((0.0, 1.0)));
        assert_eq!(scroll_delta(7), Some((-1.0, 0.0)));
        assert_eq!(scroll_delta(1), None);
    }

    #[test]
    fn primary_output_tried_first() {
        assert_eq!(output_candidates(0x43, &[0x41, 0x42, 0x43]), vec![0x43, 0x41, 0x42]);
        assert_eq!(output_candidates(0, &[0x41, 0x42]), vec![0x41, 0x42]);
    }

    #[test]
    fn mode_matches_screen_not_preference() {
        // Native panel mode listed first, screen running at 1920x1080
        let table = [
            (0x60, Size::new(2560, 1440)),
            (0x61, Size::new(1920, 1080)),
            (0x62, Size::new(1280, 720)),
        ];
        let screen = Size::new(1920, 1080);
        assert_eq!(matching_mode(&[0x60, 0x61, 0x62], &table, screen), Some(0x61));
        assert_eq!(matching_mode(&[0x60, 0x62], &table, screen), None);
        assert_eq!(matching_mode(&[0x99], &table, screen), None);
    }

    #[test]
    fn raw_delta_follows_mask() {
        let half = xinput::Fp3232 { integral: 2, frac: 1 << 31 };
        let neg = xinput::Fp3232 { integral: -3, frac: 0 };
        assert_eq!(raw_delta(&[0b11], &[half, neg]), (2.5, -3.0));
        assert_eq!(raw_delta(&[0b10], &[neg]), (0.0, -3.0));
        assert_eq!(raw_delta(&[0], &[]), (0.0, 0.0));
    }
}
