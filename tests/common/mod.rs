//! Scripted backend for driving an [`Application`] without a display server

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use casement::backend::{
    Backend, BackendKind, Capabilities, Confinement, NativeEvent, NativeEventKind, SavedMode,
    WindowSetup,
};
use casement::{
    Application, Config, CursorIcon, Error, Event, Geometry, Point, Position, ResizeEdge, Result,
    Size, WindowId,
};

/// A backend request as the scripted backend received it
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(WindowId, Size),
    Destroy(WindowId),
    SetTitle(WindowId, String),
    SetSize(WindowId, Size),
    SetPositionAndSize(WindowId, Geometry),
    SetMinSize(WindowId, Size),
    BeginResize(WindowId, ResizeEdge),
    BeginMove(WindowId),
    SetCursor(WindowId, CursorIcon),
    CursorVisible(WindowId, bool),
    RequestFocus(WindowId),
    Warp(WindowId, Point),
    Confine(WindowId),
    Release(WindowId),
    RelativeMotion(WindowId, bool),
    WmFullscreen(WindowId, bool),
    SwitchMode(WindowId),
    RestoreMode(WindowId),
}

/// Shared between the test and the backend owned by the application
pub struct Script {
    pub kind: BackendKind,
    pub caps: Capabilities,
    pub scale: f32,
    pub server_decorations: bool,
    pub screen: Option<Size>,
    pub pending: VecDeque<NativeEvent>,
    pub calls: Vec<Call>,
    pub confinement: VecDeque<Confinement>,
    pub fail_create: bool,
    pub fail_dispatch: bool,
    pub switches_mode: bool,
    /// What `cursor_position` answers
    pub pointer: Option<Position>,
}

impl Script {
    /// A window system that owns move/resize gestures and decorates windows
    pub fn x11() -> Self {
        Self {
            kind: BackendKind::X11,
            caps: Capabilities {
                compositor_driven_resize: true,
                pointer_warp: true,
                native_relative_motion: false,
                decoration_negotiation: false,
                logical_coordinates: false,
            },
            scale: 1.0,
            server_decorations: true,
            screen: Some(Size::new(1920, 1080)),
            pending: VecDeque::new(),
            calls: Vec::new(),
            confinement: VecDeque::new(),
            fail_create: false,
            fail_dispatch: false,
            switches_mode: false,
            pointer: None,
        }
    }

    /// A compositor where the client draws its title bar and starts gestures
    pub fn wayland(scale: f32) -> Self {
        Self {
            kind: BackendKind::Wayland,
            caps: Capabilities {
                compositor_driven_resize: false,
                pointer_warp: false,
                native_relative_motion: true,
                decoration_negotiation: true,
                logical_coordinates: true,
            },
            scale,
            server_decorations: false,
            screen: None,
            ..Self::x11()
        }
    }
}

#[derive(Clone)]
pub struct Handle(Rc<RefCell<Script>>);

impl Handle {
    pub fn push(&self, window: WindowId, kind: NativeEventKind) {
        self.0.borrow_mut().pending.push_back(NativeEvent::new(window, kind));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.0.borrow().calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.0.borrow_mut().calls.clear();
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

struct ScriptedBackend(Rc<RefCell<Script>>);

impl ScriptedBackend {
    fn record(&self, call: Call) {
        self.0.borrow_mut().calls.push(call);
    }
}

impl Backend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.0.borrow().kind
    }

    fn capabilities(&self) -> Capabilities {
        self.0.borrow().caps
    }

    fn display_scale(&self) -> f32 {
        self.0.borrow().scale
    }

    fn screen_size(&self) -> Option<Size> {
        self.0.borrow().screen
    }

    fn dispatch(&mut self, queue: &mut VecDeque<NativeEvent>) -> Result<()> {
        let mut script = self.0.borrow_mut();
        if script.fail_dispatch {
            return Err(Error::X11Connection(
                x11rb::errors::ConnectionError::UnknownError,
            ));
        }
        queue.extend(script.pending.drain(..));
        Ok(())
    }

    fn create_window(&mut self, id: WindowId, _title: &str, size: Size) -> Result<WindowSetup> {
        let script = self.0.borrow();
        if script.fail_create {
            return Err(Error::MissingGlobal("xdg_wm_base"));
        }
        let setup = WindowSetup {
            scale: script.scale,
            server_decorations: script.server_decorations,
        };
        drop(script);
        self.record(Call::Create(id, size));
        Ok(setup)
    }

    fn destroy_window(&mut self, id: WindowId) {
        self.record(Call::Destroy(id));
    }

    fn set_title(&mut self, id: WindowId, title: &str) {
        self.record(Call::SetTitle(id, title.to_string()));
    }

    fn set_size(&mut self, id: WindowId, size: Size) {
        self.record(Call::SetSize(id, size));
    }

    fn set_position_and_size(&mut self, id: WindowId, geometry: Geometry) {
        self.record(Call::SetPositionAndSize(id, geometry));
    }

    fn set_min_size(&mut self, id: WindowId, size: Size) {
        self.record(Call::SetMinSize(id, size));
    }

    fn window_geometry(&mut self, _id: WindowId) -> Option<Geometry> {
        None
    }

    fn begin_resize(&mut self, id: WindowId, edge: ResizeEdge) {
        self.record(Call::BeginResize(id, edge));
    }

    fn begin_move(&mut self, id: WindowId) {
        self.record(Call::BeginMove(id));
    }

    fn set_cursor(&mut self, id: WindowId, icon: CursorIcon) {
        self.record(Call::SetCursor(id, icon));
    }

    fn set_cursor_visible(&mut self, id: WindowId, visible: bool) {
        self.record(Call::CursorVisible(id, visible));
    }

    fn request_focus(&mut self, id: WindowId) {
        self.record(Call::RequestFocus(id));
    }

    fn warp_pointer(&mut self, id: WindowId, to: Point) {
        self.record(Call::Warp(id, to));
    }

    fn confine_pointer(&mut self, id: WindowId) -> Confinement {
        self.record(Call::Confine(id));
        self.0
            .borrow_mut()
            .confinement
            .pop_front()
            .unwrap_or(Confinement::Granted)
    }

    fn release_pointer(&mut self, id: WindowId) {
        self.record(Call::Release(id));
    }

    fn set_relative_motion(&mut self, id: WindowId, enabled: bool) -> bool {
        self.record(Call::RelativeMotion(id, enabled));
        enabled
    }

    fn cursor_position(&mut self, _id: WindowId) -> Option<Position> {
        self.0.borrow().pointer
    }

    fn set_wm_fullscreen(&mut self, id: WindowId, fullscreen: bool) {
        self.record(Call::WmFullscreen(id, fullscreen));
    }

    fn switch_display_mode(&mut self, id: WindowId) -> Option<SavedMode> {
        self.record(Call::SwitchMode(id));
        self.0.borrow().switches_mode.then(|| SavedMode::new(id))
    }

    fn restore_display_mode(&mut self, id: WindowId, mode: SavedMode) {
        assert_eq!(mode.downcast::<WindowId>(), Some(id));
        self.record(Call::RestoreMode(id));
    }
}

/// Application on a scripted backend, plus a handle to drive it
pub fn application(script: Script) -> (Application, Handle) {
    application_with(script, Config::default())
}

pub fn application_with(script: Script, config: Config) -> (Application, Handle) {
    let shared = Rc::new(RefCell::new(script));
    let app = Application::with_backend(Box::new(ScriptedBackend(shared.clone())), config);
    (app, Handle(shared))
}

/// Poll until the application has nothing left
pub fn drain(app: &mut Application) -> Vec<Event> {
    std::iter::from_fn(|| app.poll_event()).collect()
}

/// A window that is mapped and focused, with its startup events consumed
pub fn ready_window(app: &mut Application, script: &Handle) -> WindowId {
    let id = app.create_window("test", 800, 600).unwrap();
    script.push(id, NativeEventKind::Mapped);
    script.push(id, NativeEventKind::FocusIn);
    drain(app);
    script.clear_calls();
    id
}
