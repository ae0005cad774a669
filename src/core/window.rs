//! Protocol-independent window record

use super::cursor::{CursorState, lock_center};
use super::decoration::DecorationState;
use super::edge::ResizeState;
use super::fullscreen::FullscreenState;
use super::geometry::{Geometry, Point, Position, Size};
use super::registry::{AppId, WindowId};
use super::scale;
use crate::config::Config;
use crate::input::MouseButton;

/// Everything the core knows about one window
///
/// Sizes are physical pixels. The content area is what the application
/// renders into; the surface adds the client title bar on top when the
/// window draws its own decorations.
#[derive(Debug)]
pub struct Window {
    pub id: WindowId,
    pub app: AppId,
    pub title: String,
    pub content: Size,
    pub surface: Size,
    pub position: Point,
    pub min_size: Size,
    pub scale: f32,
    pub should_close: bool,

    pub focused: bool,
    pub mapped: bool,
    /// A configure has been observed since creation
    pub configured: bool,
    /// Last pointer position, physical surface coordinates
    pub pointer: Position,
    held: u8,

    pub resize: ResizeState,
    pub cursor: CursorState,
    pub fullscreen: FullscreenState,
    pub decoration: DecorationState,
}

impl Window {
    pub fn new(id: WindowId, app: AppId, title: &str, content: Size, config: &Config) -> Self {
        let mut window = Self {
            id,
            app,
            title: title.to_string(),
            content,
            surface: content,
            position: Point::default(),
            min_size: config.min_size,
            scale: 1.0,
            should_close: false,
            focused: false,
            mapped: false,
            configured: false,
            pointer: Position::default(),
            held: 0,
            resize: ResizeState::new(config.resize_border),
            cursor: CursorState::default(),
            fullscreen: FullscreenState::default(),
            decoration: DecorationState::new(false, config.title_bar_height),
        };
        window.set_content(content);
        window
    }

    /// Physical height of the client title bar, zero when not drawn
    pub fn title_bar_height(&self) -> u32 {
        self.decoration.band(self.scale, self.fullscreen.exclusive)
    }

    /// Replace the content size and derive the surface from it
    ///
    /// Also recomputes the lock center so it always tracks the content.
    pub fn set_content(&mut self, content: Size) {
        let band = self.title_bar_height();
        self.content = content;
        self.surface = Size::new(content.width, content.height + band);
        self.cursor.center = lock_center(content, band);
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.position.x, self.position.y, self.content.width, self.content.height)
    }

    /// Content size aligned to the buffer scale
    pub fn framebuffer_size(&self) -> Size {
        scale::align_size(self.content, self.scale)
    }

    /// Surface size aligned to the buffer scale
    pub fn surface_size(&self) -> Size {
        scale::align_size(self.surface, self.scale)
    }

    pub fn logical_size(&self) -> Size {
        scale::to_logical_size(self.content, self.scale)
    }

    pub fn press(&mut self, button: MouseButton) {
        self.held |= button_bit(button);
    }

    pub fn release(&mut self, button: MouseButton) {
        self.held &= !button_bit(button);
    }

    /// Forget held buttons, e.g. after the platform took over the pointer
    pub fn clear_buttons(&mut self) {
        self.held = 0;
    }

    pub fn any_button_held(&self) -> bool {
        self.held != 0
    }
}

fn button_bit(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => 1,
        MouseButton::Right => 2,
        MouseButton::Middle => 4,
        MouseButton::X1 => 8,
        MouseButton::X2 => 16,
    }
}

#[cfg(test)]
mod tests {
    use slotmap::KeyData;

    use super::*;

    fn window(content: Size) -> Window {
        let id = WindowId::from(KeyData::from_ffi(1));
        Window::new(id, AppId::next(), "test", content, &Config::default())
    }

    #[test]
    fn surface_includes_title_bar() {
        let mut w = window(Size::new(400, 300));
        w.scale = 2.0;
        w.decoration.title_bar_height = 30;
        w.set_content(Size::new(800, 600));
        assert_eq!(w.surface, Size::new(800, 660));
        assert!(w.content.height <= w.surface.height);
    }

    #[test]
    fn server_decorations_remove_the_band() {
        let mut w = window(Size::new(800, 600));
        w.decoration.server_side = true;
        w.set_content(w.content);
        assert_eq!(w.surface, w.content);
        assert_eq!(w.title_bar_height(), 0);
    }

    #[test]
    fn lock_center_follows_content() {
        let mut w = window(Size::new(800, 600));
        w.decoration.server_side = true;
        w.set_content(w.content);
        assert_eq!(w.cursor.center, Point::new(400, 300));
        w.set_content(Size::new(1024, 768));
        assert_eq!(w.cursor.center, Point::new(512, 384));
    }

    #[test]
    fn lock_center_skips_title_bar() {
        let mut w = window(Size::new(800, 600));
        w.decoration.title_bar_height = 30;
        w.set_content(w.content);
        assert_eq!(w.cursor.center, Point::new(400, 330));
        assert_eq!(w.surface, Size::new(800, 630));
    }

    #[test]
    fn sizes_align_to_buffer_scale() {
        let mut w = window(Size::new(801, 601));
        w.scale = 2.0;
        assert_eq!(w.framebuffer_size(), Size::new(800, 600));
        assert_eq!(w.logical_size(), Size::new(400, 300));
    }

    #[test]
    fn held_buttons() {
        let mut w = window(Size::new(800, 600));
        assert!(!w.any_button_held());
        w.press(MouseButton::Left);
        w.press(MouseButton::Right);
        w.release(MouseButton::Left);
        assert!(w.any_button_held());
        w.release(MouseButton::Right);
        assert!(!w.any_button_held());
    }
}
