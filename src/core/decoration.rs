//! Decoration bookkeeping
//!
//! Until the platform grants server-side decorations the window draws its
//! own title bar, and the top `title_bar_height` logical pixels of the
//! surface belong to it.

/// Default client title-bar height, in logical pixels
pub const DEFAULT_TITLE_BAR_HEIGHT: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecorationState {
    pub server_side: bool,
    /// Height of the client-drawn title bar, logical pixels
    pub title_bar_height: u32,
}

impl DecorationState {
    pub fn new(server_side: bool, title_bar_height: u32) -> Self {
        Self { server_side, title_bar_height }
    }

    /// Physical height of the title bar band at the top of the surface
    ///
    /// Zero when the server decorates the window or it is fullscreen.
    pub fn band(&self, scale: f32, fullscreen: bool) -> u32 {
        if self.server_side || fullscreen {
            0
        } else {
            (self.title_bar_height as f32 * scale) as u32
        }
    }

    /// Whether a surface-relative `y` falls inside the title bar
    pub fn in_title_bar(&self, y: f64, scale: f32, fullscreen: bool) -> bool {
        let band = self.band(scale, fullscreen);
        band > 0 && y >= 0.0 && y < band as f64
    }
}

impl Default for DecorationState {
    fn default() -> Self {
        Self::new(false, DEFAULT_TITLE_BAR_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_scales_with_window() {
        let decoration = DecorationState::new(false, 30);
        assert_eq!(decoration.band(2.0, false), 60);
        assert_eq!(decoration.band(1.5, false), 45);
    }

    #[test]
    fn no_band_when_server_decorated_or_fullscreen() {
        assert_eq!(DecorationState::new(true, 40).band(1.0, false), 0);
        assert_eq!(DecorationState::new(false, 40).band(1.0, true), 0);
    }

    #[test]
    fn title_bar_hit_test() {
        let decoration = DecorationState::default();
        assert!(decoration.in_title_bar(0.0, 1.0, false));
        assert!(decoration.in_title_bar(39.5, 1.0, false));
        assert!(!decoration.in_title_bar(40.0, 1.0, false));
        assert!(decoration.in_title_bar(70.0, 2.0, false));
        assert!(!decoration.in_title_bar(10.0, 1.0, true));
    }
}
