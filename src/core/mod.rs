//! Protocol-independent core: window state and the algorithms shared by
//! every backend

pub mod cursor;
pub mod decoration;
pub mod edge;
pub mod fullscreen;
pub mod geometry;
pub mod normalize;
pub mod registry;
pub mod scale;
pub mod window;
