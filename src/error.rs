//! Error type shared by the façade and both backends.

use thiserror::Error;

/// Result alias used throughout casement
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Neither `WAYLAND_DISPLAY` nor `DISPLAY` led to a usable server
    #[error("no display server available")]
    NoDisplay,

    #[error("failed to connect to X server: {0}")]
    X11Connect(#[from] x11rb::errors::ConnectError),

    #[error("X11 connection error: {0}")]
    X11Connection(#[from] x11rb::errors::ConnectionError),

    #[error("X11 request failed: {0}")]
    X11Reply(#[from] x11rb::errors::ReplyError),

    #[error("X11 request failed: {0}")]
    X11ReplyOrId(#[from] x11rb::errors::ReplyOrIdError),

    #[error("failed to connect to Wayland compositor: {0}")]
    WaylandConnect(#[from] wayland_client::ConnectError),

    #[error("failed to read Wayland globals: {0}")]
    WaylandGlobals(#[from] wayland_client::globals::GlobalError),

    #[error("Wayland dispatch failed: {0}")]
    WaylandDispatch(#[from] wayland_client::DispatchError),

    #[error("Wayland connection error: {0}")]
    Wayland(#[from] wayland_client::backend::WaylandError),

    /// A required protocol global was not advertised by the compositor
    #[error("compositor does not advertise {0}")]
    MissingGlobal(&'static str),

    /// Growing the window collection failed; nothing was changed
    #[error("out of memory while registering window")]
    ResourceExhausted,

    /// The handle does not name a live window of this application
    #[error("unknown window handle")]
    UnknownWindow,
}

impl Error {
    /// The connection to the display server is gone
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::X11Connection(_) | Error::Wayland(_) | Error::WaylandDispatch(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_are_not_fatal() {
        assert!(!Error::UnknownWindow.is_fatal());
        assert!(!Error::MissingGlobal("wl_compositor").is_fatal());
        assert!(Error::X11Connection(x11rb::errors::ConnectionError::UnknownError).is_fatal());
    }
}
