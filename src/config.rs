//! # Configuration
//!
//! Backend preference, window chrome metrics and scale discovery.
//!
//! Configuration is currently sourced from:
//! - Environment variables (`CASEMENT_SCALE`, `GDK_SCALE`, `QT_SCALE_FACTOR`)
//! - Programmatic construction through [`Context::with_config`](crate::Context::with_config)
//!
//! `CASEMENT_BACKEND` is not read here; it only applies to an `Auto`
//! preference and is consulted when the first application is created.

use serde::{Deserialize, Serialize};

use crate::backend::BackendPreference;
use crate::core::geometry::Size;
use crate::core::scale;

/// Environment variable that overrides the X11 scale factor
///
/// Wayland windows always follow the compositor's output scale.
pub const SCALE_ENV: &str = "CASEMENT_SCALE";

/// Toolkit scale variables honoured after [`SCALE_ENV`], in order
pub const TOOLKIT_SCALE_ENVS: [&str; 2] = ["GDK_SCALE", "QT_SCALE_FACTOR"];

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Initial backend preference of a [`Context`](crate::Context)
    pub backend: BackendPreference,
    /// Explicit scale factor, bypassing DPI discovery
    pub scale_override: Option<f32>,
    /// Width of the resize hit-test band, in logical pixels
    pub resize_border: u32,
    /// Height of the client-drawn title bar, in logical pixels
    pub title_bar_height: u32,
    /// Minimum window size advertised to the window manager
    pub min_size: Size,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            scale_override: None,
            resize_border: 8,
            title_bar_height: 40,
            min_size: Size::new(100, 100),
        }
    }
}

impl Config {
    /// Build a configuration from defaults plus the process environment
    pub fn from_env() -> Self {
        let vars = std::iter::once(SCALE_ENV)
            .chain(TOOLKIT_SCALE_ENVS)
            .map(|name| std::env::var(name).ok());
        Self::default().with_scale_vars(vars)
    }

    /// Apply the first valid scale override among `values`
    ///
    /// Values are consulted in priority order; unparsable or out-of-range
    /// entries are skipped.
    pub fn with_scale_vars<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        self.scale_override = values
            .into_iter()
            .flatten()
            .find_map(|value| scale::parse_override(&value));
        if let Some(scale) = self.scale_override {
            tracing::debug!("Scale override from environment: {}", scale);
        }
        self
    }
}
