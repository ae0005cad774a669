//! HiDPI scale discovery and logical/physical conversion
//!
//! Everything crossing the public boundary is in physical pixels. Backends
//! whose protocol speaks logical pixels get their sizes converted here, in
//! one place, so both directions truncate and align the same way.

use super::geometry::{Point, Position, Size};
use crate::backend::Capabilities;

/// Scale factors the physical-DPI estimate snaps to
pub const SNAP_STEPS: [f32; 5] = [1.0, 1.5, 2.0, 2.5, 3.0];

const REFERENCE_DPI: f32 = 96.0;
const MIN_SCALE_EXCLUSIVE: f32 = 0.5;
const MAX_SCALE: f32 = 4.0;

fn in_range(scale: f32) -> bool {
    scale.is_finite() && scale > MIN_SCALE_EXCLUSIVE && scale <= MAX_SCALE
}

/// Snap a raw ratio to the nearest of [`SNAP_STEPS`], rounding half up
pub fn snap_scale(raw: f32) -> f32 {
    if raw >= 2.75 {
        3.0
    } else if raw >= 2.25 {
        2.5
    } else if raw >= 1.75 {
        2.0
    } else if raw >= 1.25 {
        1.5
    } else {
        1.0
    }
}

/// Parse a user-supplied scale value such as `GDK_SCALE=2`
pub fn parse_override(value: &str) -> Option<f32> {
    let scale: f32 = value.trim().parse().ok()?;
    in_range(scale).then_some(scale)
}

/// Scale from a desktop resource DPI value (`Xft.dpi`)
pub fn scale_from_dpi(dpi: &str) -> Option<f32> {
    let dpi: f32 = dpi.trim().parse().ok()?;
    let scale = dpi / REFERENCE_DPI;
    in_range(scale).then_some(scale)
}

/// Estimate from the screen's reported physical width
///
/// Servers that fake a 96 DPI report on a HiDPI panel are caught by
/// resolution: 2560 px or wider counts as 2.0.
pub fn estimate_from_physical(width_px: u32, width_mm: u32) -> Option<f32> {
    if width_mm == 0 {
        return None;
    }
    let dpi = width_px as f32 * 25.4 / width_mm as f32;
    if (95.0..=97.0).contains(&dpi) && width_px >= 2560 {
        return Some(2.0);
    }
    Some(snap_scale(dpi / REFERENCE_DPI))
}

/// Pick the window scale from the available sources, in priority order
///
/// The result is never below 1.0.
pub fn discover(
    env_override: Option<f32>,
    resource_dpi: Option<&str>,
    physical: Option<(u32, u32)>,
) -> f32 {
    let scale = env_override
        .or_else(|| resource_dpi.and_then(scale_from_dpi))
        .or_else(|| physical.and_then(|(px, mm)| estimate_from_physical(px, mm)))
        .unwrap_or(1.0);
    scale.max(1.0)
}

/// Integer buffer scale a compositor expects buffers to be divisible by
pub fn buffer_scale(scale: f32) -> u32 {
    if scale > 1.0 { scale.floor() as u32 } else { 1 }
}

/// Round `value` down to a multiple of the buffer scale
pub fn align(value: u32, scale: f32) -> u32 {
    let step = buffer_scale(scale);
    value / step * step
}

pub fn align_size(size: Size, scale: f32) -> Size {
    Size::new(align(size.width, scale), align(size.height, scale))
}

/// Logical to physical pixels: truncate, then align to the buffer scale
pub fn to_physical(logical: u32, scale: f32) -> u32 {
    align((logical as f32 * scale) as u32, scale)
}

pub fn to_physical_size(size: Size, scale: f32) -> Size {
    Size::new(to_physical(size.width, scale), to_physical(size.height, scale))
}

/// Physical to logical pixels, truncating
pub fn to_logical(physical: u32, scale: f32) -> u32 {
    (physical as f32 / scale) as u32
}

pub fn to_logical_size(size: Size, scale: f32) -> Size {
    Size::new(to_logical(size.width, scale), to_logical(size.height, scale))
}

/// Scale a signed position, truncating toward zero
pub fn scale_coord(value: i32, factor: f32) -> i32 {
    (value as f32 * factor) as i32
}

/// Converts between the core's physical pixels and a backend's native units
#[derive(Debug, Clone, Copy)]
pub struct Units {
    logical: bool,
    scale: f32,
}

impl Units {
    pub fn new(caps: &Capabilities, scale: f32) -> Self {
        Self { logical: caps.logical_coordinates, scale }
    }

    pub fn point_to_native(&self, point: Point) -> Point {
        if self.logical {
            Point::new(
                scale_coord(point.x, 1.0 / self.scale),
                scale_coord(point.y, 1.0 / self.scale),
            )
        } else {
            point
        }
    }

    pub fn position_from_native(&self, pos: Position) -> Position {
        if self.logical { pos.scaled(self.scale as f64) } else { pos }
    }

    pub fn size_to_native(&self, size: Size) -> Size {
        if self.logical { to_logical_size(size, self.scale) } else { size }
    }

    pub fn size_from_native(&self, size: Size) -> Size {
        if self.logical { to_physical_size(size, self.scale) } else { size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_rounds_to_common_steps() {
        assert_eq!(snap_scale(0.8), 1.0);
        assert_eq!(snap_scale(1.24), 1.0);
        assert_eq!(snap_scale(1.25), 1.5);
        assert_eq!(snap_scale(1.9), 2.0);
        assert_eq!(snap_scale(2.3), 2.5);
        assert_eq!(snap_scale(5.0), 3.0);
    }

    #[test]
    fn override_range_is_half_open() {
        assert_eq!(parse_override("0.5"), None);
        assert_eq!(parse_override("0.75"), Some(0.75));
        assert_eq!(parse_override(" 4 "), Some(4.0));
        assert_eq!(parse_override("4.01"), None);
        assert_eq!(parse_override("NaN"), None);
    }

    #[test]
    fn xft_dpi_maps_to_ratio() {
        assert_eq!(scale_from_dpi("192"), Some(2.0));
        assert_eq!(scale_from_dpi("144"), Some(1.5));
        assert_eq!(scale_from_dpi("bogus"), None);
        assert_eq!(scale_from_dpi("1000"), None);
    }

    #[test]
    fn physical_estimate() {
        // 27" 2560 px panel reporting 96 DPI
        assert_eq!(estimate_from_physical(2560, 677), Some(2.0));
        // 1920 px at 96 DPI stays 1.0
        assert_eq!(estimate_from_physical(1920, 508), Some(1.0));
        // 3840 px over 344 mm is ~283 DPI
        assert_eq!(estimate_from_physical(3840, 344), Some(3.0));
        assert_eq!(estimate_from_physical(1920, 0), None);
    }

    #[test]
    fn discovery_priority() {
        assert_eq!(discover(Some(1.5), Some("192"), Some((3840, 344))), 1.5);
        assert_eq!(discover(None, Some("192"), Some((3840, 344))), 2.0);
        assert_eq!(discover(None, None, Some((3840, 344))), 3.0);
        assert_eq!(discover(None, None, None), 1.0);
        assert_eq!(discover(Some(0.75), None, None), 1.0);
    }

    #[test]
    fn conversion_aligns_to_buffer_scale() {
        assert_eq!(to_physical_size(Size::new(400, 300), 2.0), Size::new(800, 600));
        assert_eq!(to_physical(301, 1.5), 451);
        assert_eq!(align(801, 2.0), 800);
        assert_eq!(align(801, 2.5), 800);
        assert_eq!(align(801, 1.0), 801);
        assert_eq!(to_logical_size(Size::new(800, 660), 2.0), Size::new(400, 330));
    }

    #[test]
    fn logical_units_convert_both_ways() {
        let caps = Capabilities { logical_coordinates: true, ..Default::default() };
        let units = Units::new(&caps, 2.0);
        assert_eq!(units.size_to_native(Size::new(800, 660)), Size::new(400, 330));
        assert_eq!(units.size_from_native(Size::new(400, 300)), Size::new(800, 600));
        assert_eq!(units.position_from_native(Position::new(10.5, 3.0)), Position::new(21.0, 6.0));
        assert_eq!(units.point_to_native(Point::new(400, 300)), Point::new(200, 150));

        let physical = Units::new(&Capabilities::default(), 2.0);
        assert_eq!(physical.size_to_native(Size::new(800, 660)), Size::new(800, 660));
    }
}
