use crate::types::Grid;
use serde::Serialize;

/// Axis extents of the raw and interpolated maps.
///
/// `raw` covers whole pixels; `interpolated` spans first to last pixel
/// centre, which is where densified samples live.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MapExtents {
    /// (x_min, x_max, y_min, y_max)
    pub raw: (f64, f64, f64, f64),
    pub interpolated: (f64, f64, f64, f64),
    /// Microns (or pixels) per pixel along x and y.
    pub per_pixel: (f64, f64),
    /// True when the extents are expressed in microns.
    pub microns: bool,
}

pub fn extents(grid: &Grid) -> MapExtents {
    let (lx, ly, microns) = match (grid.lx_um, grid.ly_um) {
        (Some(lx), Some(ly)) if lx > 0.0 && ly > 0.0 => (lx, ly, true),
        _ => (grid.nx as f64, grid.ny as f64, false),
    };
    let fx = if grid.nx > 0 { lx / grid.nx as f64 } else { 0.0 };
    let fy = if grid.ny > 0 { ly / grid.ny as f64 } else { 0.0 };
    MapExtents {
        raw: (0.0, lx, 0.0, ly),
        interpolated: (0.5 * fx, lx - 0.5 * fx, 0.5 * fy, ly - 0.5 * fy),
        per_pixel: (fx, fy),
        microns,
    }
}
