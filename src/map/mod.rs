//! Scalar per-pixel values to 2-D maps.
//!
//! # Algorithm Outline
//! 1. Reshape the raw values in serpentine layout.
//! 2. Replace masked pixels by NaN.
//! 3. Fill NaN cells by Delaunay interpolation; cells outside the hull take
//!    their row mean.
//! 4. Densify by an integer factor and list the densified cells that stand
//!    for pixels that were NaN before filling (the blank set).

pub mod correlation;
pub mod mask;

pub use correlation::{masked_correlation, on_off, within_mode, CorrelationMatrix};
pub use mask::{
    criterion_mask, BoundsPrompt, InteractiveMask, LinePrompt, ListMask, MaskPolicy,
    ProgrammaticMask, PromptReply,
};

use crate::error::{Result, SspfmError};
use crate::geometry::{
    extents, pixel_index_map, serpentine_map, turnaround_markers, validate_length, MapExtents,
    Mask, TurnMarker,
};
use crate::interp::{blank_set, densified_shape, densify, fill_with, EdgeFill, FillMethod, FillOptions};
use crate::properties::PropertyBundle;
use crate::raster::Raster;
use crate::types::{Grid, Mode};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapOptions {
    pub method: FillMethod,
    /// Integer densification factor; 1 keeps the pixel grid.
    pub densify: usize,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            method: FillMethod::Linear,
            densify: 1,
        }
    }
}

/// Every intermediate map of one property.
#[derive(Clone, Debug, Serialize)]
pub struct MapArtifacts {
    /// Step 1: serpentine layout, no mask.
    pub raw: Raster,
    /// Step 2: masked cells NaN.
    pub masked: Raster,
    /// Step 3.
    pub filled: Raster,
    /// Step 3b.
    pub densified: Raster,
    /// Step 4: row-major indices into `densified`.
    pub blank: Vec<usize>,
    pub extents: MapExtents,
    pub markers: Vec<TurnMarker>,
    /// Pixel index shown at each raw map cell.
    pub index_map: Raster,
}

/// Run steps 1 to 4 on one per-pixel vector.
pub fn build_map(values: &[f64], grid: &Grid, mask: &Mask, opts: &MapOptions) -> Result<MapArtifacts> {
    validate_length(values.len(), grid)?;
    if let Some(bad) = mask.iter().find(|i| *i >= grid.len()) {
        return Err(SspfmError::Geometry(format!(
            "mask index {bad} outside the {}x{} grid",
            grid.nx, grid.ny
        )));
    }
    let raw = serpentine_map(values, grid);
    let masked = serpentine_map(&mask.apply(values), grid);
    let filled = fill_with(
        &masked,
        &FillOptions {
            method: opts.method,
            edge: EdgeFill::RowMean,
        },
    );
    let k = opts.densify.max(1);
    let densified = densify(&filled, k, opts.method);
    let blank = if k > 1 {
        blank_set(
            &masked.nan_mask(),
            masked.w,
            densified_shape(masked.h, masked.w, k),
            k,
        )
    } else {
        masked
            .nan_mask()
            .iter()
            .enumerate()
            .filter(|(_, nan)| **nan)
            .map(|(i, _)| i)
            .collect()
    };
    debug!(
        "map {}x{}: {} masked, {} filled, {} blanked",
        grid.nx,
        grid.ny,
        mask.len(),
        masked.count_nan().saturating_sub(filled.count_nan()),
        blank.len()
    );
    Ok(MapArtifacts {
        raw,
        masked,
        filled,
        densified,
        blank,
        extents: extents(grid),
        markers: turnaround_markers(grid),
        index_map: pixel_index_map(grid),
    })
}

/// Map of one property of a bundle.
pub fn property_map(
    bundle: &PropertyBundle,
    mode: Mode,
    name: &str,
    mask: &Mask,
    opts: &MapOptions,
) -> Result<MapArtifacts> {
    let values = bundle.get(mode, name).ok_or_else(|| {
        SspfmError::Config(format!("no property '{name}' in mode {mode}"))
    })?;
    build_map(values, &bundle.grid, mask, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_missing_pixel_is_filled_from_its_row() {
        let grid = Grid::new(3, 2);
        let art = build_map(&[10.0, 20.0, 30.0, 40.0, 50.0], &grid, &Mask::empty(), &MapOptions::default())
            .expect("map");
        assert!(art.raw.get(0, 0).is_nan());
        assert_eq!(art.raw.get(1, 0), 50.0);
        assert_eq!(art.raw.get(2, 0), 40.0);
        assert_eq!(art.raw.get(0, 1), 10.0);
        assert!((art.filled.get(0, 0) - 45.0).abs() < 1e-12);
        assert_eq!(art.blank, vec![0]);
    }

    #[test]
    fn masked_pixels_are_blanked_after_densification() {
        let grid = Grid::new(3, 3);
        let values: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let opts = MapOptions {
            densify: 2,
            ..Default::default()
        };
        let art = build_map(&values, &grid, &Mask::from_indices([4]), &opts).expect("map");
        assert!(art.masked.get(1, 1).is_nan());
        assert_eq!(art.filled.count_nan(), 0);
        assert_eq!(art.densified.shape(), (5, 5));
        assert!(art.blank.contains(&(2 * 5 + 2)));
        assert!(!art.blank.contains(&0));
    }

    #[test]
    fn factor_one_equals_filled() {
        let grid = Grid::new(2, 2);
        let art = build_map(&[1.0, 2.0, 3.0, 4.0], &grid, &Mask::empty(), &MapOptions::default())
            .expect("map");
        assert_eq!(art.densified, art.filled);
    }

    #[test]
    fn oversized_input_is_a_geometry_error() {
        let grid = Grid::new(2, 2);
        let err = build_map(&[0.0; 5], &grid, &Mask::empty(), &MapOptions::default()).unwrap_err();
        assert!(matches!(err, SspfmError::Geometry(_)));
    }
}
