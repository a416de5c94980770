//! Pixel geometry: linear index ↔ grid position ↔ serpentine map layout.
//!
//! Values arrive in acquisition order (linear pixel index). The probe walks
//! odd rows right-to-left and the first row sits at the bottom of the sample,
//! so [`serpentine`] mirrors odd rows and flips the matrix vertically to put
//! pixel 0 at the bottom-left of a rendered map.

pub mod annotations;
pub mod extents;
pub mod mask;

pub use annotations::{pixel_index_map, turnaround_markers, TurnMarker};
pub use extents::{extents, MapExtents};
pub use mask::Mask;

use crate::error::{Result, SspfmError};
use crate::raster::{Raster, RasterView, RasterViewMut};
use crate::types::Grid;

/// Fill an `(N_y, N_x)` raster row-by-row in acquisition order.
///
/// Cells beyond `values.len()` stay NaN; extra values are ignored.
pub fn reshape(values: &[f64], grid: &Grid) -> Raster {
    let mut out = Raster::new_nan(grid.nx, grid.ny);
    let n = values.len().min(grid.len());
    out.data[..n].copy_from_slice(&values[..n]);
    out
}

/// Reverse every odd row along x, then flip vertically.
pub fn serpentine(matrix: &Raster) -> Raster {
    let mut out = matrix.clone();
    mirror_odd_rows(&mut out);
    out.flipped_vertical()
}

/// Exact inverse of [`serpentine`].
pub fn de_serpentine(matrix: &Raster) -> Raster {
    let mut out = matrix.flipped_vertical();
    mirror_odd_rows(&mut out);
    out
}

fn mirror_odd_rows(matrix: &mut Raster) {
    for (y, row) in matrix.rows_mut().enumerate() {
        if y % 2 == 1 {
            row.reverse();
        }
    }
}

/// Row-major values of a raster in acquisition order.
pub fn flatten(matrix: &Raster) -> Vec<f64> {
    matrix.as_slice().to_vec()
}

/// Serpentine map of raw per-pixel values (map pipeline step 1).
pub fn serpentine_map(values: &[f64], grid: &Grid) -> Raster {
    serpentine(&reshape(values, grid))
}

/// Inverse of [`serpentine_map`]: per-pixel values in linear order.
pub fn values_from_map(map: &Raster) -> Vec<f64> {
    flatten(&de_serpentine(map))
}

/// (row, col) of pixel `index` inside the serpentine raster.
pub fn display_position(grid: &Grid, index: usize) -> (usize, usize) {
    let (x, y_from_bottom) = grid.physical_coords(index);
    (grid.ny - 1 - y_from_bottom, x)
}

/// Linear pixel index displayed at serpentine cell (row, col).
pub fn index_at_display(grid: &Grid, row: usize, col: usize) -> usize {
    let grid_row = grid.ny - 1 - row;
    let grid_col = if grid_row % 2 == 1 {
        grid.nx - 1 - col
    } else {
        col
    };
    grid_row * grid.nx + grid_col
}

/// Check that `len` measured pixels fit the grid with at most one partial row.
pub fn validate_length(len: usize, grid: &Grid) -> Result<()> {
    if grid.nx == 0 || grid.ny == 0 {
        return Err(SspfmError::Geometry(format!(
            "empty grid {}x{}",
            grid.nx, grid.ny
        )));
    }
    if len > grid.len() {
        return Err(SspfmError::Geometry(format!(
            "{len} pixels exceed the {}x{} grid",
            grid.nx, grid.ny
        )));
    }
    let missing = grid.len() - len;
    if missing > grid.nx {
        return Err(SspfmError::Geometry(format!(
            "{missing} missing pixels span more than one row of the {}x{} grid",
            grid.nx, grid.ny
        )));
    }
    Ok(())
}
