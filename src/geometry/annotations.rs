use super::{display_position, serpentine};
use crate::raster::Raster;
use crate::types::Grid;
use serde::Serialize;

/// Scan-direction marker drawn on a map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TurnMarker {
    pub index: usize,
    /// Cell of the marker in the serpentine raster.
    pub row: usize,
    pub col: usize,
    /// `>` even row start, `<` odd row start, `v` row end, `s` last pixel.
    pub symbol: char,
}

/// Direction markers at every row boundary of the probe path.
pub fn turnaround_markers(grid: &Grid) -> Vec<TurnMarker> {
    let mut markers = Vec::with_capacity(2 * grid.ny);
    if grid.is_empty() {
        return markers;
    }
    let last = grid.len() - 1;
    for y in 0..grid.ny {
        let start = y * grid.nx;
        let end = start + grid.nx - 1;
        if start != end {
            let symbol = if y % 2 == 1 { '<' } else { '>' };
            markers.push(marker(grid, start, symbol));
        }
        let symbol = if end == last { 's' } else { 'v' };
        markers.push(marker(grid, end, symbol));
    }
    markers
}

fn marker(grid: &Grid, index: usize, symbol: char) -> TurnMarker {
    let (row, col) = display_position(grid, index);
    TurnMarker {
        index,
        row,
        col,
        symbol,
    }
}

/// Serpentine raster holding each cell's linear pixel index.
pub fn pixel_index_map(grid: &Grid) -> Raster {
    let values: Vec<f64> = (0..grid.len()).map(|i| i as f64).collect();
    serpentine(&super::reshape(&values, grid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_follow_the_probe_path() {
        let grid = Grid::new(3, 3);
        let symbols: Vec<(usize, char)> = turnaround_markers(&grid)
            .iter()
            .map(|m| (m.index, m.symbol))
            .collect();
        assert_eq!(
            symbols,
            vec![(0, '>'), (2, 'v'), (3, '<'), (5, 'v'), (6, '>'), (8, 's')]
        );
    }

    #[test]
    fn last_marker_sits_top_right_for_odd_row_count() {
        let grid = Grid::new(3, 3);
        let last = *turnaround_markers(&grid).last().expect("marker");
        assert_eq!((last.row, last.col), (0, 2));
        let index_map = pixel_index_map(&grid);
        assert_eq!(index_map.get(last.col, last.row), 8.0);
    }
}
