pub trait RasterView {
    fn width(&self) -> usize;
    fn height(&self) -> usize;

    fn row(&self, y: usize) -> &[f64];

    fn as_slice(&self) -> &[f64];

    fn rows(&self) -> Rows<'_, Self>
    where
        Self: Sized,
    {
        Rows { raster: self, y: 0 }
    }

    /// Mean of the finite cells of row `y`.
    fn row_mean(&self, y: usize) -> Option<f64> {
        let row = self.row(y);
        let (sum, n) = row
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// Mean of the finite cells of column `x`.
    fn col_mean(&self, x: usize) -> Option<f64> {
        let (sum, n) = (0..self.height())
            .map(|y| self.row(y)[x])
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }
}

pub trait RasterViewMut: RasterView {
    fn row_mut(&mut self, y: usize) -> &mut [f64];

    fn as_mut_slice(&mut self) -> &mut [f64];

    fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, f64>
    where
        Self: Sized,
    {
        let w = self.width().max(1);
        self.as_mut_slice().chunks_exact_mut(w)
    }
}

pub struct Rows<'a, R: ?Sized + RasterView> {
    raster: &'a R,
    y: usize,
}

impl<'a, R: RasterView> Iterator for Rows<'a, R> {
    type Item = &'a [f64];

    fn next(&mut self) -> Option<Self::Item> {
        if self.y >= self.raster.height() {
            return None;
        }
        let y = self.y;
        self.y += 1;
        Some(self.raster.row(y))
    }
}
