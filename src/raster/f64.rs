//! Owned single-channel f64 raster in row-major layout.
//!
//! Row 0 is the top row of a rendered map. Missing or masked cells hold NaN.
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    /// Number of columns
    pub w: usize,
    /// Number of rows
    pub h: usize,
    /// Backing storage in row-major order
    pub data: Vec<f64>,
}

impl Raster {
    /// Construct a NaN-filled raster of size `w × h`.
    pub fn new_nan(w: usize, h: usize) -> Self {
        Self::filled(w, h, f64::NAN)
    }

    pub fn filled(w: usize, h: usize, value: f64) -> Self {
        Self {
            w,
            h,
            data: vec![value; w * h],
        }
    }

    /// Wrap existing row-major data; `None` when the length does not match.
    pub fn from_vec(w: usize, h: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == w * h).then_some(Self { w, h, data })
    }

    /// Build a raster from nested rows (top row first).
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let h = rows.len();
        let w = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != w) {
            return None;
        }
        Some(Self {
            w,
            h,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    #[inline]
    /// Convert (x, y) to a linear index into `data`.
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.w + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[self.idx(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f64) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    /// (rows, cols) like a numpy shape.
    pub fn shape(&self) -> (usize, usize) {
        (self.h, self.w)
    }

    pub fn count_nan(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }

    /// Finite (min, max), `None` when no cell is finite.
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for &v in self.data.iter().filter(|v| v.is_finite()) {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            });
        }
        range
    }

    /// Flag per cell telling whether it is NaN.
    pub fn nan_mask(&self) -> Vec<bool> {
        self.data.iter().map(|v| v.is_nan()).collect()
    }

    /// Rows in reverse order (top becomes bottom).
    pub fn flipped_vertical(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for y in (0..self.h).rev() {
            data.extend_from_slice(&self.data[y * self.w..(y + 1) * self.w]);
        }
        Self {
            w: self.w,
            h: self.h,
            data,
        }
    }
}

impl crate::raster::traits::RasterView for Raster {
    #[inline]
    fn width(&self) -> usize {
        self.w
    }
    #[inline]
    fn height(&self) -> usize {
        self.h
    }
    #[inline]
    fn row(&self, y: usize) -> &[f64] {
        let start = y * self.w;
        &self.data[start..start + self.w]
    }
    #[inline]
    fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

impl crate::raster::traits::RasterViewMut for Raster {
    #[inline]
    fn row_mut(&mut self, y: usize) -> &mut [f64] {
        let start = y * self.w;
        let end = start + self.w;
        &mut self.data[start..end]
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}
