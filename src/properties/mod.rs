//! Per-pixel scalar properties grouped by mode.
//!
//! A [`ModeTable`] holds named columns of length `N_x·N_y` in insertion
//! order; that order is the column order of the persisted property files.

pub mod io;

use crate::error::{Result, SspfmError};
use crate::types::{Grid, Mode};
use serde::Serialize;
use std::collections::BTreeMap;

/// Named per-pixel columns of one mode.
#[derive(Clone, Debug, Serialize)]
pub struct ModeTable {
    n_pixels: usize,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl ModeTable {
    pub fn new(n_pixels: usize) -> Self {
        Self {
            n_pixels,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn n_pixels(&self) -> usize {
        self.n_pixels
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Insert or replace a column. Shorter inputs are padded with NaN.
    pub fn insert(&mut self, name: &str, mut values: Vec<f64>) -> Result<()> {
        if values.len() > self.n_pixels {
            return Err(SspfmError::Geometry(format!(
                "property '{name}' has {} values for {} pixels",
                values.len(),
                self.n_pixels
            )));
        }
        values.resize(self.n_pixels, f64::NAN);
        match self.names.iter().position(|n| n == name) {
            Some(k) => self.columns[k] = values,
            None => {
                self.names.push(name.to_string());
                self.columns.push(values);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|k| self.columns[k].as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .zip(&self.columns)
            .map(|(n, c)| (n.as_str(), c.as_slice()))
    }

    /// Values of every column at `pixel`, in column order.
    pub fn row(&self, pixel: usize) -> Vec<f64> {
        self.columns
            .iter()
            .map(|c| c.get(pixel).copied().unwrap_or(f64::NAN))
            .collect()
    }

    /// Equality treating NaN as equal to NaN.
    pub fn same_as(&self, other: &ModeTable) -> bool {
        self.n_pixels == other.n_pixels
            && self.names == other.names
            && self.columns.iter().zip(&other.columns).all(|(a, b)| {
                a.iter()
                    .zip(b)
                    .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
            })
    }
}

/// Every mode's property table for one scan.
#[derive(Clone, Debug, Serialize)]
pub struct PropertyBundle {
    pub grid: Grid,
    modes: BTreeMap<Mode, ModeTable>,
}

impl PropertyBundle {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            modes: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, mode: Mode, name: &str, values: Vec<f64>) -> Result<()> {
        let n = self.grid.len();
        self.modes
            .entry(mode)
            .or_insert_with(|| ModeTable::new(n))
            .insert(name, values)
    }

    pub fn insert_table(&mut self, mode: Mode, table: ModeTable) -> Result<()> {
        if table.n_pixels != self.grid.len() {
            return Err(SspfmError::Geometry(format!(
                "{mode} table has {} rows for a {}x{} grid",
                table.n_pixels, self.grid.nx, self.grid.ny
            )));
        }
        self.modes.insert(mode, table);
        Ok(())
    }

    pub fn get(&self, mode: Mode, name: &str) -> Option<&[f64]> {
        self.modes.get(&mode)?.get(name)
    }

    pub fn table(&self, mode: Mode) -> Option<&ModeTable> {
        self.modes.get(&mode)
    }

    pub fn modes(&self) -> impl Iterator<Item = Mode> + '_ {
        self.modes.keys().copied()
    }

    pub fn same_as(&self, other: &PropertyBundle) -> bool {
        self.grid == other.grid
            && self.modes.len() == other.modes.len()
            && self
                .modes
                .iter()
                .all(|(m, t)| other.modes.get(m).is_some_and(|o| t.same_as(o)))
    }
}
