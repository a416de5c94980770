use serde::{Deserialize, Serialize};
use std::fmt;

/// Measurement mode a per-pixel property or loop belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Off,
    On,
    Coupled,
    Other,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Off, Mode::On, Mode::Coupled, Mode::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::On => "on",
            Mode::Coupled => "coupled",
            Mode::Other => "other",
        }
    }

    pub fn parse(name: &str) -> Option<Mode> {
        match name.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Mode::Off),
            "on" => Some(Mode::On),
            "coupled" => Some(Mode::Coupled),
            "other" => Some(Mode::Other),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the bias was applied while the segment was measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldState {
    On,
    Off,
}

impl FieldState {
    pub fn mode(self) -> Mode {
        match self {
            FieldState::On => Mode::On,
            FieldState::Off => Mode::Off,
        }
    }
}

/// Sweep direction of the write voltage when the segment was acquired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Write voltage increasing.
    Forward,
    /// Write voltage decreasing.
    Reverse,
}

/// Scan grid in pixels, with optional physical size in microns.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub nx: usize,
    pub ny: usize,
    #[serde(default)]
    pub lx_um: Option<f64>,
    #[serde(default)]
    pub ly_um: Option<f64>,
}

impl Grid {
    pub fn new(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            lx_um: None,
            ly_um: None,
        }
    }

    pub fn with_microns(mut self, lx_um: f64, ly_um: f64) -> Self {
        self.lx_um = Some(lx_um);
        self.ly_um = Some(ly_um);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (col, row) of pixel `index` in acquisition order.
    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.nx, index / self.nx)
    }

    /// Physical (x, y) position of pixel `index` on the sample, y counted from
    /// the bottom of the scan.
    ///
    /// The linear index is the acquisition rank; odd rows are traversed
    /// right-to-left so their x position is mirrored.
    pub fn physical_coords(&self, index: usize) -> (usize, usize) {
        let (col, row) = self.coords(index);
        let x = if row % 2 == 1 { self.nx - 1 - col } else { col };
        (x, row)
    }
}
