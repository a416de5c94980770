//! Mask construction.
//!
//! A criterion mask keeps the pixels whose reference value lies inside
//! `[v_min, v_max]` and excludes the others (NaN references included).
//! `revert` swaps kept and excluded pixels over the whole pixel universe.

use crate::error::{Result, SspfmError};
use crate::geometry::Mask;
use log::info;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

/// Pixels excluded by the window `[v_min, v_max]` on `reference`.
pub fn criterion_mask(reference: &[f64], v_min: f64, v_max: f64, revert: bool) -> Mask {
    let (lo, hi) = if v_min <= v_max { (v_min, v_max) } else { (v_max, v_min) };
    Mask::from_indices(
        reference
            .iter()
            .enumerate()
            .filter(|(_, v)| !(v.is_finite() && **v >= lo && **v <= hi))
            .map(|(i, _)| i),
    )
    .reverted_if(revert, reference.len())
}

/// Source of the excluded pixel set for a map run.
pub trait MaskPolicy {
    /// Mask over `reference.len()` pixels.
    fn build(&mut self, reference: &[f64]) -> Result<Mask>;
}

/// Explicit list of excluded pixels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListMask {
    pub indices: Vec<usize>,
    #[serde(default)]
    pub revert: bool,
}

impl MaskPolicy for ListMask {
    fn build(&mut self, reference: &[f64]) -> Result<Mask> {
        let n = reference.len();
        if let Some(bad) = self.indices.iter().find(|i| **i >= n) {
            return Err(SspfmError::Geometry(format!(
                "mask index {bad} outside 0..{n}"
            )));
        }
        Ok(Mask::from_indices(self.indices.iter().copied()).reverted_if(self.revert, n))
    }
}

/// Fixed value window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgrammaticMask {
    pub v_min: f64,
    pub v_max: f64,
    #[serde(default)]
    pub revert: bool,
}

impl MaskPolicy for ProgrammaticMask {
    fn build(&mut self, reference: &[f64]) -> Result<Mask> {
        Ok(criterion_mask(reference, self.v_min, self.v_max, self.revert))
    }
}

/// Answer of a [`BoundsPrompt`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PromptReply {
    Accept,
    Bounds(f64, f64),
    Cancel,
}

/// User interface asked for new window bounds.
pub trait BoundsPrompt {
    /// Show the current window and how many pixels it excludes.
    fn ask(&mut self, current: (f64, f64), excluded: usize, total: usize) -> Result<PromptReply>;
}

/// Window refined by a prompt until the user accepts it.
pub struct InteractiveMask<P: BoundsPrompt> {
    pub prompt: P,
    pub initial: (f64, f64),
    pub revert: bool,
}

impl<P: BoundsPrompt> MaskPolicy for InteractiveMask<P> {
    fn build(&mut self, reference: &[f64]) -> Result<Mask> {
        let mut bounds = self.initial;
        loop {
            let mask = criterion_mask(reference, bounds.0, bounds.1, self.revert);
            match self.prompt.ask(bounds, mask.len(), reference.len())? {
                PromptReply::Accept => {
                    info!(
                        "mask accepted: [{}, {}] excludes {} of {} pixels",
                        bounds.0,
                        bounds.1,
                        mask.len(),
                        reference.len()
                    );
                    return Ok(mask);
                }
                PromptReply::Bounds(lo, hi) => bounds = (lo, hi),
                PromptReply::Cancel => return Err(SspfmError::UserAbort),
            }
        }
    }
}

/// Line-based prompt: an empty line or `y` accepts, two numbers set new
/// bounds, `q` or end of input cancels.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> BoundsPrompt for LinePrompt<R, W> {
    fn ask(&mut self, current: (f64, f64), excluded: usize, total: usize) -> Result<PromptReply> {
        loop {
            write!(
                self.output,
                "window [{}, {}] excludes {excluded}/{total} pixels; accept [y], new bounds 'min max', or q: ",
                current.0, current.1
            )
            .and_then(|_| self.output.flush())
            .map_err(|e| SspfmError::io("Failed to write prompt", e))?;
            let mut line = String::new();
            let read = self
                .input
                .read_line(&mut line)
                .map_err(|e| SspfmError::io("Failed to read prompt answer", e))?;
            if read == 0 {
                return Ok(PromptReply::Cancel);
            }
            let answer = line.trim();
            match answer {
                "" | "y" | "yes" => return Ok(PromptReply::Accept),
                "q" | "quit" | "n" => return Ok(PromptReply::Cancel),
                _ => {}
            }
            let nums: Vec<f64> = answer
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect();
            if let &[lo, hi] = nums.as_slice() {
                return Ok(PromptReply::Bounds(lo, hi));
            }
        }
    }
}
