//! Nanoloops: piezoresponse versus write voltage for one pixel.
//!
//! The right half-branch is the ascending sweep (index 0 at V_min), the left
//! half-branch the descending sweep (index 0 at V_max). A loop is either a
//! single measured cycle or the pointwise mean of several cycles; the kind is
//! carried by [`LoopOrigin`].

pub mod assembly;

pub use assembly::{assemble, coupled_loop, coupled_multi, LoopInputs};

use crate::angle::circular_mean;
use crate::error::{Result, SspfmError};
use crate::stats::nan_mean;
use crate::types::Mode;
use serde::Serialize;

/// What a loop was built from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopOrigin {
    /// One measured cycle.
    Cycle { cycle: usize },
    /// Pointwise mean over `n_cycles` cycles.
    Mean { n_cycles: usize },
}

/// One half-branch of a loop.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Branch {
    pub write_volt: Vec<f64>,
    pub piezorep: Vec<f64>,
    pub amp: Vec<f64>,
    /// Corrected phase, degrees.
    pub pha: Vec<f64>,
}

impl Branch {
    pub fn len(&self) -> usize {
        self.write_volt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.write_volt.is_empty()
    }

    fn same_axis(&self, other: &Branch) -> bool {
        self.len() == other.len()
            && self
                .write_volt
                .iter()
                .zip(&other.write_volt)
                .all(|(a, b)| (a - b).abs() <= 1e-9 * (1.0 + a.abs()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Nanoloop {
    pub mode: Mode,
    pub read_volt: f64,
    pub origin: LoopOrigin,
    pub right: Branch,
    pub left: Branch,
}

impl Nanoloop {
    pub fn write_volt_right(&self) -> &[f64] {
        &self.right.write_volt
    }

    pub fn write_volt_left(&self) -> &[f64] {
        &self.left.write_volt
    }

    pub fn piezorep_right(&self) -> &[f64] {
        &self.right.piezorep
    }

    pub fn piezorep_left(&self) -> &[f64] {
        &self.left.piezorep
    }

    /// Concatenated write voltages, right branch first.
    pub fn write_volt(&self) -> Vec<f64> {
        [self.right.write_volt.as_slice(), self.left.write_volt.as_slice()].concat()
    }

    /// Concatenated piezoresponse, right branch first.
    pub fn piezorep(&self) -> Vec<f64> {
        [self.right.piezorep.as_slice(), self.left.piezorep.as_slice()].concat()
    }

    pub fn amp(&self) -> Vec<f64> {
        [self.right.amp.as_slice(), self.left.amp.as_slice()].concat()
    }

    pub fn pha(&self) -> Vec<f64> {
        [self.right.pha.as_slice(), self.left.pha.as_slice()].concat()
    }

    pub fn len(&self) -> usize {
        self.right.len() + self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both loops share the write-voltage axis pointwise.
    pub fn same_axis(&self, other: &Nanoloop) -> bool {
        self.right.same_axis(&other.right) && self.left.same_axis(&other.left)
    }

    /// Pointwise mean of loops sharing one axis. Phase uses the circular mean.
    pub fn mean_of(loops: &[&Nanoloop]) -> Result<Nanoloop> {
        let first = loops
            .first()
            .ok_or_else(|| SspfmError::Fit("mean of zero loops".to_string()))?;
        if let Some(bad) = loops.iter().find(|l| !l.same_axis(first)) {
            return Err(SspfmError::Fit(format!(
                "cycles do not share a write-voltage axis ({} vs {} points)",
                bad.len(),
                first.len()
            )));
        }
        Ok(Nanoloop {
            mode: first.mode,
            read_volt: first.read_volt,
            origin: LoopOrigin::Mean {
                n_cycles: loops.len(),
            },
            right: mean_branch(&loops.iter().map(|l| &l.right).collect::<Vec<_>>()),
            left: mean_branch(&loops.iter().map(|l| &l.left).collect::<Vec<_>>()),
        })
    }
}

fn mean_branch(branches: &[&Branch]) -> Branch {
    let Some(base) = branches.first() else {
        return Branch::default();
    };
    let mut out = Branch {
        write_volt: base.write_volt.clone(),
        ..Default::default()
    };
    for k in 0..base.len() {
        let piezo: Vec<f64> = branches.iter().map(|b| b.piezorep[k]).collect();
        let amp: Vec<f64> = branches.iter().map(|b| b.amp[k]).collect();
        let pha: Vec<f64> = branches.iter().map(|b| b.pha[k]).collect();
        out.piezorep.push(nan_mean(&piezo));
        out.amp.push(nan_mean(&amp));
        out.pha.push(circular_mean(&pha, None).unwrap_or(f64::NAN));
    }
    out
}

/// All single-cycle loops of one pixel in one mode, in acquisition order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MultiLoop {
    pub mode: Mode,
    pub loops: Vec<Nanoloop>,
}

impl MultiLoop {
    /// Distinct read voltages in order of first appearance.
    pub fn read_voltages(&self) -> Vec<f64> {
        let mut out: Vec<f64> = Vec::new();
        for l in &self.loops {
            if !out.iter().any(|v| (v - l.read_volt).abs() <= 1e-12) {
                out.push(l.read_volt);
            }
        }
        out
    }

    /// Cycles measured at `read_volt`, in cycle order.
    pub fn at_read(&self, read_volt: f64) -> Vec<&Nanoloop> {
        self.loops
            .iter()
            .filter(|l| (l.read_volt - read_volt).abs() <= 1e-12)
            .collect()
    }

    pub fn is_single_cycle(&self) -> bool {
        self.loops.len() == 1
    }

    /// Mean over every cycle of every read voltage.
    pub fn mean_loop(&self) -> Result<Nanoloop> {
        let all: Vec<&Nanoloop> = self.loops.iter().collect();
        Nanoloop::mean_of(&all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(cycle: usize, shift: f64, pha: f64) -> Nanoloop {
        let branch = |v: Vec<f64>| Branch {
            piezorep: v.iter().map(|x| x + shift).collect(),
            amp: vec![1.0; v.len()],
            pha: vec![pha; v.len()],
            write_volt: v,
        };
        Nanoloop {
            mode: Mode::Off,
            read_volt: 0.0,
            origin: LoopOrigin::Cycle { cycle },
            right: branch(vec![-1.0, 0.0, 1.0]),
            left: branch(vec![1.0, 0.0, -1.0]),
        }
    }

    #[test]
    fn mean_loop_is_pointwise() {
        let multi = MultiLoop {
            mode: Mode::Off,
            loops: vec![cycle(0, 0.0, 350.0), cycle(1, 2.0, 10.0)],
        };
        let mean = multi.mean_loop().expect("mean");
        assert_eq!(mean.origin, LoopOrigin::Mean { n_cycles: 2 });
        assert_eq!(mean.piezorep_right(), &[0.0, 1.0, 2.0]);
        assert_eq!(mean.write_volt_left(), &[1.0, 0.0, -1.0]);
        assert!(mean.right.pha[0].abs() < 1e-9, "circular mean of 350 and 10");
    }

    #[test]
    fn mismatched_axes_are_rejected() {
        let mut other = cycle(1, 0.0, 0.0);
        other.right.write_volt[1] = 0.5;
        let a = cycle(0, 0.0, 0.0);
        assert!(Nanoloop::mean_of(&[&a, &other]).is_err());
    }
}
