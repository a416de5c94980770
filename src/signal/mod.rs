//! SSPFM bias schedule.
//!
//! Builds the write/read voltage sequence from the measurement sheet and the
//! ordered list of segment tags it implies: for every read voltage and cycle,
//! each write step yields an on-field segment (bias applied) followed by an
//! off-field segment (bias back at the read level).

pub mod segmenter;

pub use segmenter::{cut_segments, SegmentTrim};

use crate::error::{Result, SspfmError};
use crate::segments::SegmentTag;
use crate::stats::linspace;
use crate::types::{Direction, FieldState};
use serde::{Deserialize, Serialize};

/// Order in which one write cycle visits the voltage range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// V_min → V_max → V_min
    #[default]
    LowToHigh,
    /// V_max → V_min → V_max
    HighToLow,
    /// 0 → V_max → V_min → 0
    ZeroUp,
    /// 0 → V_min → V_max → 0
    ZeroDown,
}

/// Order of the read voltages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// One read voltage (`min_volt_read`).
    #[default]
    Single,
    LowToHigh,
    HighToLow,
}

/// Bias parameters of the measurement sheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SspfmBias {
    pub min_volt_write: f64,
    pub max_volt_write: f64,
    /// Write voltages per half cycle (both sweep ends included).
    pub nb_volt_write: usize,
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default)]
    pub min_volt_read: f64,
    #[serde(default)]
    pub max_volt_read: f64,
    #[serde(default = "default_one")]
    pub nb_volt_read: usize,
    #[serde(default)]
    pub read_mode: ReadMode,
    /// Write cycles per read voltage.
    #[serde(default = "default_one")]
    pub nb_cycles: usize,
    /// Samples acquired during each on-field (write) segment.
    pub samples_write: usize,
    /// Samples acquired during each off-field (read) segment.
    pub samples_read: usize,
}

fn default_one() -> usize {
    1
}

impl SspfmBias {
    pub fn validate(&self) -> Result<()> {
        if self.nb_volt_write < 2 {
            return Err(SspfmError::Config(
                "nb_volt_write must be at least 2".to_string(),
            ));
        }
        if self.max_volt_write <= self.min_volt_write {
            return Err(SspfmError::Config(format!(
                "max_volt_write ({}) must exceed min_volt_write ({})",
                self.max_volt_write, self.min_volt_write
            )));
        }
        if self.nb_volt_read == 0 || self.nb_cycles == 0 {
            return Err(SspfmError::Config(
                "nb_volt_read and nb_cycles must be positive".to_string(),
            ));
        }
        if self.samples_write == 0 && self.samples_read == 0 {
            return Err(SspfmError::Config(
                "segments need at least one sample".to_string(),
            ));
        }
        Ok(())
    }

    /// Write voltages of one cycle with their sweep direction.
    pub fn write_sequence(&self) -> Vec<(f64, Direction)> {
        let n = self.nb_volt_write;
        let up: Vec<(f64, Direction)> = linspace(self.min_volt_write, self.max_volt_write, n)
            .into_iter()
            .map(|v| (v, Direction::Forward))
            .collect();
        let down: Vec<(f64, Direction)> = linspace(self.max_volt_write, self.min_volt_write, n)
            .into_iter()
            .map(|v| (v, Direction::Reverse))
            .collect();
        match self.write_mode {
            WriteMode::LowToHigh => [up, down].concat(),
            WriteMode::HighToLow => [down, up].concat(),
            WriteMode::ZeroUp => {
                let i0 = up.iter().position(|(v, _)| *v >= 0.0).unwrap_or(0);
                [&up[i0..], &down[..], &up[..i0]].concat()
            }
            WriteMode::ZeroDown => {
                let j0 = down.iter().position(|(v, _)| *v <= 0.0).unwrap_or(0);
                [&down[j0..], &up[..], &down[..j0]].concat()
            }
        }
    }

    pub fn read_voltages(&self) -> Vec<f64> {
        match self.read_mode {
            ReadMode::Single => vec![self.min_volt_read],
            ReadMode::LowToHigh => linspace(self.min_volt_read, self.max_volt_read, self.nb_volt_read),
            ReadMode::HighToLow => linspace(self.max_volt_read, self.min_volt_read, self.nb_volt_read),
        }
    }

    /// Segment tags in acquisition order.
    pub fn segment_plan(&self) -> Vec<SegmentTag> {
        let sequence = self.write_sequence();
        let mut plan = Vec::new();
        for read_volt in self.read_voltages() {
            for cycle in 0..self.nb_cycles {
                for &(write_volt, direction) in &sequence {
                    for state in [FieldState::On, FieldState::Off] {
                        plan.push(SegmentTag {
                            write_volt,
                            read_volt,
                            state,
                            direction,
                            cycle,
                        });
                    }
                }
            }
        }
        plan
    }

    /// Samples of a segment measured in `state`.
    pub fn samples_for(&self, state: FieldState) -> usize {
        match state {
            FieldState::On => self.samples_write,
            FieldState::Off => self.samples_read,
        }
    }

    /// Total samples one pixel measurement must contain.
    pub fn samples_per_pixel(&self) -> usize {
        self.segment_plan()
            .iter()
            .map(|t| self.samples_for(t.state))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bias(mode: WriteMode) -> SspfmBias {
        SspfmBias {
            min_volt_write: -2.0,
            max_volt_write: 2.0,
            nb_volt_write: 5,
            write_mode: mode,
            min_volt_read: 0.0,
            max_volt_read: 0.0,
            nb_volt_read: 1,
            read_mode: ReadMode::Single,
            nb_cycles: 2,
            samples_write: 4,
            samples_read: 3,
        }
    }

    #[test]
    fn low_to_high_cycle_covers_both_branches() {
        let seq = bias(WriteMode::LowToHigh).write_sequence();
        let volts: Vec<f64> = seq.iter().map(|s| s.0).collect();
        assert_eq!(volts, vec![-2.0, -1.0, 0.0, 1.0, 2.0, 2.0, 1.0, 0.0, -1.0, -2.0]);
        assert_eq!(seq[4].1, Direction::Forward);
        assert_eq!(seq[5].1, Direction::Reverse);
    }

    #[test]
    fn zero_up_starts_at_zero_and_keeps_point_count() {
        let seq = bias(WriteMode::ZeroUp).write_sequence();
        assert_eq!(seq.len(), 10);
        assert_eq!(seq[0], (0.0, Direction::Forward));
        assert_eq!(seq.last().copied(), Some((-1.0, Direction::Forward)));
    }

    #[test]
    fn plan_alternates_on_and_off_segments() {
        let b = bias(WriteMode::LowToHigh);
        let plan = b.segment_plan();
        assert_eq!(plan.len(), 2 * 10 * 2);
        assert_eq!(plan[0].state, FieldState::On);
        assert_eq!(plan[1].state, FieldState::Off);
        assert_eq!(plan[20].cycle, 1);
        assert_eq!(b.samples_per_pixel(), 20 * 4 + 20 * 3);
    }
}
