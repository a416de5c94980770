//! Machine-readable record of a pipeline run.
//!
//! Each stage reports how many pixels it processed and how many failed, with
//! a sample of the failure messages. `RunReport` is written next to the
//! property files as `report.json`.

pub mod timing;

pub use timing::{elapsed_ms, StageTiming, TimingBreakdown};

use crate::error::SspfmError;
use crate::types::Mode;
use log::{info, warn};
use serde::Serialize;

/// Failure messages kept per stage.
const MAX_FAILURE_SAMPLES: usize = 16;

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    pub processed: usize,
    pub failed: usize,
    /// `(pixel, message)` of the first failures.
    pub failures: Vec<(usize, String)>,
}

impl StageReport {
    pub fn new(stage: impl Into<String>, mode: Option<Mode>) -> Self {
        Self {
            stage: stage.into(),
            mode,
            ..Default::default()
        }
    }

    pub fn ok(&mut self) {
        self.processed += 1;
    }

    pub fn fail(&mut self, pixel: usize, err: &SspfmError) {
        self.processed += 1;
        self.failed += 1;
        if self.failures.len() < MAX_FAILURE_SAMPLES {
            self.failures.push((pixel, err.to_string()));
        }
    }

    /// Log the stage summary: info when clean, warn otherwise.
    pub fn log(&self) {
        let mode = self.mode.map(|m| format!(" [{m}]")).unwrap_or_default();
        if self.failed == 0 {
            info!("{}{mode}: {} pixels", self.stage, self.processed);
        } else {
            warn!(
                "{}{mode}: {} of {} pixels failed (first: {:?})",
                self.stage,
                self.failed,
                self.processed,
                self.failures.first()
            );
        }
    }
}

/// Everything a run reports besides its output tables.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub n_pixels: usize,
    pub measured_pixels: usize,
    pub stages: Vec<StageReport>,
    pub timings: TimingBreakdown,
    /// Notes such as skipped cluster modes.
    pub notes: Vec<String>,
}

impl RunReport {
    pub fn stage(&self, name: &str, mode: Option<Mode>) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name && s.mode == mode)
    }

    pub fn total_failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_counted_and_sampled() {
        let mut stage = StageReport::new("fit", Some(Mode::Off));
        stage.ok();
        for p in 0..20 {
            stage.fail(p, &SspfmError::Fit("diverged".into()));
        }
        assert_eq!(stage.processed, 21);
        assert_eq!(stage.failed, 20);
        assert_eq!(stage.failures.len(), MAX_FAILURE_SAMPLES);
        let json = serde_json::to_value(&stage).expect("json");
        assert_eq!(json["mode"], "off");
        assert!(json.get("failures").is_some());
    }

    #[test]
    fn timing_accumulates_total() {
        let mut t = TimingBreakdown::default();
        let v = t.time("stage", || 3);
        t.push("other", 2.0);
        assert_eq!(v, 3);
        assert_eq!(t.stages.len(), 2);
        assert!(t.total_ms >= 2.0);
    }
}
