use crate::best_loop::AnalysisMode;
use crate::electrostatic::{ElectrostaticOptions, LockedSlope, SatMode};
use crate::hysteresis::{FitMethod, FitModel, HysteresisOptions, Thresholds};
use crate::phase::{PeakMethod, PhaFunc, PhaseCorrection, PhaseOptions};
use crate::segments::source::TableLayout;
use crate::segments::Channel;
use crate::signal::SegmentTrim;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Loader a parameter file asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractParameters {
    #[default]
    Json,
    Toml,
    Python,
}

/// Per-pixel analysis settings, one flat record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub extract_parameters: ExtractParameters,

    // Text reader.
    pub header_lines: usize,
    pub index_line_meas_name: usize,
    pub delimiter: String,
    pub key_measurement_extraction: BTreeMap<Channel, String>,
    pub segment_trim: SegmentTrim,

    // Phase.
    pub radians_input_phase: bool,
    pub pha_fwd: f64,
    pub pha_rev: f64,
    pub pha_corr: PhaseCorrection,
    pub pha_func: PhaFunc,
    pub histo_phase_method: PeakMethod,
    pub unipolar_phase_revert: bool,

    // Hysteresis.
    pub fit_model: FitModel,
    pub fit_method: FitMethod,
    pub asymmetric: bool,
    pub robust_fit: bool,
    pub inf_threshold: f64,
    pub sat_threshold: f64,
    pub max_iter: usize,

    // Best loop.
    pub analysis_mode: AnalysisMode,
    pub del_1st_loop: bool,

    // Electrostatics.
    pub electrostatic_offset: bool,
    pub diff_domain: Option<(f64, f64)>,
    pub sat_mode: SatMode,
    pub sat_domain: Option<(f64, f64)>,
    pub locked_elec_slope: Option<LockedSlope>,

    // Execution.
    pub multi_processing: bool,
    /// Worker threads; all cores when absent.
    pub workers: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let layout = TableLayout::default();
        let phase = PhaseOptions::default();
        let hyst = HysteresisOptions::default();
        Self {
            extract_parameters: ExtractParameters::Json,
            header_lines: layout.header_lines,
            index_line_meas_name: layout.index_line_meas_name,
            delimiter: layout.delimiter,
            key_measurement_extraction: layout.key_measurement_extraction,
            segment_trim: SegmentTrim::default(),
            radians_input_phase: false,
            pha_fwd: phase.pha_fwd,
            pha_rev: phase.pha_rev,
            pha_corr: phase.correction,
            pha_func: phase.func,
            histo_phase_method: phase.peak_method,
            unipolar_phase_revert: phase.unipolar_phase_revert,
            fit_model: hyst.model,
            fit_method: hyst.method,
            asymmetric: hyst.asymmetric,
            robust_fit: hyst.robust,
            inf_threshold: hyst.thresholds.inf_threshold,
            sat_threshold: hyst.thresholds.sat_threshold,
            max_iter: hyst.max_iter,
            analysis_mode: AnalysisMode::default(),
            del_1st_loop: false,
            electrostatic_offset: false,
            diff_domain: None,
            sat_mode: SatMode::Auto,
            sat_domain: None,
            locked_elec_slope: None,
            multi_processing: false,
            workers: None,
        }
    }
}

impl AnalysisConfig {
    pub fn table_layout(&self) -> TableLayout {
        TableLayout {
            header_lines: self.header_lines,
            index_line_meas_name: self.index_line_meas_name,
            delimiter: self.delimiter.clone(),
            key_measurement_extraction: self.key_measurement_extraction.clone(),
        }
    }

    pub fn phase_options(&self) -> PhaseOptions {
        PhaseOptions {
            pha_fwd: self.pha_fwd,
            pha_rev: self.pha_rev,
            correction: self.pha_corr,
            peak_method: self.histo_phase_method,
            func: self.pha_func,
            unipolar_phase_revert: self.unipolar_phase_revert,
            ..PhaseOptions::default()
        }
    }

    pub fn hysteresis_options(&self) -> HysteresisOptions {
        HysteresisOptions {
            model: self.fit_model,
            asymmetric: self.asymmetric,
            method: self.fit_method,
            robust: self.robust_fit,
            thresholds: Thresholds {
                inf_threshold: self.inf_threshold,
                sat_threshold: self.sat_threshold,
            },
            max_iter: self.max_iter,
        }
    }

    pub fn electrostatic_options(&self) -> ElectrostaticOptions {
        ElectrostaticOptions {
            electrostatic_offset: self.electrostatic_offset,
            diff_domain: self.diff_domain,
            sat_mode: self.sat_mode,
            sat_domain: self.sat_domain,
            locked_elec_slope: self.locked_elec_slope,
        }
    }
}
