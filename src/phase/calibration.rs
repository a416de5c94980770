use super::histogram::PhaseHistogram;
use crate::angle::{circular_distance, circular_mean, signed_difference, wrap_deg, wrap_deg_positive};
use log::debug;
use serde::{Deserialize, Serialize};

/// Phase correction applied before computing piezoresponse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseCorrection {
    Raw,
    Offset,
    #[default]
    Affine,
    UpDown,
}

/// Histogram peak picker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakMethod {
    #[default]
    Fit,
    Max,
}

/// Projection used for piezoresponse = amplitude · f(phase).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaFunc {
    #[default]
    Cos,
    Sin,
}

impl PhaFunc {
    pub fn eval(self, phase_deg: f64) -> f64 {
        match self {
            PhaFunc::Cos => phase_deg.to_radians().cos(),
            PhaFunc::Sin => phase_deg.to_radians().sin(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhaseOptions {
    /// Target phase of the forward polarization state.
    pub pha_fwd: f64,
    /// Target phase of the reverse polarization state.
    pub pha_rev: f64,
    pub correction: PhaseCorrection,
    pub peak_method: PeakMethod,
    pub func: PhaFunc,
    /// Swap which peak is sent to which target.
    pub unipolar_phase_revert: bool,
    pub num_bins: usize,
    /// Minimum distance between the two histogram peaks.
    pub min_separation_deg: f64,
    /// Half window of samples used by the `fit` peak picker.
    pub fit_half_window_deg: f64,
}

impl Default for PhaseOptions {
    fn default() -> Self {
        Self {
            pha_fwd: 0.0,
            pha_rev: 180.0,
            correction: PhaseCorrection::Affine,
            peak_method: PeakMethod::Fit,
            func: PhaFunc::Cos,
            unipolar_phase_revert: false,
            num_bins: 72,
            min_separation_deg: 60.0,
            fit_half_window_deg: 30.0,
        }
    }
}

/// Peaks of a phase histogram, dominant first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PhasePeaks {
    pub first: f64,
    pub second: Option<f64>,
}

/// Locate the one or two phase states present in `samples`.
pub fn find_peaks(samples: &[f64], opts: &PhaseOptions) -> Option<PhasePeaks> {
    let mut hist = PhaseHistogram::from_samples(samples, opts.num_bins);
    hist.smooth_121();
    let (first, second) = hist.find_two_peaks(opts.min_separation_deg)?;
    let pick = |bin: usize| match opts.peak_method {
        PeakMethod::Max => hist.center(bin),
        PeakMethod::Fit => hist.refined_peak(samples, bin, opts.fit_half_window_deg),
    };
    Some(PhasePeaks {
        first: pick(first),
        second: second.map(pick),
    })
}

#[derive(Clone, Debug, PartialEq)]
enum PhaseMap {
    Identity,
    Shift(f64),
    /// Linear map on the arc unwrapped around `center`.
    Affine {
        center: f64,
        from: f64,
        to: f64,
        scale: f64,
    },
    /// Hard assignment of each peak's basin to a target.
    Quantize(Vec<(f64, f64)>),
}

/// Phase correction derived from one pixel's (or a pooled) phase histogram.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseCalibration {
    map: PhaseMap,
    frame_low: f64,
    pub peaks: Option<PhasePeaks>,
}

impl PhaseCalibration {
    pub fn identity(opts: &PhaseOptions) -> Self {
        Self {
            map: PhaseMap::Identity,
            frame_low: frame_low(opts),
            peaks: None,
        }
    }

    /// Build the correction for `samples` (degrees). Without any finite
    /// sample the correction falls back to identity.
    pub fn from_samples(samples: &[f64], opts: &PhaseOptions) -> Self {
        if opts.correction == PhaseCorrection::Raw {
            return Self::identity(opts);
        }
        let Some(peaks) = find_peaks(samples, opts) else {
            debug!("phase calibration: empty histogram, using identity");
            return Self::identity(opts);
        };
        let (fwd, rev) = (opts.pha_fwd, opts.pha_rev);
        // Targets of the peaks sitting nearest pha_fwd / pha_rev.
        let (to_fwd, to_rev) = if opts.unipolar_phase_revert {
            (rev, fwd)
        } else {
            (fwd, rev)
        };
        let offset = PhaseMap::Shift(signed_difference(to_fwd, peaks.first));
        let map = match (opts.correction, peaks.second) {
            (PhaseCorrection::Raw, _) => PhaseMap::Identity,
            (PhaseCorrection::Offset, _) => offset,
            (PhaseCorrection::Affine, Some(second)) => {
                let (p_fwd, p_rev) = assign(peaks.first, second, fwd, rev);
                affine(p_fwd, p_rev, to_fwd, to_rev).unwrap_or(offset)
            }
            (PhaseCorrection::Affine, None) => {
                debug!("phase calibration: single peak, affine reduced to offset");
                offset
            }
            (PhaseCorrection::UpDown, Some(second)) => {
                let (p_fwd, p_rev) = assign(peaks.first, second, fwd, rev);
                PhaseMap::Quantize(vec![(p_fwd, to_fwd), (p_rev, to_rev)])
            }
            (PhaseCorrection::UpDown, None) => {
                PhaseMap::Quantize(vec![(fwd, to_fwd), (rev, to_rev)])
            }
        };
        Self {
            map,
            frame_low: frame_low(opts),
            peaks: Some(peaks),
        }
    }

    /// Corrected phase in degrees, expressed in the frame
    /// `[min(fwd, rev) − 90, min(fwd, rev) + 270)`.
    pub fn apply(&self, phase: f64) -> f64 {
        if !phase.is_finite() {
            return f64::NAN;
        }
        let corrected = match &self.map {
            PhaseMap::Identity => return phase,
            PhaseMap::Shift(delta) => phase + delta,
            PhaseMap::Affine {
                center,
                from,
                to,
                scale,
            } => {
                let x = center + wrap_deg(phase - center);
                to + (x - from) * scale
            }
            PhaseMap::Quantize(pairs) => pairs
                .iter()
                .min_by(|a, b| {
                    circular_distance(phase, a.0).total_cmp(&circular_distance(phase, b.0))
                })
                .map(|p| p.1)
                .unwrap_or(phase),
        };
        self.frame_low + wrap_deg_positive(corrected - self.frame_low)
    }

    pub fn apply_all(&self, phases: &[f64]) -> Vec<f64> {
        phases.iter().map(|&p| self.apply(p)).collect()
    }
}

fn frame_low(opts: &PhaseOptions) -> f64 {
    opts.pha_fwd.min(opts.pha_rev) - 90.0
}

/// Pair peaks with targets so the total circular distance is smallest.
fn assign(a: f64, b: f64, fwd: f64, rev: f64) -> (f64, f64) {
    let straight = circular_distance(a, fwd) + circular_distance(b, rev);
    let crossed = circular_distance(a, rev) + circular_distance(b, fwd);
    if crossed < straight {
        (b, a)
    } else {
        (a, b)
    }
}

fn affine(p_fwd: f64, p_rev: f64, fwd: f64, rev: f64) -> Option<PhaseMap> {
    let dp = signed_difference(p_rev, p_fwd);
    if dp.abs() < 1e-9 {
        return None;
    }
    let mut dt = signed_difference(rev, fwd);
    if (dt.abs() - 180.0).abs() < 1e-9 {
        dt = 180.0 * dp.signum();
    }
    if dt.abs() < 1e-9 {
        return None;
    }
    Some(PhaseMap::Affine {
        center: p_fwd + dp / 2.0,
        from: p_fwd,
        to: fwd,
        scale: dt / dp,
    })
}

/// Signed piezoresponse of one sample.
#[inline]
pub fn piezoresponse(amp: f64, phase_deg: f64, func: PhaFunc) -> f64 {
    amp.abs() * func.eval(phase_deg)
}

/// Whether the ascending branch travels from the forward state to the
/// reverse state. `ascending_phase` is ordered by increasing write voltage.
pub fn is_counterclockwise(ascending_phase: &[f64], pha_fwd: f64, pha_rev: f64) -> Option<bool> {
    let finite: Vec<f64> = ascending_phase.iter().copied().filter(|p| p.is_finite()).collect();
    if finite.len() < 2 {
        return None;
    }
    let third = (finite.len() / 3).max(1);
    let start = circular_mean(&finite[..third], None)?;
    let end = circular_mean(&finite[finite.len() - third..], None)?;
    let start_fwd = circular_distance(start, pha_fwd) < circular_distance(start, pha_rev);
    let end_rev = circular_distance(end, pha_rev) < circular_distance(end, pha_fwd);
    if start_fwd == end_rev {
        Some(start_fwd)
    } else {
        None
    }
}

/// Sign applied to electrostatic slopes: +1 when the loop orientation agrees
/// with the tip grounding, −1 otherwise.
#[inline]
pub fn polarity(counterclockwise: bool, grounded_tip: bool) -> f64 {
    if counterclockwise == grounded_tip {
        1.0
    } else {
        -1.0
    }
}
