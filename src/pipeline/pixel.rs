//! Analysis of one pixel in every mode it was measured in.

use super::PipelineOptions;
use crate::best_loop;
use crate::electrostatic::{differential_fit, remove_slope, saturation_slope, DifferentialFit, SaturationSlope};
use crate::error::{Result, SspfmError};
use crate::hysteresis::{fit_loop, HystProperties, Hysteresis};
use crate::loops::{coupled_multi, LoopInputs, MultiLoop, Nanoloop};
use crate::phase::{is_counterclockwise, polarity};
use crate::segments::{Channel, PixelSegments};
use crate::stats::nan_mean;
use crate::types::{FieldState, Mode};
use log::{debug, trace};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Columns of the `other` mode.
pub const OTHER_NAMES: [&str; 2] = ["deflection", "height"];

/// Pipeline stage a pixel event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Loops,
    Fit,
    Electrostatic,
    /// On-field refit after the electrostatic slope is removed.
    Refit,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Loops => "loops",
            Stage::Fit => "fit",
            Stage::Electrostatic => "electrostatic",
            Stage::Refit => "refit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage for one pixel.
#[derive(Debug)]
pub struct StageEvent {
    pub stage: Stage,
    pub mode: Option<Mode>,
    pub error: Option<SspfmError>,
}

/// Property row and best loops of one pixel in one mode.
#[derive(Clone, Debug, Default)]
pub struct ModeResult {
    /// Values in [`columns`] order.
    pub values: Vec<f64>,
    pub best: Vec<Nanoloop>,
}

/// Deflection against write voltage, one point per segment.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ForceCurve {
    pub write_volt: Vec<f64>,
    pub deflection: Vec<f64>,
}

#[derive(Debug, Default)]
pub struct PixelResult {
    pub index: usize,
    pub modes: BTreeMap<Mode, ModeResult>,
    pub curve: Option<ForceCurve>,
    pub events: Vec<StageEvent>,
}

impl PixelResult {
    fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    fn record<T>(&mut self, stage: Stage, mode: Option<Mode>, res: Result<T>) -> Option<T> {
        match res {
            Ok(v) => {
                self.events.push(StageEvent {
                    stage,
                    mode,
                    error: None,
                });
                Some(v)
            }
            Err(e) => {
                trace!("pixel {} {stage} {mode:?}: {e}", self.index);
                self.events.push(StageEvent {
                    stage,
                    mode,
                    error: Some(e),
                });
                None
            }
        }
    }

    /// Result for a pixel whose segment table could not be read.
    pub fn unreadable(index: usize, err: SspfmError) -> Self {
        let mut out = Self::new(index);
        out.record::<()>(Stage::Read, None, Err(err));
        out
    }

    pub fn was_read(&self) -> bool {
        !self
            .events
            .iter()
            .any(|e| e.stage == Stage::Read && e.error.is_some())
    }
}

/// Property names of a mode, in column order.
pub fn columns(mode: Mode) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = match mode {
        Mode::Other => return OTHER_NAMES.to_vec(),
        _ => HystProperties::NAMES.to_vec(),
    };
    match mode {
        Mode::On => names.extend(SaturationSlope::NAMES),
        Mode::Coupled => names.extend(DifferentialFit::NAMES),
        _ => {}
    }
    names
}

/// Fitted loop of one mode: its hysteresis (if the fit converged) and the
/// property values.
struct Fitted {
    hysteresis: Option<Hysteresis>,
    values: Vec<f64>,
}

fn fit_values(out: &mut PixelResult, mode: Mode, nanoloop: &Nanoloop, opts: &PipelineOptions) -> Fitted {
    let th = &opts.hysteresis.thresholds;
    match out.record(Stage::Fit, Some(mode), fit_loop(nanoloop, &opts.hysteresis)) {
        Some(h) => {
            let values = h.properties(th).values(&h.params).to_vec();
            Fitted {
                hysteresis: Some(h),
                values,
            }
        }
        None => Fitted {
            hysteresis: None,
            values: HystProperties::nan_values().to_vec(),
        },
    }
}

fn select(out: &mut PixelResult, multi: &MultiLoop, opts: &PipelineOptions) -> Option<Vec<Nanoloop>> {
    let mode = multi.mode;
    let res = best_loop::select(multi, opts.analysis_mode, opts.del_1st_loop, &opts.hysteresis);
    out.record(Stage::Loops, Some(mode), res)
}

fn assemble(out: &mut PixelResult, segments: &PixelSegments, state: FieldState, opts: &PipelineOptions) -> Option<MultiLoop> {
    let record = segments.record(state);
    if record.segments.is_empty() {
        return None;
    }
    let inputs = LoopInputs {
        phase: &opts.phase,
        radians_input_phase: opts.radians_input_phase,
    };
    out.record(Stage::Loops, Some(state.mode()), crate::loops::assemble(&record, inputs))
        .map(|(multi, _)| multi)
}

/// Loop orientation sign; counterclockwise when the phase gives no answer.
fn loop_polarity(reference: Option<&Nanoloop>, opts: &PipelineOptions) -> f64 {
    let ccw = reference
        .and_then(|l| is_counterclockwise(&l.right.pha, opts.phase.pha_fwd, opts.phase.pha_rev))
        .unwrap_or(true);
    polarity(ccw, opts.grounded_tip)
}

/// Offset subtracted from the coupled loop: the off-field fit offset, or the
/// mean off-field response when the fit failed.
fn off_offset(off: Option<&(Vec<Nanoloop>, Option<Hysteresis>)>, opts: &PipelineOptions) -> f64 {
    if !opts.electrostatic.electrostatic_offset {
        return 0.0;
    }
    let Some((best, fit)) = off else {
        return 0.0;
    };
    fit.as_ref()
        .map(|h| h.params.offset)
        .filter(|o| o.is_finite())
        .or_else(|| best.first().map(|l| nan_mean(&l.piezorep())))
        .filter(|o| o.is_finite())
        .unwrap_or(0.0)
}

fn force_curve(segments: &PixelSegments) -> Option<ForceCurve> {
    let (write_volt, deflection): (Vec<f64>, Vec<f64>) = segments
        .segments
        .iter()
        .filter(|s| s.samples.get(Channel::Deflection).is_some())
        .map(|s| (s.tag.write_volt, s.mean(Channel::Deflection)))
        .unzip();
    deflection
        .iter()
        .any(|d| d.is_finite())
        .then_some(ForceCurve {
            write_volt,
            deflection,
        })
}

/// Properties of the on-field loop refitted with `slope` removed. A failed
/// refit is recorded as a `refit` stage failure.
fn refit_without_slope(
    out: &mut PixelResult,
    on_loop: &Nanoloop,
    slope: f64,
    opts: &PipelineOptions,
) -> Option<Vec<f64>> {
    let stripped = remove_slope(on_loop, slope);
    let h = out.record(Stage::Refit, Some(Mode::On), fit_loop(&stripped, &opts.hysteresis))?;
    Some(h.properties(&opts.hysteresis.thresholds).values(&h.params).to_vec())
}

/// Run every stage on one pixel's segments.
pub fn analyze(segments: &PixelSegments, opts: &PipelineOptions) -> PixelResult {
    let mut out = PixelResult::new(segments.index);
    out.events.push(StageEvent {
        stage: Stage::Read,
        mode: None,
        error: None,
    });

    let off_multi = assemble(&mut out, segments, FieldState::Off, opts);
    let on_multi = assemble(&mut out, segments, FieldState::On, opts);

    // Off field.
    let mut off_state = None;
    if let Some(multi) = &off_multi {
        if let Some(best) = select(&mut out, multi, opts) {
            let fitted = fit_values(&mut out, Mode::Off, &best[0], opts);
            out.modes.insert(
                Mode::Off,
                ModeResult {
                    values: fitted.values,
                    best: best.clone(),
                },
            );
            off_state = Some((best, fitted.hysteresis));
        }
    }

    let orientation_ref = off_state
        .as_ref()
        .and_then(|(best, _)| best.first())
        .cloned()
        .or_else(|| on_multi.as_ref().and_then(|m| m.loops.first().cloned()));
    let pol = loop_polarity(orientation_ref.as_ref(), opts);

    // On field: fit, estimate the electrostatic slope, refit without it.
    if let Some(multi) = &on_multi {
        if let Some(best) = select(&mut out, multi, opts) {
            let raw = fit_values(&mut out, Mode::On, &best[0], opts);
            let th = &opts.hysteresis.thresholds;
            let raw_props = raw.hysteresis.as_ref().map(|h| h.properties(th));
            let slope = saturation_slope(&best[0], raw_props.as_ref(), &opts.electrostatic, pol)
                .ok_or_else(|| SspfmError::Fit("no saturated domain for the electrostatic slope".to_string()));
            let mut values = raw.values;
            let slope = out.record(Stage::Electrostatic, Some(Mode::On), slope);
            match slope {
                Some(s) => {
                    match refit_without_slope(&mut out, &best[0], s.slope, opts) {
                        Some(v) => values = v,
                        None => debug!("pixel {}: on-field refit failed, raw fit kept", out.index),
                    }
                    values.extend(s.values());
                }
                None => values.extend([f64::NAN; 2]),
            }
            out.modes.insert(Mode::On, ModeResult { values, best });
        }
    }

    // Coupled: derived from on and off only.
    if let (Some(on), Some(off)) = (&on_multi, &off_multi) {
        let offset = off_offset(off_state.as_ref(), opts);
        if let Some(coupled) = out.record(Stage::Loops, Some(Mode::Coupled), coupled_multi(on, off, offset)) {
            if let Some(best) = select(&mut out, &coupled, opts) {
                let mut values = fit_values(&mut out, Mode::Coupled, &best[0], opts).values;
                let diff = differential_fit(&best[0], opts.electrostatic.diff_domain)
                    .ok_or_else(|| SspfmError::Fit("differential loop regression is undefined".to_string()));
                match out.record(Stage::Electrostatic, Some(Mode::Coupled), diff) {
                    Some(d) => values.extend(d.values()),
                    None => values.extend([f64::NAN; 4]),
                }
                out.modes.insert(Mode::Coupled, ModeResult { values, best });
            }
        }
    }

    let other = [
        segments.channel_mean(Channel::Deflection),
        segments.channel_mean(Channel::Height),
    ];
    if other.iter().any(|v| v.is_finite()) {
        out.modes.insert(
            Mode::Other,
            ModeResult {
                values: other.to_vec(),
                best: Vec::new(),
            },
        );
    }
    out.curve = force_curve(segments);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::{Branch, LoopOrigin};

    #[test]
    fn column_sets_per_mode() {
        assert_eq!(columns(Mode::Off).len(), HystProperties::NAMES.len());
        assert_eq!(columns(Mode::On).len(), HystProperties::NAMES.len() + 2);
        assert_eq!(columns(Mode::Coupled).len(), HystProperties::NAMES.len() + 4);
        assert_eq!(columns(Mode::Other), OTHER_NAMES.to_vec());
        assert!(columns(Mode::Coupled).contains(&"contact_potential"));
    }

    fn tanh_loop() -> Nanoloop {
        let up: Vec<f64> = (0..21).map(|i| -5.0 + 0.5 * i as f64).collect();
        let down: Vec<f64> = up.iter().rev().copied().collect();
        let branch = |volts: &[f64], x0: f64| Branch {
            write_volt: volts.to_vec(),
            piezorep: volts.iter().map(|v| (2.0 * (v - x0)).tanh() + 0.05 * v).collect(),
            ..Default::default()
        };
        Nanoloop {
            mode: Mode::On,
            read_volt: 0.0,
            origin: LoopOrigin::Cycle { cycle: 0 },
            right: branch(&up, 1.5),
            left: branch(&down, -1.5),
        }
    }

    #[test]
    fn failed_refit_is_reported() {
        let opts = PipelineOptions::default();
        let mut out = PixelResult::new(4);
        let values = refit_without_slope(&mut out, &tanh_loop(), 0.05, &opts).expect("refit");
        assert_eq!(values.len(), HystProperties::NAMES.len());
        assert!(out.events.last().is_some_and(|e| e.stage == Stage::Refit && e.error.is_none()));

        assert!(refit_without_slope(&mut out, &tanh_loop(), f64::NAN, &opts).is_none());
        let last = out.events.last().expect("event");
        assert_eq!((last.stage, last.mode), (Stage::Refit, Some(Mode::On)));
        assert!(last.error.is_some());
    }

    #[test]
    fn unreadable_pixel_is_marked() {
        let res = PixelResult::unreadable(3, SspfmError::parse(3, "truncated"));
        assert!(!res.was_read());
        assert!(res.modes.is_empty());
    }
}
