//! Per-pixel driver turning a segment source into property tables.
//!
//! # Algorithm Outline
//! 1. Check the measured pixel count against the scan grid.
//! 2. For every pixel (in parallel when enabled): read the segment table,
//!    assemble the off-field and on-field loops, derive the coupled loop,
//!    select the best loops, fit them and decouple the electrostatic slope.
//! 3. Collate results in pixel-index order; failed or missing pixels become
//!    NaN rows.
//! 4. Summarize every stage in a [`RunReport`].

pub mod pixel;
pub mod vectors;

pub use pixel::{analyze, columns, ForceCurve, ModeResult, PixelResult, Stage, StageEvent, OTHER_NAMES};
pub use vectors::{coupled_vectors, curve_vectors, loop_vectors, ClusterVectors};

use crate::best_loop::AnalysisMode;
use crate::config::{AnalysisConfig, LoopChannel, ScanMetadata};
use crate::diagnostics::{RunReport, StageReport, TimingBreakdown};
use crate::electrostatic::ElectrostaticOptions;
use crate::error::Result;
use crate::geometry::validate_length;
use crate::hysteresis::HysteresisOptions;
use crate::loops::Nanoloop;
use crate::phase::PhaseOptions;
use crate::properties::{ModeTable, PropertyBundle};
use crate::segments::SegmentSource;
use crate::types::{Grid, Mode};
use log::{info, warn};
use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Everything the per-pixel stages need, resolved once per run.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub phase: PhaseOptions,
    pub hysteresis: HysteresisOptions,
    pub electrostatic: ElectrostaticOptions,
    pub analysis_mode: AnalysisMode,
    pub del_1st_loop: bool,
    pub radians_input_phase: bool,
    pub grounded_tip: bool,
    pub multi_processing: bool,
    pub workers: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default(), false)
    }
}

impl PipelineOptions {
    pub fn new(cfg: &AnalysisConfig, grounded_tip: bool) -> Self {
        Self {
            phase: cfg.phase_options(),
            hysteresis: cfg.hysteresis_options(),
            electrostatic: cfg.electrostatic_options(),
            analysis_mode: cfg.analysis_mode,
            del_1st_loop: cfg.del_1st_loop,
            radians_input_phase: cfg.radians_input_phase,
            grounded_tip,
            multi_processing: cfg.multi_processing,
            workers: cfg.workers,
        }
    }

    pub fn from_config(cfg: &AnalysisConfig, meta: &ScanMetadata) -> Self {
        Self::new(cfg, meta.grounded_tip)
    }
}

/// Collated output of a run.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub bundle: PropertyBundle,
    /// Best loops per mode, one entry per grid pixel (empty when missing).
    pub best_loops: BTreeMap<Mode, Vec<Vec<Nanoloop>>>,
    /// Force curves per grid pixel.
    pub curves: Vec<Option<ForceCurve>>,
    pub report: RunReport,
}

impl PipelineOutput {
    /// `(pixel, voltage, piezoresponse)` rows of the best loops of `mode`.
    pub fn loop_rows(&self, mode: Mode) -> Vec<(usize, Vec<f64>, Vec<f64>)> {
        self.best_loops
            .get(&mode)
            .map(|pixels| {
                pixels
                    .iter()
                    .enumerate()
                    .flat_map(|(i, loops)| loops.iter().map(move |l| (i, l.write_volt(), l.piezorep())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn best_of(output: &PipelineOutput, mode: Mode) -> &[Vec<Nanoloop>] {
    output
        .best_loops
        .get(&mode)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Clustering input of `mode`: best loops for the loop modes, force curves
/// for `other`. Coupled rows subtract the off-field fit offset when
/// `electrostatic_offset` is set.
pub fn mode_vectors(
    output: &PipelineOutput,
    mode: Mode,
    channels: &[LoopChannel],
    relative: bool,
    electrostatic_offset: bool,
) -> ClusterVectors {
    match mode {
        Mode::Other => curve_vectors(&output.curves, relative),
        Mode::Coupled => {
            let offsets: Option<Vec<f64>> = if electrostatic_offset {
                output.bundle.get(Mode::Off, "offset").map(|o| {
                    o.iter()
                        .map(|v| if v.is_finite() { -v } else { 0.0 })
                        .collect()
                })
            } else {
                None
            };
            coupled_vectors(
                best_of(output, Mode::On),
                best_of(output, Mode::Off),
                channels,
                offsets.as_deref(),
                relative,
            )
        }
        m => loop_vectors(best_of(output, m), channels, relative),
    }
}

fn analyze_index<S: SegmentSource + ?Sized>(source: &S, index: usize, opts: &PipelineOptions) -> PixelResult {
    match source.read_pixel(index) {
        Ok(mut segments) => {
            segments.index = index;
            analyze(&segments, opts)
        }
        Err(e) => PixelResult::unreadable(index, e),
    }
}

fn analyze_all<S: SegmentSource + ?Sized>(source: &S, opts: &PipelineOptions) -> Result<Vec<PixelResult>> {
    let n = source.pixel_count();
    #[cfg(feature = "parallel")]
    {
        if opts.multi_processing {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(opts.workers.unwrap_or(0))
                .build()
                .map_err(|e| crate::error::SspfmError::Config(format!("Failed to start worker pool: {e}")))?;
            info!("analyzing {n} pixels on {} workers", pool.current_num_threads());
            return Ok(pool.install(|| {
                (0..n)
                    .into_par_iter()
                    .map(|i| analyze_index(source, i, opts))
                    .collect()
            }));
        }
    }
    #[cfg(not(feature = "parallel"))]
    {
        if opts.multi_processing {
            warn!("multi_processing requested but the crate was built without `parallel`");
        }
    }
    Ok((0..n).map(|i| analyze_index(source, i, opts)).collect())
}

fn stage_reports(results: &[PixelResult]) -> Vec<StageReport> {
    let mut reports: Vec<StageReport> = Vec::new();
    for res in results {
        for ev in &res.events {
            let pos = match reports
                .iter()
                .position(|r| r.stage == ev.stage.as_str() && r.mode == ev.mode)
            {
                Some(p) => p,
                None => {
                    reports.push(StageReport::new(ev.stage.as_str(), ev.mode));
                    reports.len() - 1
                }
            };
            match &ev.error {
                Some(e) => reports[pos].fail(res.index, e),
                None => reports[pos].ok(),
            }
        }
    }
    reports
}

fn collate(results: &[PixelResult], grid: &Grid) -> Result<(PropertyBundle, BTreeMap<Mode, Vec<Vec<Nanoloop>>>)> {
    let n = grid.len();
    let mut bundle = PropertyBundle::new(*grid);
    let mut best_loops = BTreeMap::new();
    for mode in Mode::ALL {
        if !results.iter().any(|r| r.modes.contains_key(&mode)) {
            continue;
        }
        let names = columns(mode);
        let mut cols = vec![vec![f64::NAN; n]; names.len()];
        let mut loops = vec![Vec::new(); n];
        for res in results {
            let Some(m) = res.modes.get(&mode) else {
                continue;
            };
            for (col, v) in cols.iter_mut().zip(&m.values) {
                col[res.index] = *v;
            }
            loops[res.index] = m.best.clone();
        }
        let mut table = ModeTable::new(n);
        for (name, values) in names.iter().zip(cols) {
            table.insert(name, values)?;
        }
        bundle.insert_table(mode, table)?;
        if mode != Mode::Other {
            best_loops.insert(mode, loops);
        }
    }
    Ok((bundle, best_loops))
}

/// Analyze every pixel of `source` on `grid`.
///
/// Per-pixel failures are recorded as NaN rows and counted in the report;
/// only geometry and worker-pool errors abort the run.
pub fn run<S: SegmentSource + ?Sized>(source: &S, grid: &Grid, opts: &PipelineOptions) -> Result<PipelineOutput> {
    let measured = source.pixel_count();
    validate_length(measured, grid)?;

    let mut timings = TimingBreakdown::default();
    let results = timings.time("pixels", || analyze_all(source, opts))?;
    let stages = timings.time("report", || stage_reports(&results));
    let (bundle, best_loops) = timings.time("collate", || collate(&results, grid))?;

    let mut curves = vec![None; grid.len()];
    for res in &results {
        if let Some(c) = &res.curve {
            curves[res.index] = Some(c.clone());
        }
    }

    let mut notes = Vec::new();
    for mode in [Mode::Off, Mode::On, Mode::Coupled] {
        if bundle.table(mode).is_none() {
            notes.push(format!("{mode}: no loop measured"));
        }
    }
    let report = RunReport {
        n_pixels: grid.len(),
        measured_pixels: results.iter().filter(|r| r.was_read()).count(),
        stages,
        timings,
        notes,
    };
    for stage in &report.stages {
        stage.log();
    }
    if report.measured_pixels < measured {
        warn!(
            "{} of {measured} pixels could not be read",
            measured - report.measured_pixels
        );
    }
    info!(
        "pipeline: {} pixels, {} stage failures in {:.1} ms",
        report.n_pixels,
        report.total_failed(),
        report.timings.total_ms
    );
    Ok(PipelineOutput {
        bundle,
        best_loops,
        curves,
        report,
    })
}
