#![doc = include_str!("../README.md")]

// Pipeline surface.
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod properties;
pub mod segments;
pub mod types;

// Analysis stages, usable on their own.
pub mod best_loop;
pub mod cluster;
pub mod electrostatic;
pub mod hysteresis;
pub mod loops;
pub mod map;
pub mod phase;
pub mod signal;

// Numeric and layout helpers.
pub mod angle;
pub mod geometry;
pub mod interp;
pub mod raster;
pub mod stats;

// --- High-level re-exports -------------------------------------------------

pub use crate::error::{Result, SspfmError};
pub use crate::pipeline::{run, PipelineOptions, PipelineOutput};
pub use crate::properties::PropertyBundle;
pub use crate::types::{Grid, Mode};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for scripts driving the pipeline.
///
/// ```no_run
/// use sspfm_toolbox::prelude::*;
/// use std::path::Path;
///
/// # fn main() -> sspfm_toolbox::Result<()> {
/// let cfg = load_run_config(Path::new("run.toml"))?;
/// let meta = load_metadata(&cfg.measurement_sheet)?;
/// let source = TextTableSource::from_dir(
///     &cfg.input.dir,
///     &cfg.input.extension,
///     cfg.analysis.table_layout(),
///     meta.bias.clone(),
///     cfg.analysis.segment_trim,
/// )?;
/// let out = run(&source, &meta.grid, &PipelineOptions::from_config(&cfg.analysis, &meta))?;
/// println!("{} failed stages", out.report.total_failed());
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::config::{load_metadata, load_run_config, RunConfig, ScanMetadata};
    pub use crate::error::{Result, SspfmError};
    pub use crate::pipeline::{run, PipelineOptions, PipelineOutput};
    pub use crate::properties::PropertyBundle;
    pub use crate::segments::{MemorySource, SegmentSource, TextTableSource};
    pub use crate::types::{Grid, Mode};
}
