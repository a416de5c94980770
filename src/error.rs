//! Error kinds surfaced by the analysis pipeline.
//!
//! Per-pixel kinds (`Parse`, `Fit`) are captured by the pixel driver and turned
//! into NaN rows; the remaining kinds abort the current run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SspfmError {
    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// A per-pixel input could not be read or segmented.
    #[error("pixel {pixel}: {reason}")]
    Parse { pixel: usize, reason: String },
    /// Every allowed optimizer failed on a hysteresis fit.
    #[error("hysteresis fit failed: {0}")]
    Fit(String),
    /// Clustering input is degenerate for the requested partition.
    #[error("clustering error: {0}")]
    Cluster(String),
    /// Grid dimensions are inconsistent with the data.
    #[error("geometry error: {0}")]
    Geometry(String),
    /// Interactive mask selection was cancelled.
    #[error("mask selection cancelled by user")]
    UserAbort,
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// A delimited table could not be read or written.
    #[error("{context}: {source}")]
    Table {
        context: String,
        #[source]
        source: csv::Error,
    },
}

impl SspfmError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn table(context: impl Into<String>, source: csv::Error) -> Self {
        Self::Table {
            context: context.into(),
            source,
        }
    }

    pub fn parse(pixel: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            pixel,
            reason: reason.into(),
        }
    }

    /// True for errors that only invalidate a single pixel.
    pub fn is_per_pixel(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Fit(_))
    }
}

pub type Result<T> = std::result::Result<T, SspfmError>;
