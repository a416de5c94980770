use super::SspfmBias;
use crate::error::{Result, SspfmError};
use crate::segments::{ChannelSet, PixelSegments, Segment};
use serde::{Deserialize, Serialize};

/// Fractions of each segment discarded at its start and end before
/// averaging (settling transients).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentTrim {
    pub start: f64,
    pub end: f64,
}

impl Default for SegmentTrim {
    fn default() -> Self {
        Self {
            start: 0.05,
            end: 0.05,
        }
    }
}

impl SegmentTrim {
    fn bounds(&self, len: usize) -> (usize, usize) {
        let head = ((len as f64) * self.start.clamp(0.0, 0.49)).floor() as usize;
        let tail = ((len as f64) * self.end.clamp(0.0, 0.49)).floor() as usize;
        let start = head.min(len.saturating_sub(1));
        let end = len.saturating_sub(tail).max(start + 1).min(len);
        (start, end)
    }
}

/// Cut a pixel's sampled channels into tagged segments following `bias`.
pub fn cut_segments(
    pixel: usize,
    measurement: &ChannelSet,
    bias: &SspfmBias,
    trim: &SegmentTrim,
) -> Result<PixelSegments> {
    let needed = bias.samples_per_pixel();
    let available = measurement.len();
    if available < needed {
        return Err(SspfmError::parse(
            pixel,
            format!("measurement holds {available} samples, bias schedule needs {needed}"),
        ));
    }
    let mut offset = 0usize;
    let mut segments = Vec::new();
    for tag in bias.segment_plan() {
        let len = bias.samples_for(tag.state);
        if len == 0 {
            continue;
        }
        let (start, end) = trim.bounds(len);
        segments.push(Segment {
            tag,
            samples: measurement.slice(offset + start, offset + end),
        });
        offset += len;
    }
    Ok(PixelSegments {
        index: pixel,
        segments,
    })
}
