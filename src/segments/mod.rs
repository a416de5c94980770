//! Per-pixel measurement segments.
//!
//! A pixel measurement is cut into segments, one per write step and field
//! state. Every segment carries its bias tag and whichever sampled channels
//! the source provides.

pub mod source;

pub use source::{MemorySource, SegmentSource, TextTableSource};

use crate::stats::nan_mean;
use crate::types::{Direction, FieldState, Mode};
use serde::{Deserialize, Serialize};

/// Canonical channel names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Times,
    Amp,
    Pha,
    TipBias,
    Deflection,
    Height,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Times,
        Channel::Amp,
        Channel::Pha,
        Channel::TipBias,
        Channel::Deflection,
        Channel::Height,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Times => "times",
            Channel::Amp => "amp",
            Channel::Pha => "pha",
            Channel::TipBias => "tip_bias",
            Channel::Deflection => "deflection",
            Channel::Height => "height",
        }
    }

    pub fn parse(name: &str) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

/// Sampled channels of a measurement or a segment; any subset may be absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSet {
    pub times: Option<Vec<f64>>,
    pub amp: Option<Vec<f64>>,
    pub pha: Option<Vec<f64>>,
    pub tip_bias: Option<Vec<f64>>,
    pub deflection: Option<Vec<f64>>,
    pub height: Option<Vec<f64>>,
}

impl ChannelSet {
    pub fn get(&self, channel: Channel) -> Option<&[f64]> {
        match channel {
            Channel::Times => self.times.as_deref(),
            Channel::Amp => self.amp.as_deref(),
            Channel::Pha => self.pha.as_deref(),
            Channel::TipBias => self.tip_bias.as_deref(),
            Channel::Deflection => self.deflection.as_deref(),
            Channel::Height => self.height.as_deref(),
        }
    }

    pub fn set(&mut self, channel: Channel, values: Vec<f64>) {
        let slot = match channel {
            Channel::Times => &mut self.times,
            Channel::Amp => &mut self.amp,
            Channel::Pha => &mut self.pha,
            Channel::TipBias => &mut self.tip_bias,
            Channel::Deflection => &mut self.deflection,
            Channel::Height => &mut self.height,
        };
        *slot = Some(values);
    }

    /// Sample count of the shortest present channel.
    pub fn len(&self) -> usize {
        Channel::ALL
            .iter()
            .filter_map(|&c| self.get(c).map(<[f64]>::len))
            .min()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sub-range `[start, end)` of every present channel.
    pub fn slice(&self, start: usize, end: usize) -> ChannelSet {
        let cut = |v: &Option<Vec<f64>>| v.as_ref().map(|v| v[start.min(v.len())..end.min(v.len())].to_vec());
        ChannelSet {
            times: cut(&self.times),
            amp: cut(&self.amp),
            pha: cut(&self.pha),
            tip_bias: cut(&self.tip_bias),
            deflection: cut(&self.deflection),
            height: cut(&self.height),
        }
    }
}

/// Bias state under which a segment was measured.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentTag {
    pub write_volt: f64,
    pub read_volt: f64,
    pub state: FieldState,
    pub direction: Direction,
    /// Cycle index within the read voltage.
    pub cycle: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub tag: SegmentTag,
    pub samples: ChannelSet,
}

impl Segment {
    /// Mean of a channel over the segment, NaN when the channel is absent.
    pub fn mean(&self, channel: Channel) -> f64 {
        self.samples
            .get(channel)
            .map(nan_mean)
            .unwrap_or(f64::NAN)
    }
}

/// Complete segment table of one pixel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelSegments {
    pub index: usize,
    pub segments: Vec<Segment>,
}

/// Typed view of the segments of one pixel in one field mode.
#[derive(Clone, Debug)]
pub struct SegmentRecord<'a> {
    pub pixel: usize,
    pub mode: Mode,
    pub segments: Vec<&'a Segment>,
}

impl PixelSegments {
    /// Segments measured in `state`, in acquisition order.
    pub fn record(&self, state: FieldState) -> SegmentRecord<'_> {
        SegmentRecord {
            pixel: self.index,
            mode: state.mode(),
            segments: self
                .segments
                .iter()
                .filter(|s| s.tag.state == state)
                .collect(),
        }
    }

    /// Off-field then on-field records; empty records are skipped.
    pub fn records(&self) -> Vec<SegmentRecord<'_>> {
        [FieldState::Off, FieldState::On]
            .into_iter()
            .map(|s| self.record(s))
            .filter(|r| !r.segments.is_empty())
            .collect()
    }

    /// Pixel-level mean of a channel over every segment.
    pub fn channel_mean(&self, channel: Channel) -> f64 {
        let means: Vec<f64> = self.segments.iter().map(|s| s.mean(channel)).collect();
        nan_mean(&means)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(state: FieldState, amp: &[f64]) -> Segment {
        let mut samples = ChannelSet::default();
        samples.set(Channel::Amp, amp.to_vec());
        Segment {
            tag: SegmentTag {
                write_volt: 1.0,
                read_volt: 0.0,
                state,
                direction: Direction::Forward,
                cycle: 0,
            },
            samples,
        }
    }

    #[test]
    fn records_split_by_field_state() {
        let px = PixelSegments {
            index: 3,
            segments: vec![
                seg(FieldState::On, &[1.0, 3.0]),
                seg(FieldState::Off, &[2.0]),
                seg(FieldState::On, &[5.0]),
            ],
        };
        let records = px.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].mode, Mode::Off);
        assert_eq!(records[1].segments.len(), 2);
        assert_eq!(records[1].segments[0].mean(Channel::Amp), 2.0);
        assert!(records[0].segments[0].mean(Channel::Pha).is_nan());
    }

    #[test]
    fn channel_names_round_trip() {
        for c in Channel::ALL {
            assert_eq!(Channel::parse(c.as_str()), Some(c));
        }
        assert_eq!(Channel::parse("TIP_BIAS"), Some(Channel::TipBias));
    }
}
