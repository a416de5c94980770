//! Per-pixel vectors handed to the clustering stage.

use super::ForceCurve;
use crate::cluster::{build_rows, coupled_rows, raw_rows};
use crate::config::LoopChannel;
use crate::loops::Nanoloop;

/// Feature rows of one mode plus the axis of the un-normalized rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterVectors {
    /// Abscissa of a `raw` row; repeated once per channel.
    pub x: Vec<f64>,
    pub features: Vec<Vec<f64>>,
    pub raw: Vec<Vec<f64>>,
}

fn channel_values(l: &Nanoloop, channel: LoopChannel) -> Vec<f64> {
    match channel {
        LoopChannel::Piezorep => l.piezorep(),
        LoopChannel::Amp => l.amp(),
        LoopChannel::Pha => l.pha(),
    }
}

/// Write-voltage axis shared by the loops; rows on another axis are dropped.
fn common_axis(best: &[Vec<Nanoloop>]) -> Vec<f64> {
    best.iter()
        .find_map(|loops| loops.first())
        .map(|l| l.write_volt())
        .unwrap_or_default()
}

fn channel_rows(best: &[Vec<Nanoloop>], axis: &[f64], channel: LoopChannel) -> Vec<Vec<f64>> {
    best.iter()
        .map(|loops| match loops.first() {
            Some(l) if l.write_volt() == axis => channel_values(l, channel),
            _ => Vec::new(),
        })
        .collect()
}

fn assemble(axis: Vec<f64>, per_channel: Vec<Vec<Vec<f64>>>, relative: bool) -> ClusterVectors {
    let refs: Vec<&[Vec<f64>]> = per_channel.iter().map(Vec::as_slice).collect();
    let x = axis
        .iter()
        .copied()
        .cycle()
        .take(axis.len() * per_channel.len())
        .collect();
    ClusterVectors {
        x,
        features: build_rows(&refs, relative),
        raw: raw_rows(&refs),
    }
}

/// Rows built from the first best loop of each pixel.
pub fn loop_vectors(best: &[Vec<Nanoloop>], channels: &[LoopChannel], relative: bool) -> ClusterVectors {
    let axis = common_axis(best);
    let per_channel = channels
        .iter()
        .map(|&c| channel_rows(best, &axis, c))
        .collect();
    assemble(axis, per_channel, relative)
}

/// Coupled rows `on − off + offset` built from the on-field and off-field
/// best loops.
pub fn coupled_vectors(
    on: &[Vec<Nanoloop>],
    off: &[Vec<Nanoloop>],
    channels: &[LoopChannel],
    offsets: Option<&[f64]>,
    relative: bool,
) -> ClusterVectors {
    let axis = common_axis(on);
    let per_channel = channels
        .iter()
        .map(|&c| {
            coupled_rows(
                &channel_rows(on, &axis, c),
                &channel_rows(off, &axis, c),
                offsets,
            )
        })
        .collect();
    assemble(axis, per_channel, relative)
}

/// Force-curve rows; curves on another voltage axis than the first are
/// dropped.
pub fn curve_vectors(curves: &[Option<ForceCurve>], relative: bool) -> ClusterVectors {
    let axis = curves
        .iter()
        .flatten()
        .next()
        .map(|c| c.write_volt.clone())
        .unwrap_or_default();
    let rows: Vec<Vec<f64>> = curves
        .iter()
        .map(|c| match c {
            Some(c) if c.write_volt == axis => c.deflection.clone(),
            _ => Vec::new(),
        })
        .collect();
    assemble(axis, vec![rows], relative)
}
