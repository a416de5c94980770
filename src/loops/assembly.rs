use super::{Branch, LoopOrigin, MultiLoop, Nanoloop};
use crate::error::{Result, SspfmError};
use crate::phase::{piezoresponse, PhaseCalibration, PhaseOptions};
use crate::segments::{Channel, SegmentRecord, SegmentTag};
use crate::types::{Direction, Mode};

/// Settings used to turn segment means into piezoresponse.
#[derive(Clone, Copy, Debug)]
pub struct LoopInputs<'a> {
    pub phase: &'a PhaseOptions,
    /// Source phase is in radians.
    pub radians_input_phase: bool,
}

#[derive(Clone, Copy, Debug)]
struct Point {
    tag: SegmentTag,
    amp: f64,
    pha: f64,
}

/// Build the single-cycle loops of one record and the phase correction
/// derived from its segments.
///
/// When the source has no phase channel the amplitude is taken as the signed
/// response.
pub fn assemble(record: &SegmentRecord<'_>, inputs: LoopInputs<'_>) -> Result<(MultiLoop, PhaseCalibration)> {
    if record.segments.is_empty() {
        return Err(SspfmError::parse(record.pixel, "no segment in record"));
    }
    let has_phase = record
        .segments
        .iter()
        .any(|s| s.samples.get(Channel::Pha).is_some());
    let points: Vec<Point> = record
        .segments
        .iter()
        .map(|s| {
            let mut pha = s.mean(Channel::Pha);
            if inputs.radians_input_phase {
                pha = pha.to_degrees();
            }
            Point {
                tag: s.tag,
                amp: s.mean(Channel::Amp),
                pha,
            }
        })
        .collect();

    let calibration = if has_phase {
        let raw: Vec<f64> = points.iter().map(|p| p.pha).collect();
        PhaseCalibration::from_samples(&raw, inputs.phase)
    } else {
        PhaseCalibration::identity(inputs.phase)
    };

    let mut groups: Vec<((f64, usize), Vec<Point>)> = Vec::new();
    for p in points {
        let key = (p.tag.read_volt, p.tag.cycle);
        match groups.iter_mut().find(|(k, _)| k.0 == key.0 && k.1 == key.1) {
            Some((_, members)) => members.push(p),
            None => groups.push((key, vec![p])),
        }
    }

    let mut loops = Vec::with_capacity(groups.len());
    for ((read_volt, cycle), members) in groups {
        let branch = |direction: Direction, ascending: bool| -> Branch {
            let mut pts: Vec<&Point> = members
                .iter()
                .filter(|p| p.tag.direction == direction)
                .collect();
            pts.sort_by(|a, b| {
                let ord = a.tag.write_volt.total_cmp(&b.tag.write_volt);
                if ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
            let mut out = Branch::default();
            for p in pts {
                let pha = if has_phase {
                    calibration.apply(p.pha)
                } else {
                    f64::NAN
                };
                let response = if has_phase {
                    piezoresponse(p.amp, pha, inputs.phase.func)
                } else {
                    p.amp
                };
                out.write_volt.push(p.tag.write_volt);
                out.amp.push(p.amp);
                out.pha.push(pha);
                out.piezorep.push(response);
            }
            out
        };
        let right = branch(Direction::Forward, true);
        let left = branch(Direction::Reverse, false);
        if right.is_empty() || left.is_empty() {
            return Err(SspfmError::parse(
                record.pixel,
                format!("cycle {cycle} at read {read_volt} V lacks a sweep direction"),
            ));
        }
        loops.push(Nanoloop {
            mode: record.mode,
            read_volt,
            origin: LoopOrigin::Cycle { cycle },
            right,
            left,
        });
    }

    Ok((
        MultiLoop {
            mode: record.mode,
            loops,
        },
        calibration,
    ))
}

/// Coupled loop `on − off − offset_off` on the shared write-voltage axis.
pub fn coupled_loop(on: &Nanoloop, off: &Nanoloop, offset_off: f64) -> Result<Nanoloop> {
    if !on.same_axis(off) {
        return Err(SspfmError::Fit(
            "on-field and off-field loops do not share a write-voltage axis".to_string(),
        ));
    }
    let diff = |a: &Branch, b: &Branch| Branch {
        write_volt: a.write_volt.clone(),
        piezorep: a
            .piezorep
            .iter()
            .zip(&b.piezorep)
            .map(|(x, y)| x - y - offset_off)
            .collect(),
        amp: a.amp.iter().zip(&b.amp).map(|(x, y)| x - y).collect(),
        pha: vec![f64::NAN; a.len()],
    };
    Ok(Nanoloop {
        mode: Mode::Coupled,
        read_volt: on.read_volt,
        origin: on.origin,
        right: diff(&on.right, &off.right),
        left: diff(&on.left, &off.left),
    })
}

/// Cycle-by-cycle coupled loops.
pub fn coupled_multi(on: &MultiLoop, off: &MultiLoop, offset_off: f64) -> Result<MultiLoop> {
    if on.loops.len() != off.loops.len() {
        return Err(SspfmError::Fit(format!(
            "{} on-field cycles against {} off-field cycles",
            on.loops.len(),
            off.loops.len()
        )));
    }
    let loops = on
        .loops
        .iter()
        .zip(&off.loops)
        .map(|(a, b)| coupled_loop(a, b, offset_off))
        .collect::<Result<Vec<_>>>()?;
    Ok(MultiLoop {
        mode: Mode::Coupled,
        loops,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::{ChannelSet, PixelSegments, Segment};
    use crate::types::FieldState;

    fn segment(write_volt: f64, direction: Direction, cycle: usize, amp: f64, pha: f64) -> Segment {
        let mut samples = ChannelSet::default();
        samples.set(Channel::Amp, vec![amp]);
        samples.set(Channel::Pha, vec![pha]);
        Segment {
            tag: SegmentTag {
                write_volt,
                read_volt: 0.0,
                state: FieldState::Off,
                direction,
                cycle,
            },
            samples,
        }
    }

    fn pixel(cycles: usize) -> PixelSegments {
        let mut segments = Vec::new();
        for c in 0..cycles {
            for v in [-1.0, 0.0, 1.0] {
                let pha = if v < 0.5 { 0.0 } else { 180.0 };
                segments.push(segment(v, Direction::Forward, c, 2.0, pha));
            }
            for v in [1.0, 0.0, -1.0] {
                let pha = if v > -0.5 { 180.0 } else { 0.0 };
                segments.push(segment(v, Direction::Reverse, c, 2.0, pha));
            }
        }
        PixelSegments { index: 4, segments }
    }

    #[test]
    fn branches_follow_sweep_order() {
        let px = pixel(2);
        let record = px.record(FieldState::Off);
        let opts = PhaseOptions::default();
        let inputs = LoopInputs {
            phase: &opts,
            radians_input_phase: false,
        };
        let (multi, _) = assemble(&record, inputs).expect("loops");
        assert_eq!(multi.loops.len(), 2);
        let first = &multi.loops[0];
        assert_eq!(first.write_volt_right(), &[-1.0, 0.0, 1.0]);
        assert_eq!(first.write_volt_left(), &[1.0, 0.0, -1.0]);
        assert!((first.piezorep_right()[0] - 2.0).abs() < 1e-9);
        assert!((first.piezorep_right()[2] + 2.0).abs() < 1e-9);
        assert_eq!(multi.loops[1].origin, LoopOrigin::Cycle { cycle: 1 });
    }

    #[test]
    fn coupled_is_pointwise_difference() {
        let px = pixel(1);
        let opts = PhaseOptions::default();
        let inputs = LoopInputs {
            phase: &opts,
            radians_input_phase: false,
        };
        let (off, _) = assemble(&px.record(FieldState::Off), inputs).expect("loops");
        let coupled = coupled_multi(&off, &off, 0.5).expect("coupled");
        assert_eq!(coupled.mode, Mode::Coupled);
        assert!(coupled.loops[0].piezorep().iter().all(|v| (*v + 0.5).abs() < 1e-12));
    }

    #[test]
    fn missing_direction_is_a_parse_error() {
        let px = PixelSegments {
            index: 1,
            segments: vec![segment(0.0, Direction::Forward, 0, 1.0, 0.0)],
        };
        let opts = PhaseOptions::default();
        let inputs = LoopInputs {
            phase: &opts,
            radians_input_phase: false,
        };
        let err = assemble(&px.record(FieldState::Off), inputs).unwrap_err();
        assert!(err.is_per_pixel());
    }
}
