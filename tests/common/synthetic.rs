use sspfm_toolbox::segments::{Channel, ChannelSet, PixelSegments, Segment, SegmentTag};
use sspfm_toolbox::types::{Direction, FieldState};

/// Shape of a synthetic hysteresis pixel.
#[derive(Clone, Copy, Debug)]
pub struct LoopShape {
    /// Half width of the loop in volts.
    pub coercive: f64,
    /// Horizontal shift (imprint) in volts.
    pub shift: f64,
    /// Linear electrostatic slope added to the on-field response.
    pub on_slope: f64,
    pub cycles: usize,
}

impl Default for LoopShape {
    fn default() -> Self {
        Self {
            coercive: 1.5,
            shift: 0.0,
            on_slope: 0.05,
            cycles: 1,
        }
    }
}

/// Write voltages of one sweep, -5 V to 5 V in 0.5 V steps.
pub fn sweep() -> Vec<f64> {
    (0..21).map(|i| -5.0 + 0.5 * i as f64).collect()
}

/// Off-field response: the ascending branch switches at `shift + coercive`,
/// the descending one at `shift - coercive`.
pub fn off_response(shape: &LoopShape, v: f64, direction: Direction) -> f64 {
    let x0 = match direction {
        Direction::Forward => shape.shift + shape.coercive,
        Direction::Reverse => shape.shift - shape.coercive,
    };
    (2.0 * (v - x0)).tanh()
}

fn segment(v: f64, state: FieldState, direction: Direction, cycle: usize, response: f64) -> Segment {
    let mut samples = ChannelSet::default();
    samples.set(Channel::Amp, vec![response.abs(); 3]);
    let pha = if response >= 0.0 { 0.0 } else { 180.0 };
    samples.set(Channel::Pha, vec![pha; 3]);
    samples.set(Channel::Deflection, vec![0.1 * v + 1.0; 3]);
    samples.set(Channel::Height, vec![12.0; 3]);
    Segment {
        tag: SegmentTag {
            write_volt: v,
            read_volt: 0.0,
            state,
            direction,
            cycle,
        },
        samples,
    }
}

/// Complete segment table of one pixel: per write step an on-field then an
/// off-field segment.
pub fn loop_pixel(index: usize, shape: &LoopShape) -> PixelSegments {
    let up = sweep();
    let down: Vec<f64> = up.iter().rev().copied().collect();
    let mut segments = Vec::new();
    for cycle in 0..shape.cycles {
        for (volts, direction) in [(&up, Direction::Forward), (&down, Direction::Reverse)] {
            for &v in volts {
                let off = off_response(shape, v, direction);
                let on = off + shape.on_slope * v;
                segments.push(segment(v, FieldState::On, direction, cycle, on));
                segments.push(segment(v, FieldState::Off, direction, cycle, off));
            }
        }
    }
    PixelSegments { index, segments }
}

/// One pixel per shape, in order.
pub fn scan(shapes: &[LoopShape]) -> Vec<PixelSegments> {
    shapes
        .iter()
        .enumerate()
        .map(|(i, s)| loop_pixel(i, s))
        .collect()
}
