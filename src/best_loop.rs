//! Representative loop of a pixel for a read-voltage protocol.

use crate::error::{Result, SspfmError};
use crate::hysteresis::{fit_loop, HysteresisOptions};
use crate::loops::{MultiLoop, Nanoloop};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Cycles of the first read voltage averaged into one loop.
    OnFLoop,
    /// Every cycle of every read voltage averaged into one loop.
    #[default]
    MeanLoop,
    /// Per read voltage, the cycle best described by its own fit.
    MultiLoop,
}

/// Loops kept after the first-cycle policy, in acquisition order.
///
/// The first cycle of each read voltage is dropped only when another cycle
/// remains at that read voltage.
fn kept_cycles(multi: &MultiLoop, del_1st_loop: bool) -> Vec<(f64, Vec<&Nanoloop>)> {
    multi
        .read_voltages()
        .into_iter()
        .map(|read| {
            let mut cycles = multi.at_read(read);
            if del_1st_loop && cycles.len() > 1 {
                cycles.remove(0);
            }
            (read, cycles)
        })
        .collect()
}

fn average(loops: &[&Nanoloop]) -> Result<Nanoloop> {
    match loops {
        [single] => Ok((*single).clone()),
        _ => Nanoloop::mean_of(loops),
    }
}

/// Best loops of one pixel in one mode: a single loop for the averaging
/// modes, one loop per read voltage for `multi_loop`.
pub fn select(
    multi: &MultiLoop,
    mode: AnalysisMode,
    del_1st_loop: bool,
    hyst: &HysteresisOptions,
) -> Result<Vec<Nanoloop>> {
    if multi.loops.is_empty() {
        return Err(SspfmError::Fit("no loop to select from".to_string()));
    }
    if multi.is_single_cycle() {
        return Ok(vec![multi.loops[0].clone()]);
    }
    let groups = kept_cycles(multi, del_1st_loop);
    match mode {
        AnalysisMode::OnFLoop => {
            let (_, cycles) = &groups[0];
            Ok(vec![average(cycles)?])
        }
        AnalysisMode::MeanLoop => {
            let all: Vec<&Nanoloop> = groups.iter().flat_map(|(_, c)| c.iter().copied()).collect();
            Ok(vec![average(&all)?])
        }
        AnalysisMode::MultiLoop => groups
            .iter()
            .map(|(read, cycles)| {
                let best = cycles
                    .iter()
                    .map(|l| {
                        let r2 = fit_loop(l, hyst).map(|h| h.r_square).unwrap_or(f64::NEG_INFINITY);
                        (*l, r2)
                    })
                    .fold(None::<(&Nanoloop, f64)>, |best, cand| match best {
                        Some(b) if b.1 >= cand.1 => Some(b),
                        _ => Some(cand),
                    })
                    .map(|(l, r2)| {
                        debug!("best loop at read {read} V: r2={r2:.5}");
                        l.clone()
                    });
                best.ok_or_else(|| SspfmError::Fit(format!("no cycle at read {read} V")))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::{Branch, LoopOrigin};
    use crate::types::Mode;

    fn cycle(read_volt: f64, cycle: usize, noise: f64) -> Nanoloop {
        let up: Vec<f64> = (0..21).map(|i| -2.0 + 0.2 * i as f64).collect();
        let down: Vec<f64> = up.iter().rev().copied().collect();
        let branch = |v: Vec<f64>, shift: f64| Branch {
            piezorep: v
                .iter()
                .enumerate()
                .map(|(i, v)| (3.0 * (v - shift)).tanh() + if i % 2 == 0 { noise } else { -noise })
                .collect(),
            amp: vec![1.0; v.len()],
            pha: vec![0.0; v.len()],
            write_volt: v,
        };
        Nanoloop {
            mode: Mode::Off,
            read_volt,
            origin: LoopOrigin::Cycle { cycle },
            right: branch(up, 0.5),
            left: branch(down, -0.5),
        }
    }

    #[test]
    fn single_cycle_is_returned_for_every_mode() {
        let multi = MultiLoop {
            mode: Mode::Off,
            loops: vec![cycle(0.0, 0, 0.0)],
        };
        let hyst = HysteresisOptions::default();
        for mode in [AnalysisMode::OnFLoop, AnalysisMode::MeanLoop, AnalysisMode::MultiLoop] {
            for del in [false, true] {
                let best = select(&multi, mode, del, &hyst).expect("select");
                assert_eq!(best, vec![multi.loops[0].clone()], "{mode:?} del={del}");
            }
        }
    }

    #[test]
    fn first_cycle_is_dropped_on_request() {
        let mut first = cycle(0.0, 0, 0.0);
        first.right.piezorep.iter_mut().for_each(|v| *v += 10.0);
        let multi = MultiLoop {
            mode: Mode::Off,
            loops: vec![first, cycle(0.0, 1, 0.0)],
        };
        let hyst = HysteresisOptions::default();
        let best = select(&multi, AnalysisMode::MeanLoop, true, &hyst).expect("select");
        assert_eq!(best[0].piezorep(), multi.loops[1].piezorep());
        let kept = select(&multi, AnalysisMode::MeanLoop, false, &hyst).expect("select");
        assert_eq!(kept[0].origin, LoopOrigin::Mean { n_cycles: 2 });
    }

    #[test]
    fn multi_loop_keeps_cleanest_cycle_per_read() {
        let multi = MultiLoop {
            mode: Mode::Off,
            loops: vec![
                cycle(0.0, 0, 0.3),
                cycle(0.0, 1, 0.0),
                cycle(1.0, 0, 0.0),
                cycle(1.0, 1, 0.2),
            ],
        };
        let best = select(&multi, AnalysisMode::MultiLoop, false, &HysteresisOptions::default())
            .expect("select");
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].origin, LoopOrigin::Cycle { cycle: 1 });
        assert_eq!(best[1].origin, LoopOrigin::Cycle { cycle: 0 });
        assert_eq!(best[1].read_volt, 1.0);
    }
}
