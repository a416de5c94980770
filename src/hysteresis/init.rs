use super::model::{FitModel, HystParams};
use crate::stats::{gradient, nan_mean};
use std::f64::consts::PI;

/// Finite `(v, y)` pairs sorted by increasing voltage.
pub(crate) fn sorted_points(v: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = v
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .collect();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0));
    pts
}

struct BranchGuess {
    ampli: f64,
    coef: f64,
    x0: f64,
}

fn guess_branch(pts: &[(f64, f64)], model: FitModel, span: f64) -> BranchGuess {
    let fallback_coef = 4.0 / span;
    let (Some(lo), Some(hi)) = (pts.first(), pts.last()) else {
        return BranchGuess {
            ampli: 0.0,
            coef: fallback_coef,
            x0: 0.0,
        };
    };
    let ampli = hi.1 - lo.1;
    let mid = 0.5 * (hi.1 + lo.1);
    let x0 = pts
        .windows(2)
        .find_map(|w| {
            let (a, b) = (w[0], w[1]);
            let crosses = (a.1 - mid) * (b.1 - mid) <= 0.0 && a.1 != b.1;
            crosses.then(|| a.0 + (mid - a.1) * (b.0 - a.0) / (b.1 - a.1))
        })
        .unwrap_or_else(|| 0.5 * (lo.0 + hi.0));

    let xs: Vec<f64> = pts.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = pts.iter().map(|p| p.1).collect();
    let steepest = gradient(&xs, &ys).iter().fold(0.0f64, |m, d| m.max(d.abs()));
    let coef = if ampli.abs() > 1e-12 && steepest > 0.0 {
        match model {
            FitModel::Sigmoid => 4.0 * steepest / ampli.abs(),
            FitModel::Arctan => PI * steepest / ampli.abs(),
        }
    } else {
        fallback_coef
    };
    BranchGuess {
        ampli,
        coef: coef.clamp(1.0 / span, 200.0 / span),
        x0,
    }
}

/// Starting point from the branch extrema and mid-level crossings.
pub(crate) fn initial_guess(
    ascending: &[(f64, f64)],
    descending: &[(f64, f64)],
    model: FitModel,
) -> HystParams {
    let all_v = ascending.iter().chain(descending).map(|p| p.0);
    let (v_min, v_max) = all_v.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let span = if v_max > v_min { v_max - v_min } else { 1.0 };
    let ys: Vec<f64> = ascending.iter().chain(descending).map(|p| p.1).collect();
    let asc = guess_branch(ascending, model, span);
    let desc = guess_branch(descending, model, span);
    HystParams {
        offset: nan_mean(&ys),
        slope: 0.0,
        ampli_0: asc.ampli,
        ampli_1: desc.ampli,
        coef_0: asc.coef,
        coef_1: desc.coef,
        x0_0: asc.x0,
        x0_1: desc.x0,
    }
}
