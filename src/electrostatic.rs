//! Electrostatic decoupling.
//!
//! The differential loop `on − off` carries the electrostatic coupling as a
//! linear slope over the write voltage; the on-field loop alone gives a
//! second estimate from its slope inside the saturated domain.

use crate::hysteresis::HystProperties;
use crate::loops::{Branch, Nanoloop};
use crate::stats::{gradient, linear_regression, nan_mean};
use log::warn;
use serde::{Deserialize, Serialize};

/// How the on-field saturation domain is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatMode {
    /// Beyond the fitted saturation voltages.
    #[default]
    Auto,
    /// Explicit `sat_domain`.
    Set,
}

/// Expected sign of the electrostatic slope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockedSlope {
    Positive,
    Negative,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectrostaticOptions {
    /// Subtract the off-field offset from the differential loop.
    pub electrostatic_offset: bool,
    /// Regression window of the differential loop; full range when absent.
    pub diff_domain: Option<(f64, f64)>,
    pub sat_mode: SatMode,
    pub sat_domain: Option<(f64, f64)>,
    pub locked_elec_slope: Option<LockedSlope>,
}

/// Linear regression of the differential loop.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DifferentialFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_square: f64,
    /// `−intercept / slope`, the contact potential estimate.
    pub x_intercept: f64,
}

impl DifferentialFit {
    pub const NAMES: [&'static str; 4] = ["diff_slope", "diff_offset", "diff_r_square", "contact_potential"];

    pub fn values(&self) -> [f64; 4] {
        [self.slope, self.intercept, self.r_square, self.x_intercept]
    }
}

/// Regress `D(V)` of a coupled loop over `window`.
pub fn differential_fit(coupled: &Nanoloop, window: Option<(f64, f64)>) -> Option<DifferentialFit> {
    let fit = linear_regression(&coupled.write_volt(), &coupled.piezorep(), window)?;
    let x_intercept = if fit.slope.abs() > f64::EPSILON {
        -fit.intercept / fit.slope
    } else {
        f64::NAN
    };
    Some(DifferentialFit {
        slope: fit.slope,
        intercept: fit.intercept,
        r_square: fit.r_square,
        x_intercept,
    })
}

/// Electrostatic slope of the on-field loop in its saturated domain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SaturationSlope {
    /// Mean `dy/dV` over the domain, before orientation.
    pub raw: f64,
    /// `raw` times the loop polarity, clamped to the locked sign.
    pub slope: f64,
    /// Low-side and high-side domain limits.
    pub domain: (f64, f64),
    pub clamped: bool,
}

impl SaturationSlope {
    pub const NAMES: [&'static str; 2] = ["sat_elec_slope", "sat_elec_slope_raw"];

    pub fn values(&self) -> [f64; 2] {
        [self.slope, self.raw]
    }
}

fn branch_points(branch: &Branch) -> (Vec<f64>, Vec<f64>) {
    let mut pts: Vec<(f64, f64)> = branch
        .write_volt
        .iter()
        .zip(&branch.piezorep)
        .filter(|(v, y)| v.is_finite() && y.is_finite())
        .map(|(v, y)| (*v, *y))
        .collect();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0));
    pts.into_iter().unzip()
}

/// Mean derivative of the on-field loop where `V ≤ low` or `V ≥ high`.
///
/// In `auto` mode `(low, high)` are the fitted saturation voltages
/// `(x_sat_m, x_sat_p)`; in `set` mode they come from `sat_domain`.
pub fn saturation_slope(
    on_loop: &Nanoloop,
    props: Option<&HystProperties>,
    opts: &ElectrostaticOptions,
    polarity: f64,
) -> Option<SaturationSlope> {
    let domain = match opts.sat_mode {
        SatMode::Auto => {
            let p = props?;
            let (lo, hi) = (p.x_sat_m.min(p.x_sat_p), p.x_sat_m.max(p.x_sat_p));
            if !lo.is_finite() || !hi.is_finite() {
                return None;
            }
            (lo, hi)
        }
        SatMode::Set => opts.sat_domain?,
    };
    let mut derivatives = Vec::new();
    for branch in [&on_loop.right, &on_loop.left] {
        let (v, y) = branch_points(branch);
        let d = gradient(&v, &y);
        derivatives.extend(
            v.iter()
                .zip(d)
                .filter(|(v, _)| **v <= domain.0 || **v >= domain.1)
                .map(|(_, d)| d),
        );
    }
    let raw = nan_mean(&derivatives);
    if !raw.is_finite() {
        return None;
    }
    let oriented = raw * polarity;
    let (slope, clamped) = match opts.locked_elec_slope {
        Some(LockedSlope::Positive) if oriented < 0.0 => (0.0, true),
        Some(LockedSlope::Negative) if oriented > 0.0 => (0.0, true),
        _ => (oriented, false),
    };
    if clamped {
        warn!(
            "electrostatic slope {oriented:.4e} contradicts the locked sign {:?}; clamped to 0",
            opts.locked_elec_slope
        );
    }
    Some(SaturationSlope {
        raw,
        slope,
        domain,
        clamped,
    })
}

/// On-field loop with the linear electrostatic contribution removed.
pub fn remove_slope(on_loop: &Nanoloop, slope: f64) -> Nanoloop {
    let strip = |b: &Branch| Branch {
        piezorep: b
            .write_volt
            .iter()
            .zip(&b.piezorep)
            .map(|(v, y)| y - slope * v)
            .collect(),
        ..b.clone()
    };
    Nanoloop {
        right: strip(&on_loop.right),
        left: strip(&on_loop.left),
        ..on_loop.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::LoopOrigin;
    use crate::types::Mode;

    fn linear_loop(slope: f64, intercept: f64) -> Nanoloop {
        let up: Vec<f64> = (0..11).map(|i| -5.0 + i as f64).collect();
        let down: Vec<f64> = up.iter().rev().copied().collect();
        let branch = |v: Vec<f64>| Branch {
            piezorep: v.iter().map(|v| slope * v + intercept).collect(),
            amp: vec![f64::NAN; v.len()],
            pha: vec![f64::NAN; v.len()],
            write_volt: v,
        };
        Nanoloop {
            mode: Mode::Coupled,
            read_volt: 0.0,
            origin: LoopOrigin::Cycle { cycle: 0 },
            right: branch(up),
            left: branch(down),
        }
    }

    #[test]
    fn differential_fit_recovers_contact_potential() {
        let fit = differential_fit(&linear_loop(0.5, -1.0), None).expect("fit");
        assert!((fit.slope - 0.5).abs() < 1e-12);
        assert!((fit.x_intercept - 2.0).abs() < 1e-12);
        assert!((fit.r_square - 1.0).abs() < 1e-12);
    }

    #[test]
    fn locked_sign_clamps_wrong_slope() {
        let on = linear_loop(-0.2, 0.0);
        let opts = ElectrostaticOptions {
            sat_mode: SatMode::Set,
            sat_domain: Some((-3.0, 3.0)),
            locked_elec_slope: Some(LockedSlope::Positive),
            ..Default::default()
        };
        let sat = saturation_slope(&on, None, &opts, 1.0).expect("slope");
        assert!((sat.raw + 0.2).abs() < 1e-12);
        assert_eq!(sat.slope, 0.0);
        assert!(sat.clamped);
        let flipped = saturation_slope(&on, None, &opts, -1.0).expect("slope");
        assert!((flipped.slope - 0.2).abs() < 1e-12);
    }

    #[test]
    fn auto_domain_needs_fitted_saturation() {
        let on = linear_loop(0.3, 0.0);
        assert!(saturation_slope(&on, None, &ElectrostaticOptions::default(), 1.0).is_none());
    }

    #[test]
    fn removing_slope_flattens_loop() {
        let flat = remove_slope(&linear_loop(0.3, 1.0), 0.3);
        assert!(flat.piezorep().iter().all(|y| (y - 1.0).abs() < 1e-12));
    }
}
