//! Two-branch hysteresis fit.
//!
//! Each branch is `offset + slope·V + S_i(V)` where `S_i` is a centered
//! sigmoid or arctan step with its own amplitude, steepness and center
//! (shared amplitude and steepness in symmetric mode).
//!
//! # Fit Outline
//! 1. Collect the finite samples of both branches.
//! 2. Guess parameters from branch extrema, mid-level crossings and the
//!    steepest slope.
//! 3. Minimize the residuals with the configured optimizer; in robust mode
//!    the remaining optimizers are tried in turn when one does not converge.
//! 4. Derive coercive, nucleation, saturation and area properties from the
//!    fitted parameters.

mod init;
pub mod model;
pub mod properties;
pub mod solver;

pub use model::{FitModel, HystParams, Side};
pub use properties::{CharacteristicY, HystProperties, Thresholds};
pub use solver::{FitMethod, SolverOptions};

use crate::error::{Result, SspfmError};
use crate::loops::Nanoloop;
use crate::stats::r_square;
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use solver::{minimize, Bounds};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HysteresisOptions {
    pub model: FitModel,
    /// Independent amplitude and steepness per branch.
    pub asymmetric: bool,
    pub method: FitMethod,
    /// Fall back to the other optimizers on non-convergence.
    pub robust: bool,
    pub thresholds: Thresholds,
    pub max_iter: usize,
}

impl Default for HysteresisOptions {
    fn default() -> Self {
        Self {
            model: FitModel::Sigmoid,
            asymmetric: false,
            method: FitMethod::LeastSquare,
            robust: true,
            thresholds: Thresholds::default(),
            max_iter: 200,
        }
    }
}

/// Fitted hysteresis of one loop.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Hysteresis {
    pub model: FitModel,
    pub params: HystParams,
    pub r_square: f64,
    /// Optimizer that produced the accepted fit.
    pub method: FitMethod,
    pub v_min: f64,
    pub v_max: f64,
}

impl Hysteresis {
    pub fn eval(&self, side: Side, v: f64) -> f64 {
        self.params.total(self.model, side, v)
    }

    pub fn properties(&self, thresholds: &Thresholds) -> HystProperties {
        properties::derive(
            self.model,
            &self.params,
            self.v_min,
            self.v_max,
            self.r_square,
            thresholds,
        )
    }
}

/// Fit both branches of a loop; the right branch is ascending.
pub fn fit_loop(nanoloop: &Nanoloop, opts: &HysteresisOptions) -> Result<Hysteresis> {
    fit_branches(
        (nanoloop.write_volt_right(), nanoloop.piezorep_right()),
        (nanoloop.write_volt_left(), nanoloop.piezorep_left()),
        opts,
    )
}

/// Fit an ascending and a descending branch given as `(voltage, response)`.
pub fn fit_branches(
    ascending: (&[f64], &[f64]),
    descending: (&[f64], &[f64]),
    opts: &HysteresisOptions,
) -> Result<Hysteresis> {
    let asc = init::sorted_points(ascending.0, ascending.1);
    let desc = init::sorted_points(descending.0, descending.1);
    let dim = HystParams::dim(opts.asymmetric);
    if asc.len() < 2 || desc.len() < 2 || asc.len() + desc.len() <= dim {
        return Err(SspfmError::Fit(format!(
            "{} + {} finite samples cannot constrain {dim} parameters",
            asc.len(),
            desc.len()
        )));
    }
    let (v_min, v_max) = asc
        .iter()
        .chain(&desc)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.0), hi.max(p.0))
        });
    let span = (v_max - v_min).max(f64::EPSILON);

    let model = opts.model;
    let asymmetric = opts.asymmetric;
    let residual = |p: &DVector<f64>| -> DVector<f64> {
        let params = HystParams::from_free(p, asymmetric);
        let asc_r = asc
            .iter()
            .map(|(v, y)| params.total(model, Side::Ascending, *v) - y);
        let desc_r = desc
            .iter()
            .map(|(v, y)| params.total(model, Side::Descending, *v) - y);
        DVector::from_iterator(asc.len() + desc.len(), asc_r.chain(desc_r))
    };

    let p0 = init::initial_guess(&asc, &desc, model).to_free(asymmetric);
    let bounds = parameter_bounds(asymmetric, v_min, v_max, span);
    let solver_opts = SolverOptions {
        max_iter: opts.max_iter,
        ..SolverOptions::default()
    };
    let methods = if opts.robust {
        opts.method.fallback_order()
    } else {
        vec![opts.method]
    };

    for method in methods {
        let sol = minimize(method, &residual, p0.clone(), &bounds, &solver_opts);
        let params = HystParams::from_free(&sol.params, asymmetric).canonical();
        if !sol.converged || !params.is_finite() {
            debug!(
                "hysteresis fit: {} stopped after {} iterations (cost={:.3e}, converged={})",
                method.as_str(),
                sol.iterations,
                sol.cost,
                sol.converged
            );
            continue;
        }
        let data: Vec<f64> = asc.iter().chain(&desc).map(|p| p.1).collect();
        let fitted: Vec<f64> = asc
            .iter()
            .map(|(v, _)| params.total(model, Side::Ascending, *v))
            .chain(desc.iter().map(|(v, _)| params.total(model, Side::Descending, *v)))
            .collect();
        return Ok(Hysteresis {
            model,
            params,
            r_square: r_square(&data, &fitted),
            method,
            v_min,
            v_max,
        });
    }
    Err(SspfmError::Fit(format!(
        "no optimizer converged (requested {}, robust={})",
        opts.method.as_str(),
        opts.robust
    )))
}

/// Steepness is kept non-negative and centers within one span of the data.
fn parameter_bounds(asymmetric: bool, v_min: f64, v_max: f64, span: f64) -> Bounds {
    let mut bounds = Bounds::unbounded(HystParams::dim(asymmetric));
    let (coef_idx, x0_idx): (&[usize], &[usize]) = if asymmetric {
        (&[4, 5], &[6, 7])
    } else {
        (&[3], &[4, 5])
    };
    for &k in coef_idx {
        bounds.lower[k] = 0.0;
    }
    for &k in x0_idx {
        bounds.lower[k] = v_min - span;
        bounds.upper[k] = v_max + span;
    }
    bounds
}
