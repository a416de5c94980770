//! Small dense least-squares minimizers over residual functions.
//!
//! Problems here have at most eight parameters and a few hundred residuals,
//! so Jacobians are built by central differences and normal equations are
//! solved with a Cholesky factorization.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Optimizer used by the hysteresis fit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMethod {
    /// Levenberg–Marquardt.
    Leastsq,
    /// Bounded trust-region Gauss–Newton.
    #[default]
    LeastSquare,
    /// Nelder–Mead simplex on the squared residual norm.
    Nelder,
}

impl FitMethod {
    pub const ALL: [FitMethod; 3] = [FitMethod::Leastsq, FitMethod::LeastSquare, FitMethod::Nelder];

    pub fn as_str(self) -> &'static str {
        match self {
            FitMethod::Leastsq => "leastsq",
            FitMethod::LeastSquare => "least_square",
            FitMethod::Nelder => "nelder",
        }
    }

    /// `self` followed by the remaining methods in declaration order.
    pub fn fallback_order(self) -> Vec<FitMethod> {
        std::iter::once(self)
            .chain(FitMethod::ALL.into_iter().filter(move |m| *m != self))
            .collect()
    }
}

/// Box constraints; infinite entries leave a coordinate free.
#[derive(Clone, Debug)]
pub struct Bounds {
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

impl Bounds {
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: DVector::from_element(n, f64::NEG_INFINITY),
            upper: DVector::from_element(n, f64::INFINITY),
        }
    }

    pub fn clamp(&self, p: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            p.len(),
            p.iter()
                .enumerate()
                .map(|(k, v)| v.max(self.lower[k]).min(self.upper[k])),
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SolverOptions {
    pub max_iter: usize,
    /// Relative cost decrease considered negligible.
    pub ftol: f64,
    /// Relative step size considered negligible.
    pub xtol: f64,
    /// Cost below which the fit is exact.
    pub cost_floor: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            ftol: 1e-12,
            xtol: 1e-10,
            cost_floor: 1e-24,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Solution {
    pub params: DVector<f64>,
    /// `½‖r‖²` at `params`.
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl Solution {
    fn new(params: DVector<f64>, cost: f64, iterations: usize, converged: bool) -> Self {
        Self {
            params,
            cost,
            iterations,
            converged: converged && cost.is_finite(),
        }
    }
}

/// Minimize `½‖residual(p)‖²` starting at `p0`.
pub fn minimize<F>(
    method: FitMethod,
    residual: &F,
    p0: DVector<f64>,
    bounds: &Bounds,
    opts: &SolverOptions,
) -> Solution
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    match method {
        FitMethod::Leastsq => levenberg_marquardt(residual, p0, opts),
        FitMethod::LeastSquare => bounded_gauss_newton(residual, bounds.clamp(&p0), bounds, opts),
        FitMethod::Nelder => nelder_mead(residual, bounds.clamp(&p0), bounds, opts),
    }
}

fn cost_of(r: &DVector<f64>) -> f64 {
    0.5 * r.norm_squared()
}

fn jacobian<F>(f: &F, p: &DVector<f64>, m: usize) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let n = p.len();
    let mut jac = DMatrix::zeros(m, n);
    for k in 0..n {
        let h = 6e-6 * p[k].abs().max(1.0);
        let mut plus = p.clone();
        let mut minus = p.clone();
        plus[k] += h;
        minus[k] -= h;
        let col = (f(&plus) - f(&minus)) / (2.0 * h);
        jac.set_column(k, &col);
    }
    jac
}

fn levenberg_marquardt<F>(f: &F, mut p: DVector<f64>, opts: &SolverOptions) -> Solution
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let n = p.len();
    let mut r = f(&p);
    let mut cost = cost_of(&r);
    if !cost.is_finite() {
        return Solution::new(p, cost, 0, false);
    }
    let mut lambda = 1e-3;
    for iter in 0..opts.max_iter {
        if cost <= opts.cost_floor {
            return Solution::new(p, cost, iter, true);
        }
        let jac = jacobian(f, &p, r.len());
        let jtj = jac.transpose() * &jac;
        let grad = jac.transpose() * &r;
        if grad.amax() <= opts.ftol * (1.0 + cost) {
            return Solution::new(p, cost, iter, true);
        }
        let mut accepted = false;
        while lambda < 1e16 {
            let mut a = jtj.clone();
            for k in 0..n {
                a[(k, k)] += lambda * jtj[(k, k)].max(1e-12);
            }
            let Some(chol) = a.cholesky() else {
                lambda *= 10.0;
                continue;
            };
            let delta = chol.solve(&(-&grad));
            let trial = &p + &delta;
            let r_trial = f(&trial);
            let c_trial = cost_of(&r_trial);
            if c_trial.is_finite() && c_trial < cost {
                let small_step = delta.norm() <= opts.xtol * (p.norm() + opts.xtol);
                let small_drop = cost - c_trial <= opts.ftol * cost;
                p = trial;
                r = r_trial;
                cost = c_trial;
                lambda = (lambda / 3.0).max(1e-12);
                accepted = true;
                if small_step || small_drop {
                    return Solution::new(p, cost, iter + 1, true);
                }
                break;
            }
            lambda *= 4.0;
        }
        if !accepted {
            // No descent direction left at machine precision.
            return Solution::new(p, cost, iter + 1, true);
        }
    }
    Solution::new(p, cost, opts.max_iter, false)
}

fn bounded_gauss_newton<F>(
    f: &F,
    mut p: DVector<f64>,
    bounds: &Bounds,
    opts: &SolverOptions,
) -> Solution
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let n = p.len();
    let mut r = f(&p);
    let mut cost = cost_of(&r);
    if !cost.is_finite() {
        return Solution::new(p, cost, 0, false);
    }
    let mut mu: Option<f64> = None;
    for iter in 0..opts.max_iter {
        if cost <= opts.cost_floor {
            return Solution::new(p, cost, iter, true);
        }
        let jac = jacobian(f, &p, r.len());
        let jtj = jac.transpose() * &jac;
        let grad = jac.transpose() * &r;

        // Projected gradient: coordinates pinned at a bound with the
        // gradient pushing outward do not count.
        let projected = (0..n)
            .map(|k| {
                let at_lower = p[k] <= bounds.lower[k] && grad[k] > 0.0;
                let at_upper = p[k] >= bounds.upper[k] && grad[k] < 0.0;
                if at_lower || at_upper {
                    0.0
                } else {
                    grad[k].abs()
                }
            })
            .fold(0.0f64, f64::max);
        if projected <= opts.ftol * (1.0 + cost) {
            return Solution::new(p, cost, iter, true);
        }

        let damping = *mu.get_or_insert_with(|| {
            1e-3 * (0..n).map(|k| jtj[(k, k)]).fold(0.0f64, f64::max).max(1e-12)
        });
        let mut a = jtj.clone();
        for k in 0..n {
            a[(k, k)] += damping;
        }
        let Some(chol) = a.cholesky() else {
            mu = Some(damping * 10.0);
            continue;
        };
        let trial = bounds.clamp(&(&p + chol.solve(&(-&grad))));
        let step = &trial - &p;
        let r_trial = f(&trial);
        let c_trial = cost_of(&r_trial);
        let predicted = -(grad.dot(&step) + 0.5 * step.dot(&(&jtj * &step)));
        let actual = cost - c_trial;
        let rho = if predicted > 0.0 { actual / predicted } else { -1.0 };

        if c_trial.is_finite() && actual > 0.0 {
            let small_step = step.norm() <= opts.xtol * (p.norm() + opts.xtol);
            let small_drop = actual <= opts.ftol * cost;
            p = trial;
            r = r_trial;
            cost = c_trial;
            if small_step || small_drop {
                return Solution::new(p, cost, iter + 1, true);
            }
        }
        let next = if rho > 0.75 {
            damping / 3.0
        } else if rho < 0.25 {
            damping * 2.0
        } else {
            damping
        };
        if next > 1e20 {
            return Solution::new(p, cost, iter + 1, true);
        }
        mu = Some(next.max(1e-15));
    }
    Solution::new(p, cost, opts.max_iter, false)
}

fn nelder_mead<F>(f: &F, p0: DVector<f64>, bounds: &Bounds, opts: &SolverOptions) -> Solution
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let n = p0.len();
    let eval = |p: &DVector<f64>| {
        let c = cost_of(&f(p));
        if c.is_finite() {
            c
        } else {
            f64::INFINITY
        }
    };
    let mut simplex: Vec<(DVector<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((p0.clone(), eval(&p0)));
    for k in 0..n {
        let mut v = p0.clone();
        v[k] = if v[k] != 0.0 { v[k] * 1.05 } else { 0.00025 };
        let v = bounds.clamp(&v);
        let c = eval(&v);
        simplex.push((v, c));
    }

    let max_evals = opts.max_iter * 20 * n.max(1);
    let mut evals = n + 1;
    let mut iterations = 0usize;
    while evals < max_evals {
        iterations += 1;
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let best = simplex[0].1;
        let f_spread = simplex.iter().map(|s| (s.1 - best).abs()).fold(0.0, f64::max);
        let x_spread = simplex
            .iter()
            .skip(1)
            .map(|s| (&s.0 - &simplex[0].0).amax())
            .fold(0.0, f64::max);
        if best <= opts.cost_floor
            || (f_spread <= opts.ftol * (1.0 + best) && x_spread <= 1e-8 * (1.0 + simplex[0].0.amax()))
        {
            let (p, c) = simplex.swap_remove(0);
            return Solution::new(p, c, iterations, true);
        }

        let centroid = simplex[..n]
            .iter()
            .fold(DVector::<f64>::zeros(n), |acc, s| acc + &s.0)
            / n as f64;
        let worst = simplex[n].clone();
        let reflect = bounds.clamp(&(&centroid + (&centroid - &worst.0)));
        let f_reflect = eval(&reflect);
        evals += 1;

        if f_reflect < simplex[0].1 {
            let expand = bounds.clamp(&(&centroid + 2.0 * (&centroid - &worst.0)));
            let f_expand = eval(&expand);
            evals += 1;
            simplex[n] = if f_expand < f_reflect {
                (expand, f_expand)
            } else {
                (reflect, f_reflect)
            };
            continue;
        }
        if f_reflect < simplex[n - 1].1 {
            simplex[n] = (reflect, f_reflect);
            continue;
        }
        let contract = if f_reflect < worst.1 {
            bounds.clamp(&(&centroid + 0.5 * (&reflect - &centroid)))
        } else {
            bounds.clamp(&(&centroid + 0.5 * (&worst.0 - &centroid)))
        };
        let f_contract = eval(&contract);
        evals += 1;
        if f_contract < worst.1.min(f_reflect) {
            simplex[n] = (contract, f_contract);
            continue;
        }
        let anchor = simplex[0].0.clone();
        for s in simplex.iter_mut().skip(1) {
            s.0 = &anchor + 0.5 * (&s.0 - &anchor);
            s.1 = eval(&s.0);
        }
        evals += n;
    }
    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (p, c) = simplex.swap_remove(0);
    Solution::new(p, c, iterations, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exponential decay y = 2·exp(−0.7·t) + 0.5 sampled without noise.
    fn problem() -> (Vec<f64>, Vec<f64>) {
        let t: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y = t.iter().map(|t| 2.0 * (-0.7 * t).exp() + 0.5).collect();
        (t, y)
    }

    fn check(method: FitMethod) {
        let (t, y) = problem();
        let residual = |p: &DVector<f64>| {
            DVector::from_iterator(
                t.len(),
                t.iter().zip(&y).map(|(t, y)| p[0] * (-p[1] * t).exp() + p[2] - y),
            )
        };
        let p0 = DVector::from_vec(vec![1.0, 0.3, 0.0]);
        let sol = minimize(method, &residual, p0, &Bounds::unbounded(3), &SolverOptions::default());
        assert!(sol.converged, "{method:?} did not converge");
        assert!((sol.params[0] - 2.0).abs() < 1e-4, "{method:?}: {}", sol.params);
        assert!((sol.params[1] - 0.7).abs() < 1e-4, "{method:?}: {}", sol.params);
        assert!((sol.params[2] - 0.5).abs() < 1e-4, "{method:?}: {}", sol.params);
    }

    #[test]
    fn levenberg_marquardt_recovers_decay() {
        check(FitMethod::Leastsq);
    }

    #[test]
    fn bounded_gauss_newton_recovers_decay() {
        check(FitMethod::LeastSquare);
    }

    #[test]
    fn nelder_mead_recovers_decay() {
        check(FitMethod::Nelder);
    }

    #[test]
    fn bounds_are_respected() {
        let residual = |p: &DVector<f64>| DVector::from_vec(vec![p[0] + 3.0]);
        let bounds = Bounds {
            lower: DVector::from_vec(vec![0.0]),
            upper: DVector::from_vec(vec![10.0]),
        };
        let sol = minimize(
            FitMethod::LeastSquare,
            &residual,
            DVector::from_vec(vec![5.0]),
            &bounds,
            &SolverOptions::default(),
        );
        assert!(sol.params[0] >= 0.0);
        assert!(sol.params[0] < 1e-6, "pinned at lower bound: {}", sol.params);
    }

    #[test]
    fn fallback_order_starts_with_requested_method() {
        assert_eq!(
            FitMethod::Nelder.fallback_order(),
            vec![FitMethod::Nelder, FitMethod::Leastsq, FitMethod::LeastSquare]
        );
    }
}
