//! Gaussian mixture with full covariances, fitted by expectation-maximization.
//!
//! # Algorithm Outline
//! 1. Initialize means from a seeded k-means run, covariances from the
//!    member scatter plus a ridge, weights from populations.
//! 2. E-step: log responsibilities through a Cholesky solve per component
//!    and a log-sum-exp normalization.
//! 3. M-step: weighted means, covariances (ridge added), weights.
//! 4. Stop when the mean log-likelihood improves by less than `tol`.
//! 5. Report hard labels, the final log-likelihood and the BIC.

use super::kmeans::{check_input, kmeans};
use crate::error::{Result, SspfmError};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use std::f64::consts::PI;

#[derive(Clone, Debug)]
pub struct GmmOptions {
    pub max_iter: usize,
    pub tol: f64,
    /// Added to every covariance diagonal.
    pub reg_covar: f64,
    pub seed: u64,
}

impl Default for GmmOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            seed: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GmmResult {
    pub labels: Vec<usize>,
    pub means: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
    pub log_likelihood: f64,
    pub bic: f64,
    pub converged: bool,
}

struct Component {
    weight: f64,
    mean: DVector<f64>,
    chol: Cholesky<f64, Dyn>,
    log_det: f64,
}

fn factor(mut cov: DMatrix<f64>, reg: f64) -> Result<(Cholesky<f64, Dyn>, f64)> {
    let d = cov.nrows();
    let mut ridge = reg;
    for _ in 0..6 {
        for i in 0..d {
            cov[(i, i)] += ridge;
        }
        if let Some(chol) = Cholesky::new(cov.clone()) {
            let log_det = 2.0 * chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();
            return Ok((chol, log_det));
        }
        ridge *= 10.0;
    }
    Err(SspfmError::Cluster(
        "covariance is not positive definite".to_string(),
    ))
}

impl Component {
    fn log_pdf(&self, x: &DVector<f64>) -> f64 {
        let d = x.len() as f64;
        let diff = x - &self.mean;
        let y = self
            .chol
            .l()
            .solve_lower_triangular(&diff)
            .unwrap_or_else(|| DVector::from_element(diff.len(), f64::INFINITY));
        -0.5 * (d * (2.0 * PI).ln() + self.log_det + y.norm_squared())
    }
}

fn m_step(data: &[DVector<f64>], resp: &DMatrix<f64>, reg: f64) -> Result<Vec<Component>> {
    let n = data.len();
    let d = data[0].len();
    (0..resp.ncols())
        .map(|c| {
            let nk = resp.column(c).sum() + 10.0 * f64::EPSILON;
            let mut mean = DVector::<f64>::zeros(d);
            for (i, x) in data.iter().enumerate() {
                mean += x * resp[(i, c)];
            }
            mean /= nk;
            let mut cov = DMatrix::<f64>::zeros(d, d);
            for (i, x) in data.iter().enumerate() {
                let diff = x - &mean;
                cov += &diff * diff.transpose() * resp[(i, c)];
            }
            cov /= nk;
            let (chol, log_det) = factor(cov, reg)?;
            Ok(Component {
                weight: nk / n as f64,
                mean,
                chol,
                log_det,
            })
        })
        .collect()
}

/// Responsibilities (rows = samples) and the mean log-likelihood.
fn e_step(data: &[DVector<f64>], comps: &[Component]) -> (DMatrix<f64>, f64) {
    let mut resp = DMatrix::<f64>::zeros(data.len(), comps.len());
    let mut total = 0.0;
    for (i, x) in data.iter().enumerate() {
        let logs: Vec<f64> = comps
            .iter()
            .map(|c| c.weight.ln() + c.log_pdf(x))
            .collect();
        let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lse = max + logs.iter().map(|l| (l - max).exp()).sum::<f64>().ln();
        total += lse;
        for (c, l) in logs.iter().enumerate() {
            resp[(i, c)] = (l - lse).exp();
        }
    }
    (resp, total / data.len() as f64)
}

/// Fit a `k`-component mixture on `rows`.
pub fn gmm(rows: &[Vec<f64>], k: usize, opts: &GmmOptions) -> Result<GmmResult> {
    check_input(rows, k)?;
    let n = rows.len();
    let d = rows[0].len();
    let data: Vec<DVector<f64>> = rows.iter().map(|r| DVector::from_column_slice(r)).collect();

    let init = kmeans(rows, k, 1, 100, opts.seed)?;
    let mut resp = DMatrix::<f64>::zeros(n, k);
    for (i, l) in init.labels.iter().enumerate() {
        resp[(i, *l)] = 1.0;
    }
    let mut comps = m_step(&data, &resp, opts.reg_covar)?;
    let mut lower_bound = f64::NEG_INFINITY;
    let mut converged = false;
    for _ in 0..opts.max_iter.max(1) {
        let (r, ll) = e_step(&data, &comps);
        resp = r;
        comps = m_step(&data, &resp, opts.reg_covar)?;
        let change = ll - lower_bound;
        lower_bound = ll;
        if change.abs() < opts.tol {
            converged = true;
            break;
        }
    }
    let (resp, mean_ll) = e_step(&data, &comps);
    let labels = (0..n)
        .map(|i| {
            resp.row(i)
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (c, p)| if *p > best.1 { (c, *p) } else { best })
                .0
        })
        .collect();
    let log_likelihood = mean_ll * n as f64;
    let n_params = (k * d + k * d * (d + 1) / 2 + k - 1) as f64;
    let bic = -2.0 * log_likelihood + n_params * (n as f64).ln();
    Ok(GmmResult {
        labels,
        means: comps.iter().map(|c| c.mean.iter().copied().collect()).collect(),
        weights: comps.iter().map(|c| c.weight).collect(),
        log_likelihood,
        bic,
        converged,
    })
}
