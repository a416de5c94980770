//! Small numeric kernels shared by the fit, decoupling and map stages.

const EPS: f64 = 1e-12;

/// Mean of the finite entries, NaN when there are none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for &v in values {
        if v.is_finite() {
            sum += v;
            n += 1;
        }
    }
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// `n` evenly spaced samples over `[start, stop]` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Trapezoidal integral of `y` over `x`.
pub fn trapz(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum()
}

/// Central-difference derivative of `y` over `x` (one-sided at the ends).
pub fn gradient(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return vec![0.0; n];
    }
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let (a, b) = if i == 0 {
            (0, 1)
        } else if i == n - 1 {
            (n - 2, n - 1)
        } else {
            (i - 1, i + 1)
        };
        let dx = x[b] - x[a];
        out.push(if dx.abs() <= EPS {
            0.0
        } else {
            (y[b] - y[a]) / dx
        });
    }
    out
}

/// Coefficient of determination of `model` against `data`.
pub fn r_square(data: &[f64], model: &[f64]) -> f64 {
    let mean = nan_mean(data);
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (&d, &m) in data.iter().zip(model) {
        if !d.is_finite() || !m.is_finite() {
            continue;
        }
        ss_res += (d - m) * (d - m);
        ss_tot += (d - mean) * (d - mean);
    }
    if ss_tot <= EPS {
        if ss_res <= EPS {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Ordinary least-squares line `y = slope·x + intercept`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_square: f64,
}

#[derive(Default)]
struct LineAccum {
    n: f64,
    sx: f64,
    sy: f64,
    sxx: f64,
    sxy: f64,
}

impl LineAccum {
    fn accumulate(&mut self, x: f64, y: f64) {
        self.n += 1.0;
        self.sx += x;
        self.sy += y;
        self.sxx += x * x;
        self.sxy += x * y;
    }

    fn solve(&self) -> Option<(f64, f64)> {
        let det = self.n * self.sxx - self.sx * self.sx;
        if self.n < 2.0 || det.abs() <= EPS {
            return None;
        }
        let slope = (self.n * self.sxy - self.sx * self.sy) / det;
        let intercept = (self.sy - slope * self.sx) / self.n;
        Some((slope, intercept))
    }
}

/// Fits a line through the finite `(x, y)` pairs, optionally restricted to
/// `x ∈ [window.0, window.1]`.
pub fn linear_regression(x: &[f64], y: &[f64], window: Option<(f64, f64)>) -> Option<LinearFit> {
    let (lo, hi) = match window {
        Some((a, b)) => (a.min(b), a.max(b)),
        None => (f64::NEG_INFINITY, f64::INFINITY),
    };
    let mut accum = LineAccum::default();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (&xi, &yi) in x.iter().zip(y) {
        if !xi.is_finite() || !yi.is_finite() || xi < lo || xi > hi {
            continue;
        }
        accum.accumulate(xi, yi);
        xs.push(xi);
        ys.push(yi);
    }
    let (slope, intercept) = accum.solve()?;
    let model: Vec<f64> = xs.iter().map(|&xi| slope * xi + intercept).collect();
    Some(LinearFit {
        slope,
        intercept,
        r_square: r_square(&ys, &model),
    })
}

/// Pearson correlation over the pairs where both entries are finite.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x, y))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let ma = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mb = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in pairs {
        cov += (x - ma) * (y - mb);
        va += (x - ma) * (x - ma);
        vb += (y - mb) * (y - mb);
    }
    let denom = (va * vb).sqrt();
    if denom <= EPS {
        return None;
    }
    Some((cov / denom).clamp(-1.0, 1.0))
}

/// Euclidean distance between two equally sized vectors.
#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn regression_recovers_line() {
        let x = linspace(-5.0, 5.0, 21);
        let y: Vec<f64> = x.iter().map(|v| 0.3 * v - 1.2).collect();
        let fit = linear_regression(&x, &y, None).expect("fit");
        assert_abs_diff_eq!(fit.slope, 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.intercept, -1.2, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.r_square, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn regression_window_excludes_outside_points() {
        let x = [-2.0, -1.0, 0.0, 1.0, 2.0, 10.0];
        let y = [-2.0, -1.0, 0.0, 1.0, 2.0, 500.0];
        let fit = linear_regression(&x, &y, Some((2.0, -2.0))).expect("fit");
        assert_abs_diff_eq!(fit.slope, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn pearson_of_negation_is_minus_one() {
        let a = [1.0, 4.0, 2.0, f64::NAN, 7.0];
        let b: Vec<f64> = a.iter().map(|v| -v).collect();
        assert_abs_diff_eq!(pearson(&a, &b).expect("corr"), -1.0, epsilon = 1e-12);
        assert!(pearson(&[1.0, 1.0], &[2.0, 3.0]).is_none());
    }

    #[test]
    fn trapz_and_gradient_on_parabola() {
        let x = linspace(0.0, 1.0, 1001);
        let y: Vec<f64> = x.iter().map(|v| v * v).collect();
        assert_abs_diff_eq!(trapz(&x, &y), 1.0 / 3.0, epsilon = 1e-6);
        let g = gradient(&x, &y);
        assert_abs_diff_eq!(g[500], 1.0, epsilon = 1e-9);
    }
}
