use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Switching shape of one branch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitModel {
    #[default]
    Sigmoid,
    Arctan,
}

impl FitModel {
    /// Centered switching term `S(V)`, zero at `x0`.
    #[inline]
    pub fn shape(self, ampli: f64, coef: f64, x0: f64, v: f64) -> f64 {
        let z = coef * (v - x0);
        match self {
            FitModel::Sigmoid => ampli * (sigmoid(z) - 0.5),
            FitModel::Arctan => ampli * z.atan() / PI,
        }
    }

    /// `dS/dV`.
    #[inline]
    pub fn slope(self, ampli: f64, coef: f64, x0: f64, v: f64) -> f64 {
        let z = coef * (v - x0);
        match self {
            FitModel::Sigmoid => {
                let s = sigmoid(z);
                ampli * coef * s * (1.0 - s)
            }
            FitModel::Arctan => ampli * coef / (PI * (1.0 + z * z)),
        }
    }
}

#[inline]
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Branch of a loop: 0 ascending (forward), 1 descending (reverse).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Ascending,
    Descending,
}

/// Parameters of the two-branch model
/// `y_i(V) = offset + slope·V + S(ampli_i, coef_i, x0_i; V)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct HystParams {
    pub offset: f64,
    pub slope: f64,
    pub ampli_0: f64,
    pub ampli_1: f64,
    pub coef_0: f64,
    pub coef_1: f64,
    pub x0_0: f64,
    pub x0_1: f64,
}

impl HystParams {
    /// Number of free parameters.
    pub fn dim(asymmetric: bool) -> usize {
        if asymmetric {
            8
        } else {
            6
        }
    }

    /// Free-parameter vector. Symmetric fits share ampli and coef.
    pub fn to_free(&self, asymmetric: bool) -> DVector<f64> {
        if asymmetric {
            DVector::from_vec(vec![
                self.offset,
                self.slope,
                self.ampli_0,
                self.ampli_1,
                self.coef_0,
                self.coef_1,
                self.x0_0,
                self.x0_1,
            ])
        } else {
            DVector::from_vec(vec![
                self.offset,
                self.slope,
                0.5 * (self.ampli_0 + self.ampli_1),
                0.5 * (self.coef_0 + self.coef_1),
                self.x0_0,
                self.x0_1,
            ])
        }
    }

    pub fn from_free(p: &DVector<f64>, asymmetric: bool) -> Self {
        if asymmetric {
            Self {
                offset: p[0],
                slope: p[1],
                ampli_0: p[2],
                ampli_1: p[3],
                coef_0: p[4],
                coef_1: p[5],
                x0_0: p[6],
                x0_1: p[7],
            }
        } else {
            Self {
                offset: p[0],
                slope: p[1],
                ampli_0: p[2],
                ampli_1: p[2],
                coef_0: p[3],
                coef_1: p[3],
                x0_0: p[4],
                x0_1: p[5],
            }
        }
    }

    /// Flip `(ampli, coef)` pairs so every `coef` is non-negative; the
    /// model is odd in `coef`, so the curve is unchanged.
    pub fn canonical(mut self) -> Self {
        if self.coef_0 < 0.0 {
            self.coef_0 = -self.coef_0;
            self.ampli_0 = -self.ampli_0;
        }
        if self.coef_1 < 0.0 {
            self.coef_1 = -self.coef_1;
            self.ampli_1 = -self.ampli_1;
        }
        self
    }

    pub fn is_finite(&self) -> bool {
        [
            self.offset,
            self.slope,
            self.ampli_0,
            self.ampli_1,
            self.coef_0,
            self.coef_1,
            self.x0_0,
            self.x0_1,
        ]
        .iter()
        .all(|v| v.is_finite())
    }

    pub fn side(&self, side: Side) -> (f64, f64, f64) {
        match side {
            Side::Ascending => (self.ampli_0, self.coef_0, self.x0_0),
            Side::Descending => (self.ampli_1, self.coef_1, self.x0_1),
        }
    }

    #[inline]
    pub fn background(&self, v: f64) -> f64 {
        self.offset + self.slope * v
    }

    /// Background-free branch value.
    #[inline]
    pub fn ferro(&self, model: FitModel, side: Side, v: f64) -> f64 {
        let (a, c, x0) = self.side(side);
        model.shape(a, c, x0, v)
    }

    /// Branch value including the background.
    #[inline]
    pub fn total(&self, model: FitModel, side: Side, v: f64) -> f64 {
        self.background(v) + self.ferro(model, side, v)
    }
}
