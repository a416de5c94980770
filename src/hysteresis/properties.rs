use super::model::{FitModel, HystParams, Side};
use crate::stats::{linspace, trapz};
use serde::{Deserialize, Serialize};

const GRID_POINTS: usize = 2001;

/// Thresholds on `|dS/dV|` relative to its maximum over the fitted range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Nucleation where `|dS/dV|` first exceeds `inf_threshold · max`.
    pub inf_threshold: f64,
    /// Saturation where `|dS/dV|` falls below `(1 − sat_threshold) · max`.
    pub sat_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            inf_threshold: 0.1,
            sat_threshold: 0.9,
        }
    }
}

/// Branch values at the characteristic voltages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CharacteristicY {
    pub coer_p: f64,
    pub coer_m: f64,
    pub nuc_p: f64,
    pub nuc_m: f64,
    pub sat_p: f64,
    pub sat_m: f64,
}

/// Properties derived from a fitted hysteresis. `_p` values come from the
/// ascending branch, `_m` values from the descending one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HystProperties {
    pub x_coer_p: f64,
    pub x_coer_m: f64,
    pub x_nuc_p: f64,
    pub x_nuc_m: f64,
    pub x_sat_p: f64,
    pub x_sat_m: f64,
    /// Including the background line.
    pub total: CharacteristicY,
    /// Background subtracted.
    pub ferro: CharacteristicY,
    pub area: f64,
    pub imprint: f64,
    pub memory_window: f64,
    pub y_shift: f64,
    pub amplitude: f64,
    pub r_square: f64,
}

impl HystProperties {
    pub const NAMES: [&'static str; 27] = [
        "x_coer_p",
        "x_coer_m",
        "y_coer_p",
        "y_coer_m",
        "x_nuc_p",
        "x_nuc_m",
        "y_nuc_p",
        "y_nuc_m",
        "y_nuc_p_ferro",
        "y_nuc_m_ferro",
        "x_sat_p",
        "x_sat_m",
        "y_sat_p",
        "y_sat_m",
        "y_sat_p_ferro",
        "y_sat_m_ferro",
        "area",
        "imprint",
        "memory_window",
        "y_shift",
        "amplitude",
        "offset",
        "slope",
        "coef_p",
        "coef_m",
        "r_square",
        "fit_ok",
    ];

    /// Values in [`Self::NAMES`] order. `params` supplies the raw fit terms.
    pub fn values(&self, params: &HystParams) -> [f64; 27] {
        [
            self.x_coer_p,
            self.x_coer_m,
            self.total.coer_p,
            self.total.coer_m,
            self.x_nuc_p,
            self.x_nuc_m,
            self.total.nuc_p,
            self.total.nuc_m,
            self.ferro.nuc_p,
            self.ferro.nuc_m,
            self.x_sat_p,
            self.x_sat_m,
            self.total.sat_p,
            self.total.sat_m,
            self.ferro.sat_p,
            self.ferro.sat_m,
            self.area,
            self.imprint,
            self.memory_window,
            self.y_shift,
            self.amplitude,
            params.offset,
            params.slope,
            params.coef_0,
            params.coef_1,
            self.r_square,
            1.0,
        ]
    }

    /// Row recorded for a pixel whose fit failed.
    pub fn nan_values() -> [f64; 27] {
        let mut row = [f64::NAN; 27];
        row[26] = 0.0;
        row
    }
}

/// First voltage along `grid` where `d` crosses `level` in the requested
/// direction, linearly interpolated between samples.
fn crossing(grid: &[f64], d: &[f64], level: f64, rising: bool) -> f64 {
    for i in 1..grid.len() {
        let (a, b) = (d[i - 1], d[i]);
        let hit = if rising {
            a < level && b >= level
        } else {
            a > level && b <= level
        };
        if hit {
            let t = if (b - a).abs() > 0.0 { (level - a) / (b - a) } else { 0.0 };
            return grid[i - 1] + t * (grid[i] - grid[i - 1]);
        }
    }
    f64::NAN
}

/// Nucleation and saturation voltages of one branch, following the branch
/// in its sweep direction.
fn nuc_sat(
    model: FitModel,
    params: &HystParams,
    side: Side,
    v_min: f64,
    v_max: f64,
    th: &Thresholds,
) -> (f64, f64) {
    let (a, c, x0) = params.side(side);
    let mut grid = linspace(v_min, v_max, GRID_POINTS);
    if side == Side::Descending {
        grid.reverse();
    }
    let d: Vec<f64> = grid.iter().map(|v| model.slope(a, c, x0, *v).abs()).collect();
    let d_max = d.iter().copied().fold(0.0f64, f64::max);
    if d_max <= 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let nuc = crossing(&grid, &d, th.inf_threshold * d_max, true);
    let peak = d
        .iter()
        .enumerate()
        .fold(0usize, |best, (i, v)| if *v > d[best] { i } else { best });
    let sat_level = (1.0 - th.sat_threshold) * d_max;
    let sat = crossing(&grid[peak..], &d[peak..], sat_level, false);
    (nuc, sat)
}

pub(crate) fn derive(
    model: FitModel,
    params: &HystParams,
    v_min: f64,
    v_max: f64,
    r_square: f64,
    th: &Thresholds,
) -> HystProperties {
    let (x_nuc_p, x_sat_p) = nuc_sat(model, params, Side::Ascending, v_min, v_max, th);
    let (x_nuc_m, x_sat_m) = nuc_sat(model, params, Side::Descending, v_min, v_max, th);
    let x_coer_p = params.x0_0;
    let x_coer_m = params.x0_1;

    let at = |side: Side, v: f64, with_background: bool| -> f64 {
        if !v.is_finite() {
            return f64::NAN;
        }
        if with_background {
            params.total(model, side, v)
        } else {
            params.ferro(model, side, v)
        }
    };
    let ys = |with_background: bool| CharacteristicY {
        coer_p: at(Side::Ascending, x_coer_p, with_background),
        coer_m: at(Side::Descending, x_coer_m, with_background),
        nuc_p: at(Side::Ascending, x_nuc_p, with_background),
        nuc_m: at(Side::Descending, x_nuc_m, with_background),
        sat_p: at(Side::Ascending, x_sat_p, with_background),
        sat_m: at(Side::Descending, x_sat_m, with_background),
    };

    let grid = linspace(v_min, v_max, GRID_POINTS);
    let gap: Vec<f64> = grid
        .iter()
        .map(|v| params.ferro(model, Side::Descending, *v) - params.ferro(model, Side::Ascending, *v))
        .collect();

    HystProperties {
        x_coer_p,
        x_coer_m,
        x_nuc_p,
        x_nuc_m,
        x_sat_p,
        x_sat_m,
        total: ys(true),
        ferro: ys(false),
        area: trapz(&grid, &gap).abs(),
        imprint: 0.5 * (x_coer_p + x_coer_m),
        memory_window: x_coer_p - x_coer_m,
        y_shift: params.offset,
        amplitude: 0.5 * (params.ampli_0.abs() + params.ampli_1.abs()),
        r_square,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_loop() -> HystParams {
        HystParams {
            offset: 0.5,
            slope: 0.1,
            ampli_0: 2.0,
            ampli_1: 2.0,
            coef_0: 4.0,
            coef_1: 4.0,
            x0_0: 1.0,
            x0_1: -1.0,
        }
    }

    #[test]
    fn coercive_and_area_of_shifted_branches() {
        let p = square_loop();
        let props = derive(FitModel::Sigmoid, &p, -5.0, 5.0, 1.0, &Thresholds::default());
        assert_eq!(props.x_coer_p, 1.0);
        assert_eq!(props.memory_window, 2.0);
        assert_eq!(props.imprint, 0.0);
        // Two unit-height steps of amplitude 2 shifted by 2 V enclose 4.
        assert!((props.area - 4.0).abs() < 1e-3, "area={}", props.area);
        assert!((props.total.coer_p - p.background(1.0)).abs() < 1e-12);
        assert!(props.ferro.coer_p.abs() < 1e-12);
    }

    #[test]
    fn nucleation_precedes_saturation_along_sweep() {
        let p = square_loop();
        let props = derive(FitModel::Sigmoid, &p, -5.0, 5.0, 1.0, &Thresholds::default());
        assert!(props.x_nuc_p < p.x0_0 && p.x0_0 < props.x_sat_p);
        assert!(props.x_nuc_m > p.x0_1 && p.x0_1 > props.x_sat_m);
        // Symmetric sigmoid: both thresholds at 10 % give mirrored voltages.
        assert!(((p.x0_0 - props.x_nuc_p) - (props.x_sat_p - p.x0_0)).abs() < 1e-2);
    }

    #[test]
    fn failed_row_marks_fit() {
        let row = HystProperties::nan_values();
        assert!(row[0].is_nan());
        assert_eq!(row[HystProperties::NAMES.len() - 1], 0.0);
    }
}
