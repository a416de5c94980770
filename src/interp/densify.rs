use super::fill::FillMethod;
use crate::raster::Raster;

/// Shape `(rows, cols)` of a raster densified by factor `k`.
pub fn densified_shape(h: usize, w: usize, k: usize) -> (usize, usize) {
    let k = k.max(1);
    (k * h.max(1) - (k - 1), k * w.max(1) - (k - 1))
}

/// Upsample `filled` by an integer factor `k`.
///
/// Original cells land on multiples of `k`; cells in between are
/// interpolated bilinearly (`Linear`) or with a Catmull-Rom bicubic kernel
/// (`Cubic`, falling back to bilinear next to NaN). A NaN corner with a
/// non-zero weight makes the output NaN. `k = 1` returns the input.
pub fn densify(filled: &Raster, k: usize, method: FillMethod) -> Raster {
    if k <= 1 || filled.w == 0 || filled.h == 0 {
        return filled.clone();
    }
    let (oh, ow) = densified_shape(filled.h, filled.w, k);
    let mut out = Raster::new_nan(ow, oh);
    let kf = k as f64;
    for r in 0..oh {
        for c in 0..ow {
            let y = r as f64 / kf;
            let x = c as f64 / kf;
            let v = if r % k == 0 && c % k == 0 {
                filled.get(c / k, r / k)
            } else {
                match method {
                    FillMethod::Linear => bilinear(filled, x, y),
                    FillMethod::Cubic => {
                        let v = bicubic(filled, x, y);
                        if v.is_finite() {
                            v
                        } else {
                            bilinear(filled, x, y)
                        }
                    }
                }
            };
            out.set(c, r, v);
        }
    }
    out
}

fn bilinear(src: &Raster, x: f64, y: f64) -> f64 {
    let x0 = (x.floor() as usize).min(src.w - 1);
    let y0 = (y.floor() as usize).min(src.h - 1);
    let x1 = (x0 + 1).min(src.w - 1);
    let y1 = (y0 + 1).min(src.h - 1);
    let tx = x - x0 as f64;
    let ty = y - y0 as f64;
    let taps = [
        ((1.0 - tx) * (1.0 - ty), x0, y0),
        (tx * (1.0 - ty), x1, y0),
        ((1.0 - tx) * ty, x0, y1),
        (tx * ty, x1, y1),
    ];
    let mut acc = 0.0;
    for (w, xi, yi) in taps {
        if w <= 1e-12 {
            continue;
        }
        let v = src.get(xi, yi);
        if v.is_nan() {
            return f64::NAN;
        }
        acc += w * v;
    }
    acc
}

fn catmull_rom(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

fn bicubic(src: &Raster, x: f64, y: f64) -> f64 {
    let xi = x.floor() as isize;
    let yi = y.floor() as isize;
    let wx = catmull_rom(x - xi as f64);
    let wy = catmull_rom(y - yi as f64);
    let clamp_x = |v: isize| v.clamp(0, src.w as isize - 1) as usize;
    let clamp_y = |v: isize| v.clamp(0, src.h as isize - 1) as usize;
    let mut acc = 0.0;
    for (j, wyj) in wy.iter().enumerate() {
        let sy = clamp_y(yi - 1 + j as isize);
        for (i, wxi) in wx.iter().enumerate() {
            let w = wxi * wyj;
            if w.abs() <= 1e-12 {
                continue;
            }
            let v = src.get(clamp_x(xi - 1 + i as isize), sy);
            if v.is_nan() {
                return f64::NAN;
            }
            acc += w * v;
        }
    }
    acc
}

/// Densified cells whose nearest original cell was NaN before filling.
///
/// `pre_fill_nan` is the row-major NaN flag of the original `(h, w)` raster;
/// indices are row-major in the densified raster of shape `densified`.
pub fn blank_set(
    pre_fill_nan: &[bool],
    original_w: usize,
    densified: (usize, usize),
    k: usize,
) -> Vec<usize> {
    let k = k.max(1) as f64;
    let (dh, dw) = densified;
    if original_w == 0 {
        return Vec::new();
    }
    let original_h = pre_fill_nan.len() / original_w;
    let mut out = Vec::new();
    for r in 0..dh {
        let oy = ((r as f64 / k).round() as usize).min(original_h.saturating_sub(1));
        for c in 0..dw {
            let ox = ((c as f64 / k).round() as usize).min(original_w - 1);
            if pre_fill_nan[oy * original_w + ox] {
                out.push(r * dw + c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn densified_shape_trims_trailing_rows() {
        assert_eq!(densified_shape(3, 4, 2), (5, 7));
        assert_eq!(densified_shape(3, 4, 1), (3, 4));
    }

    #[test]
    fn k_one_is_identity() {
        let r = Raster::from_rows(&[vec![1.0, 2.0], vec![3.0, f64::NAN]]).expect("raster");
        let d = densify(&r, 1, FillMethod::Linear);
        assert_eq!(d.w, 2);
        assert!(d.get(1, 1).is_nan());
        assert_eq!(d.get(0, 1), 3.0);
    }

    #[test]
    fn bilinear_midpoints() {
        let r = Raster::from_rows(&[vec![0.0, 2.0], vec![4.0, 6.0]]).expect("raster");
        let d = densify(&r, 2, FillMethod::Linear);
        assert_eq!((d.h, d.w), (3, 3));
        assert_abs_diff_eq!(d.get(1, 0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d.get(1, 1), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d.get(2, 2), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn cubic_reproduces_linear_ramp() {
        let rows: Vec<Vec<f64>> = (0..4)
            .map(|y| (0..4).map(|x| (x + 2 * y) as f64).collect())
            .collect();
        let r = Raster::from_rows(&rows).expect("raster");
        let d = densify(&r, 3, FillMethod::Cubic);
        assert_abs_diff_eq!(d.get(4, 4), 4.0 / 3.0 + 8.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn blank_set_covers_removed_pixel_block() {
        let nan = vec![false, false, false, false, true, false, false, false, false];
        let blank = blank_set(&nan, 3, densified_shape(3, 3, 2), 2);
        assert!(blank.contains(&(2 * 5 + 2)));
        assert!(!blank.contains(&0));
        let k1 = blank_set(&nan, 3, (3, 3), 1);
        assert_eq!(k1, vec![4]);
    }
}
