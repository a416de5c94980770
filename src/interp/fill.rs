//! NaN filling by scattered-data interpolation over the valid cells.

use super::delaunay::Triangulation;
use crate::raster::{Raster, RasterView};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Interpolant used inside the convex hull of the valid cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMethod {
    #[default]
    Linear,
    Cubic,
}

/// Treatment of NaN cells left outside the convex hull.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeFill {
    /// Leave them NaN.
    #[default]
    Keep,
    /// Use the mean of the valid cells of the same row (column if the row
    /// has none).
    RowMean,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillOptions {
    pub method: FillMethod,
    pub edge: EdgeFill,
}

/// Interpolate NaN cells inside the convex hull of the valid cells.
pub fn fill(matrix: &Raster, method: FillMethod) -> Raster {
    fill_with(
        matrix,
        &FillOptions {
            method,
            edge: EdgeFill::Keep,
        },
    )
}

pub fn fill_with(matrix: &Raster, options: &FillOptions) -> Raster {
    let mut out = matrix.clone();
    if matrix.count_nan() == 0 {
        return out;
    }
    let mut points = Vec::new();
    let mut values = Vec::new();
    for (y, row) in matrix.rows().enumerate() {
        for (x, &v) in row.iter().enumerate() {
            if v.is_finite() {
                points.push([x as f64, y as f64]);
                values.push(v);
            }
        }
    }
    match Triangulation::build(points) {
        Some(tri) => {
            let gradients = match options.method {
                FillMethod::Linear => None,
                FillMethod::Cubic => Some(vertex_gradients(&tri, &values)),
            };
            let mut filled = 0usize;
            for y in 0..matrix.h {
                for x in 0..matrix.w {
                    if !matrix.get(x, y).is_nan() {
                        continue;
                    }
                    let p = [x as f64, y as f64];
                    let Some((t, w)) = tri.locate(p) else {
                        continue;
                    };
                    let v = tri.triangles[t].v;
                    let value = match &gradients {
                        None => w[0] * values[v[0]] + w[1] * values[v[1]] + w[2] * values[v[2]],
                        Some(g) => cubic_patch(&tri, &values, g, v, w),
                    };
                    out.set(x, y, value);
                    filled += 1;
                }
            }
            debug!(
                "fill: {} of {} NaN cells interpolated ({:?})",
                filled,
                matrix.count_nan(),
                options.method
            );
        }
        None => {
            warn!("fill: valid cells cannot be triangulated, leaving raster unfilled");
            return out;
        }
    }
    if options.edge == EdgeFill::RowMean {
        fill_edges_row_mean(&mut out);
    }
    out
}

fn fill_edges_row_mean(raster: &mut Raster) {
    let snapshot = raster.clone();
    for y in 0..raster.h {
        let row_mean = snapshot.row_mean(y);
        for x in 0..raster.w {
            if raster.get(x, y).is_nan() {
                if let Some(v) = row_mean.or_else(|| snapshot.col_mean(x)) {
                    raster.set(x, y, v);
                }
            }
        }
    }
}

/// Least-squares gradient at every vertex from its triangulation neighbours.
fn vertex_gradients(tri: &Triangulation, values: &[f64]) -> Vec<[f64; 2]> {
    let adj = tri.neighbors();
    tri.points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let (mut a11, mut a12, mut a22, mut b1, mut b2) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for &j in &adj[i] {
                let dx = tri.points[j][0] - p[0];
                let dy = tri.points[j][1] - p[1];
                let df = values[j] - values[i];
                let w = 1.0 / (dx * dx + dy * dy).max(1e-12);
                a11 += w * dx * dx;
                a12 += w * dx * dy;
                a22 += w * dy * dy;
                b1 += w * dx * df;
                b2 += w * dy * df;
            }
            let det = a11 * a22 - a12 * a12;
            if det.abs() <= 1e-12 {
                [0.0, 0.0]
            } else {
                [(a22 * b1 - a12 * b2) / det, (a11 * b2 - a12 * b1) / det]
            }
        })
        .collect()
}

/// Cubic Bézier triangle built from vertex values and gradients.
fn cubic_patch(
    tri: &Triangulation,
    values: &[f64],
    grads: &[[f64; 2]],
    v: [usize; 3],
    w: [f64; 3],
) -> f64 {
    let p = v.map(|i| tri.points[i]);
    let f = v.map(|i| values[i]);
    let g = v.map(|i| grads[i]);
    let edge = |from: usize, to: usize| -> f64 {
        let d = [p[to][0] - p[from][0], p[to][1] - p[from][1]];
        f[from] + (g[from][0] * d[0] + g[from][1] * d[1]) / 3.0
    };
    let b210 = edge(0, 1);
    let b120 = edge(1, 0);
    let b021 = edge(1, 2);
    let b012 = edge(2, 1);
    let b102 = edge(2, 0);
    let b201 = edge(0, 2);
    let e = (b210 + b120 + b021 + b012 + b102 + b201) / 6.0;
    let vmean = (f[0] + f[1] + f[2]) / 3.0;
    let b111 = e + 0.5 * (e - vmean);
    let [u, s, t] = w;
    u.powi(3) * f[0]
        + s.powi(3) * f[1]
        + t.powi(3) * f[2]
        + 3.0 * u * u * s * b210
        + 3.0 * u * s * s * b120
        + 3.0 * s * s * t * b021
        + 3.0 * s * t * t * b012
        + 3.0 * u * t * t * b102
        + 3.0 * u * u * t * b201
        + 6.0 * u * s * t * b111
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn plane(w: usize, h: usize) -> Raster {
        let mut r = Raster::new_nan(w, h);
        for y in 0..h {
            for x in 0..w {
                r.set(x, y, 2.0 * x as f64 - 0.5 * y as f64 + 1.0);
            }
        }
        r
    }

    #[test]
    fn linear_fill_reproduces_plane() {
        let truth = plane(5, 4);
        let mut holes = truth.clone();
        holes.set(2, 1, f64::NAN);
        holes.set(3, 2, f64::NAN);
        let filled = fill(&holes, FillMethod::Linear);
        assert_abs_diff_eq!(filled.get(2, 1), truth.get(2, 1), epsilon = 1e-9);
        assert_abs_diff_eq!(filled.get(3, 2), truth.get(3, 2), epsilon = 1e-9);
    }

    #[test]
    fn cubic_fill_reproduces_plane() {
        let truth = plane(6, 6);
        let mut holes = truth.clone();
        holes.set(2, 3, f64::NAN);
        let filled = fill(&holes, FillMethod::Cubic);
        assert_abs_diff_eq!(filled.get(2, 3), truth.get(2, 3), epsilon = 1e-9);
    }

    #[test]
    fn cells_outside_hull_stay_nan_unless_edge_fill() {
        let m = Raster::from_rows(&[
            vec![f64::NAN, 50.0, 40.0],
            vec![10.0, 20.0, 30.0],
        ])
        .expect("raster");
        let kept = fill(&m, FillMethod::Linear);
        assert!(kept.get(0, 0).is_nan());
        let edged = fill_with(
            &m,
            &FillOptions {
                method: FillMethod::Linear,
                edge: EdgeFill::RowMean,
            },
        );
        assert_abs_diff_eq!(edged.get(0, 0), 45.0, epsilon = 1e-12);
    }

    #[test]
    fn untriangulable_input_is_returned_unchanged() {
        let m = Raster::from_rows(&[vec![1.0, f64::NAN, 3.0]]).expect("raster");
        let out = fill(&m, FillMethod::Linear);
        assert!(out.get(1, 0).is_nan());
    }
}
