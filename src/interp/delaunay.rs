//! Bowyer–Watson Delaunay triangulation of scattered 2-D points.

const EPS: f64 = 1e-9;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Triangle {
    pub(crate) v: [usize; 3],
    circ_center: [f64; 2],
    circ_r2: f64,
}

pub(crate) struct Triangulation {
    pub(crate) points: Vec<[f64; 2]>,
    pub(crate) triangles: Vec<Triangle>,
}

impl Triangle {
    fn new(points: &[[f64; 2]], v: [usize; 3]) -> Option<Self> {
        let [a, b, c] = [points[v[0]], points[v[1]], points[v[2]]];
        let d = 2.0 * (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1]));
        if d.abs() <= EPS {
            return None;
        }
        let a2 = a[0] * a[0] + a[1] * a[1];
        let b2 = b[0] * b[0] + b[1] * b[1];
        let c2 = c[0] * c[0] + c[1] * c[1];
        let ux = (a2 * (b[1] - c[1]) + b2 * (c[1] - a[1]) + c2 * (a[1] - b[1])) / d;
        let uy = (a2 * (c[0] - b[0]) + b2 * (a[0] - c[0]) + c2 * (b[0] - a[0])) / d;
        let r2 = (a[0] - ux).powi(2) + (a[1] - uy).powi(2);
        Some(Self {
            v,
            circ_center: [ux, uy],
            circ_r2: r2,
        })
    }

    fn circumcircle_contains(&self, p: [f64; 2]) -> bool {
        let d2 = (p[0] - self.circ_center[0]).powi(2) + (p[1] - self.circ_center[1]).powi(2);
        d2 < self.circ_r2 * (1.0 - 1e-12)
    }
}

impl Triangulation {
    /// Triangulate `points`; `None` when fewer than three non-collinear points.
    pub(crate) fn build(points: Vec<[f64; 2]>) -> Option<Self> {
        if points.len() < 3 || all_collinear(&points) {
            return None;
        }
        let n = points.len();
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &points {
            min_x = min_x.min(p[0]);
            min_y = min_y.min(p[1]);
            max_x = max_x.max(p[0]);
            max_y = max_y.max(p[1]);
        }
        let span = (max_x - min_x).max(max_y - min_y).max(1.0);
        let mid = [0.5 * (min_x + max_x), 0.5 * (min_y + max_y)];
        let big = 1e4 * span;

        let mut all = points;
        all.push([mid[0] - big, mid[1] - big]);
        all.push([mid[0] + big, mid[1] - big]);
        all.push([mid[0], mid[1] + big]);

        let mut triangles = vec![Triangle::new(&all, [n, n + 1, n + 2])?];
        for i in 0..n {
            let p = all[i];
            let mut boundary: Vec<[usize; 2]> = Vec::new();
            let mut kept = Vec::with_capacity(triangles.len() + 2);
            for tri in triangles.into_iter() {
                if tri.circumcircle_contains(p) {
                    for e in [[tri.v[0], tri.v[1]], [tri.v[1], tri.v[2]], [tri.v[2], tri.v[0]]] {
                        if let Some(pos) = boundary
                            .iter()
                            .position(|b| b[0] == e[1] && b[1] == e[0] || *b == e)
                        {
                            boundary.swap_remove(pos);
                        } else {
                            boundary.push(e);
                        }
                    }
                } else {
                    kept.push(tri);
                }
            }
            for e in boundary {
                if let Some(tri) = Triangle::new(&all, [e[0], e[1], i]) {
                    kept.push(tri);
                }
            }
            triangles = kept;
        }
        triangles.retain(|t| t.v.iter().all(|&v| v < n));
        all.truncate(n);
        if triangles.is_empty() {
            return None;
        }
        Some(Self {
            points: all,
            triangles,
        })
    }

    /// Triangle containing `p` and its barycentric weights.
    pub(crate) fn locate(&self, p: [f64; 2]) -> Option<(usize, [f64; 3])> {
        for (t, tri) in self.triangles.iter().enumerate() {
            let [a, b, c] = tri.v.map(|i| self.points[i]);
            if p[0] < a[0].min(b[0]).min(c[0]) - EPS
                || p[0] > a[0].max(b[0]).max(c[0]) + EPS
                || p[1] < a[1].min(b[1]).min(c[1]) - EPS
                || p[1] > a[1].max(b[1]).max(c[1]) + EPS
            {
                continue;
            }
            if let Some(w) = barycentric(a, b, c, p) {
                if w.iter().all(|&wi| wi >= -1e-7) {
                    return Some((t, w));
                }
            }
        }
        None
    }

    /// Vertex adjacency lists derived from the triangle edges.
    pub(crate) fn neighbors(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.points.len()];
        for tri in &self.triangles {
            for k in 0..3 {
                let a = tri.v[k];
                let b = tri.v[(k + 1) % 3];
                if !adj[a].contains(&b) {
                    adj[a].push(b);
                }
                if !adj[b].contains(&a) {
                    adj[b].push(a);
                }
            }
        }
        adj
    }
}

fn barycentric(a: [f64; 2], b: [f64; 2], c: [f64; 2], p: [f64; 2]) -> Option<[f64; 3]> {
    let det = (b[1] - c[1]) * (a[0] - c[0]) + (c[0] - b[0]) * (a[1] - c[1]);
    if det.abs() <= EPS {
        return None;
    }
    let l1 = ((b[1] - c[1]) * (p[0] - c[0]) + (c[0] - b[0]) * (p[1] - c[1])) / det;
    let l2 = ((c[1] - a[1]) * (p[0] - c[0]) + (a[0] - c[0]) * (p[1] - c[1])) / det;
    Some([l1, l2, 1.0 - l1 - l2])
}

fn all_collinear(points: &[[f64; 2]]) -> bool {
    let a = points[0];
    let Some(b) = points
        .iter()
        .copied()
        .find(|p| (p[0] - a[0]).abs() > EPS || (p[1] - a[1]).abs() > EPS)
    else {
        return true;
    };
    points.iter().all(|p| {
        let cross = (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);
        cross.abs() <= EPS
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_square_yields_two_triangles() {
        let tri = Triangulation::build(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]])
            .expect("triangulation");
        assert_eq!(tri.triangles.len(), 2);
        assert!(tri.locate([0.5, 0.5]).is_some());
        assert!(tri.locate([1.5, 0.5]).is_none());
    }

    #[test]
    fn collinear_points_are_rejected() {
        assert!(Triangulation::build(vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]).is_none());
    }

    #[test]
    fn grid_triangulation_covers_hull() {
        let mut pts = Vec::new();
        for y in 0..5 {
            for x in 0..6 {
                pts.push([x as f64, y as f64]);
            }
        }
        let tri = Triangulation::build(pts).expect("triangulation");
        assert_eq!(tri.triangles.len(), 2 * 5 * 4);
        for y in 0..9 {
            for x in 0..11 {
                let p = [x as f64 * 0.5, y as f64 * 0.5];
                assert!(tri.locate(p).is_some(), "uncovered point {p:?}");
            }
        }
    }
}
