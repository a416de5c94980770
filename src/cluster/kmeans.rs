//! K-means with k-means++ seeding and Lloyd iterations.

use crate::error::{Result, SspfmError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Debug, PartialEq)]
pub struct KMeansResult {
    pub labels: Vec<usize>,
    pub centers: Vec<Vec<f64>>,
    /// Within-cluster sum of squared distances.
    pub inertia: f64,
    pub iterations: usize,
}

#[inline]
fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the closest center; ties go to the lowest index.
fn nearest(row: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    centers
        .iter()
        .enumerate()
        .map(|(k, c)| (k, sq_dist(row, c)))
        .fold((0, f64::INFINITY), |best, cand| if cand.1 < best.1 { cand } else { best })
}

/// Reject inputs that cannot be split into `k` non-empty clusters.
pub(crate) fn check_input(rows: &[Vec<f64>], k: usize) -> Result<()> {
    if k == 0 {
        return Err(SspfmError::Cluster("number of clusters must be positive".to_string()));
    }
    if rows.len() < k {
        return Err(SspfmError::Cluster(format!(
            "{} rows cannot form {k} clusters",
            rows.len()
        )));
    }
    let dim = rows[0].len();
    if dim == 0 || rows.iter().any(|r| r.len() != dim) {
        return Err(SspfmError::Cluster("rows must share a non-zero length".to_string()));
    }
    let mut distinct: Vec<&Vec<f64>> = Vec::new();
    for row in rows {
        if !distinct.iter().any(|d| *d == row) {
            distinct.push(row);
            if distinct.len() >= k {
                return Ok(());
            }
        }
    }
    Err(SspfmError::Cluster(format!(
        "only {} distinct rows for {k} clusters",
        distinct.len()
    )))
}

fn seed_centers(rows: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centers = vec![rows[rng.gen_range(0..rows.len())].clone()];
    let mut d2: Vec<f64> = rows.iter().map(|r| sq_dist(r, &centers[0])).collect();
    while centers.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = rows.len() - 1;
            for (i, d) in d2.iter().enumerate() {
                if *d > 0.0 && target < *d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            rng.gen_range(0..rows.len())
        };
        centers.push(rows[next].clone());
        for (d, r) in d2.iter_mut().zip(rows) {
            *d = d.min(sq_dist(r, &centers[centers.len() - 1]));
        }
    }
    centers
}

fn lloyd(rows: &[Vec<f64>], mut centers: Vec<Vec<f64>>, max_iter: usize) -> KMeansResult {
    let k = centers.len();
    let dim = rows[0].len();
    let mut labels = vec![usize::MAX; rows.len()];
    let mut iterations = 0;
    for it in 0..max_iter.max(1) {
        iterations = it + 1;
        let mut changed = false;
        for (label, row) in labels.iter_mut().zip(rows) {
            let (best, _) = nearest(row, &centers);
            if *label != best {
                *label = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (label, row) in labels.iter().zip(rows) {
            counts[*label] += 1;
            for (s, v) in sums[*label].iter_mut().zip(row) {
                *s += v;
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                centers[c] = sums[c].iter().map(|s| s / counts[c] as f64).collect();
            } else {
                // Empty cluster: move it onto the worst-served row.
                let far = rows
                    .iter()
                    .enumerate()
                    .map(|(i, r)| (i, nearest(r, &centers).1))
                    .fold((0, -1.0), |best, cand| if cand.1 > best.1 { cand } else { best });
                centers[c] = rows[far.0].clone();
            }
        }
    }
    let inertia = rows
        .iter()
        .zip(&labels)
        .map(|(r, l)| sq_dist(r, &centers[*l]))
        .sum();
    KMeansResult {
        labels,
        centers,
        inertia,
        iterations,
    }
}

/// Best of `n_init` seeded runs by inertia.
pub fn kmeans(
    rows: &[Vec<f64>],
    k: usize,
    n_init: usize,
    max_iter: usize,
    seed: u64,
) -> Result<KMeansResult> {
    check_input(rows, k)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut best: Option<KMeansResult> = None;
    for _ in 0..n_init.max(1) {
        let centers = seed_centers(rows, k, &mut rng);
        let run = lloyd(rows, centers, max_iter);
        if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    best.ok_or_else(|| SspfmError::Cluster("k-means produced no run".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f64>> {
        let mut rows = Vec::new();
        for i in 0..10 {
            let t = i as f64 * 0.01;
            rows.push(vec![t, -t]);
            rows.push(vec![5.0 + t, 5.0]);
            rows.push(vec![-5.0, 5.0 - t]);
        }
        rows
    }

    #[test]
    fn separates_three_blobs() {
        let rows = blobs();
        let res = kmeans(&rows, 3, 20, 100, 7).expect("kmeans");
        for chunk in res.labels.chunks(3) {
            assert_ne!(chunk[0], chunk[1]);
            assert_ne!(chunk[1], chunk[2]);
            assert_ne!(chunk[0], chunk[2]);
        }
        assert_eq!(res.labels[0], res.labels[27]);
        assert!(res.inertia < 0.1);
    }

    #[test]
    fn same_seed_same_result() {
        let rows = blobs();
        let a = kmeans(&rows, 3, 5, 100, 42).expect("kmeans");
        let b = kmeans(&rows, 3, 5, 100, 42).expect("kmeans");
        assert_eq!(a, b);
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        let equal = vec![vec![1.0, 1.0]; 5];
        assert!(matches!(kmeans(&equal, 2, 20, 10, 0), Err(SspfmError::Cluster(_))));
        let few = vec![vec![0.0], vec![1.0]];
        assert!(matches!(kmeans(&few, 3, 20, 10, 0), Err(SspfmError::Cluster(_))));
    }
}
