//! Deterministic cluster naming.
//!
//! The most populated cluster becomes "A"; the others follow by increasing
//! center distance from it. Ties fall back to the smallest mean distance to
//! the other centers, then to first appearance in input order.

use crate::stats::euclidean;
use serde::Serialize;
use std::cmp::Ordering;

/// Summary row of one renamed cluster.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterInfo {
    pub name: String,
    pub population: usize,
    /// Center distance to cluster "A".
    pub ref_distance: f64,
    pub nearest_distance: f64,
    pub nearest_name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Canonical {
    /// Old label to new index.
    pub remap: Vec<usize>,
    /// New index to old label.
    pub order: Vec<usize>,
    pub info: Vec<ClusterInfo>,
}

/// Letter name of the `i`-th cluster: A..Z, then AA, AB, …
pub fn cluster_name(i: usize) -> String {
    let mut n = i;
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Rename clusters given labels in input order and their centers.
pub fn canonicalize(labels: &[usize], centers: &[Vec<f64>]) -> Canonical {
    let k = centers.len();
    let mut population = vec![0usize; k];
    let mut first_seen = vec![usize::MAX; k];
    for (i, l) in labels.iter().enumerate() {
        population[*l] += 1;
        first_seen[*l] = first_seen[*l].min(i);
    }
    let dist = |a: usize, b: usize| euclidean(&centers[a], &centers[b]);
    let mean_dist: Vec<f64> = (0..k)
        .map(|c| {
            if k < 2 {
                0.0
            } else {
                (0..k).filter(|o| *o != c).map(|o| dist(c, o)).sum::<f64>() / (k - 1) as f64
            }
        })
        .collect();

    let reference = (0..k)
        .min_by(|&a, &b| {
            population[b]
                .cmp(&population[a])
                .then(mean_dist[a].total_cmp(&mean_dist[b]))
                .then(first_seen[a].cmp(&first_seen[b]))
        })
        .unwrap_or(0);

    let mut order: Vec<usize> = (0..k).filter(|c| *c != reference).collect();
    order.sort_by(|&a, &b| {
        dist(reference, a)
            .total_cmp(&dist(reference, b))
            .then(first_seen[a].cmp(&first_seen[b]))
    });
    order.insert(0, reference);

    let mut remap = vec![0usize; k];
    for (new, old) in order.iter().enumerate() {
        remap[*old] = new;
    }

    let info = order
        .iter()
        .enumerate()
        .map(|(new, &old)| {
            let nearest = order
                .iter()
                .filter(|o| **o != old)
                .map(|&o| (o, dist(old, o)))
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
            ClusterInfo {
                name: cluster_name(new),
                population: population[old],
                ref_distance: dist(reference, old),
                nearest_distance: nearest.map_or(f64::NAN, |n| n.1),
                nearest_name: nearest.map_or_else(String::new, |n| cluster_name(remap[n.0])),
            }
        })
        .collect();

    Canonical { remap, order, info }
}
