//! Per-mode clustering of per-pixel vectors.
//!
//! # Algorithm Outline
//! 1. Build one feature row per pixel (normalized and concatenated channels,
//!    or the coupled difference) and drop rows with non-finite values.
//! 2. Optionally project the rows onto their two leading principal components.
//! 3. Sort rows lexicographically so the partition does not depend on the
//!    pixel order, then run K-means or a Gaussian mixture.
//! 4. Rename clusters canonically and average the member rows in the
//!    un-normalized input space.

pub mod canonical;
pub mod gmm;
pub mod kmeans;
pub mod pca;
pub mod preprocess;

pub use canonical::{canonicalize, cluster_name, ClusterInfo};
pub use preprocess::{build_rows, coupled_rows, raw_rows};

use crate::error::{Result, SspfmError};
use crate::stats::nan_mean;
use crate::types::Mode;
use gmm::{gmm, GmmOptions};
use kmeans::kmeans;
use log::{debug, info, warn};
use pca::Pca;
use preprocess::is_valid_row;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Note attached to a mode whose pixels are all masked or missing.
pub const NO_MODE_NOTE: &str = "no mode available";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMethod {
    #[default]
    Kmeans,
    Gmm,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterOptions {
    pub method: ClusterMethod,
    pub n_clusters: usize,
    /// Reduce the rows to `n_components` principal components first.
    pub pca: bool,
    pub n_components: usize,
    /// Normalize single-channel rows as well.
    pub relative: bool,
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            method: ClusterMethod::Kmeans,
            n_clusters: 3,
            pca: false,
            n_components: 2,
            relative: false,
            seed: 0,
            n_init: 20,
            max_iter: 300,
        }
    }
}

/// Clustering outcome of one mode.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterAssignment {
    pub mode: Mode,
    /// Canonical cluster index per pixel; `None` for excluded pixels.
    pub labels: Vec<Option<usize>>,
    pub info: Vec<ClusterInfo>,
    /// K-means SSE or mixture BIC.
    pub inertia: f64,
    /// Mean member row per cluster, indexed like `info`.
    pub averages: Vec<Vec<f64>>,
    pub note: Option<String>,
}

impl ClusterAssignment {
    pub fn empty(mode: Mode, n_pixels: usize) -> Self {
        Self {
            mode,
            labels: vec![None; n_pixels],
            info: Vec::new(),
            inertia: f64::NAN,
            averages: Vec::new(),
            note: Some(NO_MODE_NOTE.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    /// Column name of the label file: force curves live in the `other` mode.
    pub fn label_column(&self) -> &'static str {
        match self.mode {
            Mode::Other => "force_curve",
            m => m.as_str(),
        }
    }

    /// Labels as numbers, NaN for excluded pixels.
    pub fn label_values(&self) -> Vec<f64> {
        self.labels
            .iter()
            .map(|l| l.map_or(f64::NAN, |v| v as f64))
            .collect()
    }
}

fn lexicographic(a: &[f64], b: &[f64]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Partition of `rows` into `k` clusters: labels in row order, centers and inertia.
fn partition(rows: &[Vec<f64>], k: usize, opts: &ClusterOptions) -> Result<(Vec<usize>, Vec<Vec<f64>>, f64)> {
    let mut perm: Vec<usize> = (0..rows.len()).collect();
    perm.sort_by(|&a, &b| lexicographic(&rows[a], &rows[b]));
    let sorted: Vec<Vec<f64>> = perm.iter().map(|&i| rows[i].clone()).collect();
    let (sorted_labels, centers, inertia) = match opts.method {
        ClusterMethod::Kmeans => {
            let res = kmeans(&sorted, k, opts.n_init.max(20), opts.max_iter, opts.seed)?;
            (res.labels, res.centers, res.inertia)
        }
        ClusterMethod::Gmm => {
            let gopts = GmmOptions {
                max_iter: opts.max_iter,
                seed: opts.seed,
                ..GmmOptions::default()
            };
            let res = gmm(&sorted, k, &gopts)?;
            if !res.converged {
                warn!("gaussian mixture with {k} components did not converge");
            }
            (res.labels, res.means, res.bic)
        }
    };
    let mut labels = vec![0usize; rows.len()];
    for (j, &i) in perm.iter().enumerate() {
        labels[i] = sorted_labels[j];
    }
    Ok((labels, centers, inertia))
}

fn reduce(rows: Vec<Vec<f64>>, opts: &ClusterOptions) -> Vec<Vec<f64>> {
    if !opts.pca || rows.first().map_or(true, |r| r.len() <= opts.n_components) {
        return rows;
    }
    match Pca::fit(&rows, opts.n_components) {
        Some(pca) => {
            debug!("pca: explained variance {:?}", pca.explained_variance);
            pca.transform(&rows)
        }
        None => rows,
    }
}

fn average_rows(members: &[&Vec<f64>]) -> Vec<f64> {
    let len = members.iter().map(|r| r.len()).max().unwrap_or(0);
    (0..len)
        .map(|j| {
            let column: Vec<f64> = members.iter().filter_map(|r| r.get(j).copied()).collect();
            nan_mean(&column)
        })
        .collect()
}

/// Cluster one mode.
///
/// `features` are the prepared rows (one per pixel); `raw` the matching
/// un-normalized rows used for the per-cluster averages.
pub fn cluster_rows(
    mode: Mode,
    features: &[Vec<f64>],
    raw: &[Vec<f64>],
    opts: &ClusterOptions,
) -> Result<ClusterAssignment> {
    let valid: Vec<usize> = (0..features.len())
        .filter(|&i| is_valid_row(&features[i]))
        .collect();
    if valid.is_empty() {
        info!("clustering {mode}: {NO_MODE_NOTE}");
        return Ok(ClusterAssignment::empty(mode, features.len()));
    }
    let rows = reduce(valid.iter().map(|&i| features[i].clone()).collect(), opts);
    let (labels, centers, inertia) = partition(&rows, opts.n_clusters, opts)?;
    let canon = canonicalize(&labels, &centers);

    let mut per_pixel = vec![None; features.len()];
    for (&pixel, &label) in valid.iter().zip(&labels) {
        per_pixel[pixel] = Some(canon.remap[label]);
    }
    let averages = canon
        .order
        .iter()
        .map(|&old| {
            let members: Vec<&Vec<f64>> = valid
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == old)
                .filter_map(|(&p, _)| raw.get(p))
                .collect();
            average_rows(&members)
        })
        .collect();
    debug!(
        "clustering {mode}: {} of {} pixels in {} clusters, inertia={inertia:.4e}",
        valid.len(),
        features.len(),
        canon.info.len()
    );
    Ok(ClusterAssignment {
        mode,
        labels: per_pixel,
        info: canon.info,
        inertia,
        averages,
        note: None,
    })
}

/// Inertia for `k = 2..=k_max`; stops at the first `k` the data cannot support.
pub fn elbow(mode: Mode, features: &[Vec<f64>], k_max: usize, opts: &ClusterOptions) -> Result<Vec<(usize, f64)>> {
    if mode == Mode::Other {
        return Err(SspfmError::Cluster(
            "inertia accumulation is undefined for the 'other' pseudo-mode".to_string(),
        ));
    }
    let rows: Vec<Vec<f64>> = features.iter().filter(|r| is_valid_row(r)).cloned().collect();
    if rows.is_empty() {
        return Err(SspfmError::Cluster(format!("{mode}: {NO_MODE_NOTE}")));
    }
    let rows = reduce(rows, opts);
    let mut scan = Vec::new();
    for k in 2..=k_max.max(2) {
        match partition(&rows, k, opts) {
            Ok((_, _, inertia)) => scan.push((k, inertia)),
            Err(e) if !scan.is_empty() => {
                debug!("elbow scan of {mode} stops at k={k}: {e}");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(scan)
}
