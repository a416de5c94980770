use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Set of excluded pixel indices, always in linear (acquisition) order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask {
    indices: BTreeSet<usize>,
}

impl Mask {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            indices: indices.into_iter().collect(),
        }
    }

    /// Set complement over the pixel universe `0..n_pixels`.
    pub fn complement(&self, n_pixels: usize) -> Self {
        Self {
            indices: (0..n_pixels).filter(|i| !self.indices.contains(i)).collect(),
        }
    }

    /// The mask itself, or its complement when `revert` is set.
    pub fn reverted_if(self, revert: bool, n_pixels: usize) -> Self {
        if revert {
            self.complement(n_pixels)
        } else {
            self
        }
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }

    /// Copy of `values` with masked entries replaced by NaN.
    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| if self.contains(i) { f64::NAN } else { v })
            .collect()
    }
}
