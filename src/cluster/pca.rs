use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Principal components of a set of rows.
#[derive(Clone, Debug)]
pub struct Pca {
    mean: DVector<f64>,
    /// One component per column, strongest first.
    components: DMatrix<f64>,
    pub explained_variance: Vec<f64>,
}

impl Pca {
    /// Fit `n_components` components. `None` for fewer than two rows.
    pub fn fit(rows: &[Vec<f64>], n_components: usize) -> Option<Pca> {
        let n = rows.len();
        let d = rows.first()?.len();
        if n < 2 || d == 0 {
            return None;
        }
        let data = DMatrix::from_fn(n, d, |i, j| rows[i][j]);
        let mean = DVector::from_fn(d, |j, _| data.column(j).mean());
        let mut centered = data;
        for j in 0..d {
            let m = mean[j];
            centered.column_mut(j).apply(|v| *v -= m);
        }
        let cov = centered.transpose() * &centered / (n as f64 - 1.0);
        let eig = SymmetricEigen::new(cov);
        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
        let m = n_components.min(d).max(1);
        let mut components = DMatrix::zeros(d, m);
        let mut explained_variance = Vec::with_capacity(m);
        for (c, &src) in order.iter().take(m).enumerate() {
            let mut v = eig.eigenvectors.column(src).into_owned();
            // Deterministic sign: largest loading positive.
            let lead = v.iter().fold(0.0f64, |acc, x| if x.abs() > acc.abs() { *x } else { acc });
            if lead < 0.0 {
                v.neg_mut();
            }
            components.set_column(c, &v);
            explained_variance.push(eig.eigenvalues[src].max(0.0));
        }
        Some(Pca {
            mean,
            components,
            explained_variance,
        })
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                let x = DVector::from_fn(self.mean.len(), |j, _| row[j] - self.mean[j]);
                (self.components.transpose() * x).iter().copied().collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Pca;

    #[test]
    fn first_component_follows_dominant_direction() {
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| {
                let t = i as f64;
                vec![t, 2.0 * t, if i % 2 == 0 { 0.1 } else { -0.1 }]
            })
            .collect();
        let pca = Pca::fit(&rows, 2).expect("pca");
        assert!(pca.explained_variance[0] > 100.0 * pca.explained_variance[1]);
        let projected = pca.transform(&rows);
        assert_eq!(projected[0].len(), 2);
        assert!(projected[9][0] > projected[0][0]);
    }
}
