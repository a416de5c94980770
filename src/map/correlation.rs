//! Pearson correlation between property maps.

use crate::geometry::Mask;
use crate::properties::ModeTable;
use crate::stats::pearson;
use serde::Serialize;

/// Correlation of `a` and `b` over pixels outside `mask` and finite in both.
/// NaN when fewer than two such pixels or a constant vector remain.
pub fn masked_correlation(a: &[f64], b: &[f64], mask: &Mask) -> f64 {
    let keep = |(i, _): &(usize, &f64)| !mask.contains(*i);
    let a: Vec<f64> = a.iter().enumerate().filter(keep).map(|(_, v)| *v).collect();
    let b: Vec<f64> = b.iter().enumerate().filter(keep).map(|(_, v)| *v).collect();
    pearson(&a, &b).unwrap_or(f64::NAN)
}

/// Upper-triangular correlation matrix; entries below the diagonal are NaN.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        Some(self.values[i][j])
    }
}

/// Correlations between the selected columns of one mode (all when
/// `selection` is empty).
pub fn within_mode(table: &ModeTable, selection: &[String], mask: &Mask) -> CorrelationMatrix {
    let columns: Vec<(&str, &[f64])> = table
        .columns()
        .filter(|(n, _)| selection.is_empty() || selection.iter().any(|s| s == n))
        .collect();
    let n = columns.len();
    let mut values = vec![vec![f64::NAN; n]; n];
    for i in 0..n {
        for j in i..n {
            values[i][j] = masked_correlation(columns[i].1, columns[j].1, mask);
        }
    }
    CorrelationMatrix {
        names: columns.iter().map(|(n, _)| n.to_string()).collect(),
        values,
    }
}

/// Per shared property name, the correlation between the on and off maps.
pub fn on_off(on: &ModeTable, off: &ModeTable, mask: &Mask) -> Vec<(String, f64)> {
    on.columns()
        .filter_map(|(name, a)| {
            off.get(name)
                .map(|b| (name.to_string(), masked_correlation(a, b, mask)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_pixel_is_ignored() {
        let a = [1.0, 4.0, 2.0, 1000.0, 3.0];
        let b = [2.0, 8.0, 4.0, -1000.0, 6.0];
        assert!((masked_correlation(&a, &b, &Mask::from_indices([3])) - 1.0).abs() < 1e-12);
        assert!(masked_correlation(&a, &b, &Mask::empty()) < 0.0);
    }

    #[test]
    fn matrix_is_upper_triangular() {
        let mut table = ModeTable::new(4);
        table.insert("a", vec![1.0, 2.0, 3.0, 4.0]).expect("insert");
        table.insert("b", vec![4.0, 3.0, 2.0, 1.0]).expect("insert");
        table.insert("c", vec![1.0, 1.0, 1.0, 1.0]).expect("insert");
        let m = within_mode(&table, &[], &Mask::empty());
        assert_eq!(m.names, ["a", "b", "c"]);
        assert!((m.values[0][0] - 1.0).abs() < 1e-12);
        assert!((m.values[0][1] + 1.0).abs() < 1e-12);
        assert!(m.values[1][0].is_nan());
        assert!(m.values[0][2].is_nan());
        assert_eq!(m.get("b", "a"), Some(m.values[0][1]));
    }

    #[test]
    fn on_off_uses_shared_names() {
        let mut on = ModeTable::new(3);
        on.insert("area", vec![1.0, 2.0, 3.0]).expect("insert");
        on.insert("sat_elec_slope", vec![0.0, 1.0, 0.0]).expect("insert");
        let mut off = ModeTable::new(3);
        off.insert("area", vec![2.0, 4.0, 6.5]).expect("insert");
        let r = on_off(&on, &off, &Mask::empty());
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].0, "area");
        assert!(r[0].1 > 0.99);
    }
}
