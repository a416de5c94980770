//! Row preparation before clustering.

/// Whether a row can take part in clustering.
#[inline]
pub fn is_valid_row(row: &[f64]) -> bool {
    !row.is_empty() && row.iter().all(|v| v.is_finite())
}

/// Min-max scale one row into `[0, 1]`; a constant row maps to zeros.
pub fn normalize_row(row: &[f64]) -> Vec<f64> {
    let (lo, hi) = row
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let range = hi - lo;
    row.iter()
        .map(|v| {
            if !v.is_finite() {
                f64::NAN
            } else if range > 0.0 {
                (v - lo) / range
            } else {
                0.0
            }
        })
        .collect()
}

/// Per-pixel feature rows from one or more channels.
///
/// Every channel is given as one row per pixel. With several channels, or
/// when `relative` is set, each channel row is normalized before the channels
/// are concatenated.
pub fn build_rows(channels: &[&[Vec<f64>]], relative: bool) -> Vec<Vec<f64>> {
    concat(channels, relative || channels.len() > 1)
}

/// Channels concatenated per pixel without scaling.
pub fn raw_rows(channels: &[&[Vec<f64>]]) -> Vec<Vec<f64>> {
    concat(channels, false)
}

fn concat(channels: &[&[Vec<f64>]], normalize: bool) -> Vec<Vec<f64>> {
    let n = channels.iter().map(|c| c.len()).max().unwrap_or(0);
    (0..n)
        .map(|i| {
            let mut row = Vec::new();
            for channel in channels {
                match channel.get(i) {
                    Some(values) if normalize => row.extend(normalize_row(values)),
                    Some(values) => row.extend_from_slice(values),
                    None => return Vec::new(),
                }
            }
            row
        })
        .collect()
}

/// `on − off (+ offset_off)` per pixel. Pixels with mismatched lengths yield
/// an empty (invalid) row.
pub fn coupled_rows(on: &[Vec<f64>], off: &[Vec<f64>], offsets: Option<&[f64]>) -> Vec<Vec<f64>> {
    on.iter()
        .zip(off)
        .enumerate()
        .map(|(i, (a, b))| {
            if a.len() != b.len() {
                return Vec::new();
            }
            let shift = offsets.and_then(|o| o.get(i).copied()).unwrap_or(0.0);
            a.iter().zip(b).map(|(x, y)| x - y + shift).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_rows_are_normalized_per_channel() {
        let amp = vec![vec![0.0, 5.0, 10.0], vec![1.0, 1.0, 1.0]];
        let pha = vec![vec![-90.0, 90.0], vec![0.0, 180.0]];
        let rows = build_rows(&[&amp, &pha], false);
        assert_eq!(rows[0], vec![0.0, 0.5, 1.0, 0.0, 1.0]);
        assert_eq!(rows[1], vec![0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn single_channel_kept_unless_relative() {
        let amp = vec![vec![2.0, 4.0]];
        assert_eq!(build_rows(&[&amp], false)[0], vec![2.0, 4.0]);
        assert_eq!(build_rows(&[&amp], true)[0], vec![0.0, 1.0]);
    }

    #[test]
    fn coupled_rows_subtract_and_shift() {
        let on = vec![vec![3.0, 4.0], vec![1.0]];
        let off = vec![vec![1.0, 1.0], vec![1.0, 2.0]];
        let rows = coupled_rows(&on, &off, Some(&[0.5, 0.0]));
        assert_eq!(rows[0], vec![2.5, 3.5]);
        assert!(!is_valid_row(&rows[1]));
    }
}
