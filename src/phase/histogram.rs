use crate::angle::{circular_distance, circular_mean, wrap_deg_positive};

/// Circular histogram over [0°, 360°) used to find the two phase states.
pub(crate) struct PhaseHistogram {
    bins: Vec<f64>,
    bin_width: f64,
}

impl PhaseHistogram {
    pub(crate) fn new(num_bins: usize) -> Self {
        let num_bins = num_bins.max(1);
        PhaseHistogram {
            bins: vec![0.0; num_bins],
            bin_width: 360.0 / num_bins as f64,
        }
    }

    pub(crate) fn from_samples(samples: &[f64], num_bins: usize) -> Self {
        let mut hist = Self::new(num_bins);
        for &s in samples {
            hist.accumulate(s, 1.0);
        }
        hist
    }

    #[cfg(test)]
    pub(crate) fn bins(&self) -> &[f64] {
        &self.bins
    }

    pub(crate) fn accumulate(&mut self, angle: f64, weight: f64) {
        if !angle.is_finite() {
            return;
        }
        let mut idx = (wrap_deg_positive(angle) / self.bin_width) as usize;
        if idx >= self.bins.len() {
            idx = self.bins.len() - 1;
        }
        self.bins[idx] += weight.max(0.0);
    }

    /// Circular [1, 2, 1]/4 smoothing.
    pub(crate) fn smooth_121(&mut self) {
        let n = self.bins.len();
        if n <= 2 {
            return;
        }
        let smoothed: Vec<f64> = (0..n)
            .map(|i| {
                let prev = self.bins[(i + n - 1) % n];
                let next = self.bins[(i + 1) % n];
                (prev + 2.0 * self.bins[i] + next) * 0.25
            })
            .collect();
        self.bins = smoothed;
    }

    pub(crate) fn center(&self, index: usize) -> f64 {
        (index as f64 + 0.5) * self.bin_width
    }

    /// Dominant bin and, if any, the strongest bin farther than
    /// `min_separation_deg` from it.
    pub(crate) fn find_two_peaks(&self, min_separation_deg: f64) -> Option<(usize, Option<usize>)> {
        let first = self.argmax()?;
        if self.bins[first] <= 0.0 {
            return None;
        }
        let n = self.bins.len();
        let sep_bins = (min_separation_deg.max(0.0) / self.bin_width).ceil() as isize;
        let mut suppressed = vec![false; n];
        for di in -sep_bins..=sep_bins {
            let j = (first as isize + di).rem_euclid(n as isize) as usize;
            suppressed[j] = true;
        }
        let mut second = None;
        let mut best = 0.0;
        for (i, &val) in self.bins.iter().enumerate() {
            if suppressed[i] || val <= 0.0 {
                continue;
            }
            if val > best {
                best = val;
                second = Some(i);
            }
        }
        Some((first, second))
    }

    /// Gaussian moment estimate of a peak: circular mean of the samples
    /// lying within `half_window_deg` of the bin center.
    pub(crate) fn refined_peak(&self, samples: &[f64], index: usize, half_window_deg: f64) -> f64 {
        let center = self.center(index);
        let near: Vec<f64> = samples
            .iter()
            .copied()
            .filter(|s| s.is_finite() && circular_distance(*s, center) <= half_window_deg)
            .collect();
        circular_mean(&near, None)
            .map(wrap_deg_positive)
            .unwrap_or(center)
    }

    fn argmax(&self) -> Option<usize> {
        let mut best_idx = None;
        let mut best_val = f64::MIN;
        for (i, &val) in self.bins.iter().enumerate() {
            if val > best_val {
                best_val = val;
                best_idx = Some(i);
            }
        }
        best_idx
    }
}

#[cfg(test)]
mod tests {
    use super::PhaseHistogram;

    #[test]
    fn smoothing_wraps_around_zero() {
        let mut hist = PhaseHistogram::new(36);
        hist.accumulate(359.0, 4.0);
        hist.smooth_121();
        assert_eq!(hist.bins()[0], 1.0);
        assert_eq!(hist.bins()[35], 2.0);
    }

    #[test]
    fn two_peaks_are_separated() {
        let samples = [10.0, 11.0, 9.0, 195.0, 196.0, 12.0];
        let mut hist = PhaseHistogram::from_samples(&samples, 72);
        hist.smooth_121();
        let (p0, p1) = hist.find_two_peaks(60.0).expect("peaks");
        let p1 = p1.expect("second peak");
        assert!((hist.center(p0) - 10.0).abs() < 5.0, "first={}", hist.center(p0));
        assert!((hist.center(p1) - 195.0).abs() < 5.0, "second={}", hist.center(p1));
    }

    #[test]
    fn single_state_has_no_second_peak() {
        let mut hist = PhaseHistogram::from_samples(&[90.0, 91.0, 89.0], 72);
        hist.smooth_121();
        let (_, second) = hist.find_two_peaks(60.0).expect("peak");
        assert!(second.is_none());
    }

    #[test]
    fn refined_peak_recovers_sample_mean() {
        let samples = [8.0, 12.0, 190.0, 200.0];
        let hist = PhaseHistogram::from_samples(&samples, 72);
        let refined = hist.refined_peak(&samples, 2, 30.0);
        assert!((refined - 10.0).abs() < 1e-9, "refined={refined}");
    }
}
