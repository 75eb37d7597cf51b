//! Outlier-resistant statistics over pixel samples.
//!
//! The clipping loop is mean-centred: each pass drops values further than
//! `sigma` population standard deviations from the mean of the surviving
//! sample, until nothing more is dropped or the iteration budget runs out.

use ndarray::{ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::table::nan_float;

/// Sigma-clipping parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SigmaClip {
    pub sigma: f64,
    pub max_iterations: usize,
}

impl Default for SigmaClip {
    fn default() -> Self {
        Self {
            sigma: 3.0,
            max_iterations: 5,
        }
    }
}

/// Mean/median/std of a clipped sample. All three are NaN when no value
/// survived; `n_used` says how many did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClippedStats {
    #[serde(with = "nan_float")]
    pub mean: f64,
    #[serde(with = "nan_float")]
    pub median: f64,
    #[serde(with = "nan_float")]
    pub std: f64,
    pub n_used: usize,
}

impl ClippedStats {
    pub const NO_DATA: ClippedStats = ClippedStats {
        mean: f64::NAN,
        median: f64::NAN,
        std: f64::NAN,
        n_used: 0,
    };

    pub fn is_defined(&self) -> bool {
        self.n_used > 0
    }
}

impl PartialEq for ClippedStats {
    /// Field-wise equality where NaN equals NaN.
    fn eq(&self, other: &Self) -> bool {
        fn same(a: f64, b: f64) -> bool {
            a == b || (a.is_nan() && b.is_nan())
        }
        same(self.mean, other.mean)
            && same(self.median, other.median)
            && same(self.std, other.std)
            && self.n_used == other.n_used
    }
}

fn mean_and_std(sorted: &[f64]) -> (f64, f64) {
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let var = sorted.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Median of an ascending slice. NaN when empty.
pub fn median_of_sorted(sorted: &[f64]) -> f64 {
    let len = sorted.len();
    if len == 0 {
        return f64::NAN;
    }
    let mid = len / 2;
    if len % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    }
}

/// Linearly interpolated quantile of an ascending slice, `q` in [0, 1].
pub fn quantile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Finite values of `values`, sorted ascending.
pub fn sorted_finite(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut sample: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    sample.sort_unstable_by(f64::total_cmp);
    sample
}

/// Sigma-clipped mean, median and standard deviation.
///
/// Non-finite values are ignored. An empty sample yields `ClippedStats::NO_DATA`.
/// A value exactly `sigma` deviations from the mean is kept.
pub fn robust_stats(values: &[f64], sigma: f64, max_iterations: usize) -> ClippedStats {
    clip_sorted(sorted_finite(values.iter().copied()), sigma, max_iterations)
}

fn clip_sorted(mut sample: Vec<f64>, sigma: f64, max_iterations: usize) -> ClippedStats {
    if sample.is_empty() {
        return ClippedStats::NO_DATA;
    }

    for _ in 0..max_iterations {
        let (mean, std) = mean_and_std(&sample);
        let limit = sigma * std;
        let before = sample.len();
        // retain keeps the ascending order
        sample.retain(|v| (v - mean).abs() <= limit);
        if sample.len() == before || sample.is_empty() {
            break;
        }
    }

    if sample.is_empty() {
        return ClippedStats::NO_DATA;
    }
    let (mean, std) = mean_and_std(&sample);
    ClippedStats {
        mean,
        median: median_of_sorted(&sample),
        std,
        n_used: sample.len(),
    }
}

impl SigmaClip {
    pub fn apply(&self, values: &[f64]) -> ClippedStats {
        robust_stats(values, self.sigma, self.max_iterations)
    }

    /// Clip the pixels of `data`, keeping only those where `usable` is true
    /// when a mask is given.
    pub fn apply_masked(
        &self,
        data: ArrayView2<f32>,
        usable: Option<ArrayView2<bool>>,
    ) -> ClippedStats {
        clip_sorted(
            sorted_finite(masked_values(data, usable)),
            self.sigma,
            self.max_iterations,
        )
    }
}

/// Pixel values of `data` as f64, restricted to `usable` pixels when given.
pub fn masked_values(data: ArrayView2<f32>, usable: Option<ArrayView2<bool>>) -> Vec<f64> {
    match usable {
        Some(good) => {
            let mut out = Vec::with_capacity(data.len());
            Zip::from(&data).and(&good).for_each(|&v, &g| {
                if g {
                    out.push(v as f64);
                }
            });
            out
        }
        None => data.iter().map(|&v| v as f64).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;

    fn plain_stats(values: &[f64]) -> (f64, f64, f64) {
        let sorted = sorted_finite(values.iter().copied());
        let (mean, std) = mean_and_std(&sorted);
        (mean, median_of_sorted(&sorted), std)
    }

    #[test]
    fn test_empty_is_nan() {
        let s = robust_stats(&[], 3.0, 5);
        assert!(s.mean.is_nan() && s.median.is_nan() && s.std.is_nan());
        assert_eq!(s.n_used, 0);
        assert!(!s.is_defined());
    }

    #[test]
    fn test_all_nan_is_nan() {
        let s = robust_stats(&[f64::NAN, f64::INFINITY], 3.0, 5);
        assert_eq!(s, ClippedStats::NO_DATA);
    }

    #[test]
    fn test_single_value() {
        let s = robust_stats(&[42.0], 3.0, 5);
        assert_eq!(s.mean, 42.0);
        assert_eq!(s.median, 42.0);
        assert_eq!(s.std, 0.0);
        assert_eq!(s.n_used, 1);
    }

    #[test]
    fn test_constant_sample() {
        let s = robust_stats(&[7.5; 100], 3.0, 5);
        assert_eq!(s.mean, 7.5);
        assert_eq!(s.std, 0.0);
        assert_eq!(s.n_used, 100);
    }

    #[test]
    fn test_no_outliers_matches_plain_statistics() {
        let values: Vec<f64> = (0..101).map(|i| 50.0 + (i as f64 - 50.0) * 0.1).collect();
        let (mean, median, std) = plain_stats(&values);
        let s = robust_stats(&values, 3.0, 5);
        assert_eq!(s.n_used, values.len());
        assert_relative_eq!(s.mean, mean);
        assert_relative_eq!(s.median, median);
        assert_relative_eq!(s.std, std);
    }

    #[test]
    fn test_outlier_rejected() {
        let mut values = vec![10.0; 50];
        values.extend([11.0; 50]);
        values.push(1000.0);
        let s = robust_stats(&values, 3.0, 5);
        assert_eq!(s.n_used, 100);
        assert_relative_eq!(s.mean, 10.5);
        assert_relative_eq!(s.median, 10.5);
        assert_relative_eq!(s.std, 0.5);
    }

    #[test]
    fn test_iteration_budget_limits_clipping() {
        // a ladder of widening outliers peels off one rung per pass
        let mut values = vec![0.0; 20];
        values.extend([50.0, 500.0, 5000.0, 50000.0]);
        let one = robust_stats(&values, 3.0, 1);
        let many = robust_stats(&values, 3.0, 10);
        assert!(one.n_used > many.n_used);
        assert_eq!(many.n_used, 20);
        assert_eq!(many.mean, 0.0);
        assert_eq!(robust_stats(&values, 3.0, 0).n_used, values.len());
    }

    #[test]
    fn test_value_at_threshold_is_kept() {
        // mean 0, population std 1; both points sit exactly 1 sigma out
        let s = robust_stats(&[-1.0, 1.0], 1.0, 5);
        assert_eq!(s.n_used, 2);
    }

    #[test]
    fn test_order_invariance() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut values: Vec<f64> = (0..500).map(|i| ((i * 37) % 101) as f64 * 0.37).collect();
        values.extend([900.0, -400.0]);
        let reference = robust_stats(&values, 3.0, 5);
        for _ in 0..5 {
            values.shuffle(&mut rng);
            assert_eq!(robust_stats(&values, 3.0, 5), reference);
        }
    }

    #[test]
    fn test_masked_values() {
        let data = Array2::from_shape_vec((2, 2), vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let good = Array2::from_shape_vec((2, 2), vec![true, false, false, true]).unwrap();
        assert_eq!(masked_values(data.view(), Some(good.view())), vec![1.0, 4.0]);
        assert_eq!(masked_values(data.view(), None).len(), 4);

        let none = Array2::from_elem((2, 2), false);
        let s = SigmaClip::default().apply_masked(data.view(), Some(none.view()));
        assert!(!s.is_defined());
    }

    #[test]
    fn test_gain_summary_drops_outlier() {
        let mut gains = vec![2.0; 15];
        gains.push(9.0);
        let s = SigmaClip::default().apply(&gains);
        assert_eq!(s.n_used, 15);
        assert_eq!(s.median, 2.0);
        assert_eq!(s.std, 0.0);
    }

    #[test]
    fn test_quantile() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_of_sorted(&sorted, 0.0), 1.0);
        assert_eq!(quantile_of_sorted(&sorted, 1.0), 5.0);
        assert_eq!(quantile_of_sorted(&sorted, 0.5), 3.0);
        assert_relative_eq!(quantile_of_sorted(&sorted, 0.125), 1.5);
        assert!(quantile_of_sorted(&[], 0.5).is_nan());
    }
}
