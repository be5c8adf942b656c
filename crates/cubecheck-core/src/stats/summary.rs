//! Scalar reductions over a flat sample buffer.
//!
//! Quantiles use linear interpolation between order statistics:
//!   h = (n − 1)·q,  Q(q) = x[⌊h⌋] + (h − ⌊h⌋)·(x[⌊h⌋+1] − x[⌊h⌋])
//! on the ascending-sorted samples. Variance is the population variance.

use super::{extract::NanPolicy, BandStatistics};

/// Summarise `samples` into a full [`BandStatistics`] record.
///
/// Under [`NanPolicy::Propagate`] a single NaN poisons every field, matching a
/// plain floating-point reduction. Under [`NanPolicy::Skip`] NaNs are dropped
/// first. Returns `None` when no usable samples remain.
pub fn summarize(samples: &[f64], nan_policy: NanPolicy) -> Option<BandStatistics> {
    let mut sorted: Vec<f64> = match nan_policy {
        NanPolicy::Skip => samples.iter().copied().filter(|v| !v.is_nan()).collect(),
        NanPolicy::Propagate => samples.to_vec(),
    };
    if sorted.is_empty() {
        return None;
    }
    if sorted.iter().any(|v| v.is_nan()) {
        return Some(BandStatistics::filled(f64::NAN));
    }

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n;

    sorted.sort_by(f64::total_cmp);

    Some(BandStatistics {
        mean: Some(mean),
        variance: Some(variance),
        min: sorted.first().copied(),
        max: sorted.last().copied(),
        quantile25: linear_quantile(&sorted, 0.25),
        quantile50: linear_quantile(&sorted, 0.5),
        quantile75: linear_quantile(&sorted, 0.75),
    })
}

/// Quantile `q` (0–1) of already-sorted, NaN-free samples.
pub fn linear_quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let (a, b) = (sorted[lo], sorted[hi]);
    // Clamp so rounding in the interpolation never crosses an order statistic.
    Some((a + (h - lo as f64) * (b - a)).clamp(a, b))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    #[test]
    fn quartiles_of_one_to_ten() {
        let data: Vec<f64> = (1..=10).map(f64::from).collect();
        let s = summarize(&data, NanPolicy::Propagate).unwrap();
        assert_abs_diff_eq!(s.mean.unwrap(), 5.5);
        assert_abs_diff_eq!(s.variance.unwrap(), 8.25);
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.max, Some(10.0));
        assert_abs_diff_eq!(s.quantile25.unwrap(), 3.25);
        assert_abs_diff_eq!(s.quantile50.unwrap(), 5.5);
        assert_abs_diff_eq!(s.quantile75.unwrap(), 7.75);
    }

    #[test]
    fn single_sample() {
        let s = summarize(&[4.0], NanPolicy::Propagate).unwrap();
        assert_eq!(s.quantile25, Some(4.0));
        assert_eq!(s.quantile75, Some(4.0));
        assert_eq!(s.variance, Some(0.0));
    }

    #[test]
    fn unsorted_input_is_handled() {
        let s = summarize(&[9.0, 1.0, 5.0, 3.0, 7.0], NanPolicy::Propagate).unwrap();
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.max, Some(9.0));
        assert_eq!(s.quantile25, Some(3.0));
        assert_eq!(s.quantile50, Some(5.0));
        assert_eq!(s.quantile75, Some(7.0));
    }

    #[test]
    fn nan_propagates() {
        let s = summarize(&[1.0, f64::NAN, 3.0], NanPolicy::Propagate).unwrap();
        assert!(s.mean.unwrap().is_nan());
        assert!(s.min.unwrap().is_nan());
        assert!(s.quantile50.unwrap().is_nan());
    }

    #[test]
    fn nan_skipped() {
        let s = summarize(&[1.0, f64::NAN, 3.0], NanPolicy::Skip).unwrap();
        assert_abs_diff_eq!(s.mean.unwrap(), 2.0);
        assert_eq!(s.quantile50, Some(2.0));
    }

    #[test]
    fn empty_and_all_nan() {
        assert!(summarize(&[], NanPolicy::Propagate).is_none());
        assert!(summarize(&[f64::NAN, f64::NAN], NanPolicy::Skip).is_none());
    }

    #[test]
    fn quantile_rejects_out_of_range_level() {
        assert!(linear_quantile(&[1.0, 2.0], 1.5).is_none());
        assert!(linear_quantile(&[], 0.5).is_none());
    }

    #[test]
    fn order_statistics_stay_ordered_on_random_input() {
        let mut rng = StdRng::seed_from_u64(7);
        for len in [1usize, 2, 3, 17, 256, 1001] {
            let data: Vec<f64> = (0..len).map(|_| rng.gen_range(-1.0e4..1.0e4)).collect();
            let s = summarize(&data, NanPolicy::Propagate).unwrap();
            assert!(s.is_ordered(), "len={len} stats={s:?}");
        }
    }
}
