//! Descriptive statistics over plain `f64` slices.

/// Arithmetic mean. Returns 0 for an empty slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation around a precomputed mean.
pub fn std_dev(data: &[f64], mean: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = data.iter().map(|v| (v - mean) * (v - mean)).sum();
    (sum_sq / data.len() as f64).sqrt()
}

/// Sample autocorrelation at `lag`:
/// `Σ(x[t]-m)(x[t+lag]-m) / Σ(x[t]-m)²`.
///
/// Returns 0 when `lag` reaches past the series or the series has no
/// variance.
pub fn autocorrelation(data: &[f64], lag: usize) -> f64 {
    let n = data.len();
    if lag >= n {
        return 0.0;
    }

    let m = mean(data);
    let numerator: f64 = (0..n - lag)
        .map(|i| (data[i] - m) * (data[i + lag] - m))
        .sum();
    let denominator: f64 = data.iter().map(|v| (v - m) * (v - m)).sum();

    if denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator
}

/// Replace a series with its consecutive deltas, `order` times.
pub fn difference(data: &[f64], order: usize) -> Vec<f64> {
    let mut series = data.to_vec();
    for _ in 0..order {
        if series.len() < 2 {
            return Vec::new();
        }
        series = series.windows(2).map(|w| w[1] - w[0]).collect();
    }
    series
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_dev() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&data);
        assert_eq!(m, 5.0);
        assert_eq!(std_dev(&data, m), 2.0);
    }

    #[test]
    fn empty_slices_are_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[], 0.0), 0.0);
        assert_eq!(autocorrelation(&[], 1), 0.0);
    }

    #[test]
    fn autocorrelation_of_constant_is_zero() {
        assert_eq!(autocorrelation(&[3.0; 10], 1), 0.0);
    }

    #[test]
    fn autocorrelation_alternating_is_negative() {
        let data = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let r1 = autocorrelation(&data, 1);
        assert!((r1 - (-5.0 / 6.0)).abs() < 1e-12, "r1 was {r1}");
        let r2 = autocorrelation(&data, 2);
        assert!((r2 - (4.0 / 6.0)).abs() < 1e-12, "r2 was {r2}");
    }

    #[test]
    fn lag_past_end_is_zero() {
        assert_eq!(autocorrelation(&[1.0, 2.0, 3.0], 3), 0.0);
    }

    #[test]
    fn difference_orders() {
        let data = [1.0, 4.0, 9.0, 16.0];
        assert_eq!(difference(&data, 0), data.to_vec());
        assert_eq!(difference(&data, 1), vec![3.0, 5.0, 7.0]);
        assert_eq!(difference(&data, 2), vec![2.0, 2.0]);
        assert!(difference(&data, 4).is_empty());
    }
}
