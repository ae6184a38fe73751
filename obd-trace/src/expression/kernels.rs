//! Whole-array kernels behind the statistical expression functions
//!
//! Rolling windows are measured in seconds, not samples: the window for sample
//! i covers every sample j <= i with `t[i] - w <= t[j]`. Each kernel is a
//! single forward sweep with a trailing pointer, so the cost is O(n) no matter
//! how wide the window is. Non-finite samples are skipped as missing data.

use std::collections::VecDeque;

/// Window width in seconds; negative or NaN widths shrink to the sample itself
fn window_width(window: f64) -> f64 {
    if window >= 0.0 {
        window
    } else {
        0.0
    }
}

pub(crate) fn rolling_mean(times: &[f64], values: &[f64], window: f64) -> Vec<f64> {
    let width = window_width(window);
    // Sums are kept relative to a fixed reference so a constant series
    // accumulates exact zeros and comes back unchanged.
    let reference = values.iter().copied().find(|v| v.is_finite()).unwrap_or(0.0);

    let mut out = Vec::with_capacity(values.len());
    let mut start = 0usize;
    let mut sum = 0.0;
    let mut count = 0usize;

    for (i, (&t, &v)) in times.iter().zip(values).enumerate() {
        if v.is_finite() {
            sum += v - reference;
            count += 1;
        }
        while start < i && times[start] < t - width {
            let old = values[start];
            if old.is_finite() {
                sum -= old - reference;
                count -= 1;
            }
            start += 1;
        }
        out.push(if count == 0 {
            f64::NAN
        } else {
            reference + sum / count as f64
        });
    }
    out
}

pub(crate) fn rolling_min(times: &[f64], values: &[f64], window: f64) -> Vec<f64> {
    rolling_extreme(times, values, window, |candidate, kept| candidate <= kept)
}

pub(crate) fn rolling_max(times: &[f64], values: &[f64], window: f64) -> Vec<f64> {
    rolling_extreme(times, values, window, |candidate, kept| candidate >= kept)
}

/// Monotonic-deque sliding extreme; `dominates(new, old)` evicts `old`
fn rolling_extreme(times: &[f64], values: &[f64], window: f64, dominates: fn(f64, f64) -> bool) -> Vec<f64> {
    let width = window_width(window);
    let mut out = Vec::with_capacity(values.len());
    let mut deque: VecDeque<usize> = VecDeque::new();

    for (i, (&t, &v)) in times.iter().zip(values).enumerate() {
        if v.is_finite() {
            while deque.back().is_some_and(|&j| dominates(v, values[j])) {
                deque.pop_back();
            }
            deque.push_back(i);
        }
        while deque.front().is_some_and(|&j| times[j] < t - width) {
            deque.pop_front();
        }
        out.push(deque.front().map_or(f64::NAN, |&j| values[j]));
    }
    out
}

/// Sample-to-sample difference; the first element repeats the second
pub(crate) fn delta(values: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; values.len()];
    for i in 1..values.len() {
        out[i] = values[i] - values[i - 1];
    }
    if out.len() > 1 {
        out[0] = out[1];
    }
    out
}

/// Running total; missing samples contribute nothing and stay missing
pub(crate) fn cumsum(values: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    values
        .iter()
        .map(|&v| {
            if v.is_finite() {
                total += v;
                total
            } else {
                f64::NAN
            }
        })
        .collect()
}

fn finite(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| v.is_finite())
}

pub(crate) fn nan_min(values: &[f64]) -> f64 {
    finite(values).reduce(f64::min).unwrap_or(f64::NAN)
}

pub(crate) fn nan_max(values: &[f64]) -> f64 {
    finite(values).reduce(f64::max).unwrap_or(f64::NAN)
}

pub(crate) fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = finite(values).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population standard deviation (ddof = 0)
pub(crate) fn nan_std(values: &[f64]) -> f64 {
    let mean = nan_mean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let (sq, count) = finite(values).fold((0.0, 0usize), |(s, n), v| (s + (v - mean).powi(2), n + 1));
    (sq / count as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_mean_irregular_sampling() {
        let times = [0.0, 0.5, 1.0, 3.0, 3.2];
        let values = [1.0, 3.0, 5.0, 7.0, 9.0];
        let out = rolling_mean(&times, &values, 1.0);
        // windows: {0}, {0,.5}, {0,.5,1}, {3}, {3,3.2}
        assert_eq!(out, vec![1.0, 2.0, 3.0, 7.0, 8.0]);
    }

    #[test]
    fn test_rolling_mean_skips_missing() {
        let out = rolling_mean(&[0.0, 1.0, 2.0], &[2.0, f64::NAN, 4.0], 10.0);
        assert_eq!(out, vec![2.0, 2.0, 3.0]);

        let out = rolling_mean(&[0.0, 5.0], &[f64::NAN, 1.0], 1.0);
        assert!(out[0].is_nan());
        assert_eq!(out[1], 1.0);
    }

    #[test]
    fn test_rolling_mean_constant_is_exact() {
        let times: Vec<f64> = (0..50).map(|i| i as f64 * 0.137).collect();
        let values = vec![0.1; 50];
        assert_eq!(rolling_mean(&times, &values, 0.7), values);
    }

    #[test]
    fn test_rolling_extremes() {
        let times = [0.0, 1.0, 2.0, 3.0, 4.0];
        let values = [5.0, 1.0, 4.0, f64::NAN, 2.0];
        assert_eq!(rolling_min(&times, &values, 1.0), vec![5.0, 1.0, 1.0, 4.0, 2.0]);
        assert_eq!(rolling_max(&times, &values, 1.0), vec![5.0, 5.0, 4.0, 4.0, 2.0]);
        // Zero-width window is just the sample itself
        let out = rolling_max(&times, &values, 0.0);
        assert_eq!(&out[..3], &[5.0, 1.0, 4.0]);
        assert!(out[3].is_nan());
    }

    #[test]
    fn test_delta_and_cumsum() {
        assert_eq!(delta(&[1.0, 4.0, 9.0]), vec![3.0, 3.0, 5.0]);
        assert_eq!(delta(&[7.0]), vec![0.0]);
        assert!(delta(&[]).is_empty());

        let sums = cumsum(&[1.0, f64::NAN, 2.0]);
        assert_eq!(sums[0], 1.0);
        assert!(sums[1].is_nan());
        assert_eq!(sums[2], 3.0);
    }

    #[test]
    fn test_reductions() {
        let values = [2.0, f64::NAN, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(nan_min(&values), 2.0);
        assert_eq!(nan_max(&values), 9.0);
        assert_eq!(nan_mean(&values), 5.0);
        assert_eq!(nan_std(&values), 2.0);
        assert!(nan_mean(&[f64::NAN]).is_nan());
        assert!(nan_std(&[]).is_nan());
    }
}
