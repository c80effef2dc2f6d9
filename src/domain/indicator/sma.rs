//! Simple Moving Average indicator.
//!
//! SMA(n)[i] = (P[i] + P[i-1] + ... + P[i-n+1]) / n
//! Warmup: first (n-1) bars are NaN. A window holding a NaN is NaN.

use std::collections::VecDeque;

use crate::domain::indicator::{Incremental, replay};

/// Streaming SMA over the last `period` inputs. `sum` holds the non-NaN
/// values of the window; NaNs are only counted.
#[derive(Debug, Clone)]
pub struct SmaState {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
    nan_count: usize,
}

impl SmaState {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::new(),
            sum: 0.0,
            nan_count: 0,
        }
    }
}

impl Incremental for SmaState {
    type Input = f64;

    fn next(&mut self, input: f64) -> f64 {
        if self.period == 0 {
            return f64::NAN;
        }
        if self.window.len() == self.period {
            match self.window.pop_front() {
                Some(old) if old.is_nan() => self.nan_count -= 1,
                Some(old) if old.is_finite() => self.sum -= old,
                // An infinity cannot be subtracted back out.
                Some(_) => self.sum = self.window.iter().filter(|v| !v.is_nan()).sum(),
                None => {}
            }
        }
        if input.is_nan() {
            self.nan_count += 1;
        } else {
            self.sum += input;
        }
        self.window.push_back(input);

        if self.window.len() < self.period || self.nan_count > 0 {
            return f64::NAN;
        }
        self.sum / self.period as f64
    }
}

pub fn sma(src: &[f64], period: usize) -> Vec<f64> {
    replay(SmaState::new(period), src.len(), |i| src[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sma_basic() {
        let result = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert!((result[2] - 2.0).abs() < f64::EPSILON);
        assert!((result[3] - 3.0).abs() < f64::EPSILON);
        assert!((result[4] - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sma_period_one_is_identity() {
        let result = sma(&[7.0, 8.0], 1);
        assert_eq!(result, vec![7.0, 8.0]);
    }

    #[test]
    fn sma_zero_period_is_nan() {
        assert!(sma(&[1.0, 2.0], 0).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn sma_period_longer_than_data() {
        assert!(sma(&[1.0, 2.0], 5).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn sma_nan_poisons_its_windows_only() {
        let result = sma(&[1.0, f64::NAN, 3.0, 4.0, 5.0], 2);
        assert!(result[1].is_nan());
        assert!(result[2].is_nan());
        assert!((result[3] - 3.5).abs() < f64::EPSILON);
        assert!((result[4] - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn huge_period_stays_nan_without_reserving() {
        let mut state = SmaState::new(usize::MAX);
        assert!(state.next(1.0).is_nan());
        assert!(sma(&[1.0, 2.0, 3.0], 1_000_000_000).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn running_sum_recovers_after_nan_leaves_window() {
        let mut state = SmaState::new(3);
        let out: Vec<f64> = [1.0, f64::NAN, 2.0, 3.0, 4.0, 5.0]
            .into_iter()
            .map(|x| state.next(x))
            .collect();
        assert!(out[..4].iter().all(|v| v.is_nan()));
        assert_relative_eq!(out[4], 3.0);
        assert_relative_eq!(out[5], 4.0);
    }

    #[test]
    fn infinity_leaving_window_restores_sum() {
        let result = sma(&[1.0, f64::INFINITY, 2.0, 3.0, 4.0], 2);
        assert_eq!(result[1], f64::INFINITY);
        assert_eq!(result[2], f64::INFINITY);
        assert_relative_eq!(result[3], 2.5);
        assert_relative_eq!(result[4], 3.5);
    }

    #[test]
    fn running_sum_tracks_windowed_mean() {
        let src: Vec<f64> = (0..2000).map(|i| 1e6 + (i as f64 * 0.37).sin() * 50.0).collect();
        let result = sma(&src, 20);
        for i in 19..src.len() {
            let expected = src[i - 19..=i].iter().sum::<f64>() / 20.0;
            assert_relative_eq!(result[i], expected, max_relative = 1e-9);
        }
    }

    #[test]
    fn streaming_matches_batch() {
        let src: Vec<f64> = (0..50).map(|i| (i as f64 * 0.7).sin() * 10.0).collect();
        let batch = sma(&src, 7);
        let mut state = SmaState::new(7);
        for (i, &x) in src.iter().enumerate() {
            let v = state.next(x);
            assert!(v == batch[i] || (v.is_nan() && batch[i].is_nan()));
        }
    }
}
