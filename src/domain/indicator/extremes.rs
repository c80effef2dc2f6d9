//! Trailing extremes and order statistics.
//!
//! HIGHEST(n) / LOWEST(n): max / min of the last n values.
//! MEDIAN(n): middle of the sorted window, mean of the two middles when n is even.
//! Warmup: first (n-1) bars are NaN; any NaN in the window yields NaN.

use crate::domain::indicator::windowed;

pub fn highest(src: &[f64], length: usize) -> Vec<f64> {
    windowed(src, length, |w| w.iter().copied().fold(f64::MIN, f64::max))
}

pub fn lowest(src: &[f64], length: usize) -> Vec<f64> {
    windowed(src, length, |w| w.iter().copied().fold(f64::MAX, f64::min))
}

pub fn median(src: &[f64], length: usize) -> Vec<f64> {
    windowed(src, length, |w| {
        let mut sorted = w.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    })
}
