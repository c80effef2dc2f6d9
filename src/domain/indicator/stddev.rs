//! Dispersion over a trailing window: variance, standard deviation and mean
//! absolute deviation.
//!
//! VAR(n)[i] = sum((P[i-j] - SMA(n)[i])^2 for j in 0..n) / d,
//! d = n when biased, n - 1 otherwise.
//! STDEV = sqrt(VAR)
//! DEV(n)[i] = sum(|P[i-j] - SMA(n)[i]|) / n
//! Warmup: first (n-1) bars are NaN.

use crate::domain::indicator::windowed;

fn mean(window: &[f64]) -> f64 {
    window.iter().sum::<f64>() / window.len() as f64
}

fn window_variance(window: &[f64], biased: bool) -> f64 {
    let m = mean(window);
    let sum_sq: f64 = window.iter().map(|v| (v - m) * (v - m)).sum();
    let n = window.len();
    let divisor = if biased { n } else { n - 1 };
    if divisor == 0 {
        return f64::NAN;
    }
    sum_sq / divisor as f64
}

pub fn variance(src: &[f64], length: usize, biased: bool) -> Vec<f64> {
    windowed(src, length, |w| window_variance(w, biased))
}

pub fn stdev(src: &[f64], length: usize, biased: bool) -> Vec<f64> {
    windowed(src, length, |w| window_variance(w, biased).sqrt())
}

pub fn dev(src: &[f64], length: usize) -> Vec<f64> {
    windowed(src, length, |w| {
        let m = mean(w);
        w.iter().map(|v| (v - m).abs()).sum::<f64>() / w.len() as f64
    })
}
