//! Least-squares linear regression over a trailing window.
//!
//! x = 0 for the oldest value in the window, length-1 for the newest.
//! LINREG(n, offset) = intercept + slope * (n - 1 - offset)
//! Warmup: first (n-1) bars are NaN. A window of one value returns that value.

use crate::domain::indicator::windowed;

fn fit(window: &[f64], offset: i64) -> f64 {
    let n = window.len() as f64;
    if window.len() == 1 {
        return window[0];
    }
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for (j, &y) in window.iter().enumerate() {
        let x = j as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }
    let denominator = n * sum_xx - sum_x * sum_x;
    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    intercept + slope * (n - 1.0 - offset as f64)
}

pub fn linreg(src: &[f64], length: usize, offset: i64) -> Vec<f64> {
    windowed(src, length, |w| fit(w, offset))
}
