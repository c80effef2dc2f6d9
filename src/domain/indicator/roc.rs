//! Differences against the value n bars ago.
//!
//! CHANGE(n)[i] = MOM(n)[i] = P[i] - P[i-n]
//! ROC(n)[i] = (P[i] - P[i-n]) / P[i-n] * 100
//! Warmup: first n bars are NaN.

fn lagged(src: &[f64], length: usize, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    (0..src.len())
        .map(|i| {
            if length == 0 || i < length {
                return f64::NAN;
            }
            f(src[i], src[i - length])
        })
        .collect()
}

pub fn change(src: &[f64], length: usize) -> Vec<f64> {
    lagged(src, length, |now, then| now - then)
}

pub fn mom(src: &[f64], length: usize) -> Vec<f64> {
    change(src, length)
}

/// Division by a zero base yields NaN rather than infinity.
pub fn roc(src: &[f64], length: usize) -> Vec<f64> {
    lagged(src, length, |now, then| {
        if then == 0.0 {
            f64::NAN
        } else {
            (now - then) / then * 100.0
        }
    })
}
