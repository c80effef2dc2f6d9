//! Weighted moving averages: WMA, HMA, SWMA and VWMA.
//!
//! WMA(n) = (1*P[i-n+1] + 2*P[i-n+2] + ... + n*P[i]) / (n*(n+1)/2)
//! HMA(n) = WMA(2*WMA(P, n/2) - WMA(P, n), floor(sqrt(n)))
//! SWMA   = (P[i-3] + 2*P[i-2] + 2*P[i-1] + P[i]) / 6
//! VWMA(n) = sum(P*V) / sum(V) over the trailing window
//! Warmup: first (n-1) bars are NaN (3 for SWMA).

use crate::domain::indicator::{align, trailing_window, windowed};

fn weighted_mean(window: &[f64]) -> f64 {
    let n = window.len();
    let divisor = (n * (n + 1)) as f64 / 2.0;
    let numerator: f64 = window
        .iter()
        .enumerate()
        .map(|(j, v)| (j + 1) as f64 * v)
        .sum();
    numerator / divisor
}

pub fn wma(src: &[f64], period: usize) -> Vec<f64> {
    windowed(src, period, weighted_mean)
}

/// Bars needed before the first HMA value.
pub fn hma_lookback(period: usize) -> usize {
    let smooth = (period as f64).sqrt().floor() as usize;
    if period / 2 == 0 || smooth == 0 {
        return period;
    }
    period.saturating_add(smooth - 1)
}

pub fn hma(src: &[f64], period: usize) -> Vec<f64> {
    let half = wma(src, period / 2);
    let full = wma(src, period);
    let raw: Vec<f64> = half.iter().zip(&full).map(|(h, f)| 2.0 * h - f).collect();
    let smooth = (period as f64).sqrt().floor() as usize;
    wma(&raw, smooth)
}

pub fn swma(src: &[f64]) -> Vec<f64> {
    windowed(src, 4, |w| (w[0] + 2.0 * w[1] + 2.0 * w[2] + w[3]) / 6.0)
}

/// Volume-weighted mean. The two inputs are aligned on their newest element.
pub fn vwma(src: &[f64], volume: &[f64], period: usize) -> Vec<f64> {
    let (src, volume) = align(src, volume);
    (0..src.len())
        .map(|i| {
            match (
                trailing_window(src, i, period),
                trailing_window(volume, i, period),
            ) {
                (Some(p), Some(v)) => {
                    let weighted: f64 = p.iter().zip(v).map(|(p, v)| p * v).sum();
                    let total: f64 = v.iter().sum();
                    weighted / total
                }
                _ => f64::NAN,
            }
        })
        .collect()
}
