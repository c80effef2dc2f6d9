//! RSI (Relative Strength Index) indicator.
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n bars are NaN (need n price changes to compute initial average).

use crate::domain::indicator::{Incremental, replay};

#[derive(Debug, Clone)]
pub struct RsiState {
    period: usize,
    prev: Option<f64>,
    changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl RsiState {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    fn value(&self) -> f64 {
        if self.avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + self.avg_gain / self.avg_loss)
        }
    }
}

impl Incremental for RsiState {
    type Input = f64;

    fn next(&mut self, input: f64) -> f64 {
        if self.period == 0 || input.is_nan() {
            return f64::NAN;
        }
        let Some(prev) = self.prev.replace(input) else {
            return f64::NAN;
        };
        let change = input - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let n = self.period as f64;

        if self.changes < self.period {
            // Accumulate sums until the first average is available.
            self.avg_gain += gain;
            self.avg_loss += loss;
            self.changes += 1;
            if self.changes < self.period {
                return f64::NAN;
            }
            self.avg_gain /= n;
            self.avg_loss /= n;
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }
        self.value()
    }
}

pub fn rsi(src: &[f64], period: usize) -> Vec<f64> {
    replay(RsiState::new(period), src.len(), |i| src[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rsi_warmup() {
        let result = rsi(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0], 3);
        assert!(result[0].is_nan());
        assert!(result[2].is_nan());
        assert!(!result[3].is_nan());
    }

    #[test]
    fn rsi_all_gains() {
        let result = rsi(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0], 3);
        for v in &result[3..] {
            assert!((v - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn rsi_all_losses() {
        let result = rsi(&[15.0, 14.0, 13.0, 12.0, 11.0, 10.0], 3);
        for v in &result[3..] {
            assert!(v.abs() < f64::EPSILON);
        }
    }

    #[test]
    fn rsi_known_value() {
        // changes: +2, -1 → avg gain 1, avg loss 0.5 → RS 2 → RSI 66.67
        let result = rsi(&[10.0, 12.0, 11.0], 2);
        assert_relative_eq!(result[2], 100.0 - 100.0 / 3.0);
        // next change +1: gain (1*1 + 1)/2 = 1, loss (0.5*1 + 0)/2 = 0.25 → RS 4 → 80
        let result = rsi(&[10.0, 12.0, 11.0, 12.0], 2);
        assert_relative_eq!(result[3], 80.0);
    }

    #[test]
    fn rsi_flat_prices_are_100() {
        let result = rsi(&[5.0; 5], 2);
        assert_relative_eq!(result[2], 100.0);
    }

    #[test]
    fn rsi_zero_period() {
        assert!(rsi(&[1.0, 2.0, 3.0], 0).iter().all(|v| v.is_nan()));
    }
}
