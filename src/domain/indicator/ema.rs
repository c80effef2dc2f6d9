//! Exponential recurrences: EMA, RMA (Wilder) and the EMA stacks DEMA/TEMA.
//!
//! Seed with the SMA of the first n non-NaN inputs, then
//! X[i] = P[i]*alpha + X[i-1]*(1-alpha)
//! with alpha = 2/(n+1) for EMA and 1/n for RMA.
//! Warmup: first (n-1) bars are NaN. Leading NaNs are skipped before seeding;
//! after seeding a NaN input yields NaN and leaves the state unchanged.

use crate::domain::indicator::{Incremental, replay};

#[derive(Debug, Clone)]
pub struct Recurrence {
    period: usize,
    alpha: f64,
    seed_sum: f64,
    seed_count: usize,
    value: Option<f64>,
}

impl Recurrence {
    fn with_alpha(period: usize, alpha: f64) -> Self {
        Self {
            period,
            alpha,
            seed_sum: 0.0,
            seed_count: 0,
            value: None,
        }
    }

    /// alpha = 2/(n+1)
    pub fn ema(period: usize) -> Self {
        Self::with_alpha(period, 2.0 / (period as f64 + 1.0))
    }

    /// alpha = 1/n
    pub fn rma(period: usize) -> Self {
        Self::with_alpha(period, 1.0 / period.max(1) as f64)
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Incremental for Recurrence {
    type Input = f64;

    fn next(&mut self, input: f64) -> f64 {
        if self.period == 0 || input.is_nan() {
            return f64::NAN;
        }
        match self.value {
            Some(prev) => {
                let next = input * self.alpha + prev * (1.0 - self.alpha);
                self.value = Some(next);
                next
            }
            None => {
                self.seed_sum += input;
                self.seed_count += 1;
                if self.seed_count < self.period {
                    return f64::NAN;
                }
                let seed = self.seed_sum / self.period as f64;
                self.value = Some(seed);
                seed
            }
        }
    }
}

pub fn ema(src: &[f64], period: usize) -> Vec<f64> {
    replay(Recurrence::ema(period), src.len(), |i| src[i])
}

pub fn rma(src: &[f64], period: usize) -> Vec<f64> {
    replay(Recurrence::rma(period), src.len(), |i| src[i])
}

/// DEMA = 2*EMA - EMA(EMA)
pub fn dema(src: &[f64], period: usize) -> Vec<f64> {
    let e1 = ema(src, period);
    let e2 = ema(&e1, period);
    e1.iter().zip(&e2).map(|(a, b)| 2.0 * a - b).collect()
}

/// TEMA = 3*EMA - 3*EMA(EMA) + EMA(EMA(EMA))
pub fn tema(src: &[f64], period: usize) -> Vec<f64> {
    let e1 = ema(src, period);
    let e2 = ema(&e1, period);
    let e3 = ema(&e2, period);
    e1.iter()
        .zip(&e2)
        .zip(&e3)
        .map(|((a, b), c)| 3.0 * a - 3.0 * b + c)
        .collect()
}
