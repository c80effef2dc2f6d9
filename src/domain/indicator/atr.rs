//! True range and Average True Range.
//!
//! TR[0] = H - L, TR[i] = max(H - L, |H - C[i-1]|, |L - C[i-1]|)
//! ATR = Wilder RMA of TR, seeded by the SMA of the first n values.
//! Warmup: first (n-1) bars are NaN.

use crate::domain::indicator::ema::Recurrence;
use crate::domain::indicator::{Incremental, replay};

/// One bar's inputs to the true range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hlc {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Hlc {
    fn has_nan(&self) -> bool {
        self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }
}

/// True range against the previous close. Without a previous close the
/// result is `high - low` when `handle_na` is set, NaN otherwise.
pub fn true_range(bar: Hlc, prev_close: Option<f64>, handle_na: bool) -> f64 {
    let hl = bar.high - bar.low;
    match prev_close {
        Some(pc) if !pc.is_nan() => hl
            .max((bar.high - pc).abs())
            .max((bar.low - pc).abs()),
        _ if handle_na => hl,
        _ => f64::NAN,
    }
}

#[derive(Debug, Clone)]
pub struct AtrState {
    rma: Recurrence,
    prev_close: Option<f64>,
}

impl AtrState {
    pub fn new(period: usize) -> Self {
        Self {
            rma: Recurrence::rma(period),
            prev_close: None,
        }
    }
}

impl Incremental for AtrState {
    type Input = Hlc;

    fn next(&mut self, input: Hlc) -> f64 {
        if input.has_nan() {
            return f64::NAN;
        }
        let tr = true_range(input, self.prev_close, true);
        self.prev_close = Some(input.close);
        self.rma.next(tr)
    }
}

fn hlc_at(high: &[f64], low: &[f64], close: &[f64], i: usize) -> Hlc {
    Hlc {
        high: high[i],
        low: low[i],
        close: close[i],
    }
}

/// ATR over equally long chronological high/low/close slices.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = high.len().min(low.len()).min(close.len());
    replay(AtrState::new(period), len, |i| hlc_at(high, low, close, i))
}
