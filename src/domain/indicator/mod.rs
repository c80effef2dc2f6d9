//! Technical indicator implementations.
//!
//! Every function here works on a chronological slice (oldest first, "now"
//! last) and returns one output per input position. Positions without enough
//! history are NaN. A trailing window that contains NaN yields NaN;
//! recurrences skip NaN inputs without disturbing their state.
//!
//! - `IndicatorKind`: indicator identity + parameters (cache key, lookback)
//! - per-family modules with the series algorithms
//! - [`cache`]: the incremental cold/warm protocol for cumulative indicators

pub mod atr;
pub mod cache;
pub mod ema;
pub mod extremes;
pub mod linreg;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stddev;
pub mod supertrend;
pub mod vwap;
pub mod wma;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Sma(usize),
    Ema(usize),
    Rma(usize),
    Wma(usize),
    Hma(usize),
    Vwma(usize),
    Dema(usize),
    Tema(usize),
    Swma,
    Rsi(usize),
    Atr(usize),
    Change(usize),
    Mom(usize),
    Roc(usize),
    Stdev { length: usize, biased: bool },
    Variance { length: usize, biased: bool },
    Dev(usize),
    Highest(usize),
    Lowest(usize),
    Median(usize),
    Linreg { length: usize, offset: i64 },
    Supertrend { factor_x100: u32, atr_period: usize },
    Vwap,
}

impl IndicatorKind {
    /// Bars of history needed before the first numeric output. This is the
    /// value folded into a run's `max_period`.
    pub fn lookback(&self) -> usize {
        match *self {
            IndicatorKind::Sma(p)
            | IndicatorKind::Ema(p)
            | IndicatorKind::Rma(p)
            | IndicatorKind::Wma(p)
            | IndicatorKind::Vwma(p)
            | IndicatorKind::Atr(p)
            | IndicatorKind::Dev(p)
            | IndicatorKind::Highest(p)
            | IndicatorKind::Lowest(p)
            | IndicatorKind::Median(p) => p,
            IndicatorKind::Rsi(p)
            | IndicatorKind::Change(p)
            | IndicatorKind::Mom(p)
            | IndicatorKind::Roc(p) => p.saturating_add(1),
            IndicatorKind::Hma(p) => wma::hma_lookback(p),
            IndicatorKind::Dema(p) => p.saturating_mul(2).saturating_sub(1),
            IndicatorKind::Tema(p) => p.saturating_mul(3).saturating_sub(2),
            IndicatorKind::Swma => 4,
            IndicatorKind::Stdev { length, .. }
            | IndicatorKind::Variance { length, .. }
            | IndicatorKind::Linreg { length, .. } => length,
            IndicatorKind::Supertrend { atr_period, .. } => atr_period.saturating_add(1),
            IndicatorKind::Vwap => 1,
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorKind::Sma(p) => write!(f, "sma({})", p),
            IndicatorKind::Ema(p) => write!(f, "ema({})", p),
            IndicatorKind::Rma(p) => write!(f, "rma({})", p),
            IndicatorKind::Wma(p) => write!(f, "wma({})", p),
            IndicatorKind::Hma(p) => write!(f, "hma({})", p),
            IndicatorKind::Vwma(p) => write!(f, "vwma({})", p),
            IndicatorKind::Dema(p) => write!(f, "dema({})", p),
            IndicatorKind::Tema(p) => write!(f, "tema({})", p),
            IndicatorKind::Swma => write!(f, "swma"),
            IndicatorKind::Rsi(p) => write!(f, "rsi({})", p),
            IndicatorKind::Atr(p) => write!(f, "atr({})", p),
            IndicatorKind::Change(p) => write!(f, "change({})", p),
            IndicatorKind::Mom(p) => write!(f, "mom({})", p),
            IndicatorKind::Roc(p) => write!(f, "roc({})", p),
            IndicatorKind::Stdev { length, biased } => write!(f, "stdev({},{})", length, biased),
            IndicatorKind::Variance { length, biased } => {
                write!(f, "variance({},{})", length, biased)
            }
            IndicatorKind::Dev(p) => write!(f, "dev({})", p),
            IndicatorKind::Highest(p) => write!(f, "highest({})", p),
            IndicatorKind::Lowest(p) => write!(f, "lowest({})", p),
            IndicatorKind::Median(p) => write!(f, "median({})", p),
            IndicatorKind::Linreg { length, offset } => write!(f, "linreg({},{})", length, offset),
            IndicatorKind::Supertrend {
                factor_x100,
                atr_period,
            } => {
                let factor = *factor_x100 as f64 / 100.0;
                write!(f, "supertrend({},{})", factor, atr_period)
            }
            IndicatorKind::Vwap => write!(f, "vwap"),
        }
    }
}

/// A streaming indicator that consumes one input per bar and emits one
/// output. Replaying a fresh state over a whole series is the full
/// computation; keeping the state around is the incremental one.
pub trait Incremental {
    type Input: Copy;

    fn next(&mut self, input: Self::Input) -> f64;
}

/// Runs `state` over `len` inputs from scratch.
pub fn replay<S: Incremental>(
    mut state: S,
    len: usize,
    input_at: impl Fn(usize) -> S::Input,
) -> Vec<f64> {
    (0..len).map(|i| state.next(input_at(i))).collect()
}

/// Trailing window of `period` values ending at `i`, or `None` when it would
/// reach before the first element or contains NaN.
pub(crate) fn trailing_window(src: &[f64], i: usize, period: usize) -> Option<&[f64]> {
    if period == 0 || i + 1 < period || i >= src.len() {
        return None;
    }
    let window = &src[i + 1 - period..=i];
    if window.iter().any(|v| v.is_nan()) {
        None
    } else {
        Some(window)
    }
}

/// Applies `f` to every complete, NaN-free trailing window.
pub(crate) fn windowed(src: &[f64], period: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    (0..src.len())
        .map(|i| trailing_window(src, i, period).map(&f).unwrap_or(f64::NAN))
        .collect()
}

/// Trims the older end of the longer slice so both end at "now".
pub(crate) fn align<'a>(a: &'a [f64], b: &'a [f64]) -> (&'a [f64], &'a [f64]) {
    let n = a.len().min(b.len());
    (&a[a.len() - n..], &b[b.len() - n..])
}
