//! Supertrend: an ATR-banded trend state machine.
//!
//! basic upper = hl2 + factor * ATR, basic lower = hl2 - factor * ATR.
//! The upper band only moves down unless the previous close broke above it;
//! the lower band only moves up unless the previous close broke below it.
//! While bearish the line follows the upper band and flips bullish when
//! close > upper; while bullish it follows the lower band and flips bearish
//! when close < lower.
//!
//! Warmup: first `atr_period` bars are NaN. Recomputed in one forward pass
//! per call; there is no incremental state.

use crate::domain::indicator::atr::atr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Bearish,
}

impl Trend {
    /// +1 bullish, -1 bearish.
    pub fn direction(self) -> f64 {
        match self {
            Trend::Bullish => 1.0,
            Trend::Bearish => -1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupertrendOutput {
    pub value: Vec<f64>,
    pub direction: Vec<f64>,
}

struct Bands {
    upper: f64,
    lower: f64,
    trend: Trend,
}

impl Bands {
    fn line(&self) -> f64 {
        match self.trend {
            Trend::Bullish => self.lower,
            Trend::Bearish => self.upper,
        }
    }
}

pub fn supertrend(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    factor: f64,
    atr_period: usize,
) -> SupertrendOutput {
    let len = high.len().min(low.len()).min(close.len());
    let mut out = SupertrendOutput {
        value: vec![f64::NAN; len],
        direction: vec![f64::NAN; len],
    };
    if atr_period == 0 || len <= atr_period {
        return out;
    }
    let atr = atr(&high[..len], &low[..len], &close[..len], atr_period);
    let basic = |i: usize| {
        let hl2 = (high[i] + low[i]) / 2.0;
        (hl2 + factor * atr[i], hl2 - factor * atr[i])
    };

    let mut state: Option<Bands> = None;
    for i in atr_period..len {
        let (basic_upper, basic_lower) = basic(i);
        if basic_upper.is_nan() || basic_lower.is_nan() || close[i].is_nan() {
            continue;
        }
        let next = match &state {
            None => Bands {
                upper: basic_upper,
                lower: basic_lower,
                trend: if close[i] <= basic_upper {
                    Trend::Bearish
                } else {
                    Trend::Bullish
                },
            },
            Some(prev) => {
                let prev_close = close[i - 1];
                let upper = if basic_upper < prev.upper || prev_close > prev.upper {
                    basic_upper
                } else {
                    prev.upper
                };
                let lower = if basic_lower > prev.lower || prev_close < prev.lower {
                    basic_lower
                } else {
                    prev.lower
                };
                let trend = match prev.trend {
                    Trend::Bearish if close[i] > upper => Trend::Bullish,
                    Trend::Bullish if close[i] < lower => Trend::Bearish,
                    unchanged => unchanged,
                };
                Bands {
                    upper,
                    lower,
                    trend,
                }
            }
        };
        out.value[i] = next.line();
        out.direction[i] = next.trend.direction();
        state = Some(next);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Path {
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
    }

    fn path(closes: &[f64]) -> Path {
        Path {
            high: closes.iter().map(|c| c + 1.0).collect(),
            low: closes.iter().map(|c| c - 1.0).collect(),
            close: closes.to_vec(),
        }
    }

    fn flips(direction: &[f64]) -> Vec<usize> {
        direction
            .windows(2)
            .enumerate()
            .filter(|(_, w)| !w[0].is_nan() && !w[1].is_nan() && w[0] != w[1])
            .map(|(i, _)| i + 1)
            .collect()
    }

    #[test]
    fn warmup_is_nan() {
        let p = path(&[10.0; 8]);
        let out = supertrend(&p.high, &p.low, &p.close, 3.0, 3);
        assert!(out.value[..3].iter().all(|v| v.is_nan()));
        assert!(!out.value[3].is_nan());
        assert_eq!(out.direction[3], -1.0);
    }

    #[test]
    fn short_input_is_all_nan() {
        let p = path(&[10.0, 11.0]);
        let out = supertrend(&p.high, &p.low, &p.close, 3.0, 3);
        assert!(out.value.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn one_flip_per_band_crossing() {
        // Flat, rally, flat at the top, then a collapse.
        let mut closes = vec![100.0; 6];
        closes.extend((1..=6).map(|i| 100.0 + 10.0 * i as f64));
        closes.extend([160.0; 4]);
        closes.extend((1..=6).map(|i| 160.0 - 15.0 * i as f64));
        let p = path(&closes);
        let out = supertrend(&p.high, &p.low, &p.close, 1.0, 3);

        let flips = flips(&out.direction);
        assert_eq!(flips.len(), 2, "direction: {:?}", out.direction);
        assert_eq!(out.direction[flips[0]], 1.0);
        assert_eq!(out.direction[flips[1]], -1.0);
        assert_eq!(*out.direction.last().unwrap(), -1.0);
    }

    #[test]
    fn line_follows_the_active_band() {
        let mut closes = vec![100.0; 5];
        closes.extend((1..=8).map(|i| 100.0 + 5.0 * i as f64));
        let p = path(&closes);
        let out = supertrend(&p.high, &p.low, &p.close, 1.0, 3);
        for i in 3..closes.len() {
            if out.direction[i] == 1.0 {
                assert!(out.value[i] <= closes[i]);
            } else {
                assert!(out.value[i] >= closes[i]);
            }
        }
    }

    #[test]
    fn lower_band_never_falls_while_bullish() {
        let mut closes = vec![100.0; 4];
        closes.extend([110.0, 120.0, 118.0, 125.0, 121.0, 130.0, 127.0, 135.0]);
        let p = path(&closes);
        let out = supertrend(&p.high, &p.low, &p.close, 1.0, 3);
        let bullish: Vec<f64> = (0..closes.len())
            .filter(|&i| out.direction[i] == 1.0)
            .map(|i| out.value[i])
            .collect();
        assert!(!bullish.is_empty());
        assert!(bullish.windows(2).all(|w| w[1] >= w[0]));
    }
}
