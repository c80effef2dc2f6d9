//! The `ta.*` facade: indicator calls that return the value at the current bar.
//!
//! Sources are per-bar views; "now" is the last chronological element. Each
//! call records its lookback for warm-up tracking and rounds its result to
//! the context precision. `sma`, `ema`, `rma`, `rsi` and `atr` accept a cache
//! handle and take the incremental path when caching is enabled.

use crate::domain::context::{Precision, Warmup};
use crate::domain::indicator::atr::{AtrState, Hlc, atr, true_range};
use crate::domain::indicator::cache::{CacheHandle, CacheState, IndicatorCache};
use crate::domain::indicator::ema::{Recurrence, dema, ema, rma, tema};
use crate::domain::indicator::extremes::{highest, lowest, median};
use crate::domain::indicator::linreg::linreg;
use crate::domain::indicator::roc::{change, mom, roc};
use crate::domain::indicator::rsi::{RsiState, rsi};
use crate::domain::indicator::sma::{SmaState, sma};
use crate::domain::indicator::stddev::{dev, stdev, variance};
use crate::domain::indicator::supertrend::supertrend;
use crate::domain::indicator::vwap::{vwap, vwap_bands};
use crate::domain::indicator::wma::{hma, hma_lookback, swma, vwma, wma};
use crate::domain::indicator::{IndicatorKind, align};
use crate::domain::market_data::BarViews;
use crate::domain::series::SeriesView;

/// Newest `n` elements (all of them when shorter).
fn tail(src: &[f64], n: usize) -> &[f64] {
    &src[src.len().saturating_sub(n)..]
}

fn last(values: Vec<f64>) -> f64 {
    values.last().copied().unwrap_or(f64::NAN)
}

pub struct Ta<'a> {
    cache: &'a mut IndicatorCache,
    warmup: &'a mut Warmup,
    data: BarViews,
    precision: Precision,
    use_cache: bool,
}

impl<'a> Ta<'a> {
    pub fn new(
        cache: &'a mut IndicatorCache,
        warmup: &'a mut Warmup,
        data: BarViews,
        precision: Precision,
        use_cache: bool,
    ) -> Self {
        Self {
            cache,
            warmup,
            data,
            precision,
            use_cache,
        }
    }

    fn finish(&mut self, kind: IndicatorKind, value: f64) -> f64 {
        self.warmup.observe(kind.lookback());
        self.precision.apply(value)
    }

    /// Cached evaluation when enabled and a handle is given, otherwise a full
    /// replay of a fresh state.
    fn incremental<S: CacheState>(
        &mut self,
        handle: Option<CacheHandle>,
        kind: IndicatorKind,
        len: usize,
        input_at: impl Fn(usize) -> S::Input,
        init: impl FnOnce() -> S,
        full: impl FnOnce() -> f64,
    ) -> f64 {
        let value = match handle {
            Some(handle) if self.use_cache => self.cache.evaluate(handle, kind, len, input_at, init),
            _ => full(),
        };
        self.finish(kind, value)
    }

    pub fn sma(&mut self, src: SeriesView<'_>, period: usize, handle: Option<CacheHandle>) -> f64 {
        let s = src.chronological();
        self.incremental(
            handle,
            IndicatorKind::Sma(period),
            s.len(),
            |i| s[i],
            || SmaState::new(period),
            || last(sma(tail(s, period), period)),
        )
    }

    pub fn ema(&mut self, src: SeriesView<'_>, period: usize, handle: Option<CacheHandle>) -> f64 {
        let s = src.chronological();
        self.incremental(
            handle,
            IndicatorKind::Ema(period),
            s.len(),
            |i| s[i],
            || Recurrence::ema(period),
            || last(ema(s, period)),
        )
    }

    pub fn rma(&mut self, src: SeriesView<'_>, period: usize, handle: Option<CacheHandle>) -> f64 {
        let s = src.chronological();
        self.incremental(
            handle,
            IndicatorKind::Rma(period),
            s.len(),
            |i| s[i],
            || Recurrence::rma(period),
            || last(rma(s, period)),
        )
    }

    pub fn rsi(&mut self, src: SeriesView<'_>, period: usize, handle: Option<CacheHandle>) -> f64 {
        let s = src.chronological();
        self.incremental(
            handle,
            IndicatorKind::Rsi(period),
            s.len(),
            |i| s[i],
            || RsiState::new(period),
            || last(rsi(s, period)),
        )
    }

    /// ATR over the bar's own high/low/close.
    pub fn atr(&mut self, period: usize, handle: Option<CacheHandle>) -> f64 {
        let data = self.data.clone();
        let (h, l, c) = (data.high(), data.low(), data.close());
        let (h, l, c) = (h.chronological(), l.chronological(), c.chronological());
        self.incremental(
            handle,
            IndicatorKind::Atr(period),
            c.len(),
            |i| Hlc {
                high: h[i],
                low: l[i],
                close: c[i],
            },
            || AtrState::new(period),
            || last(atr(h, l, c, period)),
        )
    }

    pub fn wma(&mut self, src: SeriesView<'_>, period: usize) -> f64 {
        let v = last(wma(tail(src.chronological(), period), period));
        self.finish(IndicatorKind::Wma(period), v)
    }

    pub fn hma(&mut self, src: SeriesView<'_>, period: usize) -> f64 {
        let window = tail(src.chronological(), hma_lookback(period));
        let v = last(hma(window, period));
        self.finish(IndicatorKind::Hma(period), v)
    }

    /// Volume-weighted moving average against the bar's volume.
    pub fn vwma(&mut self, src: SeriesView<'_>, period: usize) -> f64 {
        let volume = self.data.volume();
        let (s, v) = align(src.chronological(), volume.chronological());
        let value = last(vwma(tail(s, period), tail(v, period), period));
        self.finish(IndicatorKind::Vwma(period), value)
    }

    pub fn dema(&mut self, src: SeriesView<'_>, period: usize) -> f64 {
        let v = last(dema(src.chronological(), period));
        self.finish(IndicatorKind::Dema(period), v)
    }

    pub fn tema(&mut self, src: SeriesView<'_>, period: usize) -> f64 {
        let v = last(tema(src.chronological(), period));
        self.finish(IndicatorKind::Tema(period), v)
    }

    pub fn swma(&mut self, src: SeriesView<'_>) -> f64 {
        let v = last(swma(tail(src.chronological(), 4)));
        self.finish(IndicatorKind::Swma, v)
    }

    pub fn change(&mut self, src: SeriesView<'_>, length: usize) -> f64 {
        let v = last(change(tail(src.chronological(), length.saturating_add(1)), length));
        self.finish(IndicatorKind::Change(length), v)
    }

    pub fn mom(&mut self, src: SeriesView<'_>, length: usize) -> f64 {
        let v = last(mom(tail(src.chronological(), length.saturating_add(1)), length));
        self.finish(IndicatorKind::Mom(length), v)
    }

    pub fn roc(&mut self, src: SeriesView<'_>, length: usize) -> f64 {
        let v = last(roc(tail(src.chronological(), length.saturating_add(1)), length));
        self.finish(IndicatorKind::Roc(length), v)
    }

    pub fn stdev(&mut self, src: SeriesView<'_>, length: usize, biased: bool) -> f64 {
        let v = last(stdev(tail(src.chronological(), length), length, biased));
        self.finish(IndicatorKind::Stdev { length, biased }, v)
    }

    pub fn variance(&mut self, src: SeriesView<'_>, length: usize, biased: bool) -> f64 {
        let v = last(variance(tail(src.chronological(), length), length, biased));
        self.finish(IndicatorKind::Variance { length, biased }, v)
    }

    pub fn dev(&mut self, src: SeriesView<'_>, length: usize) -> f64 {
        let v = last(dev(tail(src.chronological(), length), length));
        self.finish(IndicatorKind::Dev(length), v)
    }

    pub fn highest(&mut self, src: SeriesView<'_>, length: usize) -> f64 {
        let v = last(highest(tail(src.chronological(), length), length));
        self.finish(IndicatorKind::Highest(length), v)
    }

    pub fn lowest(&mut self, src: SeriesView<'_>, length: usize) -> f64 {
        let v = last(lowest(tail(src.chronological(), length), length));
        self.finish(IndicatorKind::Lowest(length), v)
    }

    pub fn median(&mut self, src: SeriesView<'_>, length: usize) -> f64 {
        let v = last(median(tail(src.chronological(), length), length));
        self.finish(IndicatorKind::Median(length), v)
    }

    pub fn linreg(&mut self, src: SeriesView<'_>, length: usize, offset: i64) -> f64 {
        let v = last(linreg(tail(src.chronological(), length), length, offset));
        self.finish(IndicatorKind::Linreg { length, offset }, v)
    }

    /// `(line, direction)`; direction is +1 bullish, -1 bearish.
    pub fn supertrend(&mut self, factor: f64, atr_period: usize) -> (f64, f64) {
        let data = self.data.clone();
        let out = supertrend(
            data.high().chronological(),
            data.low().chronological(),
            data.close().chronological(),
            factor,
            atr_period,
        );
        let kind = IndicatorKind::Supertrend {
            factor_x100: (factor.max(0.0) * 100.0).round() as u32,
            atr_period,
        };
        let line = self.finish(kind, last(out.value));
        (line, last(out.direction))
    }

    /// Cumulative VWAP. A non-zero anchor value restarts the accumulation.
    pub fn vwap(&mut self, src: SeriesView<'_>, anchor: Option<SeriesView<'_>>) -> f64 {
        let volume = self.data.volume();
        let flags = anchor.map(anchor_flags);
        let v = last(vwap(
            src.chronological(),
            volume.chronological(),
            flags.as_deref(),
        ));
        self.finish(IndicatorKind::Vwap, v)
    }

    /// `(vwap, upper, lower)` with bands at `mult` segment deviations.
    pub fn vwap_bands(
        &mut self,
        src: SeriesView<'_>,
        anchor: Option<SeriesView<'_>>,
        mult: f64,
    ) -> (f64, f64, f64) {
        let volume = self.data.volume();
        let flags = anchor.map(anchor_flags);
        let out = vwap_bands(
            src.chronological(),
            volume.chronological(),
            flags.as_deref(),
            mult,
        );
        let v = self.finish(IndicatorKind::Vwap, last(out.vwap));
        let upper = self.precision.apply(last(out.upper));
        let lower = self.precision.apply(last(out.lower));
        (v, upper, lower)
    }

    /// True range of the current bar. On the first bar it is `high - low`
    /// when `handle_na` is set and NaN otherwise.
    pub fn tr(&mut self, handle_na: bool) -> f64 {
        let bar = Hlc {
            high: self.data.high().at(0),
            low: self.data.low().at(0),
            close: self.data.close().at(0),
        };
        let prev_close = self.data.close().get(1);
        self.warmup.observe(if handle_na { 1 } else { 2 });
        self.precision.apply(true_range(bar, prev_close, handle_na))
    }

    /// `a` crossed above `b` on this bar.
    pub fn crossover(&mut self, a: SeriesView<'_>, b: SeriesView<'_>) -> bool {
        self.warmup.observe(2);
        let (a0, a1, b0, b1) = (a.at(0), a.at(1), b.at(0), b.at(1));
        a0 > b0 && a1 <= b1
    }

    /// `a` crossed below `b` on this bar.
    pub fn crossunder(&mut self, a: SeriesView<'_>, b: SeriesView<'_>) -> bool {
        self.warmup.observe(2);
        let (a0, a1, b0, b1) = (a.at(0), a.at(1), b.at(0), b.at(1));
        a0 < b0 && a1 >= b1
    }
}

fn anchor_flags(anchor: SeriesView<'_>) -> Vec<bool> {
    anchor
        .chronological()
        .iter()
        .map(|v| !v.is_nan() && *v != 0.0)
        .collect()
}
