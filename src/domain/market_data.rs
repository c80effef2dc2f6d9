//! Loaded bars and the built-in price series derived from them.

use crate::domain::error::PineError;
use crate::domain::ohlcv::MarketBar;
use crate::domain::series::{Series, SeriesView};
use std::fmt;
use std::sync::Arc;

/// Built-in price series available to every script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Open,
    High,
    Low,
    Close,
    Volume,
    Hl2,
    Hlc3,
    Ohlc4,
}

impl Builtin {
    pub const ALL: [Builtin; 8] = [
        Builtin::Open,
        Builtin::High,
        Builtin::Low,
        Builtin::Close,
        Builtin::Volume,
        Builtin::Hl2,
        Builtin::Hlc3,
        Builtin::Ohlc4,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Open => "open",
            Builtin::High => "high",
            Builtin::Low => "low",
            Builtin::Close => "close",
            Builtin::Volume => "volume",
            Builtin::Hl2 => "hl2",
            Builtin::Hlc3 => "hlc3",
            Builtin::Ohlc4 => "ohlc4",
        }
    }

    fn extract(&self, bar: &MarketBar) -> f64 {
        match self {
            Builtin::Open => bar.open,
            Builtin::High => bar.high,
            Builtin::Low => bar.low,
            Builtin::Close => bar.close,
            Builtin::Volume => bar.volume,
            Builtin::Hl2 => bar.hl2(),
            Builtin::Hlc3 => bar.hlc3(),
            Builtin::Ohlc4 => bar.ohlc4(),
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    OpenTime,
    CloseTime,
}

#[derive(Debug, Clone, Default)]
pub struct MarketData {
    bars: Vec<MarketBar>,
    prices: [Series; 8],
    open_time: Series<i64>,
    close_time: Series<i64>,
}

impl MarketData {
    /// Normalises provider ordering to oldest → newest by `open_time`.
    pub fn from_bars(mut bars: Vec<MarketBar>) -> Self {
        bars.sort_by_key(|b| b.open_time);
        let prices = Builtin::ALL.map(|b| {
            Series::from_chronological(bars.iter().map(|bar| b.extract(bar)).collect())
        });
        let open_time = Series::from_chronological(bars.iter().map(|b| b.open_time).collect());
        let close_time = Series::from_chronological(bars.iter().map(|b| b.close_time).collect());
        Self {
            bars,
            prices,
            open_time,
            close_time,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[MarketBar] {
        &self.bars
    }

    pub fn series(&self, builtin: Builtin) -> &Series {
        &self.prices[builtin as usize]
    }

    pub fn time_series(&self, field: TimeField) -> &Series<i64> {
        match field {
            TimeField::OpenTime => &self.open_time,
            TimeField::CloseTime => &self.close_time,
        }
    }

    /// Appends one bar as the new current element of every built-in series.
    /// The bar is validated first; on error nothing changes.
    pub fn push_bar(&mut self, bar: MarketBar) -> Result<(), PineError> {
        bar.validate()?;
        if let Some(last) = self.bars.last() {
            if bar.open_time <= last.open_time {
                return Err(PineError::InvalidBar {
                    reason: format!(
                        "open_time {} is not after the newest bar ({})",
                        bar.open_time, last.open_time
                    ),
                });
            }
        }
        for builtin in Builtin::ALL {
            self.prices[builtin as usize].push_bar(builtin.extract(&bar));
        }
        self.open_time.push_bar(bar.open_time);
        self.close_time.push_bar(bar.close_time);
        self.bars.push(bar);
        Ok(())
    }
}

/// The built-in views for one absolute bar index.
#[derive(Debug, Clone)]
pub struct BarViews {
    market: Arc<MarketData>,
    bar: usize,
}

impl BarViews {
    pub fn new(market: Arc<MarketData>, bar: usize) -> Self {
        Self { market, bar }
    }

    pub fn bar(&self) -> usize {
        self.bar
    }

    pub fn market(&self) -> &Arc<MarketData> {
        &self.market
    }

    pub fn get(&self, builtin: Builtin) -> SeriesView<'_> {
        view_or_empty(self.market.series(builtin), self.bar)
    }

    pub fn time(&self, field: TimeField) -> SeriesView<'_, i64> {
        view_or_empty(self.market.time_series(field), self.bar)
    }

    pub fn open(&self) -> SeriesView<'_> {
        self.get(Builtin::Open)
    }

    pub fn high(&self) -> SeriesView<'_> {
        self.get(Builtin::High)
    }

    pub fn low(&self) -> SeriesView<'_> {
        self.get(Builtin::Low)
    }

    pub fn close(&self) -> SeriesView<'_> {
        self.get(Builtin::Close)
    }

    pub fn volume(&self) -> SeriesView<'_> {
        self.get(Builtin::Volume)
    }

    /// Open time of the current bar, 0 when no data is loaded.
    pub fn current_time(&self) -> i64 {
        self.time(TimeField::OpenTime).current().unwrap_or(0)
    }
}

fn view_or_empty<T: Copy>(series: &Series<T>, bar: usize) -> SeriesView<'_, T> {
    series
        .view(bar)
        .unwrap_or_else(|| SeriesView::from_chronological(&[]))
}
