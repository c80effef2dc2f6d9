#![allow(dead_code)]

use pinerun::domain::error::PineError;
pub use pinerun::domain::ohlcv::MarketBar;
use pinerun::ports::data_port::{DataPort, DataRequest};
use std::collections::HashMap;

pub const MINUTE_MS: i64 = 60_000;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<MarketBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<MarketBar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    fn check(&self, ticker: &str) -> Result<(), PineError> {
        match self.errors.get(ticker) {
            Some(reason) => Err(PineError::Data {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch(&self, request: &DataRequest) -> Result<Vec<MarketBar>, PineError> {
        self.check(&request.ticker)?;
        let mut bars = self.data.get(&request.ticker).cloned().unwrap_or_default();
        bars.sort_by_key(|b| b.open_time);
        Ok(request.apply(bars))
    }

    fn list_tickers(&self, _timeframe: &str) -> Result<Vec<String>, PineError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }

    fn data_range(
        &self,
        ticker: &str,
        _timeframe: &str,
    ) -> Result<Option<(i64, i64, usize)>, PineError> {
        self.check(ticker)?;
        match self.data.get(ticker) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.open_time).min().unwrap();
                let max = bars.iter().map(|b| b.open_time).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

/// One-minute bar `i` closing at `close`, with a two-point high/low range.
pub fn make_bar(i: usize, close: f64) -> MarketBar {
    let open_time = i as i64 * MINUTE_MS;
    MarketBar {
        open_time,
        close_time: open_time + MINUTE_MS - 1,
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0 + i as f64,
    }
}

pub fn bars_from_closes(closes: &[f64]) -> Vec<MarketBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(i, c))
        .collect()
}

/// Deterministic oscillating closes around 100.
pub fn wave_closes(count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| {
            let x = i as f64;
            100.0 + (x * 0.3).sin() * 8.0 + (x * 0.05).cos() * 3.0
        })
        .collect()
}

pub fn wave_bars(count: usize) -> Vec<MarketBar> {
    bars_from_closes(&wave_closes(count))
}

/// Equal values, treating NaN as equal to NaN.
pub fn assert_same(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a.is_nan() && e.is_nan()) || (a - e).abs() <= 1e-9 * e.abs().max(1.0),
            "bar {i}: {a} != {e}"
        );
    }
}
