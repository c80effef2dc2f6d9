//! In-memory data adapter, keyed by ticker and timeframe.

use std::collections::HashMap;

use crate::domain::error::PineError;
use crate::domain::ohlcv::MarketBar;
use crate::ports::data_port::{DataPort, DataRequest};

#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    series: HashMap<(String, String), Vec<MarketBar>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever was stored for the pair. Bars are kept sorted.
    pub fn insert(
        &mut self,
        ticker: impl Into<String>,
        timeframe: impl Into<String>,
        mut bars: Vec<MarketBar>,
    ) {
        bars.sort_by_key(|b| b.open_time);
        self.series.insert((ticker.into(), timeframe.into()), bars);
    }

    pub fn with_bars(
        mut self,
        ticker: impl Into<String>,
        timeframe: impl Into<String>,
        bars: Vec<MarketBar>,
    ) -> Self {
        self.insert(ticker, timeframe, bars);
        self
    }

    fn bars(&self, ticker: &str, timeframe: &str) -> Option<&Vec<MarketBar>> {
        self.series
            .get(&(ticker.to_string(), timeframe.to_string()))
    }
}

impl DataPort for MemoryAdapter {
    fn fetch(&self, request: &DataRequest) -> Result<Vec<MarketBar>, PineError> {
        let bars = self
            .bars(&request.ticker, &request.timeframe)
            .cloned()
            .unwrap_or_default();
        Ok(request.apply(bars))
    }

    fn list_tickers(&self, timeframe: &str) -> Result<Vec<String>, PineError> {
        let mut tickers: Vec<String> = self
            .series
            .keys()
            .filter(|(_, tf)| tf == timeframe)
            .map(|(ticker, _)| ticker.clone())
            .collect();
        tickers.sort();
        Ok(tickers)
    }

    fn data_range(
        &self,
        ticker: &str,
        timeframe: &str,
    ) -> Result<Option<(i64, i64, usize)>, PineError> {
        Ok(self.bars(ticker, timeframe).and_then(|bars| {
            let first = bars.first()?;
            let last = bars.last()?;
            Some((first.open_time, last.open_time, bars.len()))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open_time: i64, close: f64) -> MarketBar {
        MarketBar {
            open_time,
            close_time: open_time + 59_999,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn fetch_sorts_and_limits() {
        let adapter = MemoryAdapter::new().with_bars(
            "BTCUSDT",
            "1m",
            vec![bar(120_000, 3.0), bar(0, 1.0), bar(60_000, 2.0)],
        );
        let bars = adapter
            .fetch(&DataRequest::new("BTCUSDT", "1m").with_limit(2))
            .unwrap();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![2.0, 3.0]);
    }

    #[test]
    fn unknown_pair_is_empty() {
        let adapter = MemoryAdapter::new();
        assert!(adapter.fetch(&DataRequest::new("X", "1m")).unwrap().is_empty());
        assert_eq!(adapter.data_range("X", "1m").unwrap(), None);
    }

    #[test]
    fn lists_and_ranges() {
        let adapter = MemoryAdapter::new()
            .with_bars("B", "1m", vec![bar(0, 1.0), bar(60_000, 2.0)])
            .with_bars("A", "1m", vec![bar(0, 1.0)])
            .with_bars("A", "1h", vec![]);
        assert_eq!(adapter.list_tickers("1m").unwrap(), vec!["A", "B"]);
        assert_eq!(adapter.data_range("B", "1m").unwrap(), Some((0, 60_000, 2)));
        assert_eq!(adapter.data_range("A", "1h").unwrap(), None);
    }
}
