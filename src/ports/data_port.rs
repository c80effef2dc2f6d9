//! Historical bar source port.

use chrono::{DateTime, Utc};

use crate::domain::error::PineError;
use crate::domain::ohlcv::MarketBar;

/// What to load. `limit` keeps the most recent bars after the time filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataRequest {
    pub ticker: String,
    pub timeframe: String,
    pub limit: Option<usize>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub title: Option<String>,
}

impl DataRequest {
    pub fn new(ticker: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            timeframe: timeframe.into(),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when `open_time` (Unix ms) falls inside `[start, end]`.
    pub fn contains(&self, open_time: i64) -> bool {
        let after_start = self
            .start
            .is_none_or(|start| open_time >= start.timestamp_millis());
        let before_end = self
            .end
            .is_none_or(|end| open_time <= end.timestamp_millis());
        after_start && before_end
    }

    /// Applies the time filter and `limit` to chronologically sorted bars.
    pub fn apply(&self, bars: Vec<MarketBar>) -> Vec<MarketBar> {
        let mut bars: Vec<MarketBar> = bars
            .into_iter()
            .filter(|bar| self.contains(bar.open_time))
            .collect();
        if let Some(limit) = self.limit {
            if bars.len() > limit {
                bars.drain(..bars.len() - limit);
            }
        }
        bars
    }
}

/// Bar order in the returned vector is provider-defined; the runner sorts.
pub trait DataPort {
    fn fetch(&self, request: &DataRequest) -> Result<Vec<MarketBar>, PineError>;

    fn list_tickers(&self, timeframe: &str) -> Result<Vec<String>, PineError>;

    /// First open time, last open time and bar count, or `None` if absent.
    fn data_range(
        &self,
        ticker: &str,
        timeframe: &str,
    ) -> Result<Option<(i64, i64, usize)>, PineError>;
}
