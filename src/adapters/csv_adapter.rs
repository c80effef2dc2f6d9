//! CSV file data adapter.
//!
//! One file per ticker and timeframe, named `{ticker}_{timeframe}.csv`, with
//! a header row naming at least `open_time,open,high,low,close,volume`.
//! `close_time` is optional; when absent it is taken from the next bar's
//! open time.

use crate::domain::error::PineError;
use crate::domain::ohlcv::{MarketBar, parse_time};
use crate::ports::data_port::{DataPort, DataRequest};
use csv::StringRecord;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

struct Columns {
    open_time: usize,
    close_time: Option<usize>,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, PineError> {
        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let require = |name: &str| {
            find(name).ok_or_else(|| PineError::Data {
                reason: format!("missing {name} column"),
            })
        };
        Ok(Self {
            open_time: require("open_time")?,
            close_time: find("close_time"),
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            volume: require("volume")?,
        })
    }
}

fn field<'r>(record: &'r StringRecord, index: usize, name: &str) -> Result<&'r str, PineError> {
    record.get(index).ok_or_else(|| PineError::Data {
        reason: format!("missing {name} value on line {}", line_of(record)),
    })
}

fn price(record: &StringRecord, index: usize, name: &str) -> Result<f64, PineError> {
    field(record, index, name)?
        .trim()
        .parse()
        .map_err(|e| PineError::Data {
            reason: format!("invalid {name} value on line {}: {e}", line_of(record)),
        })
}

fn time(record: &StringRecord, index: usize, name: &str) -> Result<i64, PineError> {
    let text = field(record, index, name)?;
    parse_time(text)
        .map(|t| t.timestamp_millis())
        .ok_or_else(|| PineError::Data {
            reason: format!("invalid {name} '{text}' on line {}", line_of(record)),
        })
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

/// Fills `close_time` for files without that column: one millisecond before
/// the next open, and the previous bar's spacing for the newest bar.
fn derive_close_times(bars: &mut [MarketBar]) {
    for i in 0..bars.len() {
        let spacing = match (bars.get(i + 1), i.checked_sub(1).map(|j| bars[j])) {
            (Some(next), _) => next.open_time - bars[i].open_time,
            (None, Some(prev)) => bars[i].open_time - prev.open_time,
            (None, None) => 1,
        };
        bars[i].close_time = bars[i].open_time + (spacing - 1).max(0);
    }
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str, timeframe: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", ticker, timeframe))
    }

    /// Every bar in the file, sorted by open time.
    fn read_all(&self, ticker: &str, timeframe: &str) -> Result<Vec<MarketBar>, PineError> {
        let path = self.csv_path(ticker, timeframe);
        let content = fs::read_to_string(&path).map_err(|e| PineError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr.headers().map_err(|e| PineError::Data {
            reason: format!("CSV header error: {}", e),
        })?;
        let cols = Columns::from_headers(headers)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| PineError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;
            let open_time = time(&record, cols.open_time, "open_time")?;
            let close_time = match cols.close_time {
                Some(i) => time(&record, i, "close_time")?,
                None => open_time,
            };
            bars.push(MarketBar {
                open_time,
                close_time,
                open: price(&record, cols.open, "open")?,
                high: price(&record, cols.high, "high")?,
                low: price(&record, cols.low, "low")?,
                close: price(&record, cols.close, "close")?,
                volume: price(&record, cols.volume, "volume")?,
            });
        }

        bars.sort_by_key(|b| b.open_time);
        if cols.close_time.is_none() {
            derive_close_times(&mut bars);
        }
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch(&self, request: &DataRequest) -> Result<Vec<MarketBar>, PineError> {
        let bars = self.read_all(&request.ticker, &request.timeframe)?;
        Ok(request.apply(bars))
    }

    fn list_tickers(&self, timeframe: &str) -> Result<Vec<String>, PineError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| PineError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let suffix = format!("_{}.csv", timeframe);
        let mut tickers = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| PineError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(ticker) = name_str.strip_suffix(&suffix) {
                tickers.push(ticker.to_string());
            }
        }

        tickers.sort();
        Ok(tickers)
    }

    fn data_range(
        &self,
        ticker: &str,
        timeframe: &str,
    ) -> Result<Option<(i64, i64, usize)>, PineError> {
        if !self.csv_path(ticker, timeframe).exists() {
            return Ok(None);
        }
        let bars = self.read_all(ticker, timeframe)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.open_time, last.open_time, bars.len())),
            _ => None,
        })
    }
}
