//! Run configuration: INI values validated into a [`RunConfig`].
//!
//! ```ini
//! [data]
//! dir = ./data
//! ticker = BTCUSDT
//! timeframe = 1h
//! limit = 1000
//! start = 2024-01-01
//! end = 2024-06-30
//!
//! [run]
//! bars = 200
//! use_cache = true
//! precision = 10
//! ```
//!
//! Command-line flags given in [`Overrides`] replace file values before
//! validation.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::domain::context::{DEFAULT_PRECISION, Precision};
use crate::domain::error::PineError;
use crate::domain::ohlcv::parse_time;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataRequest;

/// Rounding beyond this many decimals exceeds f64 precision.
pub const MAX_PRECISION: u32 = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub request: DataRequest,
    /// Most recent bars to evaluate; `None` runs every loaded bar.
    pub bars: Option<usize>,
    pub use_cache: bool,
    pub precision: Precision,
}

/// Values taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub ticker: Option<String>,
    pub timeframe: Option<String>,
    pub bars: Option<usize>,
    pub no_cache: bool,
    pub precision: Option<u32>,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> PineError {
    PineError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    flag: Option<&String>,
) -> Result<String, PineError> {
    flag.cloned()
        .or_else(|| non_empty(config, section, key))
        .ok_or_else(|| PineError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

/// A positive count, or `None` when the key is absent.
fn count(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<usize>, PineError> {
    let Some(text) = non_empty(config, section, key) else {
        return Ok(None);
    };
    match text.parse::<usize>() {
        Ok(0) => Err(invalid(section, key, format!("{key} must be positive"))),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(invalid(
            section,
            key,
            format!("expected a positive integer, got '{text}'"),
        )),
    }
}

fn date(config: &dyn ConfigPort, key: &str) -> Result<Option<DateTime<Utc>>, PineError> {
    let Some(text) = non_empty(config, "data", key) else {
        return Ok(None);
    };
    parse_time(&text).map(Some).ok_or_else(|| {
        invalid(
            "data",
            key,
            format!("invalid {key} '{text}', expected YYYY-MM-DD, RFC 3339 or epoch milliseconds"),
        )
    })
}

fn validate_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), PineError> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(invalid("data", "start", "start must not be after end"));
        }
    }
    Ok(())
}

fn validate_bars(bars: Option<usize>) -> Result<(), PineError> {
    match bars {
        Some(0) => Err(invalid("run", "bars", "bars must be positive")),
        _ => Ok(()),
    }
}

fn precision(config: &dyn ConfigPort, flag: Option<u32>) -> Result<Precision, PineError> {
    let digits = match flag {
        Some(digits) => digits,
        None => match non_empty(config, "run", "precision") {
            None => DEFAULT_PRECISION,
            Some(text) => text.parse().map_err(|_| {
                invalid(
                    "run",
                    "precision",
                    format!("expected a number of decimals, got '{text}'"),
                )
            })?,
        },
    };
    if digits > MAX_PRECISION {
        return Err(invalid(
            "run",
            "precision",
            format!("precision must be at most {MAX_PRECISION}"),
        ));
    }
    Ok(Precision(digits))
}

/// Validates every setting, flags first, and builds the run configuration.
pub fn build_run_config(
    config: &dyn ConfigPort,
    overrides: &Overrides,
) -> Result<RunConfig, PineError> {
    let ticker = required(config, "data", "ticker", overrides.ticker.as_ref())?;
    let timeframe = required(config, "data", "timeframe", overrides.timeframe.as_ref())?;
    let data_dir = overrides
        .data_dir
        .clone()
        .or_else(|| non_empty(config, "data", "dir").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let start = date(config, "start")?;
    let end = date(config, "end")?;
    validate_range(start, end)?;

    let bars = match overrides.bars {
        Some(n) => Some(n),
        None => count(config, "run", "bars")?,
    };
    validate_bars(bars)?;

    let request = DataRequest {
        limit: count(config, "data", "limit")?,
        start,
        end,
        ..DataRequest::new(ticker, timeframe)
    };

    Ok(RunConfig {
        data_dir,
        request,
        bars,
        use_cache: !overrides.no_cache && config.get_bool("run", "use_cache", true),
        precision: precision(config, overrides.precision)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use chrono::TimeZone;

    fn config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn build(content: &str) -> Result<RunConfig, PineError> {
        build_run_config(&config(content), &Overrides::default())
    }

    const FULL: &str = r#"
[data]
dir = /srv/bars
ticker = BTCUSDT
timeframe = 1h
limit = 500
start = 2024-01-01
end = 2024-02-01T12:00:00Z

[run]
bars = 200
use_cache = false
precision = 6
"#;

    #[test]
    fn full_config() {
        let cfg = build(FULL).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/srv/bars"));
        assert_eq!(cfg.request.ticker, "BTCUSDT");
        assert_eq!(cfg.request.timeframe, "1h");
        assert_eq!(cfg.request.limit, Some(500));
        assert_eq!(
            cfg.request.start,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            cfg.request.end,
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(cfg.bars, Some(200));
        assert!(!cfg.use_cache);
        assert_eq!(cfg.precision, Precision(6));
    }

    #[test]
    fn defaults() {
        let cfg = build("[data]\nticker = ETH\ntimeframe = 1d\n").unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("."));
        assert_eq!(cfg.request.limit, None);
        assert_eq!(cfg.bars, None);
        assert!(cfg.use_cache);
        assert_eq!(cfg.precision, Precision(DEFAULT_PRECISION));
    }

    #[test]
    fn missing_ticker() {
        let err = build("[data]\ntimeframe = 1d\n").unwrap_err();
        assert!(matches!(
            err,
            PineError::ConfigMissing { ref section, ref key } if section == "data" && key == "ticker"
        ));
    }

    #[test]
    fn blank_timeframe_counts_as_missing() {
        let err = build("[data]\nticker = X\ntimeframe =   \n").unwrap_err();
        assert!(matches!(err, PineError::ConfigMissing { ref key, .. } if key == "timeframe"));
    }

    #[test]
    fn overrides_win() {
        let overrides = Overrides {
            data_dir: Some(PathBuf::from("/tmp/other")),
            ticker: Some("SOLUSDT".into()),
            timeframe: Some("4h".into()),
            bars: Some(10),
            no_cache: true,
            precision: Some(2),
        };
        let cfg = build_run_config(&config("[data]\nticker = BTC\n"), &overrides).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/other"));
        assert_eq!(cfg.request.ticker, "SOLUSDT");
        assert_eq!(cfg.request.timeframe, "4h");
        assert_eq!(cfg.bars, Some(10));
        assert!(!cfg.use_cache);
        assert_eq!(cfg.precision, Precision(2));
    }

    #[test]
    fn rejects_bad_values() {
        let base = "[data]\nticker = X\ntimeframe = 1d\n";
        let cases = [
            ("limit = 0", "limit"),
            ("limit = many", "limit"),
            ("start = yesterday", "start"),
            ("start = 2024-03-01\nend = 2024-01-01", "start"),
        ];
        for (extra, key) in cases {
            let err = build(&format!("{base}{extra}\n")).unwrap_err();
            assert!(
                matches!(err, PineError::ConfigInvalid { key: ref k, .. } if k == key),
                "{extra}: {err}"
            );
        }
        let err = build(&format!("{base}[run]\nprecision = 20\n")).unwrap_err();
        assert!(matches!(err, PineError::ConfigInvalid { ref key, .. } if key == "precision"));
        let err = build(&format!("{base}[run]\nbars = -3\n")).unwrap_err();
        assert!(matches!(err, PineError::ConfigInvalid { ref key, .. } if key == "bars"));
    }

    #[test]
    fn zero_bars_flag_rejected() {
        let overrides = Overrides {
            bars: Some(0),
            ..Overrides::default()
        };
        let err = build_run_config(&config("[data]\nticker = X\ntimeframe = 1d\n"), &overrides)
            .unwrap_err();
        assert!(matches!(err, PineError::ConfigInvalid { ref key, .. } if key == "bars"));
    }
}
