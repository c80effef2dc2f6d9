//! OHLCV bar representation.

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::error::PineError;

/// Parses Unix milliseconds, `YYYY-MM-DD` (midnight UTC) or RFC 3339.
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ms) = text.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// One immutable OHLCV record. Times are Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketBar {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl MarketBar {
    /// (high + low) / 2
    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// (high + low + close) / 3
    pub fn hlc3(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// (open + high + low + close) / 4
    pub fn ohlc4(&self) -> f64 {
        (self.high + self.low + self.open + self.close) / 4.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Rejects bars that cannot be appended to a price series.
    pub fn validate(&self) -> Result<(), PineError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(PineError::InvalidBar {
                    reason: format!("{name} is not a finite number"),
                });
            }
        }
        if self.high < self.low {
            return Err(PineError::InvalidBar {
                reason: format!("high {} is below low {}", self.high, self.low),
            });
        }
        if self.volume < 0.0 {
            return Err(PineError::InvalidBar {
                reason: "volume is negative".into(),
            });
        }
        if self.close_time < self.open_time {
            return Err(PineError::InvalidBar {
                reason: "close_time precedes open_time".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> MarketBar {
        MarketBar {
            open_time: 1_700_000_000_000,
            close_time: 1_700_000_059_999,
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn parse_time_accepts_three_formats() {
        assert_eq!(
            parse_time("1700000000000").map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert_eq!(
            parse_time("2024-01-15").map(|t| t.timestamp_millis()),
            Some(1_705_276_800_000)
        );
        assert_eq!(
            parse_time("2024-01-15T01:00:00+01:00").map(|t| t.timestamp_millis()),
            Some(1_705_276_800_000)
        );
        assert!(parse_time("15/01/2024").is_none());
    }

    #[test]
    fn derived_prices() {
        let bar = sample_bar();
        assert!((bar.hl2() - 100.0).abs() < f64::EPSILON);
        assert!((bar.hlc3() - (110.0 + 90.0 + 105.0) / 3.0).abs() < f64::EPSILON);
        assert!((bar.ohlc4() - 101.25).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_hl_dominates() {
        let bar = sample_bar();
        // high-low=20, |high-100|=10, |low-100|=10 → 20
        assert!((bar.true_range(100.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let bar = sample_bar();
        // |110-70|=40 dominates
        assert!((bar.true_range(70.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_down() {
        let bar = sample_bar();
        // |90-130|=40 dominates
        assert!((bar.true_range(130.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_accepts_sane_bar() {
        assert!(sample_bar().validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let bar = MarketBar {
            high: 80.0,
            ..sample_bar()
        };
        assert!(matches!(bar.validate(), Err(PineError::InvalidBar { .. })));
    }

    #[test]
    fn validate_rejects_nan() {
        let bar = MarketBar {
            close: f64::NAN,
            ..sample_bar()
        };
        let err = bar.validate().unwrap_err();
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn validate_rejects_backwards_times() {
        let bar = MarketBar {
            close_time: 0,
            ..sample_bar()
        };
        assert!(bar.validate().is_err());
    }
}
