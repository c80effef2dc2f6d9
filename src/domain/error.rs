//! Domain error types.

/// A parse error with position information for script parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with the offending line and a caret under the error column.
    pub fn display_with_context(&self, input: &str) -> String {
        let position = self.position.min(input.len());
        let line_start = input[..position].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = input[position..]
            .find('\n')
            .map(|i| position + i)
            .unwrap_or(input.len());
        let line_no = input[..line_start].matches('\n').count() + 1;
        let column = input[line_start..position].chars().count();
        let caret = " ".repeat(column) + "^";
        format!(
            "line {line_no}:\n{line}\n{caret}\n{err}",
            line = &input[line_start..line_end],
            err = self
        )
    }
}

/// Top-level error type for pinerun.
#[derive(Debug, thiserror::Error)]
pub enum PineError {
    #[error("no script supplied and none previously compiled")]
    NoScript,

    #[error("invalid bar: {reason}")]
    InvalidBar { reason: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("compile error at position {position}: {reason}")]
    Compile { position: usize, reason: String },

    #[error("script failed at bar {bar}: {reason}")]
    Script { bar: usize, reason: String },

    #[error("result shape changed at bar {bar}: step output switched between scalar and named values")]
    ResultShape { bar: usize },

    #[error("data source error: {reason}")]
    Data { reason: String },

    #[error("no data for {ticker} ({timeframe})")]
    NoData { ticker: String, timeframe: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PineError {
    /// Shorthand for a failure raised from inside a step function.
    pub fn script(bar: usize, reason: impl Into<String>) -> Self {
        PineError::Script {
            bar,
            reason: reason.into(),
        }
    }
}

impl From<&PineError> for std::process::ExitCode {
    fn from(err: &PineError) -> Self {
        let code: u8 = match err {
            PineError::Io(_) => 1,
            PineError::ConfigParse { .. }
            | PineError::ConfigMissing { .. }
            | PineError::ConfigInvalid { .. }
            | PineError::NoScript => 2,
            PineError::Data { .. } | PineError::NoData { .. } | PineError::InvalidBar { .. } => 3,
            PineError::Parse(_) | PineError::Compile { .. } => 4,
            PineError::Script { .. } | PineError::ResultShape { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_context_points_at_column() {
        let src = "fast = ta.sma(close, 10)\nslow = ta.foo(close)";
        let err = ParseError {
            message: "unknown function 'ta.foo'".into(),
            position: src.find("ta.foo").unwrap(),
        };
        let rendered = err.display_with_context(src);
        assert!(rendered.starts_with("line 2:\nslow = ta.foo(close)\n       ^"));
        assert!(rendered.contains("unknown function 'ta.foo'"));
    }

    #[test]
    fn display_with_context_clamps_position() {
        let err = ParseError {
            message: "unexpected end of input".into(),
            position: 99,
        };
        let rendered = err.display_with_context("x = ");
        assert!(rendered.contains("x = \n    ^"));
    }

    #[test]
    fn exit_codes_group_by_category() {
        use std::process::ExitCode;
        assert_eq!(ExitCode::from(&PineError::NoScript), ExitCode::from(2));
        assert_eq!(
            ExitCode::from(&PineError::script(3, "boom")),
            ExitCode::from(5)
        );
        assert_eq!(
            ExitCode::from(&PineError::InvalidBar {
                reason: "high < low".into()
            }),
            ExitCode::from(3)
        );
    }

    #[test]
    fn parse_error_converts() {
        let err: PineError = ParseError {
            message: "x".into(),
            position: 0,
        }
        .into();
        assert!(matches!(err, PineError::Parse(_)));
    }
}
