//! Step-function traits and the values they return.

use std::future::Future;

use crate::domain::context::Context;
use crate::domain::error::PineError;
use crate::domain::series::Series;

/// A script value: a plain number or a whole series.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Series(Series),
}

impl Value {
    /// The value at the current bar. Empty series read as NaN.
    pub fn current(&self) -> f64 {
        match self {
            Value::Scalar(v) => *v,
            Value::Series(s) => s.current().unwrap_or(f64::NAN),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<Series> for Value {
    fn from(s: Series) -> Self {
        Value::Series(s)
    }
}

/// What one step returns: a single value or named values.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Scalar(Value),
    Named(Vec<(String, Value)>),
}

impl StepOutput {
    pub fn named<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        StepOutput::Named(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<f64> for StepOutput {
    fn from(v: f64) -> Self {
        StepOutput::Scalar(Value::Scalar(v))
    }
}

/// A compiled per-bar step function.
pub trait Script: Send {
    fn step(&mut self, ctx: &mut Context) -> Result<StepOutput, PineError>;
}

impl<F> Script for F
where
    F: FnMut(&mut Context) -> Result<StepOutput, PineError> + Send,
{
    fn step(&mut self, ctx: &mut Context) -> Result<StepOutput, PineError> {
        self(ctx)
    }
}

/// A step function that may suspend. The engine awaits each bar before
/// moving on, so bars never overlap.
pub trait AsyncScript {
    fn step(&mut self, ctx: &mut Context) -> impl Future<Output = Result<StepOutput, PineError>>;
}

/// Source text → step function.
pub trait Compiler {
    fn compile(&self, source: &str) -> Result<Box<dyn Script>, PineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_unwraps_series() {
        let s = Series::from_chronological(vec![1.0, 2.0]);
        assert_eq!(Value::Series(s).current(), 2.0);
        assert!(Value::Series(Series::new()).current().is_nan());
        assert_eq!(Value::from(3.0).current(), 3.0);
    }

    #[test]
    fn named_builder() {
        let out = StepOutput::named([("a", 1.0), ("b", 2.0)]);
        match out {
            StepOutput::Named(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].0, "a");
            }
            StepOutput::Scalar(_) => panic!("expected named output"),
        }
    }
}
