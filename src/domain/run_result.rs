//! Per-bar results collected by the engine.

use crate::domain::error::PineError;
use crate::domain::script::StepOutput;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Columns {
    #[default]
    Empty,
    Scalar(Vec<f64>),
    /// Named columns in first-appearance order.
    Named(Vec<(String, Vec<f64>)>),
}

/// Result accumulator. Every column always has one entry per processed bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    rows: usize,
    columns: Columns,
}

impl RunResult {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn scalar(&self) -> Option<&[f64]> {
        match &self.columns {
            Columns::Scalar(values) => Some(values),
            _ => None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        match &self.columns {
            Columns::Named(cols) => cols
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_slice()),
            _ => None,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match &self.columns {
            Columns::Named(cols) => cols.iter().map(|(n, _)| n.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Appends one bar's output. `bar` is only used for error reporting.
    pub fn push(&mut self, bar: usize, output: StepOutput) -> Result<(), PineError> {
        match output {
            StepOutput::Scalar(value) => {
                let value = value.current();
                match &mut self.columns {
                    Columns::Scalar(values) => values.push(value),
                    Columns::Empty => self.columns = Columns::Scalar(vec![value]),
                    Columns::Named(_) => return Err(PineError::ResultShape { bar }),
                }
            }
            StepOutput::Named(fields) => {
                if let Columns::Empty = self.columns {
                    self.columns = Columns::Named(Vec::new());
                }
                let Columns::Named(cols) = &mut self.columns else {
                    return Err(PineError::ResultShape { bar });
                };
                let rows = self.rows;
                for (name, value) in fields {
                    let value = value.current();
                    match cols.iter_mut().find(|(n, _)| *n == name) {
                        Some((_, column)) => {
                            // Repeated key within one bar: the last value wins.
                            if column.len() > rows {
                                column.truncate(rows);
                            }
                            column.push(value);
                        }
                        None => {
                            let mut column = vec![f64::NAN; rows];
                            column.push(value);
                            cols.push((name, column));
                        }
                    }
                }
                for (_, column) in cols.iter_mut() {
                    column.resize(rows + 1, f64::NAN);
                }
            }
        }
        self.rows += 1;
        Ok(())
    }
}
