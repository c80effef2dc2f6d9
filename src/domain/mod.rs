//! Core domain types and logic.

pub mod context;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod market_data;
pub mod ohlcv;
pub mod outputs;
pub mod run_config;
pub mod run_result;
pub mod script;
pub mod script_ast;
pub mod script_eval;
pub mod script_parser;
pub mod series;
pub mod ta;
