//! pinerun: bar-by-bar evaluation of Pine-like indicator scripts.
//!
//! Hexagonal architecture: the engine, indicator library and script compiler
//! live in [`domain`], port traits in [`ports`], concrete data and config
//! sources in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
