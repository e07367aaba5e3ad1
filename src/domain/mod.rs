//! Core domain types and logic.

pub mod ohlcv;
pub mod panel;
pub mod calendar;
pub mod stats;
pub mod signal;
pub mod ranker;
pub mod tracker;
pub mod aggregator;
pub mod series;
pub mod risk_free;
pub mod universe;
pub mod metrics;
pub mod backtest;
pub mod config_validation;
pub mod error;
