//! Core domain types and logic.

pub mod error;
pub mod node;
pub mod price_table;
pub mod commission;
pub mod tree;
pub mod strategy;
pub mod algos;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
