//! Configuration validation.
//!
//! Checks every config field before a backtest runs, so bad input fails with
//! a `[section] key` message instead of midway through the simulation.

use crate::domain::error::NavtreeError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const SCHEDULES: &[&str] = &["once", "daily", "weekly", "monthly"];
pub const SELECTIONS: &[&str] = &["all", "above_sma"];
pub const WEIGHINGS: &[&str] = &["equal"];

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), NavtreeError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), NavtreeError> {
    validate_choice(config, "schedule", SCHEDULES)?;
    validate_choice(config, "select", SELECTIONS)?;
    validate_choice(config, "weigh", WEIGHINGS)?;
    validate_sma_period(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> NavtreeError {
    NavtreeError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Reads a float, rejecting values that are present but not numeric.
pub fn number(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, NavtreeError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(section, key, format!("{raw:?} is not a number"))),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), NavtreeError> {
    let value = number(config, "backtest", "initial_capital", 1_000_000.0)?;
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), NavtreeError> {
    for (key, default) in [("per_trade", 1.0), ("per_share", 0.0), ("pct", 0.0)] {
        if number(config, "commission", key, default)? < 0.0 {
            return Err(invalid(
                "commission",
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), NavtreeError> {
    let value = number(config, "backtest", "risk_free_rate", 0.0)?;
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), NavtreeError> {
    let start = parse_date(config, "start_date")?;
    let end = parse_date(config, "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    Ok(())
}

/// Optional `[backtest]` date in `YYYY-MM-DD` form.
pub fn parse_date(config: &dyn ConfigPort, field: &str) -> Result<Option<NaiveDate>, NavtreeError> {
    match config.get_string("backtest", field) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                invalid(
                    "backtest",
                    field,
                    format!("invalid {field} format, expected YYYY-MM-DD"),
                )
            }),
    }
}

fn validate_choice(config: &dyn ConfigPort, key: &str, allowed: &[&str]) -> Result<(), NavtreeError> {
    match config.get_string("strategy", key) {
        None => Ok(()),
        Some(v) if allowed.contains(&v.trim().to_lowercase().as_str()) => Ok(()),
        Some(v) => Err(invalid(
            "strategy",
            key,
            format!("unknown {key} {v:?}, expected one of {}", allowed.join(", ")),
        )),
    }
}

fn validate_sma_period(config: &dyn ConfigPort) -> Result<(), NavtreeError> {
    let period = number(config, "strategy", "sma_period", 50.0)?;
    if period < 1.0 || period.fract() != 0.0 {
        return Err(invalid(
            "strategy",
            "sma_period",
            "sma_period must be a positive whole number",
        ));
    }
    Ok(())
}
