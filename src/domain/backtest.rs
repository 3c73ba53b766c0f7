//! Backtest driver: walks the price horizon and runs the strategy each date.

use chrono::NaiveDate;
use tracing::{debug, info};

use super::commission::CommissionSchedule;
use super::error::NavtreeError;
use super::price_table::PriceTable;
use super::strategy::Strategy;
use super::tree::Transaction;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_capital: f64,
    pub commission: CommissionSchedule,
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            start_date: None,
            end_date: None,
            initial_capital: 1_000_000.0,
            commission: CommissionSchedule::default(),
            risk_free_rate: 0.0,
        }
    }
}

/// Root history of a finished backtest.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub name: String,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
    /// NAV per unit, the cash-flow neutral performance index.
    pub prices: Vec<f64>,
    pub transactions: Vec<Transaction>,
}

impl BacktestResult {
    pub fn final_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn total_commission(&self) -> f64 {
        self.transactions.iter().map(|t| t.commission).sum()
    }
}

/// Runs `strategy` over the dates of `prices` within the configured range.
///
/// The strategy is set up on the sliced table, seeded with
/// `initial_capital`, then updated and run once per date.
pub fn run_backtest(
    strategy: &mut Strategy,
    prices: &PriceTable,
    config: &BacktestConfig,
) -> Result<BacktestResult, NavtreeError> {
    let table = prices.slice_dates(config.start_date, config.end_date);
    if table.is_empty() {
        return Err(NavtreeError::InvalidPriceTable {
            reason: "no price dates inside the backtest range".into(),
        });
    }
    let dates = table.dates().to_vec();

    strategy.setup_with_prices(table);
    strategy
        .tree_mut()
        .set_commission(config.commission.clone());
    strategy.adjust(config.initial_capital)?;
    info!(
        strategy = strategy.name(),
        dates = dates.len(),
        capital = config.initial_capital,
        "backtest started"
    );

    for date in &dates {
        strategy.update(*date, None)?;
        strategy.run()?;
        debug!(%date, "period complete");
    }

    let tree = strategy.tree_mut();
    let root = tree.root();
    let values = tree.values(root)?.to_vec();
    let navs = tree.prices(root)?.to_vec();
    let transactions = tree.transactions().to_vec();
    let result = BacktestResult {
        name: strategy.name().to_string(),
        dates,
        values,
        prices: navs,
        transactions,
    };
    info!(
        strategy = %result.name,
        final_value = result.final_value().unwrap_or(0.0),
        trades = result.transactions.len(),
        "backtest finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::algos::{Rebalance, RunOnce, SelectAll, WeighEqually};
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn prices() -> PriceTable {
        PriceTable::from_columns(
            (1..=4).map(|d| date(2021, 3, d)).collect(),
            vec![
                ("a", vec![10.0, 11.0, 12.0, 13.0]),
                ("b", vec![20.0, 20.0, 20.0, 20.0]),
            ],
        )
        .unwrap()
    }

    fn buy_and_hold() -> Strategy {
        Strategy::new("hold", vec![])
            .unwrap()
            .with_algo(RunOnce::new())
            .with_algo(SelectAll)
            .with_algo(WeighEqually)
            .with_algo(Rebalance)
    }

    #[test]
    fn default_config() {
        let c = BacktestConfig::default();
        assert!(c.start_date.is_none());
        assert!((c.initial_capital - 1_000_000.0).abs() < f64::EPSILON);
        assert_eq!(c.commission, CommissionSchedule::flat(1.0));
    }

    #[test]
    fn records_one_point_per_date() {
        let mut s = buy_and_hold();
        let config = BacktestConfig {
            initial_capital: 1_000.0,
            ..BacktestConfig::default()
        };
        let result = run_backtest(&mut s, &prices(), &config).unwrap();
        assert_eq!(result.name, "hold");
        assert_eq!(result.dates.len(), 4);
        assert_eq!(result.values.len(), 4);
        assert_eq!(result.prices.len(), 4);
        assert_eq!(result.transactions.len(), 2);
        // 50 a + 25 b, two $1 commissions
        assert_relative_eq!(result.values[0], 998.0);
        assert_relative_eq!(result.final_value().unwrap(), 998.0 + 50.0 * 3.0);
        assert_relative_eq!(result.prices[0], 99.8);
        assert_relative_eq!(result.total_commission(), 2.0);
    }

    #[test]
    fn respects_date_range() {
        let mut s = buy_and_hold();
        let config = BacktestConfig {
            start_date: Some(date(2021, 3, 2)),
            end_date: Some(date(2021, 3, 3)),
            initial_capital: 1_100.0,
            commission: CommissionSchedule::free(),
            ..BacktestConfig::default()
        };
        let result = run_backtest(&mut s, &prices(), &config).unwrap();
        assert_eq!(result.dates, vec![date(2021, 3, 2), date(2021, 3, 3)]);
        assert_relative_eq!(result.values[0], 1_100.0);
        assert_relative_eq!(result.values[1], 1_100.0 + 50.0);
    }

    #[test]
    fn empty_range_is_rejected() {
        let mut s = buy_and_hold();
        let config = BacktestConfig {
            start_date: Some(date(2030, 1, 1)),
            ..BacktestConfig::default()
        };
        assert!(matches!(
            run_backtest(&mut s, &prices(), &config),
            Err(NavtreeError::InvalidPriceTable { .. })
        ));
    }
}
