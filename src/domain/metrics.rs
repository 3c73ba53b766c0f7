//! Performance statistics over a backtest's NAV index.

use super::backtest::BacktestResult;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub transactions: usize,
    pub total_commission: f64,
}

impl Metrics {
    /// Statistics are computed on `result.prices` (NAV per unit), so capital
    /// injections do not register as returns.
    pub fn compute(result: &BacktestResult, risk_free_rate: f64) -> Self {
        let index = &result.prices;

        let total_return = match (index.first(), index.last()) {
            (Some(first), Some(last)) if *first > 0.0 => last / first - 1.0,
            _ => 0.0,
        };

        let years = index.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(index);

        let returns = period_returns(index);
        let volatility = stddev(&returns) * TRADING_DAYS_PER_YEAR.sqrt();

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(&returns, daily_rf);

        Metrics {
            total_return,
            annualized_return,
            max_drawdown,
            max_drawdown_duration,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            transactions: result.transactions.len(),
            total_commission: result.total_commission(),
        }
    }
}

fn period_returns(index: &[f64]) -> Vec<f64> {
    index
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn stddev(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Largest peak-to-trough fall and the longest run of periods spent below
/// the running peak.
fn compute_drawdown(index: &[f64]) -> (f64, i64) {
    let Some(&first) = index.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for &point in index {
        if point >= peak {
            peak = point;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(returns: &[f64], daily_rf: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let sd = stddev(returns);
    let excess_return = mean - daily_rf;

    let sharpe = if sd > 0.0 {
        (excess_return / sd) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
