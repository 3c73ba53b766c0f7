//! CSV report adapter.
//!
//! Writes the root history as `date,value,price` rows to the output path, and
//! next to it `<stem>_transactions.csv` and `<stem>_summary.csv`.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::NavtreeError;
use crate::domain::metrics::Metrics;
use crate::ports::report_port::ReportPort;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        CsvReportAdapter
    }

    pub fn sibling_path(output_path: &Path, suffix: &str) -> PathBuf {
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        output_path.with_file_name(format!("{stem}_{suffix}.csv"))
    }
}

fn csv_error(path: &Path, e: impl std::fmt::Display) -> NavtreeError {
    NavtreeError::Data {
        reason: format!("failed to write {}: {}", path.display(), e),
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        output_path: &Path,
    ) -> Result<(), NavtreeError> {
        let mut wtr = csv::Writer::from_path(output_path).map_err(|e| csv_error(output_path, e))?;
        wtr.write_record(["date", "value", "price"])
            .map_err(|e| csv_error(output_path, e))?;
        for ((date, value), price) in result.dates.iter().zip(&result.values).zip(&result.prices) {
            wtr.write_record([date.to_string(), value.to_string(), price.to_string()])
                .map_err(|e| csv_error(output_path, e))?;
        }
        wtr.flush()?;

        let path = Self::sibling_path(output_path, "transactions");
        let mut wtr = csv::Writer::from_path(&path).map_err(|e| csv_error(&path, e))?;
        wtr.write_record(["date", "node", "quantity", "price", "commission"])
            .map_err(|e| csv_error(&path, e))?;
        for t in &result.transactions {
            wtr.write_record([
                t.date.to_string(),
                t.path.clone(),
                t.quantity.to_string(),
                t.price.to_string(),
                t.commission.to_string(),
            ])
            .map_err(|e| csv_error(&path, e))?;
        }
        wtr.flush()?;

        let path = Self::sibling_path(output_path, "summary");
        let mut wtr = csv::Writer::from_path(&path).map_err(|e| csv_error(&path, e))?;
        let rows = [
            ("total_return", metrics.total_return.to_string()),
            ("annualized_return", metrics.annualized_return.to_string()),
            ("max_drawdown", metrics.max_drawdown.to_string()),
            (
                "max_drawdown_duration",
                metrics.max_drawdown_duration.to_string(),
            ),
            ("volatility", metrics.volatility.to_string()),
            ("sharpe_ratio", metrics.sharpe_ratio.to_string()),
            ("sortino_ratio", metrics.sortino_ratio.to_string()),
            ("transactions", metrics.transactions.to_string()),
            ("total_commission", metrics.total_commission.to_string()),
        ];
        wtr.write_record(["metric", "value"])
            .map_err(|e| csv_error(&path, e))?;
        for (name, value) in rows {
            wtr.write_record([name, value.as_str()])
                .map_err(|e| csv_error(&path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tree::Transaction;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn sample() -> BacktestResult {
        let d = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        BacktestResult {
            name: "s".into(),
            dates: vec![d, d.succ_opt().unwrap()],
            values: vec![1000.0, 1010.0],
            prices: vec![100.0, 101.0],
            transactions: vec![Transaction {
                date: d,
                path: "s/SPY".into(),
                quantity: 2,
                price: 450.0,
                commission: 1.0,
            }],
        }
    }

    #[test]
    fn sibling_paths_share_stem() {
        let p = CsvReportAdapter::sibling_path(Path::new("/tmp/out/run.csv"), "summary");
        assert_eq!(p, PathBuf::from("/tmp/out/run_summary.csv"));
    }

    #[test]
    fn writes_history_transactions_and_summary() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("run.csv");
        let result = sample();
        let metrics = Metrics::compute(&result, 0.0);
        CsvReportAdapter::new().write(&result, &metrics, &out).unwrap();

        let history = fs::read_to_string(&out).unwrap();
        assert_eq!(
            history,
            "date,value,price\n2024-01-15,1000,100\n2024-01-16,1010,101\n"
        );

        let trades = fs::read_to_string(dir.path().join("run_transactions.csv")).unwrap();
        assert!(trades.contains("2024-01-15,s/SPY,2,450,1\n"));

        let summary = fs::read_to_string(dir.path().join("run_summary.csv")).unwrap();
        assert!(summary.starts_with("metric,value\ntotal_return,0.01"));
        assert!(summary.contains("transactions,1\n"));
    }

    #[test]
    fn unwritable_path_fails() {
        let result = sample();
        let metrics = Metrics::compute(&result, 0.0);
        let err = CsvReportAdapter::new()
            .write(&result, &metrics, Path::new("/nonexistent/dir/run.csv"))
            .unwrap_err();
        assert!(matches!(err, NavtreeError::Data { .. }));
    }
}
