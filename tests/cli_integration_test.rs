//! CLI integration tests for the backtest command orchestration.
//!
//! Tests cover:
//! - Config parsing (build_backtest_config, build_strategy)
//! - Price file resolution (resolve_prices_path)
//! - Dry-run mode with real INI files on disk
//! - Full pipeline with MockDataPort and the CSV report adapter
//! - End-to-end runs over CSV files through `run`

mod common;

use chrono::NaiveDate;
use common::*;
use navtree::adapters::csv_report_adapter::CsvReportAdapter;
use navtree::adapters::file_config_adapter::FileConfigAdapter;
use navtree::cli::{self, Cli, Command};
use navtree::domain::commission::CommissionSchedule;
use navtree::domain::error::NavtreeError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn same_code(a: ExitCode, b: ExitCode) -> bool {
    format!("{a:?}") == format!("{b:?}")
}

fn is_success(code: ExitCode) -> bool {
    same_code(code, ExitCode::SUCCESS)
}

const VALID_INI: &str = r#"
[backtest]
prices = prices.csv
initial_capital = 100000.0
risk_free_rate = 0.05
start_date = 2021-01-01
end_date = 2021-12-31

[commission]
per_trade = 10.0
per_share = 0.0
pct = 0.0

[strategy]
name = Equal Weight Monthly
schedule = monthly
select = all
weigh = equal
"#;

mod config_loading {
    use super::*;

    #[test]
    fn build_backtest_config_valid_full() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();

        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2021, 1, 1));
        assert_eq!(config.end_date, NaiveDate::from_ymd_opt(2021, 12, 31));
        assert!((config.initial_capital - 100_000.0).abs() < f64::EPSILON);
        assert_eq!(config.commission, CommissionSchedule::flat(10.0));
        assert!((config.risk_free_rate - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn build_backtest_config_uses_defaults() {
        let adapter = FileConfigAdapter::from_string("[backtest]\n").unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();

        assert!(config.start_date.is_none());
        assert!(config.end_date.is_none());
        assert!((config.initial_capital - 1_000_000.0).abs() < f64::EPSILON);
        assert_eq!(config.commission, CommissionSchedule::flat(1.0));
        assert!((config.risk_free_rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn build_backtest_config_invalid_date_format() {
        let ini = "[backtest]\nstart_date = 2020/01/01\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let err = cli::build_backtest_config(&adapter).unwrap_err();
        assert!(matches!(err, NavtreeError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn build_backtest_config_rejects_text_capital() {
        let ini = "[backtest]\ninitial_capital = plenty\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let err = cli::build_backtest_config(&adapter).unwrap_err();
        assert!(matches!(err, NavtreeError::ConfigInvalid { key, .. } if key == "initial_capital"));
    }

    #[test]
    fn build_strategy_uses_configured_name() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let strategy = cli::build_strategy(&adapter).unwrap();
        assert_eq!(strategy.name(), "Equal Weight Monthly");
    }

    #[test]
    fn build_strategy_defaults() {
        let adapter = FileConfigAdapter::from_string("[strategy]\n").unwrap();
        let strategy = cli::build_strategy(&adapter).unwrap();
        assert_eq!(strategy.name(), "navtree");
    }

    #[test]
    fn build_strategy_choices_are_case_insensitive() {
        let ini = "[strategy]\nschedule = Weekly\nselect = ABOVE_SMA\nsma_period = 3\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        assert!(cli::build_strategy(&adapter).is_ok());
    }

    #[test]
    fn build_strategy_unknown_schedule() {
        let ini = "[strategy]\nschedule = hourly\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let err = cli::build_strategy(&adapter).unwrap_err();
        assert!(matches!(err, NavtreeError::ConfigInvalid { key, .. } if key == "schedule"));
    }
}

mod prices_path {
    use super::*;

    #[test]
    fn resolve_from_config() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let path = cli::resolve_prices_path(None, &adapter).unwrap();
        assert_eq!(path, PathBuf::from("prices.csv"));
    }

    #[test]
    fn override_takes_precedence() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let path = cli::resolve_prices_path(Some(Path::new("other.csv")), &adapter).unwrap();
        assert_eq!(path, PathBuf::from("other.csv"));
    }

    #[test]
    fn none_available() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nprices =  \n").unwrap();
        let err = cli::resolve_prices_path(None, &adapter).unwrap_err();
        assert!(matches!(err, NavtreeError::ConfigMissing { key, .. } if key == "prices"));
    }
}

mod dry_run {
    use super::*;

    #[test]
    fn dry_run_valid_config_succeeds() {
        let file = write_temp_ini(VALID_INI);
        let exit_code = cli::run_dry_run(file.path(), None);
        assert!(is_success(exit_code));
    }

    #[test]
    fn dry_run_missing_file_fails() {
        let exit_code = cli::run_dry_run(Path::new("/nonexistent/path/config.ini"), None);
        assert!(same_code(exit_code, ExitCode::from(2)));
    }

    #[test]
    fn dry_run_invalid_weighing_fails() {
        let file = write_temp_ini("[backtest]\nprices = p.csv\n[strategy]\nweigh = momentum\n");
        let exit_code = cli::run_dry_run(file.path(), None);
        assert!(same_code(exit_code, ExitCode::from(2)));
    }

    #[test]
    fn dry_run_without_prices_fails() {
        let file = write_temp_ini("[strategy]\nname = x\n");
        assert!(!is_success(cli::run_dry_run(file.path(), None)));
        assert!(is_success(cli::run_dry_run(
            file.path(),
            Some(Path::new("p.csv"))
        )));
    }
}

mod pipeline_mock {
    use super::*;

    fn strategy() -> navtree::domain::strategy::Strategy {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        cli::build_strategy(&adapter).unwrap()
    }

    fn bt_config() -> navtree::domain::backtest::BacktestConfig {
        let adapter = FileConfigAdapter::from_string("[backtest]\ninitial_capital = 10000\n").unwrap();
        cli::build_backtest_config(&adapter).unwrap()
    }

    #[test]
    fn pipeline_generates_report() {
        let prices = table(
            horizon(date(2021, 1, 1), 40),
            vec![("aaa", vec![10.0; 40]), ("bbb", vec![20.0; 40])],
        );
        let mock = MockDataPort::new(prices);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let output = temp_dir.path().join("run.csv");

        let exit_code = cli::run_backtest_pipeline(
            &mock,
            &CsvReportAdapter::new(),
            strategy(),
            &bt_config(),
            Some(&output),
        );

        assert!(is_success(exit_code));
        let history = std::fs::read_to_string(&output).unwrap();
        assert!(history.starts_with("date,value,price"));
        assert_eq!(history.lines().count(), 41);
        // January and February both rebalance; only January trades on flat prices
        let trades = std::fs::read_to_string(temp_dir.path().join("run_transactions.csv")).unwrap();
        assert_eq!(trades.lines().count(), 3);
        assert!(temp_dir.path().join("run_summary.csv").exists());
    }

    #[test]
    fn pipeline_data_error_returns_error() {
        let mock = MockDataPort::failing("disk on fire");
        let exit_code = cli::run_backtest_pipeline(
            &mock,
            &CsvReportAdapter::new(),
            strategy(),
            &bt_config(),
            None,
        );
        assert!(same_code(exit_code, ExitCode::from(1)));
    }

    #[test]
    fn pipeline_empty_table_returns_error() {
        let mock = MockDataPort::new(table(vec![], vec![]));
        let exit_code = cli::run_backtest_pipeline(
            &mock,
            &CsvReportAdapter::new(),
            strategy(),
            &bt_config(),
            None,
        );
        assert!(same_code(exit_code, ExitCode::from(4)));
    }
}

mod end_to_end {
    use super::*;

    #[test]
    fn backtest_over_csv_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let prices = write_file(dir.path(), "prices.csv", PRICES_CSV);
        let config = write_file(
            dir.path(),
            "navtree.ini",
            "[backtest]\ninitial_capital = 10000\n[commission]\nper_trade = 0\n",
        );
        let output = dir.path().join("out.csv");

        let exit_code = cli::run(Cli {
            command: Command::Backtest {
                config,
                prices: Some(prices),
                output: Some(output.clone()),
                dry_run: false,
            },
        });

        assert!(is_success(exit_code));
        let history = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = history.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "2021-01-04,10000,100");
    }

    #[test]
    fn validate_reports_bad_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = write_file(dir.path(), "bad.ini", "[backtest]\nrisk_free_rate = 3\n");
        let exit_code = cli::run(Cli {
            command: Command::Validate { config },
        });
        assert!(same_code(exit_code, ExitCode::from(2)));
    }

    #[test]
    fn list_instruments_from_csv() {
        let dir = tempfile::TempDir::new().unwrap();
        let prices = write_file(dir.path(), "prices.csv", PRICES_CSV);
        let exit_code = cli::run(Cli {
            command: Command::ListInstruments { prices },
        });
        assert!(is_success(exit_code));
    }
}
