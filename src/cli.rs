//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::algos::{
    Rebalance, RunDaily, RunMonthly, RunOnce, RunWeekly, SelectAboveSma, SelectAll, WeighEqually,
};
use crate::domain::backtest::{self as backtest_engine, BacktestConfig};
use crate::domain::commission::CommissionSchedule;
use crate::domain::config_validation::{
    number, parse_date, validate_backtest_config, validate_strategy_config,
};
use crate::domain::error::NavtreeError;
use crate::domain::metrics::Metrics;
use crate::domain::strategy::Strategy;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "navtree", about = "Hierarchical portfolio backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Price CSV, overriding `[backtest] prices`
        #[arg(short, long)]
        prices: Option<PathBuf>,
        /// Write the report here instead of printing the history to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the instruments in a price file
    ListInstruments {
        #[arg(short, long)]
        prices: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            prices,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, prices.as_deref())
            } else {
                run_backtest(&config, prices.as_deref(), output.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::ListInstruments { prices } => run_list_instruments(&prices),
    }
}

fn fail(err: &NavtreeError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn load_validated(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    validate_backtest_config(&adapter).map_err(|e| fail(&e))?;
    validate_strategy_config(&adapter).map_err(|e| fail(&e))?;
    Ok(adapter)
}

fn run_backtest(config_path: &Path, prices: Option<&Path>, output: Option<&Path>) -> ExitCode {
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let prepared = resolve_prices_path(prices, &adapter).and_then(|path| {
        let strategy = build_strategy(&adapter)?;
        let bt_config = build_backtest_config(&adapter)?;
        Ok((path, strategy, bt_config))
    });
    let (prices_path, strategy, bt_config) = match prepared {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    eprintln!("Loading strategy: {}", strategy.name());
    eprintln!("Loading prices from {}", prices_path.display());

    run_backtest_pipeline(
        &CsvAdapter::new(prices_path),
        &CsvReportAdapter::new(),
        strategy,
        &bt_config,
        output,
    )
}

/// `--prices` wins over `[backtest] prices`.
pub fn resolve_prices_path(
    prices_override: Option<&Path>,
    config: &dyn ConfigPort,
) -> Result<PathBuf, NavtreeError> {
    if let Some(p) = prices_override {
        return Ok(p.to_path_buf());
    }
    match config.get_string("backtest", "prices") {
        Some(p) if !p.trim().is_empty() => Ok(PathBuf::from(p.trim())),
        _ => Err(NavtreeError::ConfigMissing {
            section: "backtest".into(),
            key: "prices".into(),
        }),
    }
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, NavtreeError> {
    Ok(BacktestConfig {
        start_date: parse_date(adapter, "start_date")?,
        end_date: parse_date(adapter, "end_date")?,
        initial_capital: number(adapter, "backtest", "initial_capital", 1_000_000.0)?,
        commission: CommissionSchedule {
            per_trade: number(adapter, "commission", "per_trade", 1.0)?,
            per_share: number(adapter, "commission", "per_share", 0.0)?,
            pct: number(adapter, "commission", "pct", 0.0)?,
        },
        risk_free_rate: number(adapter, "backtest", "risk_free_rate", 0.0)?,
    })
}

fn choice(adapter: &dyn ConfigPort, key: &str, default: &str) -> String {
    adapter
        .get_string("strategy", key)
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn unknown(key: &str, value: &str) -> NavtreeError {
    NavtreeError::ConfigInvalid {
        section: "strategy".into(),
        key: key.into(),
        reason: format!("unknown {key} {value:?}"),
    }
}

/// Assembles the algo stack: schedule gate, selection, weighing, rebalance.
pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Strategy, NavtreeError> {
    let name = adapter
        .get_string("strategy", "name")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "navtree".to_string());
    let mut strategy = Strategy::new(name.trim(), vec![])?;

    match choice(adapter, "schedule", "monthly").as_str() {
        "once" => strategy.push_algo(RunOnce::new()),
        "daily" => strategy.push_algo(RunDaily),
        "weekly" => strategy.push_algo(RunWeekly),
        "monthly" => strategy.push_algo(RunMonthly),
        other => return Err(unknown("schedule", other)),
    }

    match choice(adapter, "select", "all").as_str() {
        "all" => strategy.push_algo(SelectAll),
        "above_sma" => {
            let period = number(adapter, "strategy", "sma_period", 50.0)?;
            strategy.push_algo(SelectAboveSma::new(period as usize));
        }
        other => return Err(unknown("select", other)),
    }

    match choice(adapter, "weigh", "equal").as_str() {
        "equal" => strategy.push_algo(WeighEqually),
        other => return Err(unknown("weigh", other)),
    }

    strategy.push_algo(Rebalance);
    Ok(strategy)
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    report_port: &dyn ReportPort,
    mut strategy: Strategy,
    bt_config: &BacktestConfig,
    output_path: Option<&Path>,
) -> ExitCode {
    let prices = match data_port.load_prices() {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    eprintln!(
        "Running backtest: {} instruments, {} dates",
        prices.names().len(),
        prices.len()
    );

    let result = match backtest_engine::run_backtest(&mut strategy, &prices, bt_config) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    let metrics = Metrics::compute(&result, bt_config.risk_free_rate);

    eprintln!("\n=== Results: {} ===", result.name);
    eprintln!(
        "Period:           {} to {}",
        result.dates.first().map(|d| d.to_string()).unwrap_or_default(),
        result.dates.last().map(|d| d.to_string()).unwrap_or_default()
    );
    eprintln!("Final Value:      {:.2}", result.final_value().unwrap_or(0.0));
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!(
        "Annualized:       {:.2}%",
        metrics.annualized_return * 100.0
    );
    eprintln!("Volatility:       {:.2}%", metrics.volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!(
        "Max Drawdown:     -{:.1}% ({} periods)",
        metrics.max_drawdown * 100.0,
        metrics.max_drawdown_duration
    );
    eprintln!("Transactions:     {}", metrics.transactions);
    eprintln!("Commission:       {:.2}", metrics.total_commission);

    match output_path {
        Some(path) => match report_port.write(&result, &metrics, path) {
            Ok(()) => {
                eprintln!("\nReport written to: {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => fail(&e),
        },
        None => {
            println!("date,value,price");
            for ((date, value), price) in
                result.dates.iter().zip(&result.values).zip(&result.prices)
            {
                println!("{date},{value},{price}");
            }
            ExitCode::SUCCESS
        }
    }
}

pub fn run_dry_run(config_path: &Path, prices: Option<&Path>) -> ExitCode {
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully");

    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let prices_path = match resolve_prices_path(prices, &adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    eprintln!("\nStrategy: {}", strategy.name());
    eprintln!("  schedule: {}", choice(&adapter, "schedule", "monthly"));
    eprintln!("  select:   {}", choice(&adapter, "select", "all"));
    eprintln!("  weigh:    {}", choice(&adapter, "weigh", "equal"));

    eprintln!("\nBacktest:");
    eprintln!("  prices:          {}", prices_path.display());
    eprintln!("  initial capital: {:.2}", bt_config.initial_capital);
    eprintln!(
        "  commission:      {} per trade, {} per share, {}% of notional",
        bt_config.commission.per_trade, bt_config.commission.per_share, bt_config.commission.pct
    );

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = build_strategy(&adapter) {
        return fail(&e);
    }
    for section in ["backtest", "commission", "strategy"] {
        if !adapter.has_section(section) {
            eprintln!("  [{section}] not present, using defaults");
        }
    }
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_list_instruments(prices_path: &Path) -> ExitCode {
    match CsvAdapter::new(prices_path.to_path_buf()).list_instruments() {
        Ok(names) => {
            for name in names {
                println!("{name}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
