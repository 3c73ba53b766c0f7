#![allow(dead_code)]

use chrono::NaiveDate;
use navtree::domain::error::NavtreeError;
use navtree::domain::price_table::PriceTable;
use navtree::ports::data_port::DataPort;
use std::path::{Path, PathBuf};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` consecutive calendar days starting at `start`.
pub fn horizon(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    (0..n)
        .map(|i| start + chrono::Duration::days(i as i64))
        .collect()
}

pub fn table(dates: Vec<NaiveDate>, columns: Vec<(&str, Vec<f64>)>) -> PriceTable {
    PriceTable::from_columns(dates, columns).unwrap()
}

/// Every column flat at `price`.
pub fn flat_table(dates: Vec<NaiveDate>, names: &[&str], price: f64) -> PriceTable {
    let n = dates.len();
    table(dates, names.iter().map(|name| (*name, vec![price; n])).collect())
}

/// Five days of two instruments that take turns being the cheapest.
pub fn rotation_table() -> PriceTable {
    table(
        horizon(date(2010, 1, 1), 5),
        vec![
            ("c1", vec![100.0, 95.0, 100.0, 100.0, 105.0]),
            ("c2", vec![95.0, 100.0, 95.0, 95.0, 95.0]),
        ],
    )
}

pub struct MockDataPort {
    pub prices: Option<PriceTable>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new(prices: PriceTable) -> Self {
        Self {
            prices: Some(prices),
            error: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            prices: None,
            error: Some(reason.to_string()),
        }
    }
}

impl DataPort for MockDataPort {
    fn load_prices(&self) -> Result<PriceTable, NavtreeError> {
        if let Some(reason) = &self.error {
            return Err(NavtreeError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.prices.clone().unwrap_or_default())
    }
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub const PRICES_CSV: &str = "\
date,aaa,bbb
2021-01-04,10,20
2021-01-05,11,20
2021-02-01,12,19
2021-02-02,12,21
2021-03-01,13,22
";
