//! CSV price file adapter.
//!
//! Reads a wide table: a `date` column followed by one column per instrument.
//! Empty cells mean "no quote" and become NaN.

use crate::domain::error::NavtreeError;
use crate::domain::price_table::PriceTable;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DataPort for CsvAdapter {
    fn load_prices(&self) -> Result<PriceTable, NavtreeError> {
        let file = File::open(&self.path).map_err(|e| NavtreeError::Data {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;
        let table = parse_prices(file)?;
        debug!(
            path = %self.path.display(),
            dates = table.len(),
            instruments = table.names().len(),
            "prices loaded"
        );
        Ok(table)
    }
}

pub fn parse_prices<R: Read>(reader: R) -> Result<PriceTable, NavtreeError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| NavtreeError::Data {
            reason: format!("CSV header error: {}", e),
        })?
        .clone();
    if headers.len() < 2 {
        return Err(NavtreeError::Data {
            reason: "expected a date column followed by instrument columns".into(),
        });
    }
    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    if let Some(dup) = names
        .iter()
        .enumerate()
        .find(|(i, n)| names[..*i].contains(n))
        .map(|(_, n)| n)
    {
        return Err(NavtreeError::Data {
            reason: format!("duplicate instrument column {}", dup),
        });
    }

    let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| NavtreeError::Data {
            reason: format!("CSV parse error: {}", e),
        })?;

        let date_str = record.get(0).ok_or_else(|| NavtreeError::Data {
            reason: "missing date column".into(),
        })?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
            NavtreeError::Data {
                reason: format!("invalid date {:?}: {}", date_str, e),
            }
        })?;

        let mut prices = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let raw = record.get(i + 1).unwrap_or("");
            let price = if raw.is_empty() {
                f64::NAN
            } else {
                raw.parse::<f64>().map_err(|e| NavtreeError::Data {
                    reason: format!("invalid price {:?} for {} on {}: {}", raw, name, date, e),
                })?
            };
            prices.push(price);
        }
        rows.push((date, prices));
    }

    rows.sort_by_key(|(date, _)| *date);
    let dates = rows.iter().map(|(d, _)| *d).collect();
    let columns = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, rows.iter().map(|(_, p)| p[i]).collect()))
        .collect();
    PriceTable::from_columns(dates, columns)
}
