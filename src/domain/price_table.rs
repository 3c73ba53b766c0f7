//! Date-indexed market price table and the no-look-ahead universe view.
//!
//! Prices are stored column-wise, one column per instrument name. A NaN entry
//! means the instrument had no quote on that date (not yet listed, holiday
//! gap, missing data).

use chrono::NaiveDate;
use std::collections::HashMap;

use super::error::NavtreeError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    date_index: HashMap<NaiveDate, usize>,
}

impl PriceTable {
    /// An empty table over `dates`. Dates must be strictly increasing.
    pub fn new(dates: Vec<NaiveDate>) -> Result<Self, NavtreeError> {
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(NavtreeError::InvalidPriceTable {
                reason: format!("dates not strictly increasing at {}", w[1]),
            });
        }
        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        Ok(PriceTable {
            dates,
            names: Vec::new(),
            columns: Vec::new(),
            date_index,
        })
    }

    pub fn from_columns<S: Into<String>>(
        dates: Vec<NaiveDate>,
        columns: Vec<(S, Vec<f64>)>,
    ) -> Result<Self, NavtreeError> {
        let mut table = PriceTable::new(dates)?;
        for (name, prices) in columns {
            table.insert_column(name, prices)?;
        }
        Ok(table)
    }

    pub fn insert_column<S: Into<String>>(
        &mut self,
        name: S,
        prices: Vec<f64>,
    ) -> Result<(), NavtreeError> {
        let name = name.into();
        if prices.len() != self.dates.len() {
            return Err(NavtreeError::InvalidPriceTable {
                reason: format!(
                    "column {} has {} rows, expected {}",
                    name,
                    prices.len(),
                    self.dates.len()
                ),
            });
        }
        match self.column_index(&name) {
            Some(col) => self.columns[col] = prices,
            None => {
                self.names.push(name);
                self.columns.push(prices);
            }
        }
        Ok(())
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_index(name).map(|c| self.columns[c].as_slice())
    }

    /// Raw quote; `None` for an unknown column, out-of-range row or NaN.
    pub fn get(&self, name: &str, row: usize) -> Option<f64> {
        let col = self.column_index(name)?;
        self.columns[col].get(row).copied().filter(|p| !p.is_nan())
    }

    /// Writes one quote, creating a NaN-filled column for unseen names.
    pub fn set(&mut self, name: &str, row: usize, price: f64) {
        if row >= self.dates.len() {
            return;
        }
        let col = match self.column_index(name) {
            Some(c) => c,
            None => {
                self.names.push(name.to_string());
                self.columns.push(vec![f64::NAN; self.dates.len()]);
                self.columns.len() - 1
            }
        };
        self.columns[col][row] = price;
    }

    /// Finite quote by column index.
    pub fn quote(&self, col: usize, row: usize) -> Option<f64> {
        self.columns
            .get(col)?
            .get(row)
            .copied()
            .filter(|p| p.is_finite())
    }

    /// Most recent finite quote at or before `row`.
    pub fn last_price(&self, col: usize, row: usize) -> Option<f64> {
        let column = self.columns.get(col)?;
        let end = row.min(column.len().checked_sub(1)?);
        column[..=end].iter().rev().copied().find(|p| p.is_finite())
    }

    /// Restricts the table to rows `start..=end` (inclusive date bounds).
    pub fn slice_dates(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PriceTable {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| start.is_none_or(|s| **d >= s) && end.is_none_or(|e| **d <= e))
            .map(|(i, _)| i)
            .collect();
        let dates: Vec<NaiveDate> = keep.iter().map(|&i| self.dates[i]).collect();
        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let columns = self
            .columns
            .iter()
            .map(|c| keep.iter().map(|&i| c[i]).collect())
            .collect();
        PriceTable {
            dates,
            names: self.names.clone(),
            columns,
            date_index,
        }
    }
}

/// Quotes for a single date, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceRow {
    entries: Vec<(String, f64)>,
}

impl PriceRow {
    pub fn new() -> Self {
        PriceRow::default()
    }

    pub fn with(mut self, name: &str, price: f64) -> Self {
        self.insert(name, price);
        self
    }

    pub fn insert(&mut self, name: &str, price: f64) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = price,
            None => self.entries.push((name.to_string(), price)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for PriceRow {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut row = PriceRow::new();
        for (name, price) in iter {
            let name: String = name.into();
            row.insert(&name, price);
        }
        row
    }
}

/// Read-only view of the market table up to and including the current date.
#[derive(Debug, Clone, Copy)]
pub struct UniverseView<'a> {
    table: &'a PriceTable,
    rows: usize,
}

impl<'a> UniverseView<'a> {
    pub(crate) fn new(table: &'a PriceTable, now: Option<usize>) -> Self {
        let rows = now.map_or(0, |n| (n + 1).min(table.len()));
        UniverseView { table, rows }
    }

    /// Number of visible dates.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn dates(&self) -> &'a [NaiveDate] {
        &self.table.dates()[..self.rows]
    }

    pub fn now(&self) -> Option<NaiveDate> {
        self.dates().last().copied()
    }

    pub fn names(&self) -> &'a [String] {
        self.table.names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.has_column(name)
    }

    /// History of `name` up to now.
    pub fn column(&self, name: &str) -> Option<&'a [f64]> {
        self.table.column(name).map(|c| &c[..self.rows])
    }

    /// Quote of `name` on `date`; `None` for future dates or missing quotes.
    pub fn price(&self, name: &str, date: NaiveDate) -> Option<f64> {
        let row = self.table.date_index(date)?;
        if row >= self.rows {
            return None;
        }
        self.table.get(name, row)
    }

    /// Quote of `name` on the current date.
    pub fn current(&self, name: &str) -> Option<f64> {
        let row = self.rows.checked_sub(1)?;
        self.table.get(name, row)
    }

    /// All finite quotes on the current date, in column order.
    pub fn current_row(&self) -> Vec<(&'a str, f64)> {
        let Some(row) = self.rows.checked_sub(1) else {
            return Vec::new();
        };
        self.table
            .names()
            .iter()
            .filter_map(|n| {
                self.table
                    .get(n, row)
                    .filter(|p| p.is_finite())
                    .map(|p| (n.as_str(), p))
            })
            .collect()
    }
}
