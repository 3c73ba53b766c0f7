//! Market data port trait.

use crate::domain::error::NavtreeError;
use crate::domain::price_table::PriceTable;

pub trait DataPort {
    /// Loads the full date-indexed price table.
    fn load_prices(&self) -> Result<PriceTable, NavtreeError>;

    /// Instrument names available from this source.
    fn list_instruments(&self) -> Result<Vec<String>, NavtreeError> {
        Ok(self.load_prices()?.names().to_vec())
    }
}
