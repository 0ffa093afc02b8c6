//! Data access port trait.

use crate::domain::error::VaultsimError;
use crate::domain::price_bar::{AuxiliarySeries, PriceBar};
use chrono::NaiveDate;

pub trait DataPort {
    /// Daily bars for `symbol`, oldest first.
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<PriceBar>, VaultsimError>;

    /// A single-valued series (index level, rate) to be aligned to the bars.
    fn fetch_auxiliary(&self, name: &str) -> Result<AuxiliarySeries, VaultsimError>;

    /// Precomputed model signals keyed by decision date.
    fn fetch_signals(&self, name: &str) -> Result<Vec<(NaiveDate, f64)>, VaultsimError>;

    /// First date, last date and bar count, or `None` when the symbol has no bars.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, VaultsimError>;
}
