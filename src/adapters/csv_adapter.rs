//! CSV file data adapter.
//!
//! Layout under the base path: `<symbol>.csv` with a `date,open,high,low,close,volume`
//! header, one auxiliary file per series with `date` plus a `value` or `close`
//! column, and signal files with `date,signal`. Columns are located by header
//! name, so extra columns (e.g. `adj close`) are ignored.

use crate::domain::error::VaultsimError;
use crate::domain::features::FeatureTable;
use crate::domain::price_bar::{AuxiliarySeries, PriceBar};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use csv::StringRecord;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.csv"))
    }

    fn open(&self, name: &str) -> Result<csv::Reader<fs::File>, VaultsimError> {
        let path = self.csv_path(name);
        csv::Reader::from_path(&path).map_err(|e| VaultsimError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })
    }
}

/// Column positions resolved from a header row.
struct Columns {
    names: Vec<String>,
}

impl Columns {
    fn from_header(header: &StringRecord) -> Self {
        Self {
            names: header.iter().map(|h| h.trim().to_lowercase()).collect(),
        }
    }

    fn find(&self, candidates: &[&str]) -> Option<usize> {
        candidates
            .iter()
            .find_map(|c| self.names.iter().position(|n| n == c))
    }

    fn require(&self, name: &str) -> Result<usize, VaultsimError> {
        self.find(&[name]).ok_or_else(|| VaultsimError::Data {
            reason: format!("missing {name} column"),
        })
    }
}

fn parse_date(record: &StringRecord, idx: usize) -> Result<NaiveDate, VaultsimError> {
    let raw = record.get(idx).unwrap_or("").trim();
    // Timestamps such as "2024-01-02 00:00:00" keep only the day.
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| VaultsimError::Data {
        reason: format!("invalid date '{raw}': {e}"),
    })
}

/// Empty and `null` cells read as NaN; anything else must parse.
fn parse_value(record: &StringRecord, idx: usize, name: &str) -> Result<f64, VaultsimError> {
    let raw = record.get(idx).unwrap_or("").trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return Ok(f64::NAN);
    }
    raw.parse().map_err(|e| VaultsimError::Data {
        reason: format!("invalid {name} value '{raw}': {e}"),
    })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<PriceBar>, VaultsimError> {
        let mut rdr = self.open(symbol)?;
        let header = rdr.headers().map_err(|e| VaultsimError::Data {
            reason: format!("CSV parse error: {e}"),
        })?;
        let cols = Columns::from_header(header);
        let date_col = cols.require("date")?;
        let open_col = cols.require("open")?;
        let high_col = cols.require("high")?;
        let low_col = cols.require("low")?;
        let close_col = cols.require("close")?;
        let volume_col = cols.require("volume")?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| VaultsimError::Data {
                reason: format!("CSV parse error: {e}"),
            })?;
            bars.push(PriceBar {
                date: parse_date(&record, date_col)?,
                open: parse_value(&record, open_col, "open")?,
                high: parse_value(&record, high_col, "high")?,
                low: parse_value(&record, low_col, "low")?,
                close: parse_value(&record, close_col, "close")?,
                volume: parse_value(&record, volume_col, "volume")?,
            });
        }

        if bars.is_empty() {
            return Err(VaultsimError::NoData {
                symbol: symbol.to_string(),
            });
        }
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn fetch_auxiliary(&self, name: &str) -> Result<AuxiliarySeries, VaultsimError> {
        let mut rdr = self.open(name)?;
        let header = rdr.headers().map_err(|e| VaultsimError::Data {
            reason: format!("CSV parse error: {e}"),
        })?;
        let cols = Columns::from_header(header);
        let date_col = cols.require("date")?;
        let value_col = cols
            .find(&["value", "close"])
            .ok_or_else(|| VaultsimError::Data {
                reason: format!("{name}: missing value or close column"),
            })?;

        let mut observations = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| VaultsimError::Data {
                reason: format!("CSV parse error: {e}"),
            })?;
            observations.push((
                parse_date(&record, date_col)?,
                parse_value(&record, value_col, "value")?,
            ));
        }
        Ok(AuxiliarySeries::new(name, observations))
    }

    fn fetch_signals(&self, name: &str) -> Result<Vec<(NaiveDate, f64)>, VaultsimError> {
        let mut rdr = self.open(name)?;
        let header = rdr.headers().map_err(|e| VaultsimError::Data {
            reason: format!("CSV parse error: {e}"),
        })?;
        let cols = Columns::from_header(header);
        let date_col = cols.require("date")?;
        let signal_col = cols.require("signal")?;

        rdr.records()
            .map(|result| -> Result<(NaiveDate, f64), VaultsimError> {
                let record = result.map_err(|e| VaultsimError::Data {
                    reason: format!("CSV parse error: {e}"),
                })?;
                Ok((
                    parse_date(&record, date_col)?,
                    parse_value(&record, signal_col, "signal")?,
                ))
            })
            .collect()
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, VaultsimError> {
        if !self.csv_path(symbol).exists() {
            return Ok(None);
        }
        match self.fetch_bars(symbol) {
            Ok(bars) => Ok(bars
                .first()
                .zip(bars.last())
                .map(|(first, last)| (first.date, last.date, bars.len()))),
            Err(VaultsimError::NoData { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Write the scaled feature table with its targets, one row per date.
pub fn write_feature_table(path: &Path, table: &FeatureTable) -> Result<(), VaultsimError> {
    let csv_err = |e: csv::Error| VaultsimError::Data {
        reason: format!("failed to write {}: {}", path.display(), e),
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;

    let mut header = Vec::with_capacity(table.width() + 3);
    header.push("date".to_string());
    header.extend(table.columns.iter().cloned());
    header.push("target_signal".to_string());
    header.push("target_return".to_string());
    wtr.write_record(&header).map_err(csv_err)?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(header.len());
        record.push(row.date.to_string());
        record.extend(row.features.iter().map(|v| v.to_string()));
        record.push(row.target_signal.to_string());
        record.push(row.target_return.to_string());
        wtr.write_record(&record).map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}
