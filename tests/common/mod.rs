#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashMap;
use vaultsim::domain::error::VaultsimError;
use vaultsim::domain::metrics::MetricsRecord;
pub use vaultsim::domain::price_bar::{AuxiliarySeries, PriceBar};
use vaultsim::domain::simulation::LedgerEntry;
use vaultsim::ports::data_port::DataPort;
use vaultsim::ports::metrics_port::MetricsPort;

pub struct MockDataPort {
    pub bars: HashMap<String, Vec<PriceBar>>,
    pub auxiliary: HashMap<String, AuxiliarySeries>,
    pub signals: HashMap<String, Vec<(NaiveDate, f64)>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            auxiliary: HashMap::new(),
            signals: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_auxiliary(mut self, series: AuxiliarySeries) -> Self {
        self.auxiliary.insert(series.name.clone(), series);
        self
    }

    pub fn with_signals(mut self, name: &str, signals: Vec<(NaiveDate, f64)>) -> Self {
        self.signals.insert(name.to_string(), signals);
        self
    }

    pub fn with_error(mut self, name: &str, reason: &str) -> Self {
        self.errors.insert(name.to_string(), reason.to_string());
        self
    }

    fn check(&self, name: &str) -> Result<(), VaultsimError> {
        match self.errors.get(name) {
            Some(reason) => Err(VaultsimError::Data {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<PriceBar>, VaultsimError> {
        self.check(symbol)?;
        match self.bars.get(symbol) {
            Some(bars) if !bars.is_empty() => Ok(bars.clone()),
            _ => Err(VaultsimError::NoData {
                symbol: symbol.to_string(),
            }),
        }
    }

    fn fetch_auxiliary(&self, name: &str) -> Result<AuxiliarySeries, VaultsimError> {
        self.check(name)?;
        self.auxiliary
            .get(name)
            .cloned()
            .ok_or_else(|| VaultsimError::Data {
                reason: format!("no auxiliary series {name}"),
            })
    }

    fn fetch_signals(&self, name: &str) -> Result<Vec<(NaiveDate, f64)>, VaultsimError> {
        self.check(name)?;
        self.signals
            .get(name)
            .cloned()
            .ok_or_else(|| VaultsimError::Data {
                reason: format!("no signals {name}"),
            })
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, VaultsimError> {
        self.check(symbol)?;
        match self.bars.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

/// Collects everything emitted, in order.
#[derive(Default)]
pub struct MemoryMetrics {
    pub records: Vec<MetricsRecord>,
    pub ledgers: Vec<(u64, usize)>,
}

impl MetricsPort for MemoryMetrics {
    fn emit(&mut self, record: &MetricsRecord) -> Result<(), VaultsimError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn write_ledger(
        &mut self,
        record: &MetricsRecord,
        ledger: &[LedgerEntry],
    ) -> Result<(), VaultsimError> {
        self.ledgers.push((record.trial_seed, ledger.len()));
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date_str: &str, close: f64) -> PriceBar {
    PriceBar {
        date: NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000.0,
    }
}

/// Daily bars following a deterministic wave, so closes rise and fall.
pub fn generate_bars(start_date: &str, count: usize, start_price: f64) -> Vec<PriceBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| {
            let t = i as f64;
            let close = start_price * (1.0 + 0.05 * (t * 0.3).sin() + 0.001 * t);
            PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open: close * 0.995,
                high: close * 1.01,
                low: close * 0.985,
                close,
                volume: 10_000.0 + 500.0 * (t * 0.7).cos(),
            }
        })
        .collect()
}

/// Bars whose closes are exactly `closes`, one per day.
pub fn bars_from_closes(start_date: &str, closes: &[f64]) -> Vec<PriceBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            date: start + chrono::Duration::days(i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1000.0,
        })
        .collect()
}
