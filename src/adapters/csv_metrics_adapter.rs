//! CSV metrics sink: one row per run, plus an optional ledger file per run.

use crate::domain::error::VaultsimError;
use crate::domain::metrics::MetricsRecord;
use crate::domain::simulation::LedgerEntry;
use crate::ports::metrics_port::MetricsPort;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct CsvMetricsAdapter {
    writer: csv::Writer<File>,
    ledger_dir: Option<PathBuf>,
}

impl CsvMetricsAdapter {
    /// Truncates `metrics_path`. The ledger directory is created on demand.
    pub fn create(metrics_path: &Path, ledger_dir: Option<PathBuf>) -> Result<Self, VaultsimError> {
        if let Some(parent) = metrics_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let writer = csv::Writer::from_path(metrics_path).map_err(|e| VaultsimError::Metrics {
            reason: format!("failed to create {}: {}", metrics_path.display(), e),
        })?;
        Ok(Self { writer, ledger_dir })
    }

    fn ledger_path(dir: &Path, record: &MetricsRecord) -> PathBuf {
        dir.join(format!(
            "ledger_{}_seed{}.csv",
            record.strategy, record.trial_seed
        ))
    }
}

impl MetricsPort for CsvMetricsAdapter {
    fn emit(&mut self, record: &MetricsRecord) -> Result<(), VaultsimError> {
        self.writer
            .serialize(record)
            .map_err(|e| VaultsimError::Metrics {
                reason: format!("failed to write record: {e}"),
            })?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_ledger(
        &mut self,
        record: &MetricsRecord,
        ledger: &[LedgerEntry],
    ) -> Result<(), VaultsimError> {
        let Some(dir) = &self.ledger_dir else {
            return Ok(());
        };
        fs::create_dir_all(dir)?;
        let path = Self::ledger_path(dir, record);

        let mut writer = csv::Writer::from_path(&path).map_err(|e| VaultsimError::Metrics {
            reason: format!("failed to create {}: {}", path.display(), e),
        })?;
        for entry in ledger {
            writer.serialize(entry).map_err(|e| VaultsimError::Metrics {
                reason: format!("failed to write ledger entry: {e}"),
            })?;
        }
        writer.flush()?;
        debug!(path = %path.display(), steps = ledger.len(), "ledger written");
        Ok(())
    }
}
