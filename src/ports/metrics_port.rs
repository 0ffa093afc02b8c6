//! Metrics sink port trait.

use crate::domain::error::VaultsimError;
use crate::domain::metrics::MetricsRecord;
use crate::domain::simulation::LedgerEntry;

/// Receives one record per completed run. Writes are not assumed idempotent.
pub trait MetricsPort {
    fn emit(&mut self, record: &MetricsRecord) -> Result<(), VaultsimError>;

    /// Persist a run's ledger. Sinks without ledger storage ignore it.
    fn write_ledger(
        &mut self,
        _record: &MetricsRecord,
        _ledger: &[LedgerEntry],
    ) -> Result<(), VaultsimError> {
        Ok(())
    }
}
