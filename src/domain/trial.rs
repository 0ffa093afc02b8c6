//! Independent simulation trials run in parallel.
//!
//! A trial is one `(trial_seed, SimulationConfig)` pair replayed over a shared
//! signal stream. Trials share no mutable state, so they fan out over rayon and
//! come back in the order they were specified.

use rayon::prelude::*;
use tracing::debug;

use super::metrics::MetricsRecord;
use super::predictor::{predict_all, Predictor};
use super::simulation::{signal_steps, simulate, SimulationConfig, SimulationResult};
use super::window::Window;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialSpec {
    pub trial_seed: u64,
    pub config: SimulationConfig,
}

#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub record: MetricsRecord,
    pub result: SimulationResult,
}

/// Score every window once, then replay the signals under each trial.
pub fn run_trials(
    windows: &[Window<'_>],
    specs: &[TrialSpec],
    predictor: &dyn Predictor,
) -> Vec<TrialOutcome> {
    let signals = predict_all(predictor, windows);
    let steps = signal_steps(windows, &signals);
    let name = predictor.name();

    specs
        .par_iter()
        .map(|spec| {
            let result = simulate(&steps, &spec.config);
            debug!(
                trial_seed = spec.trial_seed,
                strategy = %spec.config.strategy,
                roi = result.roi,
                "trial finished"
            );
            TrialOutcome {
                record: MetricsRecord::from_result(spec.trial_seed, name, &result),
                result,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialAggregate {
    pub trials: usize,
    pub mean_roi: f64,
    pub min_roi: f64,
    pub max_roi: f64,
    pub best_seed: u64,
    pub worst_seed: u64,
    pub mean_trades: f64,
    pub liquidations: usize,
}

impl TrialAggregate {
    /// `None` when there are no records.
    pub fn from_records(records: &[MetricsRecord]) -> Option<Self> {
        let first = records.first()?;
        let n = records.len() as f64;

        let mut best = first;
        let mut worst = first;
        for r in &records[1..] {
            if r.final_roi > best.final_roi {
                best = r;
            }
            if r.final_roi < worst.final_roi {
                worst = r;
            }
        }

        Some(TrialAggregate {
            trials: records.len(),
            mean_roi: records.iter().map(|r| r.final_roi).sum::<f64>() / n,
            min_roi: worst.final_roi,
            max_roi: best.final_roi,
            best_seed: best.trial_seed,
            worst_seed: worst.trial_seed,
            mean_trades: records.iter().map(|r| r.trade_count as f64).sum::<f64>() / n,
            liquidations: records.iter().filter(|r| r.liquidated).count(),
        })
    }
}
