//! Replays an ordered (signal, realized return) stream through one allocation
//! strategy and records a step-by-step ledger.

use chrono::NaiveDate;
use serde::Serialize;

use super::capital::{
    AllocationStrategy, CapitalParams, CapitalState, EntryRule, StepAction, ThresholdMode,
};
use super::window::Window;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub strategy: AllocationStrategy,
    pub initial_capital: f64,
    pub entry_threshold: f64,
    pub threshold_mode: ThresholdMode,
    pub step_up_fraction: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            strategy: AllocationStrategy::Vault,
            initial_capital: 10_000_000.0,
            entry_threshold: 0.5,
            threshold_mode: ThresholdMode::Strict,
            step_up_fraction: 0.5,
        }
    }
}

impl SimulationConfig {
    pub fn entry_rule(&self) -> EntryRule {
        EntryRule {
            threshold: self.entry_threshold,
            mode: self.threshold_mode,
        }
    }
}

/// One decision point: the signal emitted for a window and the return realized
/// over the bar that follows it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalStep {
    pub date: NaiveDate,
    pub signal: f64,
    pub realized_return: f64,
}

/// Pair each window with its signal.
///
/// # Panics
///
/// If `signals` and `windows` differ in length.
pub fn signal_steps(windows: &[Window<'_>], signals: &[f64]) -> Vec<SignalStep> {
    assert_eq!(
        windows.len(),
        signals.len(),
        "one signal is required per window"
    );
    windows
        .iter()
        .zip(signals)
        .map(|(w, &signal)| SignalStep {
            date: w.end_date(),
            signal,
            realized_return: w.target_return,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub step: usize,
    pub date: NaiveDate,
    pub signal: f64,
    pub realized_return: f64,
    pub action: StepAction,
    pub stepped_up: bool,
    pub liquidated: bool,
    pub trading_balance: f64,
    pub vault: f64,
    pub active_principal: f64,
    /// Capital after the step, as the strategy reports it.
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub config: SimulationConfig,
    pub state: CapitalState,
    pub ledger: Vec<LedgerEntry>,
    pub final_total: f64,
    /// Percent.
    pub roi: f64,
}

impl SimulationResult {
    pub fn trade_count(&self) -> usize {
        self.state.trade_count
    }

    pub fn step_up_count(&self) -> usize {
        self.state.step_up_count
    }

    pub fn liquidated(&self) -> bool {
        self.state.liquidated
    }
}

/// Run one simulation. Deterministic: identical inputs give bit-identical output.
pub fn simulate(steps: &[SignalStep], config: &SimulationConfig) -> SimulationResult {
    let params = CapitalParams::new(config.initial_capital, config.step_up_fraction);
    let rule = config.entry_rule();
    let strategy = config.strategy;
    let mut state = CapitalState::new(config.initial_capital);
    let mut ledger = Vec::with_capacity(steps.len());

    for (i, step) in steps.iter().enumerate() {
        let passes = rule.passes(step.signal);
        let outcome = strategy.step(&mut state, &params, passes, step.realized_return);

        ledger.push(LedgerEntry {
            step: i,
            date: step.date,
            signal: step.signal,
            realized_return: step.realized_return,
            action: outcome.action,
            stepped_up: outcome.stepped_up,
            liquidated: outcome.liquidated,
            trading_balance: state.trading_balance,
            vault: state.vault,
            active_principal: state.active_principal,
            total: strategy.final_total(&state),
        });
    }

    let final_total = strategy.final_total(&state);
    let roi = (final_total - config.initial_capital) / config.initial_capital * 100.0;

    SimulationResult {
        config: *config,
        state,
        ledger,
        final_total,
        roi,
    }
}
