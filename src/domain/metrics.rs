//! Run metrics: the fixed record handed to the metrics sink, plus
//! performance statistics over the ledger's equity curve.

use serde::Serialize;

use super::capital::EntryRule;
use super::simulation::{LedgerEntry, SimulationResult};
use super::window::Window;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// The per-run record emitted to experiment tracking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRecord {
    pub trial_seed: u64,
    pub strategy: String,
    pub predictor: String,
    pub final_roi: f64,
    pub trade_count: usize,
    pub step_up_count: usize,
    pub final_vault_balance: f64,
    pub liquidated: bool,
}

impl MetricsRecord {
    pub fn from_result(trial_seed: u64, predictor: &str, result: &SimulationResult) -> Self {
        MetricsRecord {
            trial_seed,
            strategy: result.config.strategy.to_string(),
            predictor: predictor.to_string(),
            final_roi: result.roi,
            trade_count: result.trade_count(),
            step_up_count: result.step_up_count(),
            final_vault_balance: result.state.vault,
            liquidated: result.liquidated(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub exposed_steps: usize,
    pub hit_rate: f64,
}

impl PerformanceSummary {
    pub fn compute(result: &SimulationResult, risk_free_rate: f64) -> Self {
        let initial_capital = result.config.initial_capital;
        let equity = equity_curve(initial_capital, &result.ledger);

        let total_return = if initial_capital > 0.0 {
            (result.final_total - initial_capital) / initial_capital
        } else {
            0.0
        };

        let years = result.ledger.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else if total_return <= -1.0 {
            -1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&equity);
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(&equity, daily_rf);

        let exposed: Vec<&LedgerEntry> = result
            .ledger
            .iter()
            .filter(|e| e.action.realized())
            .collect();
        let wins = exposed.iter().filter(|e| e.realized_return > 0.0).count();
        let hit_rate = if exposed.is_empty() {
            0.0
        } else {
            wins as f64 / exposed.len() as f64
        };

        PerformanceSummary {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            exposed_steps: exposed.len(),
            hit_rate,
        }
    }
}

/// Fraction of windows where the entry decision agreed with the up/down label.
pub fn signal_accuracy(windows: &[Window<'_>], signals: &[f64], rule: &EntryRule) -> f64 {
    if windows.is_empty() {
        return 0.0;
    }
    let hits = windows
        .iter()
        .zip(signals)
        .filter(|(w, s)| rule.passes(**s) == (w.target_signal == 1))
        .count();
    hits as f64 / windows.len() as f64
}

/// Initial capital followed by the post-step total of every ledger entry.
fn equity_curve(initial_capital: f64, ledger: &[LedgerEntry]) -> Vec<f64> {
    std::iter::once(initial_capital)
        .chain(ledger.iter().map(|e| e.total))
        .collect()
}

fn compute_drawdown(equity: &[f64]) -> (f64, i64) {
    if equity.is_empty() {
        return (0.0, 0);
    }

    let mut peak = equity[0];
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for &value in equity {
        if value > peak {
            peak = value;
            current_dd_duration = 0;
        } else if peak > 0.0 && value < peak {
            let dd = (peak - value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(equity: &[f64], daily_rf: f64) -> (f64, f64) {
    if equity.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside.sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
