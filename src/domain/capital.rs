//! Capital state machine for the allocation strategies.
//!
//! Every strategy consumes the same `(passes_entry, realized_return)` pair per
//! step and mutates one `CapitalState`. Balance arithmetic never goes below
//! zero: a non-positive or non-finite result is clamped to 0 and the run is
//! liquidated, after which every step is a no-op.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdMode {
    /// Enter when `signal > threshold`.
    #[default]
    Strict,
    /// Enter when `signal >= threshold`.
    Inclusive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryRule {
    pub threshold: f64,
    pub mode: ThresholdMode,
}

impl EntryRule {
    /// Non-finite signals never pass.
    pub fn passes(&self, signal: f64) -> bool {
        if !signal.is_finite() {
            return false;
        }
        match self.mode {
            ThresholdMode::Strict => signal > self.threshold,
            ThresholdMode::Inclusive => signal >= self.threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationStrategy {
    /// Flat/Holding machine; a held position settles the step's return before
    /// the new signal is read.
    Naive,
    /// Compound the step's return whenever the signal passes, no reserve.
    Gated,
    /// Compound on a fixed principal, sweep profit into a vault, refill losses
    /// from it and step the principal up once the vault is large enough.
    #[default]
    Vault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Idle,
    Enter,
    Hold,
    Exit,
    Trade,
    Halted,
}

impl StepAction {
    /// Whether the step's realized return hit the balance.
    pub fn realized(&self) -> bool {
        matches!(self, StepAction::Hold | StepAction::Exit | StepAction::Trade)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub action: StepAction,
    pub stepped_up: bool,
    pub liquidated: bool,
}

impl StepOutcome {
    fn of(action: StepAction) -> Self {
        StepOutcome {
            action,
            stepped_up: false,
            liquidated: false,
        }
    }
}

/// Fixed amounts derived once per run from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapitalParams {
    pub initial_capital: f64,
    /// Vault level that triggers a step-up, and the size of each step-up.
    pub step_up_amount: f64,
}

impl CapitalParams {
    pub fn new(initial_capital: f64, step_up_fraction: f64) -> Self {
        CapitalParams {
            initial_capital,
            step_up_amount: initial_capital * step_up_fraction,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapitalState {
    pub trading_balance: f64,
    pub vault: f64,
    /// Principal the trading balance is rebased to after settlement.
    pub active_principal: f64,
    pub is_holding: bool,
    pub trade_count: usize,
    pub step_up_count: usize,
    pub liquidated: bool,
}

impl CapitalState {
    pub fn new(initial_capital: f64) -> Self {
        CapitalState {
            trading_balance: initial_capital,
            vault: 0.0,
            active_principal: initial_capital,
            is_holding: false,
            trade_count: 0,
            step_up_count: 0,
            liquidated: false,
        }
    }

    /// trading_balance + vault
    pub fn total(&self) -> f64 {
        self.trading_balance + self.vault
    }

    /// Apply a realized return to the trading balance, clamping at zero.
    fn compound(&mut self, realized_return: f64) {
        self.trading_balance = clamp_balance(self.trading_balance * (1.0 + realized_return));
    }

    /// Sweep surplus into the vault or refill a shortfall from it.
    fn settle(&mut self) {
        if self.trading_balance > self.active_principal {
            self.vault += self.trading_balance - self.active_principal;
            self.trading_balance = self.active_principal;
        } else if self.trading_balance < self.active_principal {
            let shortfall = self.active_principal - self.trading_balance;
            if self.vault >= shortfall {
                self.vault -= shortfall;
                self.trading_balance = self.active_principal;
            } else {
                self.trading_balance += self.vault;
                self.vault = 0.0;
            }
        }
    }

    /// Reclassify one step-up amount from the vault into the principal.
    fn try_step_up(&mut self, amount: f64) -> bool {
        if amount > 0.0 && self.vault >= amount {
            self.active_principal += amount;
            self.vault -= amount;
            self.trading_balance = self.active_principal;
            self.step_up_count += 1;
            true
        } else {
            false
        }
    }

    fn liquidate(&mut self) {
        self.trading_balance = 0.0;
        self.is_holding = false;
        self.liquidated = true;
    }
}

fn clamp_balance(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

impl AllocationStrategy {
    /// Advance `state` by one step.
    pub fn step(
        &self,
        state: &mut CapitalState,
        params: &CapitalParams,
        passes_entry: bool,
        realized_return: f64,
    ) -> StepOutcome {
        if state.liquidated {
            return StepOutcome::of(StepAction::Halted);
        }
        match self {
            AllocationStrategy::Naive => step_naive(state, passes_entry, realized_return),
            AllocationStrategy::Gated => step_gated(state, passes_entry, realized_return),
            AllocationStrategy::Vault => step_vault(state, params, passes_entry, realized_return),
        }
    }

    /// Total capital as reported at the end of a run.
    pub fn final_total(&self, state: &CapitalState) -> f64 {
        match self {
            AllocationStrategy::Vault => state.total(),
            AllocationStrategy::Naive | AllocationStrategy::Gated => state.trading_balance,
        }
    }
}

fn step_naive(state: &mut CapitalState, passes_entry: bool, realized_return: f64) -> StepOutcome {
    if state.is_holding {
        state.compound(realized_return);
        if state.trading_balance <= 0.0 {
            state.liquidate();
            return StepOutcome {
                liquidated: true,
                ..StepOutcome::of(StepAction::Hold)
            };
        }
    }

    let action = match (state.is_holding, passes_entry) {
        (false, true) => {
            state.is_holding = true;
            state.trade_count += 1;
            StepAction::Enter
        }
        (true, true) => StepAction::Hold,
        (true, false) => {
            state.is_holding = false;
            StepAction::Exit
        }
        (false, false) => StepAction::Idle,
    };
    StepOutcome::of(action)
}

fn step_gated(state: &mut CapitalState, passes_entry: bool, realized_return: f64) -> StepOutcome {
    if !passes_entry {
        return StepOutcome::of(StepAction::Idle);
    }
    state.compound(realized_return);
    state.trade_count += 1;
    let liquidated = state.trading_balance <= 0.0;
    if liquidated {
        state.liquidate();
    }
    StepOutcome {
        liquidated,
        ..StepOutcome::of(StepAction::Trade)
    }
}

fn step_vault(
    state: &mut CapitalState,
    params: &CapitalParams,
    passes_entry: bool,
    realized_return: f64,
) -> StepOutcome {
    let action = if passes_entry {
        state.compound(realized_return);
        state.trade_count += 1;
        StepAction::Trade
    } else {
        StepAction::Idle
    };

    // Settlement must precede the step-up check: the step-up reads the
    // post-settlement vault.
    state.settle();
    let stepped_up = state.try_step_up(params.step_up_amount);

    let liquidated = state.trading_balance <= 0.0;
    if liquidated {
        state.liquidate();
    }

    StepOutcome {
        action,
        stepped_up,
        liquidated,
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationStrategy::Naive => write!(f, "naive"),
            AllocationStrategy::Gated => write!(f, "gated"),
            AllocationStrategy::Vault => write!(f, "vault"),
        }
    }
}

impl FromStr for AllocationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "naive" => Ok(AllocationStrategy::Naive),
            "gated" => Ok(AllocationStrategy::Gated),
            "vault" => Ok(AllocationStrategy::Vault),
            other => Err(format!(
                "unknown strategy '{other}' (expected naive, gated or vault)"
            )),
        }
    }
}

impl FromStr for ThresholdMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" | ">" => Ok(ThresholdMode::Strict),
            "inclusive" | ">=" => Ok(ThresholdMode::Inclusive),
            other => Err(format!(
                "unknown threshold mode '{other}' (expected strict or inclusive)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const C0: f64 = 10_000_000.0;

    fn params() -> CapitalParams {
        CapitalParams::new(C0, 0.5)
    }

    #[test]
    fn entry_rule_modes() {
        let strict = EntryRule {
            threshold: 0.5,
            mode: ThresholdMode::Strict,
        };
        let inclusive = EntryRule {
            mode: ThresholdMode::Inclusive,
            ..strict
        };
        assert!(!strict.passes(0.5));
        assert!(inclusive.passes(0.5));
        assert!(strict.passes(0.51));
        assert!(!strict.passes(f64::NAN));
        assert!(!inclusive.passes(f64::INFINITY));
    }

    #[test]
    fn vault_sweeps_surplus() {
        let mut s = CapitalState::new(C0);
        let out = AllocationStrategy::Vault.step(&mut s, &params(), true, 0.10);
        assert_eq!(out.action, StepAction::Trade);
        assert_relative_eq!(s.trading_balance, C0);
        assert_relative_eq!(s.vault, 1_000_000.0, max_relative = 1e-12);
        assert_eq!(s.trade_count, 1);
    }

    #[test]
    fn vault_refills_from_reserve() {
        let mut s = CapitalState::new(C0);
        s.vault = 1_000_000.0;
        AllocationStrategy::Vault.step(&mut s, &params(), true, -0.05);
        assert_relative_eq!(s.trading_balance, C0);
        assert_relative_eq!(s.vault, 500_000.0, max_relative = 1e-12);
    }

    #[test]
    fn vault_partial_refill_empties_reserve() {
        let mut s = CapitalState::new(C0);
        s.vault = 200_000.0;
        AllocationStrategy::Vault.step(&mut s, &params(), true, -0.05);
        assert_eq!(s.vault, 0.0);
        assert_relative_eq!(s.trading_balance, 9_700_000.0, max_relative = 1e-12);
        assert!(!s.liquidated);
    }

    #[test]
    fn vault_idle_step_still_settles() {
        let mut s = CapitalState::new(C0);
        s.trading_balance = 9_000_000.0;
        s.vault = 2_000_000.0;
        let out = AllocationStrategy::Vault.step(&mut s, &params(), false, 0.5);
        assert_eq!(out.action, StepAction::Idle);
        assert_eq!(s.trading_balance, C0);
        assert_eq!(s.vault, 1_000_000.0);
        assert_eq!(s.trade_count, 0);
    }

    #[test]
    fn step_up_after_settlement() {
        let mut s = CapitalState::new(C0);
        s.vault = 4_500_000.0;
        // +10% pushes ~1M into the vault; the same tick then steps up.
        let out = AllocationStrategy::Vault.step(&mut s, &params(), true, 0.10);
        assert!(out.stepped_up);
        assert_eq!(s.step_up_count, 1);
        assert_relative_eq!(s.active_principal, 15_000_000.0);
        assert_relative_eq!(s.trading_balance, 15_000_000.0);
        assert_relative_eq!(s.vault, 500_000.0, max_relative = 1e-9);
    }

    #[test]
    fn step_up_conserves_total() {
        let mut s = CapitalState::new(C0);
        s.vault = 7_250_000.0;
        let before = s.total();
        assert!(s.try_step_up(params().step_up_amount));
        assert_relative_eq!(s.total(), before);
        assert_relative_eq!(s.vault, 2_250_000.0);
    }

    #[test]
    fn only_one_step_up_per_tick() {
        let mut s = CapitalState::new(C0);
        s.vault = 12_000_000.0;
        AllocationStrategy::Vault.step(&mut s, &params(), false, 0.0);
        assert_eq!(s.step_up_count, 1);
        assert_relative_eq!(s.vault, 7_000_000.0);
    }

    #[test]
    fn vault_liquidates_only_when_reserve_exhausted() {
        let mut s = CapitalState::new(C0);
        s.vault = 3_000_000.0;
        let out = AllocationStrategy::Vault.step(&mut s, &params(), true, -1.5);
        assert!(!out.liquidated);
        assert_eq!(s.trading_balance, 3_000_000.0);
        assert_eq!(s.vault, 0.0);

        let out = AllocationStrategy::Vault.step(&mut s, &params(), true, -1.0);
        assert!(out.liquidated);
        assert!(s.liquidated);
        assert_eq!(s.total(), 0.0);

        let out = AllocationStrategy::Vault.step(&mut s, &params(), true, 0.5);
        assert_eq!(out.action, StepAction::Halted);
        assert_eq!(s.trade_count, 2);
    }

    #[test]
    fn naive_settles_then_decides() {
        let mut s = CapitalState::new(100.0);
        let p = CapitalParams::new(100.0, 0.5);

        // Flat: the step's return is not applied even though we enter.
        let out = AllocationStrategy::Naive.step(&mut s, &p, true, 0.10);
        assert_eq!(out.action, StepAction::Enter);
        assert_eq!(s.trading_balance, 100.0);

        // Holding: return applied first, then the falling signal exits.
        let out = AllocationStrategy::Naive.step(&mut s, &p, false, 0.10);
        assert_eq!(out.action, StepAction::Exit);
        assert_relative_eq!(s.trading_balance, 110.0);

        let out = AllocationStrategy::Naive.step(&mut s, &p, false, 0.10);
        assert_eq!(out.action, StepAction::Idle);
        assert_relative_eq!(s.trading_balance, 110.0);
        assert_eq!(s.trade_count, 1);
    }

    #[test]
    fn naive_counts_entries_not_holds() {
        let mut s = CapitalState::new(100.0);
        let p = CapitalParams::new(100.0, 0.5);
        for passes in [true, true, true, false, true, true] {
            AllocationStrategy::Naive.step(&mut s, &p, passes, 0.0);
        }
        assert_eq!(s.trade_count, 2);
        assert!(s.is_holding);
    }

    #[test]
    fn naive_liquidates_on_total_loss() {
        let mut s = CapitalState::new(100.0);
        let p = CapitalParams::new(100.0, 0.5);
        AllocationStrategy::Naive.step(&mut s, &p, true, 0.0);
        let out = AllocationStrategy::Naive.step(&mut s, &p, true, -1.2);
        assert!(out.liquidated);
        assert_eq!(s.trading_balance, 0.0);
        assert!(!s.is_holding);

        let out = AllocationStrategy::Naive.step(&mut s, &p, true, 0.3);
        assert_eq!(out.action, StepAction::Halted);
        assert_eq!(s.trade_count, 1);
    }

    #[test]
    fn gated_compounds_on_every_passing_step() {
        let mut s = CapitalState::new(100.0);
        let p = CapitalParams::new(100.0, 0.5);
        AllocationStrategy::Gated.step(&mut s, &p, true, 0.10);
        AllocationStrategy::Gated.step(&mut s, &p, false, 0.50);
        AllocationStrategy::Gated.step(&mut s, &p, true, -0.10);
        assert_relative_eq!(s.trading_balance, 100.0 * 1.1 * 0.9);
        assert_eq!(s.trade_count, 2);
    }

    #[test]
    fn final_total_per_strategy() {
        let mut s = CapitalState::new(100.0);
        s.vault = 20.0;
        assert_eq!(AllocationStrategy::Vault.final_total(&s), 120.0);
        assert_eq!(AllocationStrategy::Naive.final_total(&s), 100.0);
    }

    #[test]
    fn strategy_parses() {
        assert_eq!("Vault".parse::<AllocationStrategy>(), Ok(AllocationStrategy::Vault));
        assert_eq!(" naive ".parse::<AllocationStrategy>(), Ok(AllocationStrategy::Naive));
        assert!("kelly".parse::<AllocationStrategy>().is_err());
        assert_eq!(">=".parse::<ThresholdMode>(), Ok(ThresholdMode::Inclusive));
    }
}
