//! End-to-end pipeline tests with a mock data port.
//!
//! Tests cover:
//! - Feature table and window construction from raw bars
//! - The three-step vault scenario driven through real windows
//! - Threshold boundary behaviour for every strategy
//! - Per-seed replay predictors and metrics emission
//! - Next-bar scoring of the most recent window
//! - Determinism of repeated runs
//! - Fatal input errors

mod common;

use approx::assert_relative_eq;
use common::*;
use vaultsim::adapters::file_config_adapter::FileConfigAdapter;
use vaultsim::cli::{build_trial_specs, latest_signal, run_backtest_pipeline};
use vaultsim::domain::capital::{AllocationStrategy, StepAction};
use vaultsim::domain::error::{FeatureError, VaultsimError};
use vaultsim::domain::features::{build_feature_table, FeatureConfig, FeatureSet};
use vaultsim::domain::predictor::{predict_all, ReplayPredictor};
use vaultsim::domain::scaler::FitScope;
use vaultsim::domain::simulation::{signal_steps, simulate, SimulationConfig};
use vaultsim::domain::window::{latest_window, windows};

fn config(extra: &str) -> FileConfigAdapter {
    FileConfigAdapter::from_string(&format!("[data]\npath = unused\nsymbol = SPY\n{extra}"))
        .unwrap()
}

/// Closes whose three window targets are +10%, -5%, +10% with `window_size = 1`.
fn scenario_bars() -> Vec<PriceBar> {
    bars_from_closes(
        "2024-01-01",
        &[100.0, 100.0, 110.0, 104.5, 114.95, 115.0],
    )
}

mod feature_pipeline {
    use super::*;

    #[test]
    fn ohlcv_table_and_windows() {
        let bars = generate_bars("2023-01-01", 120, 100.0);
        let table = build_feature_table(&bars, &[], &FeatureConfig::default()).unwrap();

        assert_eq!(table.len(), 118);
        assert_eq!(table.width(), 5);
        assert_eq!(table.rows[0].date, bars[1].date);
        assert_eq!(table.rows[117].date, bars[118].date);

        let ws = windows(&table, 20).unwrap();
        assert_eq!(ws.len(), 98);
    }

    #[test]
    fn window_targets_match_next_bar() {
        let bars = generate_bars("2023-01-01", 60, 50.0);
        let table = build_feature_table(
            &bars,
            &[],
            &FeatureConfig {
                window_size: 10,
                ..FeatureConfig::default()
            },
        )
        .unwrap();

        for w in windows(&table, 10).unwrap() {
            let end = bars.iter().position(|b| b.date == w.end_date()).unwrap();
            let expected = bars[end + 1].close / bars[end].close - 1.0;
            assert_eq!(w.target_return, expected);
            assert_eq!(w.target_signal, u8::from(bars[end + 1].close > bars[end].close));
        }
    }

    #[test]
    fn ichimoku_with_auxiliary_series() {
        let bars = generate_bars("2022-01-01", 200, 100.0);
        let vix = AuxiliarySeries::new(
            "VIX",
            bars.iter()
                .enumerate()
                .map(|(i, b)| (b.date, 15.0 + (i % 7) as f64))
                .collect(),
        );
        let config = FeatureConfig {
            feature_set: FeatureSet::Ichimoku,
            ..FeatureConfig::default()
        };
        let table = build_feature_table(&bars, &[vix], &config).unwrap();

        assert_eq!(table.width(), 12);
        assert!(table.column_index("log_ret_vix").is_ok());
        assert!(table.column_index("cloud_thickness").is_ok());
        assert_eq!(table.rows[0].date, bars[config.ichimoku.warmup() + 1].date);
    }

    #[test]
    fn train_scope_fits_leading_rows_only() {
        let bars = generate_bars("2023-01-01", 102, 100.0);
        let train = build_feature_table(&bars, &[], &FeatureConfig::default()).unwrap();
        let full = build_feature_table(
            &bars,
            &[],
            &FeatureConfig {
                fit_scope: FitScope::FullSeries,
                ..FeatureConfig::default()
            },
        )
        .unwrap();

        assert_eq!(train.scaler.fitted_rows, 80);
        assert_eq!(full.scaler.fitted_rows, 100);
        assert_ne!(train.rows[0].features, full.rows[0].features);
        assert_eq!(train.rows[0].target_return, full.rows[0].target_return);
    }
}

mod vault_scenario {
    use super::*;

    fn run(strategy: AllocationStrategy) -> vaultsim::domain::simulation::SimulationResult {
        let bars = scenario_bars();
        let table = build_feature_table(
            &bars,
            &[],
            &FeatureConfig {
                window_size: 1,
                ..FeatureConfig::default()
            },
        )
        .unwrap();
        let ws = windows(&table, 1).unwrap();
        assert_eq!(ws.len(), 3);

        let predictor = ReplayPredictor::new("fixed", ws.iter().map(|w| (w.end_date(), 0.9)));
        let signals = predict_all(&predictor, &ws);
        simulate(
            &signal_steps(&ws, &signals),
            &SimulationConfig {
                strategy,
                ..SimulationConfig::default()
            },
        )
    }

    #[test]
    fn vault_ends_at_fifteen_percent() {
        let result = run(AllocationStrategy::Vault);

        let vaults: Vec<f64> = result.ledger.iter().map(|e| e.vault).collect();
        assert_relative_eq!(vaults[0], 1_000_000.0, max_relative = 1e-9);
        assert_relative_eq!(vaults[1], 500_000.0, max_relative = 1e-9);
        assert_relative_eq!(vaults[2], 1_500_000.0, max_relative = 1e-9);
        for entry in &result.ledger {
            assert_relative_eq!(entry.trading_balance, 10_000_000.0, max_relative = 1e-9);
        }
        assert_eq!(result.trade_count(), 3);
        assert_eq!(result.step_up_count(), 0);
        assert_relative_eq!(result.roi, 15.0, max_relative = 1e-9);
    }

    #[test]
    fn naive_skips_the_entry_step_return() {
        let result = run(AllocationStrategy::Naive);

        assert_eq!(result.ledger[0].action, StepAction::Enter);
        assert_eq!(result.ledger[1].action, StepAction::Hold);
        assert_eq!(result.trade_count(), 1);
        assert_relative_eq!(result.final_total, 10_450_000.0, max_relative = 1e-9);
        assert_relative_eq!(result.roi, 4.5, max_relative = 1e-9);
    }

    #[test]
    fn gated_compounds_without_reserve() {
        let result = run(AllocationStrategy::Gated);
        assert_relative_eq!(result.final_total, 11_495_000.0, max_relative = 1e-9);
        assert_eq!(result.state.vault, 0.0);
    }
}

mod threshold_boundary {
    use super::*;

    #[test]
    fn signals_below_threshold_never_trade() {
        let bars = generate_bars("2023-01-01", 80, 100.0);
        let table = build_feature_table(&bars, &[], &FeatureConfig::default()).unwrap();
        let ws = windows(&table, 20).unwrap();
        let signals = vec![0.49; ws.len()];
        let steps = signal_steps(&ws, &signals);

        for strategy in [
            AllocationStrategy::Naive,
            AllocationStrategy::Gated,
            AllocationStrategy::Vault,
        ] {
            let result = simulate(
                &steps,
                &SimulationConfig {
                    strategy,
                    ..SimulationConfig::default()
                },
            );
            assert_eq!(result.trade_count(), 0, "{strategy}");
            assert_eq!(result.roi, 0.0, "{strategy}");
            assert_eq!(result.state.vault, 0.0, "{strategy}");
            assert_eq!(result.step_up_count(), 0, "{strategy}");
            assert!(result.ledger.iter().all(|e| e.action == StepAction::Idle));
        }
    }

    #[test]
    fn signal_equal_to_threshold_is_strictly_rejected() {
        let bars = scenario_bars();
        let table = build_feature_table(
            &bars,
            &[],
            &FeatureConfig {
                window_size: 1,
                ..FeatureConfig::default()
            },
        )
        .unwrap();
        let ws = windows(&table, 1).unwrap();
        let result = simulate(&signal_steps(&ws, &[0.5, 0.5, 0.5]), &SimulationConfig::default());
        assert_eq!(result.trade_count(), 0);
    }
}

mod backtest_pipeline {
    use super::*;

    fn replay_port(bars: Vec<PriceBar>) -> MockDataPort {
        let always: Vec<_> = bars.iter().map(|b| (b.date, 1.0)).collect();
        let never: Vec<_> = bars.iter().map(|b| (b.date, 0.0)).collect();
        MockDataPort::new()
            .with_bars("SPY", bars)
            .with_signals("sig_1", always)
            .with_signals("sig_2", never)
    }

    const REPLAY: &str = "signals = sig_{seed}\n\
        [predictor]\nkind = replay\n\
        [simulation]\nstrategies = naive, gated, vault\n\
        [trials]\nseeds = 1, 2\n";

    #[test]
    fn one_record_per_trial_in_spec_order() {
        let port = replay_port(generate_bars("2023-01-01", 120, 100.0));
        let cfg = config(REPLAY);
        let specs = build_trial_specs(&cfg, None, None).unwrap();
        assert_eq!(specs.len(), 6);

        let mut sink = MemoryMetrics::default();
        let outcomes = run_backtest_pipeline(&port, &cfg, &specs, &mut sink).unwrap();

        assert_eq!(outcomes.len(), 6);
        assert_eq!(sink.records.len(), 6);
        let order: Vec<(u64, &str)> = sink
            .records
            .iter()
            .map(|r| (r.trial_seed, r.strategy.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, "naive"),
                (1, "gated"),
                (1, "vault"),
                (2, "naive"),
                (2, "gated"),
                (2, "vault"),
            ]
        );
        // 98 windows, the trailing 20% are simulated.
        assert!(sink.ledgers.iter().all(|&(_, len)| len == 20));
    }

    #[test]
    fn seeds_replay_their_own_signals() {
        let port = replay_port(generate_bars("2023-01-01", 120, 100.0));
        let cfg = config(REPLAY);
        let specs = build_trial_specs(&cfg, None, None).unwrap();
        let mut sink = MemoryMetrics::default();
        run_backtest_pipeline(&port, &cfg, &specs, &mut sink).unwrap();

        let by = |seed: u64, strategy: &str| {
            sink.records
                .iter()
                .find(|r| r.trial_seed == seed && r.strategy == strategy)
                .unwrap()
                .clone()
        };

        assert_eq!(by(1, "naive").trade_count, 1);
        assert_eq!(by(1, "gated").trade_count, 20);
        assert_eq!(by(1, "vault").trade_count, 20);
        for strategy in ["naive", "gated", "vault"] {
            let r = by(2, strategy);
            assert_eq!(r.trade_count, 0);
            assert_eq!(r.final_roi, 0.0);
            assert_eq!(r.predictor, "sig_2");
        }
    }

    #[test]
    fn whole_series_when_test_fraction_disabled() {
        let port = MockDataPort::new().with_bars("SPY", generate_bars("2023-01-01", 120, 100.0));
        let cfg = config("[simulation]\ntest_fraction_only = false\n");
        let specs = build_trial_specs(&cfg, None, None).unwrap();
        let mut sink = MemoryMetrics::default();
        run_backtest_pipeline(&port, &cfg, &specs, &mut sink).unwrap();

        assert_eq!(sink.ledgers, vec![(0, 98)]);
        assert_eq!(sink.records[0].predictor, "momentum(log_ret_close,5)");
    }

    #[test]
    fn repeated_runs_are_identical() {
        let cfg = config("[simulation]\nstrategies = naive, vault\nentry_threshold = 0\n");
        let specs = build_trial_specs(&cfg, None, None).unwrap();
        let port = MockDataPort::new().with_bars("SPY", generate_bars("2023-01-01", 150, 100.0));

        let mut first = MemoryMetrics::default();
        let mut second = MemoryMetrics::default();
        let a = run_backtest_pipeline(&port, &cfg, &specs, &mut first).unwrap();
        let b = run_backtest_pipeline(&port, &cfg, &specs, &mut second).unwrap();

        assert_eq!(first.records, second.records);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.result.ledger, y.result.ledger);
        }
    }

    #[test]
    fn strategy_override_runs_one_strategy() {
        let cfg = config("[simulation]\nstrategies = naive, vault\n");
        let specs = build_trial_specs(&cfg, Some(AllocationStrategy::Gated), Some(0.1)).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].config.strategy, AllocationStrategy::Gated);
        assert_eq!(specs[0].config.entry_threshold, 0.1);
    }
}

mod next_bar_signal {
    use super::*;

    #[test]
    fn latest_window_ends_on_final_bar() {
        let bars = generate_bars("2023-01-01", 120, 100.0);
        let table = build_feature_table(&bars, &[], &FeatureConfig::default()).unwrap();
        let latest = latest_window(&table, 20).unwrap();
        let window = latest.as_window();

        assert_eq!(window.len(), 20);
        assert_eq!(window.end_date(), bars[119].date);
        assert_eq!(window.rows[18].date, table.rows.last().unwrap().date);
        assert_eq!(&window.rows[..19], &table.rows[table.len() - 19..]);
    }

    #[test]
    fn replayed_signal_for_final_date_decides_entry() {
        let bars = generate_bars("2023-01-01", 120, 100.0);
        let last = bars[119].date;
        let port = MockDataPort::new()
            .with_signals("model", vec![(bars[118].date, 0.1), (last, 0.8)])
            .with_bars("SPY", bars);
        let cfg = config("signals = model\n[predictor]\nkind = replay\n");

        let latest = latest_signal(&port, &cfg).unwrap();
        assert_eq!(latest.date, last);
        assert_eq!(latest.signal, 0.8);
        assert!(latest.enter);
        assert_eq!(latest.predictor, "model");
    }

    #[test]
    fn missing_final_signal_stays_out() {
        let bars = generate_bars("2023-01-01", 120, 100.0);
        let port = MockDataPort::new()
            .with_signals("model", vec![(bars[118].date, 0.9)])
            .with_bars("SPY", bars);
        let cfg = config("signals = model\n[predictor]\nkind = replay\n");

        let latest = latest_signal(&port, &cfg).unwrap();
        assert!(latest.signal.is_nan());
        assert!(!latest.enter);
    }

    #[test]
    fn momentum_signal_uses_final_bar_features() {
        let bars = generate_bars("2023-01-01", 120, 100.0);
        let port = MockDataPort::new().with_bars("SPY", bars.clone());
        let cfg = config("[predictor]\nlookback = 1\n");

        let table = build_feature_table(&bars, &[], &FeatureConfig::default()).unwrap();
        let col = table.column_index("log_ret_close").unwrap();
        let expected = table.latest.as_ref().unwrap().features[col];

        let latest = latest_signal(&port, &cfg).unwrap();
        assert_eq!(latest.date, bars[119].date);
        assert_eq!(latest.signal, expected);
        assert_eq!(latest.enter, expected > 0.0);
    }
}

mod input_errors {
    use super::*;

    #[test]
    fn missing_symbol_is_no_data() {
        let cfg = config("");
        let specs = build_trial_specs(&cfg, None, None).unwrap();
        let err = run_backtest_pipeline(
            &MockDataPort::new(),
            &cfg,
            &specs,
            &mut MemoryMetrics::default(),
        )
        .unwrap_err();
        assert!(matches!(err, VaultsimError::NoData { symbol } if symbol == "SPY"));
    }

    #[test]
    fn too_few_bars_is_fatal() {
        let cfg = config("");
        let specs = build_trial_specs(&cfg, None, None).unwrap();
        let port = MockDataPort::new().with_bars("SPY", generate_bars("2023-01-01", 15, 100.0));
        let err =
            run_backtest_pipeline(&port, &cfg, &specs, &mut MemoryMetrics::default()).unwrap_err();
        assert!(matches!(
            err,
            VaultsimError::Feature(FeatureError::TooShort { rows: 13, minimum: 21 })
        ));
    }

    #[test]
    fn unordered_bars_are_fatal() {
        let mut bars = generate_bars("2023-01-01", 40, 100.0);
        bars.swap(10, 11);
        let err = build_feature_table(&bars, &[], &FeatureConfig::default()).unwrap_err();
        assert!(matches!(err, FeatureError::Unordered { .. }));
    }

    #[test]
    fn auxiliary_fetch_error_propagates() {
        let cfg = config("auxiliary = VIX\n");
        let specs = build_trial_specs(&cfg, None, None).unwrap();
        let port = MockDataPort::new()
            .with_bars("SPY", generate_bars("2023-01-01", 60, 100.0))
            .with_error("VIX", "feed offline");
        let err =
            run_backtest_pipeline(&port, &cfg, &specs, &mut MemoryMetrics::default()).unwrap_err();
        assert!(matches!(err, VaultsimError::Data { reason } if reason == "feed offline"));
    }
}
