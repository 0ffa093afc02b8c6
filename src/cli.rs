//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};

use crate::adapters::csv_adapter::{write_feature_table, CsvAdapter};
use crate::adapters::csv_metrics_adapter::CsvMetricsAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::capital::{AllocationStrategy, ThresholdMode};
use crate::domain::config_validation::{
    check_entry_threshold, parse_choice, parse_list, parse_seeds, parse_strategies,
    validate_run_config,
};
use crate::domain::error::VaultsimError;
use crate::domain::features::{build_feature_table, FeatureConfig, FeatureSet, FeatureTable};
use crate::domain::indicator::ichimoku::IchimokuParams;
use crate::domain::metrics::{signal_accuracy, PerformanceSummary};
use crate::domain::predictor::{MomentumPredictor, Predictor, PredictorKind, ReplayPredictor};
use crate::domain::price_bar::{AuxiliarySeries, PriceBar};
use crate::domain::scaler::{FitScope, ScalerKind};
use crate::domain::simulation::SimulationConfig;
use crate::domain::trial::{run_trials, TrialAggregate, TrialOutcome, TrialSpec};
use crate::domain::window::{latest_window, split_at_fraction, windows};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::metrics_port::MetricsPort;

#[derive(Parser, Debug)]
#[command(name = "vaultsim", about = "Windowed feature pipeline and vault capital simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build features, score windows and simulate every configured trial
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Run a single allocation strategy instead of the configured list
        #[arg(short, long)]
        strategy: Option<AllocationStrategy>,
        /// Override [simulation] entry_threshold
        #[arg(long)]
        threshold: Option<f64>,
        /// Metrics CSV path (overrides [output] metrics_path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the scaled feature table to CSV
    Features {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Score the most recent window and print the next-bar decision
    Signal {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a run configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for the configured symbol and auxiliary series
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            strategy,
            threshold,
            output,
        } => run_backtest(&config, strategy, threshold, output.as_ref()),
        Command::Features { config, output } => run_features(&config, &output),
        Command::Signal { config } => run_signal(&config),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config } => run_info(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: VaultsimError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(&err)
}

pub fn build_feature_config(adapter: &dyn ConfigPort) -> Result<FeatureConfig, VaultsimError> {
    let defaults = IchimokuParams::default();
    let period = |key: &str, default: usize| -> usize {
        adapter.get_int("features", key, default as i64).max(1) as usize
    };

    let train_fraction = adapter.get_double("features", "train_fraction", 0.8);
    let fit_scope = match adapter
        .get_string("features", "scaler_scope")
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        None | Some("train") => FitScope::TrainOnly {
            fraction: train_fraction,
        },
        Some("full") => FitScope::FullSeries,
        Some(other) => {
            return Err(VaultsimError::ConfigInvalid {
                section: "features".into(),
                key: "scaler_scope".into(),
                reason: format!("unknown scope '{other}' (expected train or full)"),
            });
        }
    };

    let window_size = adapter.get_int("features", "window_size", 20);
    if window_size < 1 {
        return Err(VaultsimError::ConfigInvalid {
            section: "features".into(),
            key: "window_size".into(),
            reason: "window_size must be at least 1".into(),
        });
    }

    Ok(FeatureConfig {
        feature_set: parse_choice(adapter, "features", "feature_set", FeatureSet::default())?,
        ichimoku: IchimokuParams {
            tenkan: period("tenkan", defaults.tenkan),
            kijun: period("kijun", defaults.kijun),
            senkou_b: period("senkou_b", defaults.senkou_b),
            displacement: period("displacement", defaults.displacement),
        },
        scaler: parse_choice(adapter, "features", "scaler", ScalerKind::default())?,
        fit_scope,
        window_size: window_size as usize,
    })
}

/// Simulation settings shared by every trial; the strategy is the first configured one.
/// An unset entry threshold follows the predictor's signal scale.
pub fn build_simulation_config(adapter: &dyn ConfigPort) -> Result<SimulationConfig, VaultsimError> {
    let defaults = SimulationConfig::default();
    let kind = parse_choice(adapter, "predictor", "kind", PredictorKind::default())?;
    Ok(SimulationConfig {
        strategy: parse_strategies(adapter)?[0],
        initial_capital: adapter.get_double(
            "simulation",
            "initial_capital",
            defaults.initial_capital,
        ),
        entry_threshold: adapter.get_double(
            "simulation",
            "entry_threshold",
            kind.default_entry_threshold(),
        ),
        threshold_mode: parse_choice(
            adapter,
            "simulation",
            "threshold_mode",
            ThresholdMode::default(),
        )?,
        step_up_fraction: adapter.get_double(
            "simulation",
            "step_up_fraction",
            defaults.step_up_fraction,
        ),
    })
}

/// Every (seed, strategy) pair, seed-major.
pub fn build_trial_specs(
    adapter: &dyn ConfigPort,
    strategy_override: Option<AllocationStrategy>,
    threshold_override: Option<f64>,
) -> Result<Vec<TrialSpec>, VaultsimError> {
    let mut base = build_simulation_config(adapter)?;
    if let Some(threshold) = threshold_override {
        base.entry_threshold = check_entry_threshold(threshold)?;
    }
    let strategies = match strategy_override {
        Some(s) => vec![s],
        None => parse_strategies(adapter)?,
    };

    let mut specs = Vec::new();
    for trial_seed in parse_seeds(adapter)? {
        for &strategy in &strategies {
            specs.push(TrialSpec {
                trial_seed,
                config: SimulationConfig { strategy, ..base },
            });
        }
    }
    Ok(specs)
}

fn data_adapter(config: &dyn ConfigPort) -> Result<CsvAdapter, VaultsimError> {
    let path = config
        .get_string("data", "path")
        .ok_or_else(|| VaultsimError::ConfigMissing {
            section: "data".into(),
            key: "path".into(),
        })?;
    Ok(CsvAdapter::new(PathBuf::from(path)))
}

fn symbol(config: &dyn ConfigPort) -> Result<String, VaultsimError> {
    config
        .get_string("data", "symbol")
        .ok_or_else(|| VaultsimError::ConfigMissing {
            section: "data".into(),
            key: "symbol".into(),
        })
}

/// Fetch the price bars and every configured auxiliary series.
pub fn load_inputs(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
) -> Result<(Vec<PriceBar>, Vec<AuxiliarySeries>), VaultsimError> {
    let symbol = symbol(config)?;
    let bars = data_port.fetch_bars(&symbol)?;
    info!(symbol = %symbol, bars = bars.len(), "price bars loaded");

    let auxiliary = config
        .get_string("data", "auxiliary")
        .map(|list| parse_list(&list))
        .unwrap_or_default()
        .iter()
        .map(|name| data_port.fetch_auxiliary(name))
        .collect::<Result<Vec<_>, _>>()?;
    if !auxiliary.is_empty() {
        info!(series = auxiliary.len(), "auxiliary series loaded");
    }
    Ok((bars, auxiliary))
}

/// Build the configured predictor for one trial seed. A `{seed}` placeholder in
/// `[data] signals` selects a per-seed signal file.
pub fn build_predictor(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
    table: &FeatureTable,
    trial_seed: u64,
) -> Result<Box<dyn Predictor>, VaultsimError> {
    match parse_choice(config, "predictor", "kind", PredictorKind::default())? {
        PredictorKind::Momentum => {
            let column = config
                .get_string("predictor", "column")
                .unwrap_or_else(|| "log_ret_close".to_string());
            let lookback = config.get_int("predictor", "lookback", 5).max(1) as usize;
            Ok(Box::new(MomentumPredictor::new(table, &column, lookback)?))
        }
        PredictorKind::Replay => {
            let template = config.get_string("data", "signals").ok_or_else(|| {
                VaultsimError::ConfigMissing {
                    section: "data".into(),
                    key: "signals".into(),
                }
            })?;
            let name = template.replace("{seed}", &trial_seed.to_string());
            let signals = data_port.fetch_signals(&name)?;
            Ok(Box::new(ReplayPredictor::new(name, signals)))
        }
    }
}

/// Features, windows, predictor and every trial, emitting one metrics record per trial.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
    specs: &[TrialSpec],
    sink: &mut dyn MetricsPort,
) -> Result<Vec<TrialOutcome>, VaultsimError> {
    // Stage 1: Load data
    let (bars, auxiliary) = load_inputs(data_port, config)?;

    // Stage 2: Feature table
    let feature_config = build_feature_config(config)?;
    let table = build_feature_table(&bars, &auxiliary, &feature_config)?;
    info!(
        rows = table.len(),
        columns = table.width(),
        dropped = table.dropped_rows,
        fitted_rows = table.scaler.fitted_rows,
        "feature table built"
    );

    // Stage 3: Windows
    let all_windows = windows(&table, feature_config.window_size)?;
    let simulated = if config.get_bool("simulation", "test_fraction_only", true) {
        let fraction = config.get_double("features", "train_fraction", 0.8);
        let (_, test) = split_at_fraction(&all_windows, fraction)?;
        test
    } else {
        &all_windows[..]
    };
    info!(
        total = all_windows.len(),
        simulated = simulated.len(),
        "windows prepared"
    );
    if simulated.is_empty() {
        warn!("no windows left to simulate");
    }

    // Stage 4: Trials, grouped by seed so each seed gets its own predictor
    let mut seeds: Vec<u64> = Vec::new();
    for spec in specs {
        if !seeds.contains(&spec.trial_seed) {
            seeds.push(spec.trial_seed);
        }
    }

    let mut outcomes = Vec::with_capacity(specs.len());
    for seed in seeds {
        let predictor = build_predictor(data_port, config, &table, seed)?;
        let seed_specs: Vec<TrialSpec> = specs
            .iter()
            .filter(|s| s.trial_seed == seed)
            .copied()
            .collect();
        let seed_outcomes = run_trials(simulated, &seed_specs, predictor.as_ref());

        if let Some(first) = seed_outcomes.first() {
            let signals: Vec<f64> = first.result.ledger.iter().map(|e| e.signal).collect();
            let accuracy =
                signal_accuracy(simulated, &signals, &first.result.config.entry_rule());
            info!(
                trial_seed = seed,
                predictor = predictor.name(),
                accuracy,
                "signals scored"
            );
        }

        // Stage 5: Emit metrics
        for outcome in &seed_outcomes {
            sink.emit(&outcome.record)?;
            sink.write_ledger(&outcome.record, &outcome.result.ledger)?;
        }
        outcomes.extend(seed_outcomes);
    }

    Ok(outcomes)
}

/// Next-bar decision for the most recent window.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestSignal {
    pub date: NaiveDate,
    pub predictor: String,
    pub signal: f64,
    pub enter: bool,
}

/// Score the window ending on the final bar with the first trial seed's predictor.
pub fn latest_signal(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
) -> Result<LatestSignal, VaultsimError> {
    let (bars, auxiliary) = load_inputs(data_port, config)?;
    let feature_config = build_feature_config(config)?;
    let table = build_feature_table(&bars, &auxiliary, &feature_config)?;
    let latest = latest_window(&table, feature_config.window_size)?;
    let window = latest.as_window();

    let trial_seed = parse_seeds(config)?[0];
    let predictor = build_predictor(data_port, config, &table, trial_seed)?;
    let signal = predictor.predict(&window);
    let rule = build_simulation_config(config)?.entry_rule();
    debug!(date = %window.end_date(), signal, "latest window scored");

    Ok(LatestSignal {
        date: window.end_date(),
        predictor: predictor.name().to_string(),
        signal,
        enter: rule.passes(signal),
    })
}

fn print_summary(outcomes: &[TrialOutcome], risk_free_rate: f64) {
    let mut strategies: Vec<AllocationStrategy> = Vec::new();
    for o in outcomes {
        if !strategies.contains(&o.result.config.strategy) {
            strategies.push(o.result.config.strategy);
        }
    }

    for strategy in strategies {
        let group: Vec<&TrialOutcome> = outcomes
            .iter()
            .filter(|o| o.result.config.strategy == strategy)
            .collect();
        let records: Vec<_> = group.iter().map(|o| o.record.clone()).collect();
        let Some(agg) = TrialAggregate::from_records(&records) else {
            continue;
        };

        eprintln!("\n=== {} ({} trials) ===", strategy, agg.trials);
        eprintln!("Mean ROI:         {:.2}%", agg.mean_roi);
        eprintln!(
            "Best ROI:         {:.2}% (seed {})",
            agg.max_roi, agg.best_seed
        );
        eprintln!(
            "Worst ROI:        {:.2}% (seed {})",
            agg.min_roi, agg.worst_seed
        );
        eprintln!("Mean Trades:      {:.1}", agg.mean_trades);
        if agg.liquidations > 0 {
            eprintln!("Liquidations:     {}", agg.liquidations);
        }

        if let Some(best) = group.iter().find(|o| o.record.trial_seed == agg.best_seed) {
            let summary = PerformanceSummary::compute(&best.result, risk_free_rate);
            eprintln!("  Best trial:");
            eprintln!("    Annualized:     {:.2}%", summary.annualized_return * 100.0);
            eprintln!("    Sharpe Ratio:   {:.2}", summary.sharpe_ratio);
            eprintln!("    Sortino Ratio:  {:.2}", summary.sortino_ratio);
            eprintln!("    Max Drawdown:   -{:.1}%", summary.max_drawdown * 100.0);
            eprintln!("    Hit Rate:       {:.1}%", summary.hit_rate * 100.0);
            eprintln!("    Step-ups:       {}", best.record.step_up_count);
            eprintln!("    Vault:          {:.2}", best.record.final_vault_balance);
        }
    }
}

fn run_backtest(
    config_path: &Path,
    strategy: Option<AllocationStrategy>,
    threshold: Option<f64>,
    output_path: Option<&PathBuf>,
) -> ExitCode {
    info!(path = %config_path.display(), "loading config");
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_run_config(&config) {
        return fail(e);
    }

    let specs = match build_trial_specs(&config, strategy, threshold) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let data_port = match data_adapter(&config) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };

    let metrics_path = output_path
        .cloned()
        .or_else(|| config.get_string("output", "metrics_path").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("metrics.csv"));
    let ledger_dir = config.get_string("output", "ledger_dir").map(PathBuf::from);
    let mut sink = match CsvMetricsAdapter::create(&metrics_path, ledger_dir) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let outcomes = match run_backtest_pipeline(&data_port, &config, &specs, &mut sink) {
        Ok(o) => o,
        Err(e) => return fail(e),
    };

    print_summary(
        &outcomes,
        config.get_double("simulation", "risk_free_rate", 0.0),
    );
    eprintln!("\nMetrics written to: {}", metrics_path.display());
    ExitCode::SUCCESS
}

fn run_features(config_path: &Path, output_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_run_config(&config) {
        return fail(e);
    }

    let result = data_adapter(&config).and_then(|data_port| {
        let (bars, auxiliary) = load_inputs(&data_port, &config)?;
        let feature_config = build_feature_config(&config)?;
        let table = build_feature_table(&bars, &auxiliary, &feature_config)?;
        write_feature_table(output_path, &table)?;
        Ok(table)
    });

    match result {
        Ok(table) => {
            eprintln!(
                "Feature table: {} rows x {} columns ({} rows dropped)",
                table.len(),
                table.width(),
                table.dropped_rows
            );
            eprintln!("Written to: {}", output_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_signal(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_run_config(&config) {
        return fail(e);
    }

    match data_adapter(&config).and_then(|data_port| latest_signal(&data_port, &config)) {
        Ok(latest) => {
            let decision = if latest.enter { "BUY" } else { "SELL" };
            println!(
                "{}: {} signal {:.4} -> {decision}",
                latest.date, latest.predictor, latest.signal
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_run_config(&config) {
        return fail(e);
    }

    let resolved = build_feature_config(&config)
        .and_then(|f| build_trial_specs(&config, None, None).map(|specs| (f, specs)));
    let (features, specs) = match resolved {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    eprintln!("\nFeatures:");
    eprintln!("  set:         {}", features.feature_set);
    eprintln!("  window:      {}", features.window_size);
    eprintln!("  scaler:      {}", features.scaler);
    match features.fit_scope {
        FitScope::FullSeries => eprintln!("  scaler fit:  full series"),
        FitScope::TrainOnly { fraction } => {
            eprintln!("  scaler fit:  leading {:.0}% of rows", fraction * 100.0)
        }
    }

    if let Some(spec) = specs.first() {
        let sim = spec.config;
        eprintln!("\nSimulation:");
        eprintln!("  capital:     {:.2}", sim.initial_capital);
        let op = match sim.threshold_mode {
            ThresholdMode::Strict => ">",
            ThresholdMode::Inclusive => ">=",
        };
        eprintln!("  entry:       signal {} {}", op, sim.entry_threshold);
        eprintln!("  step-up:     {:.2}", sim.initial_capital * sim.step_up_fraction);
    }
    eprintln!("  trials:      {}", specs.len());

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = match data_adapter(&config) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };
    let symbol = match symbol(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    match data_port.get_data_range(&symbol) {
        Ok(Some((first, last, count))) => println!("{symbol}: {count} bars, {first} to {last}"),
        Ok(None) => eprintln!("{symbol}: no data found"),
        Err(e) => eprintln!("error reading {symbol}: {e}"),
    }

    let auxiliary = config
        .get_string("data", "auxiliary")
        .map(|list| parse_list(&list))
        .unwrap_or_default();
    for name in &auxiliary {
        match data_port.fetch_auxiliary(name) {
            Ok(series) => match (series.observations.first(), series.observations.last()) {
                (Some((first, _)), Some((last, _))) => println!(
                    "{name}: {} observations, {first} to {last}",
                    series.observations.len()
                ),
                _ => eprintln!("{name}: no data found"),
            },
            Err(e) => eprintln!("error reading {name}: {e}"),
        }
    }
    ExitCode::SUCCESS
}
