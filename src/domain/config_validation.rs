//! Configuration validation.
//!
//! Checks every run setting before any data is loaded.

use std::str::FromStr;

use crate::domain::capital::{AllocationStrategy, ThresholdMode};
use crate::domain::error::VaultsimError;
use crate::domain::features::FeatureSet;
use crate::domain::predictor::PredictorKind;
use crate::domain::scaler::ScalerKind;
use crate::ports::config_port::ConfigPort;

pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    validate_data(config)?;
    validate_features(config)?;
    validate_simulation(config)?;
    validate_predictor(config)?;
    parse_seeds(config)?;
    Ok(())
}

/// Read an enum-valued key, falling back to `default` when it is absent.
pub fn parse_choice<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, VaultsimError>
where
    T: FromStr<Err = String>,
{
    match config.get_string(section, key) {
        Some(value) => value.parse().map_err(|reason| invalid(section, key, reason)),
        None => Ok(default),
    }
}

/// Split a comma-separated list, dropping empty entries.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `[simulation] strategies`, defaulting to the vault strategy alone.
pub fn parse_strategies(config: &dyn ConfigPort) -> Result<Vec<AllocationStrategy>, VaultsimError> {
    let Some(value) = config.get_string("simulation", "strategies") else {
        return Ok(vec![AllocationStrategy::default()]);
    };
    let strategies = parse_list(&value)
        .iter()
        .map(|s| s.parse())
        .collect::<Result<Vec<AllocationStrategy>, String>>()
        .map_err(|reason| invalid("simulation", "strategies", reason))?;
    if strategies.is_empty() {
        return Err(invalid(
            "simulation",
            "strategies",
            "at least one strategy is required",
        ));
    }
    Ok(strategies)
}

/// `[trials] seeds`, defaulting to a single trial with seed 0.
pub fn parse_seeds(config: &dyn ConfigPort) -> Result<Vec<u64>, VaultsimError> {
    let Some(value) = config.get_string("trials", "seeds") else {
        return Ok(vec![0]);
    };
    let seeds = parse_list(&value)
        .iter()
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| invalid("trials", "seeds", format!("'{s}' is not a seed")))
        })
        .collect::<Result<Vec<u64>, VaultsimError>>()?;
    if seeds.is_empty() {
        return Err(invalid("trials", "seeds", "at least one seed is required"));
    }
    for (i, seed) in seeds.iter().enumerate() {
        if seeds[..i].contains(seed) {
            return Err(invalid("trials", "seeds", format!("seed {seed} is listed twice")));
        }
    }
    Ok(seeds)
}

/// Applies to the configured threshold and to any command-line override.
pub fn check_entry_threshold(threshold: f64) -> Result<f64, VaultsimError> {
    if !threshold.is_finite() {
        return Err(invalid(
            "simulation",
            "entry_threshold",
            "entry_threshold must be finite",
        ));
    }
    Ok(threshold)
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    for key in ["path", "symbol"] {
        let present = config
            .get_string("data", key)
            .is_some_and(|v| !v.trim().is_empty());
        if !present {
            return Err(VaultsimError::ConfigMissing {
                section: "data".to_string(),
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_features(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    if config.get_int("features", "window_size", 20) < 1 {
        return Err(invalid(
            "features",
            "window_size",
            "window_size must be at least 1",
        ));
    }

    let fraction = config.get_double("features", "train_fraction", 0.8);
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(invalid(
            "features",
            "train_fraction",
            "train_fraction must be in (0, 1]",
        ));
    }

    parse_choice(config, "features", "feature_set", FeatureSet::default())?;
    parse_choice(config, "features", "scaler", ScalerKind::default())?;

    if let Some(scope) = config.get_string("features", "scaler_scope") {
        if !matches!(scope.trim().to_lowercase().as_str(), "train" | "full") {
            return Err(invalid(
                "features",
                "scaler_scope",
                format!("unknown scope '{scope}' (expected train or full)"),
            ));
        }
    }

    for key in ["tenkan", "kijun", "senkou_b", "displacement"] {
        if config.get_int("features", key, 1) < 1 {
            return Err(invalid("features", key, format!("{key} must be at least 1")));
        }
    }
    Ok(())
}

fn validate_simulation(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    let capital = config.get_double("simulation", "initial_capital", 10_000_000.0);
    if !(capital.is_finite() && capital > 0.0) {
        return Err(invalid(
            "simulation",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }

    let step_up = config.get_double("simulation", "step_up_fraction", 0.5);
    if !(step_up.is_finite() && step_up > 0.0) {
        return Err(invalid(
            "simulation",
            "step_up_fraction",
            "step_up_fraction must be positive",
        ));
    }

    check_entry_threshold(config.get_double("simulation", "entry_threshold", 0.5))?;

    parse_choice(config, "simulation", "threshold_mode", ThresholdMode::default())?;
    parse_strategies(config)?;
    Ok(())
}

fn validate_predictor(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    match parse_choice(config, "predictor", "kind", PredictorKind::default())? {
        PredictorKind::Momentum => {
            if config.get_int("predictor", "lookback", 5) < 1 {
                return Err(invalid(
                    "predictor",
                    "lookback",
                    "lookback must be at least 1",
                ));
            }
        }
        PredictorKind::Replay => {
            if config.get_string("data", "signals").is_none() {
                return Err(VaultsimError::ConfigMissing {
                    section: "data".to_string(),
                    key: "signals".to_string(),
                });
            }
        }
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> VaultsimError {
    VaultsimError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}
