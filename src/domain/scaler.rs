//! Per-column feature normalization.
//!
//! The fitted parameters are a plain value owned by whoever built the feature
//! table, so a serving path can reuse exactly the scale a backtest saw.

use std::fmt;
use std::str::FromStr;

use super::error::FeatureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalerKind {
    /// Population z-score.
    #[default]
    Standard,
    /// Map the fitted range onto [0, 1].
    MinMax,
}

/// Which rows the scaler may look at when fitting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitScope {
    /// Fit over every row. Leaks test-period statistics into the features.
    FullSeries,
    /// Fit over the leading `fraction` of rows only.
    TrainOnly { fraction: f64 },
}

impl Default for FitScope {
    fn default() -> Self {
        FitScope::TrainOnly { fraction: 0.8 }
    }
}

impl FitScope {
    /// Number of leading rows the scaler is fitted on.
    pub fn fit_rows(&self, total: usize) -> Result<usize, FeatureError> {
        match *self {
            FitScope::FullSeries => Ok(total),
            FitScope::TrainOnly { fraction } => {
                if !(fraction > 0.0 && fraction <= 1.0) {
                    return Err(FeatureError::InvalidFraction(fraction));
                }
                Ok(((total as f64 * fraction).floor() as usize).max(1).min(total))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnScale {
    pub offset: f64,
    pub scale: f64,
}

impl ColumnScale {
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.offset) / self.scale
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedScaler {
    pub kind: ScalerKind,
    pub scope: FitScope,
    pub fitted_rows: usize,
    pub columns: Vec<ColumnScale>,
}

impl FittedScaler {
    /// Fit one `ColumnScale` per column over `rows[..fit_rows]`.
    pub fn fit(rows: &[Vec<f64>], kind: ScalerKind, scope: FitScope) -> Result<Self, FeatureError> {
        let fitted_rows = scope.fit_rows(rows.len())?;
        let sample = &rows[..fitted_rows];
        let width = rows.first().map(|r| r.len()).unwrap_or(0);

        let columns = (0..width)
            .map(|col| {
                let values = sample.iter().map(|row| row[col]);
                match kind {
                    ScalerKind::Standard => standard_scale(values, fitted_rows),
                    ScalerKind::MinMax => min_max_scale(values),
                }
            })
            .collect();

        Ok(FittedScaler {
            kind,
            scope,
            fitted_rows,
            columns,
        })
    }

    pub fn transform_row(&self, row: &mut [f64]) {
        for (value, column) in row.iter_mut().zip(&self.columns) {
            *value = column.apply(*value);
        }
    }
}

fn standard_scale(values: impl Iterator<Item = f64> + Clone, n: usize) -> ColumnScale {
    if n == 0 {
        return ColumnScale {
            offset: 0.0,
            scale: 1.0,
        };
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let std = variance.sqrt();
    ColumnScale {
        offset: mean,
        scale: if std > 0.0 { std } else { 1.0 },
    }
}

fn min_max_scale(values: impl Iterator<Item = f64>) -> ColumnScale {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() {
        return ColumnScale {
            offset: 0.0,
            scale: 1.0,
        };
    }
    let range = hi - lo;
    ColumnScale {
        offset: lo,
        scale: if range > 0.0 { range } else { 1.0 },
    }
}

impl fmt::Display for ScalerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalerKind::Standard => write!(f, "standard"),
            ScalerKind::MinMax => write!(f, "minmax"),
        }
    }
}

impl FromStr for ScalerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "zscore" => Ok(ScalerKind::Standard),
            "minmax" | "min_max" => Ok(ScalerKind::MinMax),
            other => Err(format!("unknown scaler '{other}' (expected standard or minmax)")),
        }
    }
}
