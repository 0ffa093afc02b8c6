//! Predictor boundary: window in, scalar signal out.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::FeatureError;
use super::features::FeatureTable;
use super::window::Window;

/// A pure function of one window. Implementations must not rely on call order.
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;
    fn predict(&self, window: &Window<'_>) -> f64;
}

/// Which built-in predictor a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictorKind {
    #[default]
    Momentum,
    Replay,
}

impl PredictorKind {
    /// Entry threshold used when `[simulation] entry_threshold` is not set.
    /// Momentum emits a raw forecast centered on zero; replayed signals are
    /// probabilities.
    pub fn default_entry_threshold(self) -> f64 {
        match self {
            PredictorKind::Momentum => 0.0,
            PredictorKind::Replay => 0.5,
        }
    }
}

impl fmt::Display for PredictorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictorKind::Momentum => write!(f, "momentum"),
            PredictorKind::Replay => write!(f, "replay"),
        }
    }
}

impl FromStr for PredictorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "momentum" => Ok(PredictorKind::Momentum),
            "replay" => Ok(PredictorKind::Replay),
            other => Err(format!(
                "unknown predictor '{other}' (expected momentum or replay)"
            )),
        }
    }
}

/// Call the predictor exactly once per window, in window order.
pub fn predict_all(predictor: &dyn Predictor, windows: &[Window<'_>]) -> Vec<f64> {
    windows.iter().map(|w| predictor.predict(w)).collect()
}

/// Mean of one (scaled) feature column over the trailing `lookback` rows.
///
/// A raw-forecast baseline; pair it with an entry threshold of 0.
#[derive(Debug, Clone)]
pub struct MomentumPredictor {
    name: String,
    column: usize,
    lookback: usize,
}

impl MomentumPredictor {
    pub fn new(table: &FeatureTable, column: &str, lookback: usize) -> Result<Self, FeatureError> {
        if lookback == 0 {
            return Err(FeatureError::ZeroWindow);
        }
        Ok(Self {
            name: format!("momentum({column},{lookback})"),
            column: table.column_index(column)?,
            lookback,
        })
    }
}

impl Predictor for MomentumPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, window: &Window<'_>) -> f64 {
        let take = self.lookback.min(window.len());
        let skip = window.len() - take;
        window.column(self.column).skip(skip).sum::<f64>() / take as f64
    }
}

/// Replays signals produced by an external model, keyed by the window's end date.
///
/// Dates with no recorded signal yield NaN, which never passes an entry test.
#[derive(Debug, Clone)]
pub struct ReplayPredictor {
    name: String,
    signals: BTreeMap<NaiveDate, f64>,
}

impl ReplayPredictor {
    pub fn new(name: impl Into<String>, signals: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self {
            name: name.into(),
            signals: signals.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl Predictor for ReplayPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, window: &Window<'_>) -> f64 {
        self.signals
            .get(&window.end_date())
            .copied()
            .unwrap_or(f64::NAN)
    }
}
