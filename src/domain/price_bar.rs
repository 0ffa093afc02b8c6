//! Daily price bars and auxiliary series.

use chrono::NaiveDate;

use super::error::FeatureError;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Volume with zero sessions mapped to 1 so the log-return stays bounded.
    pub fn effective_volume(&self) -> f64 {
        if self.volume == 0.0 { 1.0 } else { self.volume }
    }

    /// close[next] / close[self] - 1
    pub fn simple_return_to(&self, next: &PriceBar) -> f64 {
        next.close / self.close - 1.0
    }
}

/// A named series observed on its own calendar (exchange rate, gold, yields).
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliarySeries {
    pub name: String,
    pub observations: Vec<(NaiveDate, f64)>,
}

impl AuxiliarySeries {
    pub fn new(name: impl Into<String>, mut observations: Vec<(NaiveDate, f64)>) -> Self {
        observations.sort_by_key(|(date, _)| *date);
        Self {
            name: name.into(),
            observations,
        }
    }

    /// Align to bar dates as-of: each bar takes the last observation at or
    /// before its date. Bars before the first observation get NaN.
    pub fn align_to(&self, bars: &[PriceBar]) -> Vec<f64> {
        let mut aligned = Vec::with_capacity(bars.len());
        let mut cursor = 0;
        let mut last = f64::NAN;

        for bar in bars {
            while cursor < self.observations.len() && self.observations[cursor].0 <= bar.date {
                let value = self.observations[cursor].1;
                if value.is_finite() {
                    last = value;
                }
                cursor += 1;
            }
            aligned.push(last);
        }

        aligned
    }
}

/// Reject series the feature pipeline cannot reason about.
pub fn validate_bars(bars: &[PriceBar]) -> Result<(), FeatureError> {
    if bars.is_empty() {
        return Err(FeatureError::EmptySeries);
    }

    for (i, bar) in bars.iter().enumerate() {
        if !bar.close.is_finite() || bar.close <= 0.0 {
            return Err(FeatureError::InvalidClose {
                date: bar.date,
                close: bar.close,
            });
        }
        if i > 0 && bar.date <= bars[i - 1].date {
            return Err(FeatureError::Unordered { date: bar.date });
        }
    }

    Ok(())
}
