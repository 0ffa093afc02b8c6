//! Feature table construction: stationary, scaled columns plus next-bar targets.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::error::FeatureError;
use super::indicator::ichimoku::{calculate_ichimoku, IchimokuParams};
use super::indicator::log_return::calculate_log_return;
use super::indicator::{IndicatorValue, Source};
use super::price_bar::{validate_bars, AuxiliarySeries, PriceBar};
use super::scaler::{FitScope, FittedScaler, ScalerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureSet {
    /// Log-returns of open, high, low, close and volume.
    #[default]
    Ohlcv,
    /// OHLCV plus auxiliary series and Ichimoku-derived columns.
    Ichimoku,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub feature_set: FeatureSet,
    pub ichimoku: IchimokuParams,
    pub scaler: ScalerKind,
    pub fit_scope: FitScope,
    pub window_size: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            feature_set: FeatureSet::Ohlcv,
            ichimoku: IchimokuParams::default(),
            scaler: ScalerKind::Standard,
            fit_scope: FitScope::default(),
            window_size: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub features: Vec<f64>,
    /// 1 when the next close is strictly higher.
    pub target_signal: u8,
    /// close[t+1] / close[t] - 1
    pub target_return: f64,
}

/// Immutable once built; trials share it by reference.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
    pub scaler: FittedScaler,
    pub dropped_rows: usize,
    /// The final bar's scaled features. It has no next close, so its target
    /// is NaN and it never appears in `rows`.
    pub latest: Option<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, FeatureError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| FeatureError::UnknownColumn(name.to_string()))
    }
}

/// Derive, clean and scale the feature table.
///
/// Rows with any non-finite feature or target are dropped, never imputed. This
/// always loses the first bar (no previous value), the last bar (no next
/// close) and, for the Ichimoku set, the cloud warmup. The last bar's features
/// are still kept, scaled, in `latest` for next-bar scoring.
pub fn build_feature_table(
    bars: &[PriceBar],
    auxiliary: &[AuxiliarySeries],
    config: &FeatureConfig,
) -> Result<FeatureTable, FeatureError> {
    validate_bars(bars)?;
    if config.window_size == 0 {
        return Err(FeatureError::ZeroWindow);
    }

    let (columns, raw) = derive_columns(bars, auxiliary, config);
    for (i, name) in columns.iter().enumerate() {
        if columns[..i].contains(name) {
            return Err(FeatureError::DuplicateColumn(name.clone()));
        }
    }
    let n = bars.len();

    let mut rows = Vec::with_capacity(n);
    let mut latest = None;
    let mut dropped_rows = 0usize;

    for i in 0..n {
        let target_return = if i + 1 < n {
            bars[i].simple_return_to(&bars[i + 1])
        } else {
            f64::NAN
        };
        let features: Vec<f64> = raw.iter().map(|col| col[i]).collect();
        let finite_features = features.iter().all(|v| v.is_finite());

        if i + 1 == n && finite_features {
            latest = Some(FeatureRow {
                date: bars[i].date,
                features,
                target_signal: 0,
                target_return,
            });
            dropped_rows += 1;
            continue;
        }
        if !target_return.is_finite() || !finite_features {
            dropped_rows += 1;
            continue;
        }

        rows.push(FeatureRow {
            date: bars[i].date,
            features,
            target_signal: u8::from(bars[i + 1].close > bars[i].close),
            target_return,
        });
    }

    debug!(
        total = n,
        kept = rows.len(),
        dropped = dropped_rows,
        "feature rows derived"
    );

    let minimum = config.window_size + 1;
    if rows.len() < minimum {
        return Err(FeatureError::TooShort {
            rows: rows.len(),
            minimum,
        });
    }

    let unscaled: Vec<Vec<f64>> = rows.iter().map(|r| r.features.clone()).collect();
    let scaler = FittedScaler::fit(&unscaled, config.scaler, config.fit_scope)?;
    for row in rows.iter_mut().chain(latest.as_mut()) {
        scaler.transform_row(&mut row.features);
    }

    Ok(FeatureTable {
        columns,
        rows,
        scaler,
        dropped_rows,
        latest,
    })
}

fn derive_columns(
    bars: &[PriceBar],
    auxiliary: &[AuxiliarySeries],
    config: &FeatureConfig,
) -> (Vec<String>, Vec<Vec<f64>>) {
    let dates: Vec<NaiveDate> = bars.iter().map(|b| b.date).collect();
    let mut columns = Vec::new();
    let mut raw = Vec::new();

    let mut push_log_return = |values: Vec<f64>, source: Source| {
        let series = calculate_log_return(&dates, &values, source);
        columns.push(series.indicator_type.to_string());
        raw.push(series.simple_values());
    };

    push_log_return(bars.iter().map(|b| b.open).collect(), Source::Open);
    push_log_return(bars.iter().map(|b| b.high).collect(), Source::High);
    push_log_return(bars.iter().map(|b| b.low).collect(), Source::Low);
    push_log_return(bars.iter().map(|b| b.close).collect(), Source::Close);
    push_log_return(
        bars.iter().map(|b| b.effective_volume()).collect(),
        Source::Volume,
    );

    if config.feature_set == FeatureSet::Ichimoku {
        for aux in auxiliary {
            push_log_return(aux.align_to(bars), Source::Auxiliary(aux.name.clone()));
        }

        let cloud = calculate_ichimoku(bars, config.ichimoku);
        let component = |pick: fn(&IndicatorValue) -> f64| -> Vec<f64> {
            cloud.values.iter().map(|p| pick(&p.value)).collect()
        };
        let tenkan = component(|v| match v {
            IndicatorValue::Ichimoku { tenkan, .. } => *tenkan,
            _ => f64::NAN,
        });
        let kijun = component(|v| match v {
            IndicatorValue::Ichimoku { kijun, .. } => *kijun,
            _ => f64::NAN,
        });
        let span_a = component(|v| match v {
            IndicatorValue::Ichimoku { span_a, .. } => *span_a,
            _ => f64::NAN,
        });
        let span_b = component(|v| match v {
            IndicatorValue::Ichimoku { span_b, .. } => *span_b,
            _ => f64::NAN,
        });

        let cloud_thickness: Vec<f64> = span_a.iter().zip(&span_b).map(|(a, b)| a - b).collect();
        let dist_from_kijun: Vec<f64> = bars
            .iter()
            .zip(&kijun)
            .map(|(bar, k)| bar.close - k)
            .collect();

        push_log_return(tenkan, Source::Tenkan);
        push_log_return(kijun, Source::Kijun);
        push_log_return(span_a, Source::SpanA);
        push_log_return(span_b, Source::SpanB);

        columns.push("cloud_thickness".to_string());
        raw.push(cloud_thickness);
        columns.push("dist_from_kijun".to_string());
        raw.push(dist_from_kijun);
    }

    (columns, raw)
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureSet::Ohlcv => write!(f, "ohlcv"),
            FeatureSet::Ichimoku => write!(f, "ichimoku"),
        }
    }
}

impl FromStr for FeatureSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ohlcv" => Ok(FeatureSet::Ohlcv),
            "ichimoku" => Ok(FeatureSet::Ichimoku),
            other => Err(format!(
                "unknown feature set '{other}' (expected ohlcv or ichimoku)"
            )),
        }
    }
}
