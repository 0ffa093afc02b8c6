//! Indicator series feeding the feature table.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: a single point in an indicator time series
//! - `IndicatorValue`: enum for different indicator output shapes
//! - `IndicatorType`: indicator identity + parameters (doubles as the column name)
//! - `IndicatorSeries`: a time series of indicator values

pub mod ichimoku;
pub mod log_return;

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Ichimoku {
        tenkan: f64,
        kijun: f64,
        span_a: f64,
        span_b: f64,
    },
}

impl IndicatorValue {
    /// The scalar for `Simple` points; NaN for composite shapes.
    pub fn simple(&self) -> f64 {
        match self {
            IndicatorValue::Simple(v) => *v,
            _ => f64::NAN,
        }
    }
}

/// Which raw column a log-return is taken over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Open,
    High,
    Low,
    Close,
    Volume,
    Auxiliary(String),
    Tenkan,
    Kijun,
    SpanA,
    SpanB,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    LogReturn(Source),
    Ichimoku {
        tenkan: usize,
        kijun: usize,
        senkou_b: usize,
        displacement: usize,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Scalar values with invalid points mapped to NaN.
    pub fn simple_values(&self) -> Vec<f64> {
        self.values
            .iter()
            .map(|p| if p.valid { p.value.simple() } else { f64::NAN })
            .collect()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Open => write!(f, "open"),
            Source::High => write!(f, "high"),
            Source::Low => write!(f, "low"),
            Source::Close => write!(f, "close"),
            Source::Volume => write!(f, "volume"),
            Source::Auxiliary(name) => write!(f, "{}", name.to_lowercase()),
            Source::Tenkan => write!(f, "tenkan"),
            Source::Kijun => write!(f, "kijun"),
            Source::SpanA => write!(f, "span_a"),
            Source::SpanB => write!(f, "span_b"),
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::LogReturn(source) => write!(f, "log_ret_{}", source),
            IndicatorType::Ichimoku {
                tenkan,
                kijun,
                senkou_b,
                displacement,
            } => write!(
                f,
                "ICHIMOKU({},{},{},{})",
                tenkan, kijun, senkou_b, displacement
            ),
        }
    }
}
