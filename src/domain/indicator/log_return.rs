//! Epsilon-guarded log return.
//!
//! LOG_RET[i] = ln((V[i] + eps) / (V[i-1] + eps)), eps = 1e-9
//! Warmup: first bar is invalid. Any non-finite input or result is invalid.

use chrono::NaiveDate;

use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, Source,
};

pub const LOG_RETURN_EPSILON: f64 = 1e-9;

pub fn log_return(prev: f64, curr: f64) -> f64 {
    ((curr + LOG_RETURN_EPSILON) / (prev + LOG_RETURN_EPSILON)).ln()
}

pub fn calculate_log_return(dates: &[NaiveDate], values: &[f64], source: Source) -> IndicatorSeries {
    debug_assert_eq!(dates.len(), values.len());
    let mut points = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        let value = if i == 0 {
            f64::NAN
        } else {
            log_return(values[i - 1], values[i])
        };
        let valid = value.is_finite();

        points.push(IndicatorPoint {
            date: dates[i],
            valid,
            value: IndicatorValue::Simple(if valid { value } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::LogReturn(source),
        values: points,
    }
}
