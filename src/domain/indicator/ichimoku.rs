//! Ichimoku cloud components.
//!
//! TENKAN[i] = (max(H, tenkan) + min(L, tenkan)) / 2
//! KIJUN[i]  = (max(H, kijun) + min(L, kijun)) / 2
//! SPAN_A[i] = (TENKAN[i-d] + KIJUN[i-d]) / 2
//! SPAN_B[i] = (max(H, senkou_b)[i-d] + min(L, senkou_b)[i-d]) / 2
//! Warmup: span_b is the last component to fill, at index senkou_b - 1 + d.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::price_bar::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IchimokuParams {
    pub tenkan: usize,
    pub kijun: usize,
    pub senkou_b: usize,
    pub displacement: usize,
}

impl Default for IchimokuParams {
    fn default() -> Self {
        IchimokuParams {
            tenkan: 9,
            kijun: 26,
            senkou_b: 52,
            displacement: 26,
        }
    }
}

impl IchimokuParams {
    /// Index of the first bar with every component populated.
    pub fn warmup(&self) -> usize {
        let base = self.tenkan.max(self.kijun).max(self.senkou_b);
        base.saturating_sub(1) + self.displacement
    }
}

/// Trailing midpoint (max + min) / 2 over `period` bars, NaN during warmup.
pub fn rolling_midpoint(highs: &[f64], lows: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(highs.len());
    for i in 0..highs.len() {
        if period == 0 || i + 1 < period {
            out.push(f64::NAN);
            continue;
        }
        let start = i + 1 - period;
        let hi = highs[start..=i]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let lo = lows[start..=i].iter().copied().fold(f64::INFINITY, f64::min);
        out.push((hi + lo) / 2.0);
    }
    out
}

/// Shift a series forward by `by` bars, filling the head with NaN.
pub fn shift_forward(values: &[f64], by: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= by { values[i - by] } else { f64::NAN })
        .collect()
}

pub fn calculate_ichimoku(bars: &[PriceBar], params: IchimokuParams) -> IndicatorSeries {
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

    let tenkan = rolling_midpoint(&highs, &lows, params.tenkan);
    let kijun = rolling_midpoint(&highs, &lows, params.kijun);
    let leading_a: Vec<f64> = tenkan
        .iter()
        .zip(&kijun)
        .map(|(t, k)| (t + k) / 2.0)
        .collect();
    let span_a = shift_forward(&leading_a, params.displacement);
    let span_b = shift_forward(
        &rolling_midpoint(&highs, &lows, params.senkou_b),
        params.displacement,
    );

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = tenkan[i].is_finite()
                && kijun[i].is_finite()
                && span_a[i].is_finite()
                && span_b[i].is_finite();
            IndicatorPoint {
                date: bar.date,
                valid,
                value: IndicatorValue::Ichimoku {
                    tenkan: tenkan[i],
                    kijun: kijun[i],
                    span_a: span_a[i],
                    span_b: span_b[i],
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Ichimoku {
            tenkan: params.tenkan,
            kijun: params.kijun,
            senkou_b: params.senkou_b,
            displacement: params.displacement,
        },
        values,
    }
}
