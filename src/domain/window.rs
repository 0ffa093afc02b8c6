//! Stride-1 sliding windows over the feature table.
//!
//! Window `i` views rows `[i, i + W)` and carries the targets of row `i + W - 1`,
//! i.e. the move from the window's last bar to the bar after it. Nothing at or
//! beyond row `i + W` is reachable through a window.

use chrono::NaiveDate;

use super::error::FeatureError;
use super::features::{FeatureRow, FeatureTable};

#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    pub index: usize,
    pub rows: &'a [FeatureRow],
    pub target_signal: u8,
    pub target_return: f64,
}

impl<'a> Window<'a> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Date of the last row, the decision date for this window.
    pub fn end_date(&self) -> NaiveDate {
        self.rows[self.rows.len() - 1].date
    }

    /// One feature column across the window, oldest first.
    pub fn column(&self, col: usize) -> impl Iterator<Item = f64> + 'a {
        self.rows.iter().map(move |row| row.features[col])
    }
}

/// Produce `table.len() - window_size` windows in chronological order.
pub fn windows(table: &FeatureTable, window_size: usize) -> Result<Vec<Window<'_>>, FeatureError> {
    if window_size == 0 {
        return Err(FeatureError::ZeroWindow);
    }
    let minimum = window_size + 1;
    if table.len() < minimum {
        return Err(FeatureError::TooShort {
            rows: table.len(),
            minimum,
        });
    }

    let count = table.len() - window_size;
    Ok((0..count)
        .map(|i| {
            let rows = &table.rows[i..i + window_size];
            let label = &rows[window_size - 1];
            Window {
                index: i,
                rows,
                target_signal: label.target_signal,
                target_return: label.target_return,
            }
        })
        .collect())
}

/// The newest `window_size` rows, ending on the final bar whose next move is
/// still unknown.
#[derive(Debug, Clone)]
pub struct LatestWindow {
    pub index: usize,
    pub rows: Vec<FeatureRow>,
}

impl LatestWindow {
    /// View for predictors. Targets are unknown, so the return is NaN.
    pub fn as_window(&self) -> Window<'_> {
        Window {
            index: self.index,
            rows: &self.rows,
            target_signal: 0,
            target_return: f64::NAN,
        }
    }
}

/// The last `window_size - 1` labeled rows followed by `table.latest`.
pub fn latest_window(table: &FeatureTable, window_size: usize) -> Result<LatestWindow, FeatureError> {
    if window_size == 0 {
        return Err(FeatureError::ZeroWindow);
    }
    let latest = table.latest.as_ref().ok_or(FeatureError::NoLatestRow)?;
    let history = window_size - 1;
    if table.len() < history {
        return Err(FeatureError::TooShort {
            rows: table.len(),
            minimum: history,
        });
    }

    let index = table.len() - history;
    let mut rows = table.rows[index..].to_vec();
    rows.push(latest.clone());
    Ok(LatestWindow { index, rows })
}

/// Chronological train/test split; the test side is what gets simulated.
pub fn split_at_fraction<'w, 'a>(
    windows: &'w [Window<'a>],
    train_fraction: f64,
) -> Result<(&'w [Window<'a>], &'w [Window<'a>]), FeatureError> {
    if !(train_fraction > 0.0 && train_fraction <= 1.0) {
        return Err(FeatureError::InvalidFraction(train_fraction));
    }
    let split = (windows.len() as f64 * train_fraction).floor() as usize;
    Ok(windows.split_at(split.min(windows.len())))
}
