//! Feature extraction over a window of bars.
//!
//! The definitions here are a compatibility contract with the offline-trained
//! classifier: they must match the training-time computation exactly.

use serde::{Deserialize, Serialize};

use crate::models::Bar;

/// Feature names in the column order the classifier was trained on
pub const FEATURE_NAMES: [&str; 7] = [
    "return_1",
    "return_5",
    "return_10",
    "volume_change_1",
    "volume_change_5",
    "candle_range",
    "volatility_10",
];

/// Rows before this index can never be complete
pub const WARMUP_BARS: usize = 10;

/// Smallest window that yields at least one complete row
pub const MIN_BARS: usize = WARMUP_BARS + 1;

const VOLATILITY_WINDOW: usize = 10;

/// One complete row of model inputs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub return_1: f64,
    pub return_5: f64,
    pub return_10: f64,
    pub volume_change_1: f64,
    pub volume_change_5: f64,
    pub candle_range: f64,
    pub volatility_10: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order
    pub fn to_array(&self) -> [f64; 7] {
        [
            self.return_1,
            self.return_5,
            self.return_10,
            self.volume_change_1,
            self.volume_change_5,
            self.candle_range,
            self.volatility_10,
        ]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.to_array()[i])
    }

    /// Sign-flip the directional returns so a short setup looks like a long one.
    ///
    /// The classifier was trained on sell examples transformed exactly this
    /// way; no other field may change.
    pub fn mirrored(&self) -> Self {
        Self {
            return_1: -self.return_1,
            return_5: -self.return_5,
            return_10: -self.return_10,
            ..*self
        }
    }
}

/// Fractional change `values[t] / values[t - k] - 1`, None when undefined
fn pct_change(values: &[f64], t: usize, k: usize) -> Option<f64> {
    if t < k {
        return None;
    }
    let change = values[t] / values[t - k] - 1.0;
    change.is_finite().then_some(change)
}

/// Sample standard deviation (n - 1 denominator)
fn sample_std(samples: &[f64]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = variance.sqrt();
    std.is_finite().then_some(std)
}

fn row_at(bars: &[Bar], closes: &[f64], volumes: &[f64], t: usize) -> Option<FeatureVector> {
    if t < WARMUP_BARS {
        return None;
    }

    let mut recent_returns = [0.0; VOLATILITY_WINDOW];
    for (slot, i) in recent_returns.iter_mut().zip(t + 1 - VOLATILITY_WINDOW..=t) {
        *slot = pct_change(closes, i, 1)?;
    }

    let bar = &bars[t];
    let candle_range = (bar.high - bar.low) / bar.close;
    if !candle_range.is_finite() {
        return None;
    }

    Some(FeatureVector {
        return_1: recent_returns[VOLATILITY_WINDOW - 1],
        return_5: pct_change(closes, t, 5)?,
        return_10: pct_change(closes, t, 10)?,
        volume_change_1: pct_change(volumes, t, 1)?,
        volume_change_5: pct_change(volumes, t, 5)?,
        candle_range,
        volatility_10: sample_std(&recent_returns)?,
    })
}

/// Compute a feature row for every bar, aligned to the input.
///
/// The first [`WARMUP_BARS`] positions, and any position whose inputs produce
/// a non-finite value, are `None`.
pub fn extract_features(bars: &[Bar]) -> Vec<Option<FeatureVector>> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    (0..bars.len())
        .map(|t| row_at(bars, &closes, &volumes, t))
        .collect()
}

/// Only the complete rows, in bar order
pub fn complete_features(bars: &[Bar]) -> Vec<FeatureVector> {
    extract_features(bars).into_iter().flatten().collect()
}

/// Feature row for the newest bar, if it is complete
pub fn latest_features(bars: &[Bar]) -> Option<FeatureVector> {
    let t = bars.len().checked_sub(1)?;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    row_at(bars, &closes, &volumes, t)
}
