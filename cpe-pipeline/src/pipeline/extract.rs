//! Feature extractor
//!
//! Pure statistics over one completed window. Values are taken in arrival
//! order; the trend uses 1-based arrival indices as the x axis.

use chrono::Utc;
use thiserror::Error;

use super::window::CompletedBatch;
use crate::config::MIN_WINDOW_SIZE;
use crate::models::{FeatureVector, WindowStats};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("window size must be at least {min}, got {size}")]
    WindowTooSmall { size: usize, min: usize },

    #[error("batch for {device_id} has {actual} samples, expected {expected}")]
    WrongBatchSize {
        device_id: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    window_size: usize,
}

impl FeatureExtractor {
    pub fn new(window_size: usize) -> Result<Self, ExtractError> {
        if window_size < MIN_WINDOW_SIZE {
            return Err(ExtractError::WindowTooSmall { size: window_size, min: MIN_WINDOW_SIZE });
        }
        Ok(Self { window_size })
    }

    pub fn extract(&self, batch: &CompletedBatch) -> Result<FeatureVector, ExtractError> {
        if batch.rtts.len() != self.window_size {
            return Err(ExtractError::WrongBatchSize {
                device_id: batch.device_id.clone(),
                expected: self.window_size,
                actual: batch.rtts.len(),
            });
        }

        Ok(FeatureVector {
            device_id: batch.device_id.clone(),
            computed_at: Utc::now(),
            delays: batch.rtts.clone(),
            stats: window_stats(&batch.rtts),
        })
    }
}

/// Caller guarantees at least three values
fn window_stats(rtts: &[i32]) -> WindowStats {
    let values: Vec<f64> = rtts.iter().map(|&v| f64::from(v)).collect();
    let n = values.len();

    let mut sorted = values.clone();
    sorted.sort_by(f64::total_cmp);

    let min = sorted[0];
    let max = sorted[n - 1];

    WindowStats {
        mean: mean(&values),
        min,
        median: median(&sorted),
        max,
        range: max - min,
        mean_of_last_three: mean(&values[n - 3..]),
        diff_of_last_two: values[n - 1] - values[n - 2],
        slope: slope(&values),
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Middle element for odd lengths, mean of the two middle elements for even
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// `N·Σx² − (Σx)²` for x = 1..N
fn slope_denominator(n: usize) -> f64 {
    let n_f = n as f64;
    let sum_x = n_f * (n_f + 1.0) / 2.0;
    let sum_x2 = n_f * (n_f + 1.0) * (2.0 * n_f + 1.0) / 6.0;
    n_f * sum_x2 - sum_x * sum_x
}

/// Least-squares slope of value against 1-based index; 0 when undefined
pub fn slope(values: &[f64]) -> f64 {
    let n = values.len();
    let denominator = slope_denominator(n);
    if denominator == 0.0 {
        return 0.0;
    }

    let (sum_x, sum_y, sum_xy) = values.iter().enumerate().fold(
        (0.0, 0.0, 0.0),
        |(sx, sy, sxy), (i, &y)| {
            let x = (i + 1) as f64;
            (sx + x, sy + y, sxy + x * y)
        },
    );

    (n as f64 * sum_xy - sum_x * sum_y) / denominator
}
