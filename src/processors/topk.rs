//! Top-k extraction over class distributions.

use crate::core::batch::Tensor2D;
use crate::core::errors::DigitError;
use ndarray::{ArrayView1, Axis};

/// Top-k classes for each row of a score matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct TopkResult {
    /// Class indexes per row, best first.
    pub indexes: Vec<Vec<usize>>,
    /// Scores matching `indexes`.
    pub scores: Vec<Vec<f32>>,
}

/// Extracts the `k` best classes from classification outputs.
///
/// Ranking is by descending score. Equal scores keep ascending class order,
/// so an exact tie resolves to the lowest class index.
#[derive(Debug, Clone, Copy, Default)]
pub struct Topk;

impl Topk {
    /// Creates a new processor.
    pub fn new() -> Self {
        Self
    }

    /// Processes every row of `scores`.
    ///
    /// # Errors
    ///
    /// Returns `DigitError::InvalidInput` if `k` is zero or rows are empty.
    pub fn process(&self, scores: &Tensor2D, k: usize) -> Result<TopkResult, DigitError> {
        if k == 0 {
            return Err(DigitError::invalid_input("k must be greater than 0"));
        }
        if scores.ncols() == 0 && scores.nrows() > 0 {
            return Err(DigitError::invalid_input("empty prediction vector"));
        }

        let effective_k = k.min(scores.ncols());
        let (indexes, scores): (Vec<Vec<usize>>, Vec<Vec<f32>>) = scores
            .axis_iter(Axis(0))
            .map(|row| Self::extract_row(row, effective_k))
            .unzip();
        Ok(TopkResult { indexes, scores })
    }

    /// Top-k of a single row.
    pub fn extract_row(row: ArrayView1<'_, f32>, k: usize) -> (Vec<usize>, Vec<f32>) {
        let mut indexed: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
        // sort_by is stable: ties stay in index order.
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed.into_iter().take(k).unzip()
    }
}

/// Numerically stable softmax of one row.
pub fn softmax(row: ArrayView1<'_, f32>) -> Vec<f32> {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Whether a row already is a probability distribution.
pub fn is_distribution(row: ArrayView1<'_, f32>) -> bool {
    row.iter().all(|v| (0.0..=1.0).contains(v)) && (row.sum() - 1.0).abs() <= 1e-3
}

/// Replaces every row that is not a distribution with its softmax.
///
/// # Errors
///
/// Returns `DigitError::Inference` if any score is not finite.
pub fn ensure_distributions(mut scores: Tensor2D) -> Result<Tensor2D, DigitError> {
    if scores.iter().any(|v| !v.is_finite()) {
        return Err(DigitError::inference_message(
            "classifier produced non-finite scores",
        ));
    }
    for mut row in scores.axis_iter_mut(Axis(0)) {
        if !is_distribution(row.view()) {
            let normalised = softmax(row.view());
            row.iter_mut()
                .zip(normalised)
                .for_each(|(slot, value)| *slot = value);
        }
    }
    Ok(scores)
}
