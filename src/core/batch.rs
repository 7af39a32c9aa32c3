//! Tensor aliases and batching helpers.
//!
//! Classifier batches use NCHW layout: `[batch, 1, 28, 28]` for input and
//! `[batch, 10]` for the returned class distributions.

use crate::core::errors::DigitError;
use ndarray::{Array2, Array4, Axis};

/// A 2-dimensional tensor represented as a 2D array of f32 values.
pub type Tensor2D = ndarray::Array2<f32>;

/// A 4-dimensional tensor represented as a 4D array of f32 values.
pub type Tensor4D = ndarray::Array4<f32>;

/// Stacks single-channel planes of equal shape into an NCHW batch.
///
/// # Errors
///
/// Returns `DigitError::InvalidInput` if `planes` is empty and
/// `DigitError::Tensor` if the planes do not share one shape.
pub fn stack_planes(planes: &[Array2<f32>]) -> Result<Tensor4D, DigitError> {
    let first = planes
        .first()
        .ok_or_else(|| DigitError::invalid_input("cannot build a batch from zero planes"))?;
    let (height, width) = first.dim();
    let views: Vec<_> = planes
        .iter()
        .map(|plane| plane.view().insert_axis(Axis(0)))
        .collect();
    let stacked = ndarray::stack(Axis(0), &views)?;
    debug_assert_eq!(stacked.dim(), (planes.len(), 1, height, width));
    Ok(stacked)
}

/// Wraps a single plane as a batch of one.
pub fn single_plane_batch(plane: &Array2<f32>) -> Tensor4D {
    let (height, width) = plane.dim();
    let mut batch = Array4::<f32>::zeros((1, 1, height, width));
    batch
        .index_axis_mut(Axis(0), 0)
        .index_axis_mut(Axis(0), 0)
        .assign(plane);
    batch
}
