//! Capability traits consumed by the pipeline.

use crate::core::batch::{Tensor2D, Tensor4D};
use crate::core::errors::DigitError;
use std::fmt::Debug;

/// Number of digit classes a classifier must score.
pub const NUM_CLASSES: usize = 10;

/// A pre-trained digit classifier.
///
/// Implementations receive an NCHW batch of canonical digits
/// (`[batch, 1, 28, 28]`, values in `[0, 1]`, ink bright on a dark
/// background) and return one row of [`NUM_CLASSES`] scores per batch member.
/// Rows are expected to be probability distributions; rows that are not are
/// passed through a softmax by the ensemble predictor.
///
/// A classifier is shared read-only by every concurrent request, so
/// implementations must be `Send + Sync` and must not rely on per-call
/// mutable state without their own synchronisation.
pub trait DigitClassifier: Send + Sync + Debug {
    /// Scores every member of `batch`.
    fn predict_batch(&self, batch: &Tensor4D) -> Result<Tensor2D, DigitError>;

    /// A short name used in logs and model-info reports.
    fn name(&self) -> &str {
        "digit_classifier"
    }
}

impl<C: DigitClassifier + ?Sized> DigitClassifier for std::sync::Arc<C> {
    fn predict_batch(&self, batch: &Tensor4D) -> Result<Tensor2D, DigitError> {
        (**self).predict_batch(batch)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
