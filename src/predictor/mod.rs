//! Predictors built on top of a [`DigitClassifier`](crate::core::DigitClassifier).

/// Augmentation-ensemble classification of canonical digits
pub mod ensemble;

pub use ensemble::{EnsemblePredictor, NUM_ALTERNATIVES};
