//! Augmentation-ensemble classification of canonical digits.
//!
//! With augmentation enabled the digit is expanded into a fixed batch of small
//! perturbations (see [`Augmenter`]), the classifier scores the whole batch in
//! one call and the per-member distributions are averaged. Any failure on the
//! augmented path falls back to a single forward pass on the unmodified digit.

use crate::core::batch::{single_plane_batch, Tensor2D};
use crate::core::errors::{DigitError, SimpleError};
use crate::core::predictions::{Alternative, PredictionResult};
use crate::core::traits::{DigitClassifier, NUM_CLASSES};
use crate::processors::augmentation::Augmenter;
use crate::processors::normalization::CanonicalDigit;
use crate::processors::topk::{ensure_distributions, Topk};
use ndarray::{Array1, Axis};
use tracing::{debug, warn};

/// Number of runner-up classes reported with each prediction.
pub const NUM_ALTERNATIVES: usize = 2;

/// Classifies canonical digits, optionally averaging over augmentations.
#[derive(Debug, Clone, Default)]
pub struct EnsemblePredictor {
    augmenter: Augmenter,
    topk: Topk,
}

impl EnsemblePredictor {
    /// Creates a predictor with the standard augmentation set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the augmentation set.
    pub fn with_augmenter(mut self, augmenter: Augmenter) -> Self {
        self.augmenter = augmenter;
        self
    }

    /// Classifies `digit`.
    ///
    /// # Errors
    ///
    /// Only the single-shot path can fail: an error is returned when the
    /// unaugmented forward pass itself fails or yields malformed scores.
    pub fn classify(
        &self,
        digit: &CanonicalDigit,
        classifier: &dyn DigitClassifier,
        use_augmentation: bool,
    ) -> Result<PredictionResult, DigitError> {
        if use_augmentation {
            match self.classify_augmented(digit, classifier) {
                Ok(result) => return Ok(result),
                Err(err) => {
                    warn!(
                        error = %err,
                        classifier = classifier.name(),
                        "Augmented classification failed, falling back to single pass"
                    );
                }
            }
        }
        self.classify_single(digit, classifier)
    }

    /// One forward pass on the unmodified digit.
    pub fn classify_single(
        &self,
        digit: &CanonicalDigit,
        classifier: &dyn DigitClassifier,
    ) -> Result<PredictionResult, DigitError> {
        let batch = single_plane_batch(digit.as_array());
        let scores = run_classifier(classifier, &batch, 1)?;
        self.rank(scores.row(0).to_owned())
    }

    /// Averages the classifier output over the augmentation batch.
    pub fn classify_augmented(
        &self,
        digit: &CanonicalDigit,
        classifier: &dyn DigitClassifier,
    ) -> Result<PredictionResult, DigitError> {
        let batch = self.augmenter.build_batch(digit)?;
        let members = batch.len_of(Axis(0));
        let scores = run_classifier(classifier, &batch, members)?;
        let averaged = scores.mean_axis(Axis(0)).ok_or_else(|| {
            DigitError::inference_message("classifier returned an empty batch")
        })?;
        debug!(members, "Averaged augmented predictions");
        self.rank(averaged)
    }

    fn rank(&self, distribution: Array1<f32>) -> Result<PredictionResult, DigitError> {
        let ranked = self
            .topk
            .process(&distribution.insert_axis(Axis(0)), NUM_ALTERNATIVES + 1)?;
        let (indexes, scores) = (&ranked.indexes[0], &ranked.scores[0]);
        let (&digit, &confidence) = indexes.first().zip(scores.first()).ok_or_else(|| {
            DigitError::processing_error(
                crate::core::errors::ProcessingStage::PostProcessing,
                "rank distribution",
                SimpleError::new("empty distribution"),
            )
        })?;
        let alternatives = indexes
            .iter()
            .zip(scores.iter())
            .skip(1)
            .map(|(&digit, &confidence)| Alternative {
                digit: digit as u8,
                confidence,
            })
            .collect();

        Ok(PredictionResult {
            digit: digit as u8,
            confidence: confidence.clamp(0.0, 1.0),
            alternatives,
        })
    }
}

/// Runs the classifier and validates the `[members, 10]` output.
fn run_classifier(
    classifier: &dyn DigitClassifier,
    batch: &crate::core::batch::Tensor4D,
    members: usize,
) -> Result<Tensor2D, DigitError> {
    let scores = classifier.predict_batch(batch)?;
    if scores.dim() != (members, NUM_CLASSES) {
        return Err(DigitError::inference_message(format!(
            "classifier returned shape {:?}, expected ({members}, {NUM_CLASSES})",
            scores.dim()
        )));
    }
    ensure_distributions(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::batch::Tensor4D;
    use ndarray::{Array2, Axis};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores every member with a fixed row and counts calls.
    #[derive(Debug)]
    struct FixedClassifier {
        row: Vec<f32>,
        calls: AtomicUsize,
        fail_batches: bool,
    }

    impl FixedClassifier {
        fn new(row: Vec<f32>) -> Self {
            Self {
                row,
                calls: AtomicUsize::new(0),
                fail_batches: false,
            }
        }
    }

    impl DigitClassifier for FixedClassifier {
        fn predict_batch(&self, batch: &Tensor4D) -> Result<Tensor2D, DigitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = batch.len_of(Axis(0));
            if self.fail_batches && n > 1 {
                return Err(DigitError::inference_message("batch too large"));
            }
            Ok(Array2::from_shape_fn((n, NUM_CLASSES), |(_, c)| self.row[c]))
        }
    }

    /// Prefers class 3 for the untouched digit and class 8 for every perturbation.
    #[derive(Debug)]
    struct PerturbationSensitive;

    impl DigitClassifier for PerturbationSensitive {
        fn predict_batch(&self, batch: &Tensor4D) -> Result<Tensor2D, DigitError> {
            let n = batch.len_of(Axis(0));
            Ok(Array2::from_shape_fn((n, NUM_CLASSES), |(i, c)| {
                match (i, c) {
                    (0, 3) => 1.0,
                    (i, 8) if i > 0 => 1.0,
                    _ => 0.0,
                }
            }))
        }
    }

    fn digit() -> CanonicalDigit {
        let mut plane = Array2::<f32>::zeros((28, 28));
        plane.slice_mut(ndarray::s![6..22, 12..16]).fill(1.0);
        CanonicalDigit::from_plane(plane).unwrap()
    }

    fn peaked(winner: usize) -> Vec<f32> {
        let mut row = vec![0.02; NUM_CLASSES];
        row[winner] = 0.82;
        row
    }

    #[test]
    fn test_single_pass_ranks_distribution() {
        let mut row = peaked(7);
        row[1] = 0.05;
        row[2] = 0.05;
        row[0] = 0.0;
        row[3] = 0.0;
        row[7] = 0.80;
        let classifier = FixedClassifier::new(row);
        let result = EnsemblePredictor::new()
            .classify(&digit(), &classifier, false)
            .unwrap();
        assert_eq!(result.digit, 7);
        assert!((result.confidence - 0.80).abs() < 1e-6);
        assert_eq!(result.alternatives.len(), 2);
        assert_eq!(result.alternatives[0].digit, 1);
        assert_eq!(result.alternatives[1].digit, 2);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_augmented_path_uses_one_batched_call() {
        let classifier = FixedClassifier::new(peaked(4));
        let result = EnsemblePredictor::new()
            .classify(&digit(), &classifier, true)
            .unwrap();
        assert_eq!(result.digit, 4);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_augmented_average_differs_from_single() {
        let predictor = EnsemblePredictor::new();
        let single = predictor.classify(&digit(), &PerturbationSensitive, false).unwrap();
        let averaged = predictor.classify(&digit(), &PerturbationSensitive, true).unwrap();
        assert_eq!(single.digit, 3);
        assert_eq!(averaged.digit, 8);
        assert!((averaged.confidence - 6.0 / 7.0).abs() < 1e-5);
        assert_eq!(averaged.alternatives[0].digit, 3);
    }

    #[test]
    fn test_batch_failure_falls_back_to_single_pass() {
        let mut classifier = FixedClassifier::new(peaked(5));
        classifier.fail_batches = true;
        let result = EnsemblePredictor::new()
            .classify(&digit(), &classifier, true)
            .unwrap();
        assert_eq!(result.digit, 5);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ties_resolve_to_lowest_digit() {
        let classifier = FixedClassifier::new(vec![0.1; NUM_CLASSES]);
        let result = EnsemblePredictor::new()
            .classify(&digit(), &classifier, true)
            .unwrap();
        assert_eq!(result.digit, 0);
        assert_eq!(result.alternatives[0].digit, 1);
        assert_eq!(result.alternatives[1].digit, 2);
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let mut row = vec![0.0; NUM_CLASSES];
        row[9] = 5.0;
        let classifier = FixedClassifier::new(row);
        let result = EnsemblePredictor::new()
            .classify(&digit(), &classifier, false)
            .unwrap();
        assert_eq!(result.digit, 9);
        assert!(result.confidence > 0.9 && result.confidence <= 1.0);
        assert!(result
            .alternatives
            .iter()
            .all(|alt| alt.confidence <= result.confidence));
    }

    #[test]
    fn test_wrong_output_shape_is_an_error() {
        #[derive(Debug)]
        struct Narrow;
        impl DigitClassifier for Narrow {
            fn predict_batch(&self, batch: &Tensor4D) -> Result<Tensor2D, DigitError> {
                Ok(Array2::zeros((batch.len_of(Axis(0)), 3)))
            }
        }
        assert!(EnsemblePredictor::new()
            .classify(&digit(), &Narrow, true)
            .is_err());
    }
}
