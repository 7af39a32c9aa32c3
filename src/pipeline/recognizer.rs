//! Synchronous recognition pipeline.
//!
//! [`DigitPipeline`] wires the Normalizer, Segmenter and Ensemble Predictor
//! together. Every method is a pure CPU-bound transform over its inputs and is
//! safe to call from many threads at once; admission control and the async
//! facade live in [`service`](super::service).

use crate::core::config::RecognizerConfig;
use crate::core::errors::DigitError;
use crate::core::predictions::{DetectedDigit, MultiDigitPrediction, SinglePrediction};
use crate::core::traits::DigitClassifier;
use crate::predictor::EnsemblePredictor;
use crate::processors::normalization::{DigitNormalizer, NormalizedDigit};
use crate::processors::segmentation::{Region, Segmenter};
use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, instrument};

/// Normalise, segment and classify digit images.
#[derive(Debug, Clone)]
pub struct DigitPipeline {
    normalizer: DigitNormalizer,
    segmenter: Segmenter,
    predictor: EnsemblePredictor,
    use_augmentation: bool,
    region_margin: f32,
    parallel_threshold: usize,
}

impl Default for DigitPipeline {
    fn default() -> Self {
        Self::from_config(&RecognizerConfig::default())
    }
}

impl DigitPipeline {
    /// Builds a pipeline from the tunables in `config`.
    pub fn from_config(config: &RecognizerConfig) -> Self {
        Self {
            normalizer: DigitNormalizer::new(),
            segmenter: Segmenter::new(config.min_contour_size),
            predictor: EnsemblePredictor::new(),
            use_augmentation: config.enable_augmentation,
            region_margin: config.region_margin,
            parallel_threshold: config.parallel_region_threshold,
        }
    }

    /// Whether classification averages over augmentations.
    pub fn augmentation_enabled(&self) -> bool {
        self.use_augmentation
    }

    /// Replaces the ensemble predictor.
    pub fn with_predictor(mut self, predictor: EnsemblePredictor) -> Self {
        self.predictor = predictor;
        self
    }

    /// The normalizer used for every crop.
    pub fn normalizer(&self) -> &DigitNormalizer {
        &self.normalizer
    }

    /// Recognises the single digit in `raw`.
    ///
    /// An image without foreground is classified as the blank digit and still
    /// yields a well-formed result.
    #[instrument(skip_all, fields(width = raw.width(), height = raw.height()))]
    pub fn predict_single(
        &self,
        raw: &GrayImage,
        classifier: &dyn DigitClassifier,
    ) -> Result<SinglePrediction, DigitError> {
        let normalized = self.normalizer.normalize(raw);
        let prediction =
            self.predictor
                .classify(&normalized.digit, classifier, self.use_augmentation)?;
        debug!(
            digit = prediction.digit,
            confidence = prediction.confidence,
            fallback = normalized.is_fallback,
            "Single digit classified"
        );
        Ok(SinglePrediction {
            prediction,
            preview_png: normalized.preview_png,
        })
    }

    /// Recognises every digit in `raw` using the configured minimum region size.
    pub fn predict_multi(
        &self,
        raw: &GrayImage,
        classifier: &dyn DigitClassifier,
    ) -> Result<MultiDigitPrediction, DigitError> {
        self.predict_multi_with_min_size(raw, self.segmenter.min_size(), classifier)
    }

    /// Recognises every digit in `raw`, discarding regions smaller than `min_size`.
    ///
    /// Results are in left-to-right order. Either every region is scored or
    /// the whole call fails.
    #[instrument(skip_all, fields(width = raw.width(), height = raw.height(), min_size = min_size))]
    pub fn predict_multi_with_min_size(
        &self,
        raw: &GrayImage,
        min_size: u32,
        classifier: &dyn DigitClassifier,
    ) -> Result<MultiDigitPrediction, DigitError> {
        let regions = if min_size == self.segmenter.min_size() {
            self.segmenter.segment(raw)
        } else {
            Segmenter::new(min_size).segment(raw)
        };
        debug!(regions = regions.len(), "Segmented input");

        let digits: Vec<DetectedDigit> = if regions.len() > self.parallel_threshold {
            regions
                .par_iter()
                .map(|region| self.classify_region(region, classifier))
                .collect::<Result<_, _>>()?
        } else {
            regions
                .iter()
                .map(|region| self.classify_region(region, classifier))
                .collect::<Result<_, _>>()?
        };

        Ok(MultiDigitPrediction::from_digits(digits))
    }

    /// Normalises one region after adding the configured margin.
    pub fn normalize_region(&self, region: &Region) -> NormalizedDigit {
        self.normalizer
            .normalize(&region.with_margin(self.region_margin))
    }

    fn classify_region(
        &self,
        region: &Region,
        classifier: &dyn DigitClassifier,
    ) -> Result<DetectedDigit, DigitError> {
        let normalized = self.normalize_region(region);
        let prediction =
            self.predictor
                .classify(&normalized.digit, classifier, self.use_augmentation)?;
        Ok(DetectedDigit {
            bbox: region.bbox,
            prediction,
            preview_png: normalized.preview_png,
        })
    }
}
