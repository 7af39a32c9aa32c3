//! Async recognition service.
//!
//! [`RecognitionService`] is the surface an HTTP or CLI layer talks to. Each
//! request goes through the same steps:
//!
//! 1. refuse with [`RecognitionError::Unavailable`] when no classifier is
//!    loaded, before touching the rate log
//! 2. admission through the [`AdmissionGovernor`] (rate gate, then a wait for
//!    a concurrency slot)
//! 3. decoding and the CPU-bound pipeline on tokio's blocking pool, holding the
//!    admission ticket until the work finishes
//! 4. fire-and-forget notification of the configured observer
//!
//! A panic inside the pipeline surfaces as [`RecognitionError::Internal`];
//! the ticket is released during unwinding.

use crate::core::config::{ConfigValidator, RecognizerConfig};
use crate::core::errors::{DigitError, RecognitionError};
use crate::core::predictions::{MultiDigitPrediction, SinglePrediction};
use crate::core::traits::DigitClassifier;
use crate::pipeline::governor::{AdmissionGovernor, RateLimitStore};
use crate::pipeline::observer::{DebugDumpObserver, PredictionObserver};
use crate::pipeline::recognizer::DigitPipeline;
use crate::pipeline::stats::{PipelineStats, StatsManager};
use crate::utils::image::decode_gray;
use chrono::{DateTime, Utc};
use image::GrayImage;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{error, info, instrument};

/// An 8-bit grayscale image as received from a caller.
pub type RawImage = GrayImage;

/// Description of the loaded model, for model-info endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    /// Name reported by the classifier, `"none"` when nothing is loaded.
    pub model_name: String,
    /// Configured model file.
    pub model_path: Option<PathBuf>,
    /// Configured model version.
    pub model_version: String,
    /// Whether a classifier is installed.
    pub model_loaded: bool,
    /// Whether the augmentation ensemble is used.
    pub augmentation_enabled: bool,
    /// Size of the model file.
    pub file_size_bytes: Option<u64>,
    /// Modification time of the model file.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Liveness summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    /// `"healthy"` with a classifier, `"degraded"` without.
    pub status: String,
    /// Whether a classifier is installed.
    pub model_loaded: bool,
    /// When the status was taken.
    pub timestamp: DateTime<Utc>,
}

/// Admission-controlled entry point to the recognition pipeline.
#[derive(Debug)]
pub struct RecognitionService {
    config: RecognizerConfig,
    pipeline: Arc<DigitPipeline>,
    governor: AdmissionGovernor,
    classifier: RwLock<Option<Arc<dyn DigitClassifier>>>,
    observer: Option<Arc<dyn PredictionObserver>>,
    stats: StatsManager,
}

impl RecognitionService {
    /// Creates a service from a validated configuration.
    ///
    /// When `config.debug_dump_dir` is set a [`DebugDumpObserver`] is
    /// installed.
    ///
    /// # Errors
    ///
    /// Returns `DigitError::ConfigError` for invalid settings and
    /// `DigitError::Io` if the debug directory cannot be created.
    pub fn new(
        config: RecognizerConfig,
        classifier: Option<Arc<dyn DigitClassifier>>,
    ) -> Result<Self, DigitError> {
        config.validate()?;
        let observer = match &config.debug_dump_dir {
            Some(dir) => {
                Some(Arc::new(DebugDumpObserver::new(dir.clone())?) as Arc<dyn PredictionObserver>)
            }
            None => None,
        };
        info!(
            augmentation = config.enable_augmentation,
            capacity = config.max_concurrent_predictions,
            rate_limit = config.rate_limit_per_minute,
            model_loaded = classifier.is_some(),
            "Recognition service created"
        );
        Ok(Self {
            pipeline: Arc::new(DigitPipeline::from_config(&config)),
            governor: AdmissionGovernor::new(
                config.max_concurrent_predictions,
                config.rate_limit_per_minute,
            ),
            classifier: RwLock::new(classifier),
            observer,
            stats: StatsManager::new(),
            config,
        })
    }

    /// Creates a service, loading the ONNX model named in the configuration.
    ///
    /// A model that fails to load is logged and the service starts without a
    /// classifier, answering [`RecognitionError::Unavailable`] until one is
    /// installed with [`set_classifier`](Self::set_classifier).
    #[cfg(feature = "onnx")]
    pub fn from_config(config: RecognizerConfig) -> Result<Self, DigitError> {
        let classifier = match &config.model_path {
            Some(path) => match crate::core::inference::OrtDigitClassifier::new(path) {
                Ok(classifier) => Some(Arc::new(classifier) as Arc<dyn DigitClassifier>),
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Failed to load model");
                    None
                }
            },
            None => None,
        };
        Self::new(config, classifier)
    }

    /// Replaces the admission governor's rate store.
    pub fn with_rate_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.governor = AdmissionGovernor::with_store(
            self.config.max_concurrent_predictions,
            self.config.rate_limit_per_minute,
            store,
        );
        self
    }

    /// Installs an observer, replacing any configured one.
    pub fn with_observer(mut self, observer: Arc<dyn PredictionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// The admission governor.
    pub fn governor(&self) -> &AdmissionGovernor {
        &self.governor
    }

    /// Installs or replaces the classifier.
    pub fn set_classifier(&self, classifier: Arc<dyn DigitClassifier>) {
        info!(classifier = classifier.name(), "Classifier installed");
        *self.classifier.write().unwrap_or_else(PoisonError::into_inner) = Some(classifier);
    }

    /// Removes the classifier; requests are refused until a new one is set.
    pub fn unload_classifier(&self) {
        info!("Classifier unloaded");
        *self.classifier.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether a classifier is loaded.
    pub fn classifier_available(&self) -> bool {
        self.current_classifier().is_some()
    }

    fn current_classifier(&self) -> Option<Arc<dyn DigitClassifier>> {
        self.classifier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recognises the single digit in a decoded image.
    #[instrument(skip_all, fields(caller = %caller))]
    pub async fn predict_single(
        &self,
        caller: &str,
        raw: RawImage,
    ) -> Result<SinglePrediction, RecognitionError> {
        self.single(caller, move || Ok(raw)).await
    }

    /// Decodes `bytes` once admitted and recognises the single digit.
    #[instrument(skip_all, fields(caller = %caller, len = bytes.len()))]
    pub async fn predict_single_encoded(
        &self,
        caller: &str,
        bytes: &[u8],
    ) -> Result<SinglePrediction, RecognitionError> {
        let bytes = bytes.to_vec();
        self.single(caller, move || decode_gray(&bytes)).await
    }

    /// Recognises every digit in a decoded image.
    #[instrument(skip_all, fields(caller = %caller))]
    pub async fn predict_multi(
        &self,
        caller: &str,
        raw: RawImage,
    ) -> Result<MultiDigitPrediction, RecognitionError> {
        let min_size = self.config.min_contour_size;
        self.multi(caller, min_size, move || Ok(raw)).await
    }

    /// Recognises every digit, discarding regions smaller than `min_size`.
    #[instrument(skip_all, fields(caller = %caller))]
    pub async fn predict_multi_with_min_size(
        &self,
        caller: &str,
        raw: RawImage,
        min_size: u32,
    ) -> Result<MultiDigitPrediction, RecognitionError> {
        self.multi(caller, min_size, move || Ok(raw)).await
    }

    /// Decodes `bytes` once admitted and recognises every digit.
    #[instrument(skip_all, fields(caller = %caller, len = bytes.len()))]
    pub async fn predict_multi_encoded(
        &self,
        caller: &str,
        bytes: &[u8],
    ) -> Result<MultiDigitPrediction, RecognitionError> {
        let bytes = bytes.to_vec();
        let min_size = self.config.min_contour_size;
        self.multi(caller, min_size, move || decode_gray(&bytes)).await
    }

    async fn single<L>(&self, caller: &str, load: L) -> Result<SinglePrediction, RecognitionError>
    where
        L: FnOnce() -> Result<RawImage, DigitError> + Send + 'static,
    {
        let started = Instant::now();
        let outcome = self
            .run_admitted(caller, move |pipeline, classifier| {
                let raw = load().map_err(RecognitionError::BadInput)?;
                let result = pipeline.predict_single(&raw, classifier)?;
                Ok((raw, result))
            })
            .await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok((raw, result)) => {
                self.stats.record_success(1, elapsed_ms);
                if let Some(observer) = &self.observer {
                    let observer = Arc::clone(observer);
                    let snapshot = result.clone();
                    tokio::task::spawn_blocking(move || observer.on_single(&raw, &snapshot));
                }
                Ok(result)
            }
            Err(err) => {
                self.stats.record_error(&err, elapsed_ms);
                Err(err)
            }
        }
    }

    async fn multi<L>(
        &self,
        caller: &str,
        min_size: u32,
        load: L,
    ) -> Result<MultiDigitPrediction, RecognitionError>
    where
        L: FnOnce() -> Result<RawImage, DigitError> + Send + 'static,
    {
        let started = Instant::now();
        let outcome = self
            .run_admitted(caller, move |pipeline, classifier| {
                let raw = load().map_err(RecognitionError::BadInput)?;
                let result = pipeline.predict_multi_with_min_size(&raw, min_size, classifier)?;
                Ok((raw, result))
            })
            .await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok((raw, result)) => {
                self.stats.record_success(result.count(), elapsed_ms);
                if let Some(observer) = &self.observer {
                    let observer = Arc::clone(observer);
                    let snapshot = result.clone();
                    tokio::task::spawn_blocking(move || observer.on_multi(&raw, &snapshot));
                }
                Ok(result)
            }
            Err(err) => {
                self.stats.record_error(&err, elapsed_ms);
                Err(err)
            }
        }
    }

    /// Availability check, admission, then `work` on the blocking pool.
    ///
    /// The ticket moves into the blocking closure so the slot stays taken
    /// until the work has actually finished, even if the caller stops waiting.
    async fn run_admitted<T, W>(&self, caller: &str, work: W) -> Result<T, RecognitionError>
    where
        T: Send + 'static,
        W: FnOnce(&DigitPipeline, &dyn DigitClassifier) -> Result<T, RecognitionError>
            + Send
            + 'static,
    {
        let classifier = self
            .current_classifier()
            .ok_or(RecognitionError::Unavailable)?;
        let ticket = self.governor.admit(caller).await?;
        let pipeline = Arc::clone(&self.pipeline);

        let joined = tokio::task::spawn_blocking(move || {
            let _ticket = ticket;
            work(&pipeline, classifier.as_ref())
        })
        .await;

        match joined {
            Ok(result) => {
                if let Err(RecognitionError::Internal { message }) = &result {
                    error!(caller, %message, "Prediction failed");
                }
                result
            }
            Err(join_err) => {
                error!(caller, error = %join_err, "Prediction task aborted");
                Err(RecognitionError::internal(if join_err.is_panic() {
                    "prediction task panicked"
                } else {
                    "prediction task was cancelled"
                }))
            }
        }
    }

    /// Model metadata, including file size and modification time when the
    /// configured model file exists.
    pub fn model_info(&self) -> ModelInfo {
        let classifier = self.current_classifier();
        let metadata = self
            .config
            .model_path
            .as_ref()
            .and_then(|path| std::fs::metadata(path).ok());
        ModelInfo {
            model_name: classifier
                .as_ref()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "none".to_string()),
            model_path: self.config.model_path.clone(),
            model_version: self.config.model_version.clone(),
            model_loaded: classifier.is_some(),
            augmentation_enabled: self.pipeline.augmentation_enabled(),
            file_size_bytes: metadata.as_ref().map(|m| m.len()),
            last_modified: metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
        }
    }

    /// Current health.
    pub fn health(&self) -> HealthStatus {
        let model_loaded = self.classifier_available();
        HealthStatus {
            status: if model_loaded { "healthy" } else { "degraded" }.to_string(),
            model_loaded,
            timestamp: Utc::now(),
        }
    }

    /// Snapshot of request statistics.
    pub fn stats(&self) -> PipelineStats {
        self.stats.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::batch::{Tensor2D, Tensor4D};
    use crate::core::traits::NUM_CLASSES;
    use image::Luma;
    use ndarray::{Array2, Axis};

    #[derive(Debug)]
    struct Constant(usize);

    impl DigitClassifier for Constant {
        fn predict_batch(&self, batch: &Tensor4D) -> Result<Tensor2D, DigitError> {
            let n = batch.len_of(Axis(0));
            Ok(Array2::from_shape_fn((n, NUM_CLASSES), |(_, c)| {
                if c == self.0 { 1.0 } else { 0.0 }
            }))
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    fn service(classifier: Option<Arc<dyn DigitClassifier>>) -> RecognitionService {
        RecognitionService::new(RecognizerConfig::default(), classifier).unwrap()
    }

    #[tokio::test]
    async fn test_unavailable_without_classifier() {
        let service = service(None);
        let err = service
            .predict_single("c", GrayImage::new(10, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Unavailable));
        assert_eq!(service.governor().recent_requests("c"), 0);
        assert_eq!(service.health().status, "degraded");
        assert_eq!(service.stats().unavailable, 1);
    }

    #[tokio::test]
    async fn test_hot_loaded_classifier_serves_requests() {
        let service = service(None);
        service.set_classifier(Arc::new(Constant(6)));
        let raw = GrayImage::from_fn(30, 30, |x, _| Luma([if (12..18).contains(&x) { 0 } else { 255 }]));
        let result = service.predict_single("c", raw).await.unwrap();
        assert_eq!(result.prediction.digit, 6);
        assert_eq!(service.model_info().model_name, "constant");
        assert!(service.health().model_loaded);
        assert_eq!(service.stats().successful_predictions, 1);
        assert_eq!(service.governor().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_are_bad_input() {
        let service = service(Some(Arc::new(Constant(1))));
        let err = service
            .predict_multi_encoded("c", b"not an image")
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::BadInput(_)));
        assert_eq!(err.status_code(), 400);
        assert_eq!(service.stats().failed_predictions, 1);
        assert_eq!(service.governor().in_flight(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RecognizerConfig::default().with_max_concurrent_predictions(0);
        assert!(RecognitionService::new(config, None).is_err());
    }

    #[test]
    fn test_model_info_without_file() {
        let service = service(None);
        let info = service.model_info();
        assert!(!info.model_loaded);
        assert_eq!(info.model_name, "none");
        assert_eq!(info.model_version, "1.0.0");
        assert!(info.file_size_bytes.is_none());
        assert!(info.augmentation_enabled);
    }
}
