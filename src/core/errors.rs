//! Error types for the digit recognition pipeline.
//!
//! Two layers of errors live here. [`DigitError`] covers failures inside the
//! library (image decoding, inference, tensor shapes, configuration).
//! [`RecognitionError`] is the taxonomy reported at the service boundary, where
//! admission decisions and internal faults are folded into a small set of
//! outcomes that an HTTP or CLI layer can map onto status codes.

use std::time::Duration;
use thiserror::Error;

/// Stage of the pipeline in which a processing error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Canonicalisation of a digit crop.
    Normalization,
    /// Area resampling.
    Resize,
    /// Construction of the augmentation batch.
    Augmentation,
    /// Ranking and result assembly.
    PostProcessing,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Normalization => write!(f, "normalization"),
            ProcessingStage::Resize => write!(f, "resize"),
            ProcessingStage::Augmentation => write!(f, "augmentation"),
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
        }
    }
}

/// Errors raised by the library components.
#[derive(Error, Debug)]
pub enum DigitError {
    /// The image bytes could not be decoded.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// A processing step failed.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The classifier failed to run.
    #[error("inference")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The input was rejected before processing.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// A configuration value is unusable.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[cfg(feature = "onnx")]
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the library.
pub type DigitResult<T> = Result<T, DigitError>;

impl DigitError {
    /// Creates a processing error for the given stage.
    pub fn processing_error(
        kind: ProcessingStage,
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.to_string(),
            source: Box::new(error),
        }
    }

    /// Creates a normalization error.
    pub fn normalization(
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_error(ProcessingStage::Normalization, context, error)
    }

    /// Creates a resize error.
    pub fn resize(context: &str, error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::processing_error(ProcessingStage::Resize, context, error)
    }

    /// Creates an augmentation error.
    pub fn augmentation(
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_error(ProcessingStage::Augmentation, context, error)
    }

    /// Wraps an error raised by a classifier backend.
    pub fn inference_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Inference(Box::new(error))
    }

    /// Creates an inference error from a plain message.
    pub fn inference_message(message: impl Into<String>) -> Self {
        Self::Inference(Box::new(SimpleError::new(message)))
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Creates a configuration error naming the offending field and value.
    pub fn config_error_with_context(field: &str, value: &str, reason: &str) -> Self {
        Self::ConfigError {
            message: format!(
                "Configuration error in field '{}' with value '{}': {}",
                field, value, reason
            ),
        }
    }
}

impl From<image::ImageError> for DigitError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl From<crate::core::config::ConfigError> for DigitError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::ConfigError {
            message: error.to_string(),
        }
    }
}

/// Plain message error used as a `source` where no richer error exists.
#[derive(Debug, Clone)]
pub struct SimpleError {
    message: String,
}

impl SimpleError {
    /// Creates a new error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SimpleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SimpleError {}

/// Outcome of a rejected or failed request at the service boundary.
///
/// "No foreground found" and "augmentation failed" never surface here; both
/// are recovered inside the pipeline and produce well-formed results.
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// The request payload could not be used (e.g. undecodable image bytes).
    #[error("bad input: {0}")]
    BadInput(#[source] DigitError),

    /// No classifier is loaded; the request was refused before admission.
    #[error("model not available, please try again later")]
    Unavailable,

    /// The caller exceeded its request ceiling for the current window.
    #[error("rate limit exceeded, retry after {}s", .retry_after.as_secs_f32().ceil())]
    RateLimited {
        /// Time until the oldest request in the caller's window expires.
        retry_after: Duration,
    },

    /// An unexpected fault while running the pipeline.
    #[error("prediction failed: {message}")]
    Internal {
        /// A description of the fault.
        message: String,
    },
}

impl RecognitionError {
    /// HTTP status code conventionally associated with this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            RecognitionError::BadInput(_) => 400,
            RecognitionError::RateLimited { .. } => 429,
            RecognitionError::Internal { .. } => 500,
            RecognitionError::Unavailable => 503,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecognitionError::Unavailable | RecognitionError::RateLimited { .. }
        )
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        RecognitionError::Internal {
            message: message.into(),
        }
    }
}

impl From<DigitError> for RecognitionError {
    fn from(error: DigitError) -> Self {
        match error {
            DigitError::ImageLoad(_) | DigitError::InvalidInput { .. } => {
                RecognitionError::BadInput(error)
            }
            other => RecognitionError::Internal {
                message: other.to_string(),
            },
        }
    }
}
