//! ONNX Runtime backed digit classifier.
//!
//! Models exported from Keras usually take NHWC input (`[N, 28, 28, 1]`)
//! while PyTorch exports take NCHW (`[N, 1, 28, 28]`). The layout is read
//! from the model's declared input shape, and batches are transposed before
//! the forward pass when needed.

use crate::core::batch::{Tensor2D, Tensor4D};
use crate::core::errors::{DigitError, SimpleError};
use crate::core::traits::{DigitClassifier, NUM_CLASSES};
use ndarray::ArrayView2;
use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Memory layout expected by the model's input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[batch, channels, height, width]`
    Nchw,
    /// `[batch, height, width, channels]`
    Nhwc,
}

impl TensorLayout {
    /// Infers the layout from a declared input shape. Dynamic dims are `-1`.
    pub fn from_input_shape(shape: &[i64]) -> Self {
        match shape {
            [_, _, _, 1] => TensorLayout::Nhwc,
            _ => TensorLayout::Nchw,
        }
    }
}

/// Creates an ONNX Runtime session with quiet logging.
pub fn load_session(model_path: impl AsRef<Path>) -> Result<Session, DigitError> {
    let path = model_path.as_ref();
    if !path.exists() {
        return Err(DigitError::config_error(format!(
            "model file not found: {}",
            path.display()
        )));
    }
    let session = Session::builder()?
        .with_log_level(LogLevel::Error)?
        .commit_from_file(path)?;
    Ok(session)
}

/// A [`DigitClassifier`] running an ONNX model.
///
/// Holds a small pool of sessions selected round-robin; each session is
/// guarded by its own mutex because a forward pass needs exclusive access.
pub struct OrtDigitClassifier {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_name: String,
    output_name: String,
    layout: TensorLayout,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OrtDigitClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtDigitClassifier")
            .field("sessions", &self.sessions.len())
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("layout", &self.layout)
            .field("model_path", &self.model_path)
            .finish()
    }
}

impl OrtDigitClassifier {
    /// Loads a single-session classifier.
    pub fn new(model_path: impl AsRef<Path>) -> Result<Self, DigitError> {
        Self::with_pool_size(model_path, 1)
    }

    /// Loads a classifier with `pool_size` independent sessions.
    pub fn with_pool_size(model_path: impl AsRef<Path>, pool_size: usize) -> Result<Self, DigitError> {
        let path = model_path.as_ref();
        let mut sessions = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            sessions.push(Mutex::new(load_session(path)?));
        }

        let (input_name, output_name, layout) = {
            let first = sessions[0]
                .lock()
                .map_err(|_| DigitError::inference_message("session lock poisoned"))?;
            let input = first
                .inputs
                .first()
                .ok_or_else(|| DigitError::config_error("model declares no inputs"))?;
            let layout = match &input.input_type {
                ValueType::Tensor { shape, .. } => {
                    let dims: Vec<i64> = shape.iter().copied().collect();
                    TensorLayout::from_input_shape(&dims)
                }
                _ => TensorLayout::Nchw,
            };
            let output = first
                .outputs
                .first()
                .ok_or_else(|| DigitError::config_error("model declares no outputs"))?;
            (input.name.clone(), output.name.clone(), layout)
        };

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        info!(
            model = %path.display(),
            input = %input_name,
            output = %output_name,
            ?layout,
            sessions = sessions.len(),
            "Loaded digit classifier"
        );

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_name,
            output_name,
            layout,
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    /// The model file this classifier was loaded from.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Input layout detected from the model.
    pub fn layout(&self) -> TensorLayout {
        self.layout
    }
}

impl DigitClassifier for OrtDigitClassifier {
    fn predict_batch(&self, batch: &Tensor4D) -> Result<Tensor2D, DigitError> {
        let batch_size = batch.shape()[0];
        let prepared;
        let input = match self.layout {
            TensorLayout::Nchw => batch.view(),
            TensorLayout::Nhwc => {
                prepared = batch.view().permuted_axes([0, 2, 3, 1]).as_standard_layout().to_owned();
                prepared.view()
            }
        };

        let tensor = TensorRef::from_array_view(input)?;
        let inputs = ort::inputs![self.input_name.as_str() => tensor];

        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx].lock().map_err(|_| {
            DigitError::inference_error(SimpleError::new(format!(
                "failed to acquire session lock {idx}/{}",
                self.sessions.len()
            )))
        })?;
        let outputs = session.run(inputs)?;
        let (shape, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let rows = dims.first().copied().unwrap_or(0);
        let cols: usize = dims.iter().skip(1).product();
        if rows != batch_size || cols != NUM_CLASSES {
            return Err(DigitError::inference_message(format!(
                "model '{}' returned shape {dims:?} for a batch of {batch_size}",
                self.model_name
            )));
        }
        debug!(batch_size, session = idx, "Ran digit classifier");
        Ok(ArrayView2::from_shape((rows, cols), data)?.to_owned())
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
