//! Configuration for the digit recognition service.
//!
//! [`RecognizerConfig`] gathers the deployment-time tunables: augmentation,
//! segmentation thresholds, the concurrency and rate ceilings of the admission
//! governor, and the optional debug dump directory. Values can come from serde
//! (JSON/TOML files), from the builder methods, or from `DIGIT_*` environment
//! variables via [`RecognizerConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Default number of pipeline invocations allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_PREDICTIONS: usize = 10;
/// Default request ceiling per caller within the rate window.
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: usize = 60;
/// Default minimum side length (pixels) of a segmented region.
pub const DEFAULT_MIN_CONTOUR_SIZE: u32 = 10;
/// Default margin added around segmented regions, as a fraction of the larger side.
pub const DEFAULT_REGION_MARGIN: f32 = 0.2;

const MAX_CONCURRENT_PREDICTIONS_LIMIT: usize = 256;

/// Errors that can occur during configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error indicating that a model path does not exist.
    #[error("model path does not exist: {path}")]
    ModelPathNotFound { path: PathBuf },

    /// Error indicating that a configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Error indicating that a resource limit has been exceeded.
    #[error("resource limit exceeded: {message}")]
    ResourceLimitExceeded { message: String },
}

/// A trait for validating configuration parameters.
pub trait ConfigValidator {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Returns the default configuration.
    fn get_defaults() -> Self
    where
        Self: Sized;

    /// Validates that a model path exists and is a file.
    fn validate_model_path(&self, path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            Err(ConfigError::ModelPathNotFound {
                path: path.to_path_buf(),
            })
        } else if !path.is_file() {
            Err(ConfigError::InvalidConfig {
                message: format!("model path is not a file: {}", path.display()),
            })
        } else {
            Ok(())
        }
    }

    /// Validates that a count is at least 1.
    fn validate_positive_usize(&self, value: usize, name: &str) -> Result<(), ConfigError> {
        if value == 0 {
            Err(ConfigError::InvalidConfig {
                message: format!("{name} must be greater than 0"),
            })
        } else {
            Ok(())
        }
    }

    /// Validates that a fraction lies in `[0, 1]`.
    fn validate_unit_interval(&self, value: f32, name: &str) -> Result<(), ConfigError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            Err(ConfigError::InvalidConfig {
                message: format!("{name} must be within [0, 1], got {value}"),
            })
        } else {
            Ok(())
        }
    }
}

/// Deployment-time configuration for the recognition pipeline and governor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizerConfig {
    /// Path to the classifier model file, if one should be loaded at startup.
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Version string reported by model-info queries.
    #[serde(default = "RecognizerConfig::default_model_version")]
    pub model_version: String,

    /// Average predictions over shifted, rotated and thickened copies of each digit.
    /// Applied uniformly to single and multi-digit requests.
    #[serde(default = "RecognizerConfig::default_enable_augmentation")]
    pub enable_augmentation: bool,

    /// Regions narrower or shorter than this (pixels) are discarded as noise.
    #[serde(default = "RecognizerConfig::default_min_contour_size")]
    pub min_contour_size: u32,

    /// Margin added around each region before normalisation, as a fraction
    /// of the region's larger side. `0.0` disables the margin.
    #[serde(default = "RecognizerConfig::default_region_margin")]
    pub region_margin: f32,

    /// Capacity of the concurrency gate.
    #[serde(default = "RecognizerConfig::default_max_concurrent_predictions")]
    pub max_concurrent_predictions: usize,

    /// Maximum requests per caller within a 60 second window.
    #[serde(default = "RecognizerConfig::default_rate_limit_per_minute")]
    pub rate_limit_per_minute: usize,

    /// When set, inputs and previews are written here after each request.
    #[serde(default)]
    pub debug_dump_dir: Option<PathBuf>,

    /// Regions beyond this count are classified in parallel.
    #[serde(default = "RecognizerConfig::default_parallel_region_threshold")]
    pub parallel_region_threshold: usize,
}

impl RecognizerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    fn default_model_version() -> String {
        "1.0.0".to_string()
    }

    fn default_enable_augmentation() -> bool {
        true
    }

    fn default_min_contour_size() -> u32 {
        DEFAULT_MIN_CONTOUR_SIZE
    }

    fn default_region_margin() -> f32 {
        DEFAULT_REGION_MARGIN
    }

    fn default_max_concurrent_predictions() -> usize {
        DEFAULT_MAX_CONCURRENT_PREDICTIONS
    }

    fn default_rate_limit_per_minute() -> usize {
        DEFAULT_RATE_LIMIT_PER_MINUTE
    }

    fn default_parallel_region_threshold() -> usize {
        1
    }

    /// Sets the model path.
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Sets the reported model version.
    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = version.into();
        self
    }

    /// Enables or disables the augmentation ensemble.
    pub fn with_augmentation(mut self, enabled: bool) -> Self {
        self.enable_augmentation = enabled;
        self
    }

    /// Sets the minimum region size.
    pub fn with_min_contour_size(mut self, size: u32) -> Self {
        self.min_contour_size = size;
        self
    }

    /// Sets the region margin fraction.
    pub fn with_region_margin(mut self, margin: f32) -> Self {
        self.region_margin = margin;
        self
    }

    /// Sets the concurrency gate capacity.
    pub fn with_max_concurrent_predictions(mut self, capacity: usize) -> Self {
        self.max_concurrent_predictions = capacity;
        self
    }

    /// Sets the per-caller request ceiling.
    pub fn with_rate_limit_per_minute(mut self, limit: usize) -> Self {
        self.rate_limit_per_minute = limit;
        self
    }

    /// Sets the debug dump directory.
    pub fn with_debug_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dump_dir = Some(dir.into());
        self
    }

    /// Sets the parallel region threshold.
    pub fn with_parallel_region_threshold(mut self, threshold: usize) -> Self {
        self.parallel_region_threshold = threshold;
        self
    }

    /// Reads the configuration from `DIGIT_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("DIGIT_"))
            .collect();
        Self::from_env_map(&vars)
    }

    /// Builds the configuration from an explicit variable map.
    ///
    /// Recognised keys: `DIGIT_MODEL_PATH`, `DIGIT_MODEL_VERSION`,
    /// `DIGIT_ENABLE_AUGMENTATION`, `DIGIT_MIN_CONTOUR_SIZE`,
    /// `DIGIT_REGION_MARGIN`, `DIGIT_MAX_CONCURRENT_PREDICTIONS`,
    /// `DIGIT_RATE_LIMIT_PER_MINUTE`, `DIGIT_DEBUG_DIR`.
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = non_empty(vars, "DIGIT_MODEL_PATH") {
            config.model_path = Some(PathBuf::from(path));
        }
        if let Some(version) = non_empty(vars, "DIGIT_MODEL_VERSION") {
            config.model_version = version.to_string();
        }
        if let Some(flag) = non_empty(vars, "DIGIT_ENABLE_AUGMENTATION") {
            config.enable_augmentation = parse_bool("DIGIT_ENABLE_AUGMENTATION", flag)?;
        }
        if let Some(value) = non_empty(vars, "DIGIT_MIN_CONTOUR_SIZE") {
            config.min_contour_size = parse_value("DIGIT_MIN_CONTOUR_SIZE", value)?;
        }
        if let Some(value) = non_empty(vars, "DIGIT_REGION_MARGIN") {
            config.region_margin = parse_value("DIGIT_REGION_MARGIN", value)?;
        }
        if let Some(value) = non_empty(vars, "DIGIT_MAX_CONCURRENT_PREDICTIONS") {
            config.max_concurrent_predictions =
                parse_value("DIGIT_MAX_CONCURRENT_PREDICTIONS", value)?;
        }
        if let Some(value) = non_empty(vars, "DIGIT_RATE_LIMIT_PER_MINUTE") {
            config.rate_limit_per_minute = parse_value("DIGIT_RATE_LIMIT_PER_MINUTE", value)?;
        }
        if let Some(dir) = non_empty(vars, "DIGIT_DEBUG_DIR") {
            config.debug_dump_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidConfig {
            message: format!("{key} must be a boolean, got '{value}'"),
        }),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::InvalidConfig {
        message: format!("{key} has an unparsable value '{value}'"),
    })
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            model_version: Self::default_model_version(),
            enable_augmentation: Self::default_enable_augmentation(),
            min_contour_size: Self::default_min_contour_size(),
            region_margin: Self::default_region_margin(),
            max_concurrent_predictions: Self::default_max_concurrent_predictions(),
            rate_limit_per_minute: Self::default_rate_limit_per_minute(),
            debug_dump_dir: None,
            parallel_region_threshold: Self::default_parallel_region_threshold(),
        }
    }
}

impl ConfigValidator for RecognizerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_contour_size == 0 {
            return Err(ConfigError::InvalidConfig {
                message: "min_contour_size must be greater than 0".to_string(),
            });
        }
        self.validate_unit_interval(self.region_margin, "region_margin")?;
        self.validate_positive_usize(
            self.max_concurrent_predictions,
            "max_concurrent_predictions",
        )?;
        if self.max_concurrent_predictions > MAX_CONCURRENT_PREDICTIONS_LIMIT {
            return Err(ConfigError::ResourceLimitExceeded {
                message: format!(
                    "max_concurrent_predictions {} exceeds limit {}",
                    self.max_concurrent_predictions, MAX_CONCURRENT_PREDICTIONS_LIMIT
                ),
            });
        }
        self.validate_positive_usize(self.rate_limit_per_minute, "rate_limit_per_minute")?;
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}
