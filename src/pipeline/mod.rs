//! The digit recognition pipeline.
//!
//! - [`recognizer`] holds the synchronous Normalizer → Segmenter → Ensemble
//!   chain.
//! - [`governor`] implements admission control (rate and concurrency gates).
//! - [`service`] is the async facade combining both.
//! - [`observer`] and [`stats`] are the service's reporting hooks.

pub mod governor;
pub mod observer;
pub mod recognizer;
pub mod service;
pub mod stats;

pub use governor::{
    AdmissionGovernor, AdmissionTicket, InMemoryRateStore, RateDecision, RateLimitStore,
    RATE_WINDOW,
};
pub use observer::{DebugDumpObserver, PredictionObserver};
pub use recognizer::DigitPipeline;
pub use service::{HealthStatus, ModelInfo, RawImage, RecognitionService};
pub use stats::{PipelineStats, StatsManager};
