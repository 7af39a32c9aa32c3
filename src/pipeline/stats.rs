//! Service-wide statistics helpers.
//!
//! This module defines the `PipelineStats` structure used to track request
//! outcomes of the recognition service and the `StatsManager` helper that
//! coordinates thread-safe updates to these metrics.

use crate::core::errors::RecognitionError;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Statistics for the recognition service.
///
/// Tracks how many requests were handled, how they ended and the average
/// latency of the admitted ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    /// The total number of requests seen, rejected ones included.
    pub total_requests: usize,
    /// Requests that produced a result.
    pub successful_predictions: usize,
    /// Requests that failed with bad input or an internal fault.
    pub failed_predictions: usize,
    /// Requests rejected by the rate gate.
    pub rate_limited: usize,
    /// Requests refused because no classifier was loaded.
    pub unavailable: usize,
    /// Digits reported across all successful requests.
    pub digits_recognised: usize,
    /// The average latency of completed requests in milliseconds.
    pub average_latency_ms: f64,
}

impl PipelineStats {
    /// Creates a new PipelineStats instance with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the success rate as a percentage (0.0 to 100.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.successful_predictions as f64 / self.total_requests as f64) * 100.0
        }
    }

    /// Returns the share of requests turned away by admission, as a percentage.
    pub fn rejection_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            ((self.rate_limited + self.unavailable) as f64 / self.total_requests as f64) * 100.0
        }
    }

    fn completed(&self) -> usize {
        self.successful_predictions + self.failed_predictions
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Recognition Statistics:")?;
        writeln!(f, "  Total requests: {}", self.total_requests)?;
        writeln!(
            f,
            "  Successful: {} ({:.1}%)",
            self.successful_predictions,
            self.success_rate()
        )?;
        writeln!(f, "  Failed: {}", self.failed_predictions)?;
        writeln!(
            f,
            "  Rejected: {} rate limited, {} unavailable",
            self.rate_limited, self.unavailable
        )?;
        writeln!(f, "  Digits recognised: {}", self.digits_recognised)?;
        writeln!(f, "  Average latency: {:.2} ms", self.average_latency_ms)?;
        Ok(())
    }
}

/// Thread-safe manager for updating service statistics.
#[derive(Debug, Default)]
pub struct StatsManager {
    /// Shared statistics state guarded by a mutex.
    stats: Mutex<PipelineStats>,
}

impl StatsManager {
    /// Creates a new `StatsManager` instance with zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current statistics snapshot.
    pub fn get_stats(&self) -> PipelineStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records a request that produced `digits` results in `latency_ms`.
    pub fn record_success(&self, digits: usize, latency_ms: f64) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.total_requests += 1;
        stats.successful_predictions += 1;
        stats.digits_recognised += digits;
        Self::fold_latency(&mut stats, latency_ms);
    }

    /// Records a request that ended with `error`.
    pub fn record_error(&self, error: &RecognitionError, latency_ms: f64) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.total_requests += 1;
        match error {
            RecognitionError::RateLimited { .. } => stats.rate_limited += 1,
            RecognitionError::Unavailable => stats.unavailable += 1,
            RecognitionError::BadInput(_) | RecognitionError::Internal { .. } => {
                stats.failed_predictions += 1;
                Self::fold_latency(&mut stats, latency_ms);
            }
        }
    }

    /// Running average over completed requests; the new one is already counted.
    fn fold_latency(stats: &mut PipelineStats, latency_ms: f64) {
        let completed = stats.completed();
        if completed > 0 {
            let accumulated = stats.average_latency_ms * (completed - 1) as f64;
            stats.average_latency_ms = (accumulated + latency_ms) / completed as f64;
        }
    }

    /// Resets the tracked statistics to their default state.
    pub fn reset_stats(&self) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        *stats = PipelineStats::default();
    }
}
