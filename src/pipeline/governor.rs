//! Admission control for heavy pipeline work.
//!
//! Two independent gates run before any image processing starts:
//!
//! - a **rate gate** keeping a sliding 60 second log of request timestamps per
//!   caller; a caller whose log already holds `rate_limit` entries is rejected
//!   and the rejected attempt is not recorded.
//! - a **concurrency gate**, a counting semaphore. Waiting for a slot is the
//!   only suspension point of a request; excess requests queue, they never fail.
//!
//! Callers whose log has fully expired are swept from the store at most once
//! per window, so the store only holds callers active in the last window.
//!
//! The slot is represented by an [`AdmissionTicket`] which releases itself when
//! dropped, on every exit path including panics inside the guarded work.

use crate::core::errors::RecognitionError;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Horizon of the per-caller request log.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request was recorded and may proceed.
    Allowed,
    /// The caller is at its ceiling.
    Limited {
        /// Time until the oldest logged request leaves the window.
        retry_after: Duration,
    },
}

/// Storage for per-caller request logs.
///
/// `check_and_record` must prune, compare and append as one atomic step per
/// caller; two concurrent calls for the same caller must never both observe
/// the log below the ceiling when only one slot is left.
pub trait RateLimitStore: Send + Sync + Debug {
    /// Prunes entries older than `window`, then records `now` if fewer than
    /// `limit` entries remain.
    fn check_and_record(
        &self,
        caller: &str,
        now: Instant,
        limit: usize,
        window: Duration,
    ) -> RateDecision;

    /// Number of entries inside the window, after pruning.
    fn recent_count(&self, caller: &str, now: Instant, window: Duration) -> usize;

    /// Forgets every caller with no entry inside the window. Returns the
    /// number of callers removed.
    fn sweep(&self, now: Instant, window: Duration) -> usize;
}

/// In-process store: one lock over a map of timestamp queues.
#[derive(Debug, Default)]
pub struct InMemoryRateStore {
    log: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl InMemoryRateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callers currently held.
    pub fn tracked_callers(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn prune(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = entries.front() {
        if now.saturating_duration_since(oldest) >= window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

impl RateLimitStore for InMemoryRateStore {
    fn check_and_record(
        &self,
        caller: &str,
        now: Instant,
        limit: usize,
        window: Duration,
    ) -> RateDecision {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = log.entry(caller.to_string()).or_default();
        prune(entries, now, window);

        if entries.len() >= limit {
            let retry_after = entries
                .front()
                .map(|&oldest| (oldest + window).saturating_duration_since(now))
                .unwrap_or(window);
            return RateDecision::Limited { retry_after };
        }
        entries.push_back(now);
        RateDecision::Allowed
    }

    fn recent_count(&self, caller: &str, now: Instant, window: Duration) -> usize {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = log.get_mut(caller) else {
            return 0;
        };
        prune(entries, now, window);
        let count = entries.len();
        if count == 0 {
            log.remove(caller);
        }
        count
    }

    fn sweep(&self, now: Instant, window: Duration) -> usize {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let before = log.len();
        log.retain(|_, entries| {
            prune(entries, now, window);
            !entries.is_empty()
        });
        before - log.len()
    }
}

/// One granted slot of concurrent heavy work.
///
/// Dropping the ticket returns the slot to the governor.
#[derive(Debug)]
pub struct AdmissionTicket {
    caller: String,
    _permit: OwnedSemaphorePermit,
}

impl AdmissionTicket {
    /// The caller the slot was granted to.
    pub fn caller(&self) -> &str {
        &self.caller
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        debug!(caller = %self.caller, "Released admission ticket");
    }
}

/// Bounds concurrent pipeline runs and throttles individual callers.
#[derive(Debug, Clone)]
pub struct AdmissionGovernor {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    rate_limit: usize,
    window: Duration,
    store: Arc<dyn RateLimitStore>,
    last_sweep: Arc<Mutex<Instant>>,
}

impl AdmissionGovernor {
    /// Creates a governor with an in-memory rate store.
    pub fn new(capacity: usize, rate_limit: usize) -> Self {
        Self::with_store(capacity, rate_limit, Arc::new(InMemoryRateStore::new()))
    }

    /// Creates a governor backed by an injected rate store.
    pub fn with_store(capacity: usize, rate_limit: usize, store: Arc<dyn RateLimitStore>) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            rate_limit: rate_limit.max(1),
            window: RATE_WINDOW,
            store,
            last_sweep: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Maximum number of concurrent tickets.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Requests allowed per caller within the window.
    pub fn rate_limit(&self) -> usize {
        self.rate_limit
    }

    /// Slots currently free.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Tickets currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available_slots()
    }

    /// Requests `caller` has made within the current window.
    pub fn recent_requests(&self, caller: &str) -> usize {
        self.store.recent_count(caller, Instant::now(), self.window)
    }

    /// Applies the rate gate only.
    ///
    /// # Errors
    ///
    /// Returns `RecognitionError::RateLimited` when `caller` is at its ceiling;
    /// the rejected attempt does not count toward the window.
    pub fn check_rate(&self, caller: &str) -> Result<(), RecognitionError> {
        let now = Instant::now();
        self.sweep_if_due(now);
        match self
            .store
            .check_and_record(caller, now, self.rate_limit, self.window)
        {
            RateDecision::Allowed => Ok(()),
            RateDecision::Limited { retry_after } => {
                warn!(
                    caller,
                    limit = self.rate_limit,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit exceeded"
                );
                Err(RecognitionError::RateLimited { retry_after })
            }
        }
    }

    fn sweep_if_due(&self, now: Instant) {
        let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
        if now.saturating_duration_since(*last) < self.window {
            return;
        }
        *last = now;
        drop(last);
        let removed = self.store.sweep(now, self.window);
        if removed > 0 {
            debug!(removed, "Swept idle callers from the rate store");
        }
    }

    /// Waits for a free concurrency slot.
    ///
    /// Dropping the returned future before it resolves acquires nothing.
    pub async fn acquire(&self, caller: &str) -> Result<AdmissionTicket, RecognitionError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| RecognitionError::internal("admission semaphore closed"))?;
        debug!(
            caller,
            in_flight = self.in_flight(),
            capacity = self.capacity,
            "Granted admission ticket"
        );
        Ok(AdmissionTicket {
            caller: caller.to_string(),
            _permit: permit,
        })
    }

    /// Rate gate, then concurrency gate.
    pub async fn admit(&self, caller: &str) -> Result<AdmissionTicket, RecognitionError> {
        self.check_rate(caller)?;
        self.acquire(caller).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_store_prunes_and_limits() {
        let store = InMemoryRateStore::new();
        let start = Instant::now();
        for _ in 0..3 {
            assert_eq!(
                store.check_and_record("a", start, 3, RATE_WINDOW),
                RateDecision::Allowed
            );
        }
        let later = start + Duration::from_secs(20);
        assert_eq!(
            store.check_and_record("a", later, 3, RATE_WINDOW),
            RateDecision::Limited {
                retry_after: Duration::from_secs(40)
            }
        );
        // the rejection was not recorded
        assert_eq!(store.recent_count("a", later, RATE_WINDOW), 3);
        // other callers are independent
        assert_eq!(
            store.check_and_record("b", later, 3, RATE_WINDOW),
            RateDecision::Allowed
        );

        let expired = start + RATE_WINDOW;
        assert_eq!(store.recent_count("a", expired, RATE_WINDOW), 0);
        assert_eq!(
            store.check_and_record("a", expired, 3, RATE_WINDOW),
            RateDecision::Allowed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_idle_callers() {
        let store = InMemoryRateStore::new();
        let start = Instant::now();
        store.check_and_record("idle", start, 5, RATE_WINDOW);
        store.check_and_record("busy", start + Duration::from_secs(50), 5, RATE_WINDOW);
        let removed = store.sweep(start + Duration::from_secs(70), RATE_WINDOW);
        assert_eq!(removed, 1);
        assert_eq!(
            store.recent_count("busy", start + Duration::from_secs(70), RATE_WINDOW),
            1
        );
        assert_eq!(store.tracked_callers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_count_forgets_caller() {
        let store = InMemoryRateStore::new();
        let start = Instant::now();
        store.check_and_record("gone", start, 5, RATE_WINDOW);
        assert_eq!(store.recent_count("gone", start + RATE_WINDOW, RATE_WINDOW), 0);
        assert_eq!(store.tracked_callers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_governor_sweeps_idle_callers_once_per_window() {
        let store = Arc::new(InMemoryRateStore::new());
        let governor = AdmissionGovernor::with_store(4, 10, store.clone());
        for i in 0..300 {
            governor.check_rate(&format!("10.0.{}.{}", i / 256, i % 256)).unwrap();
        }
        assert_eq!(store.tracked_callers(), 300);

        tokio::time::advance(RATE_WINDOW + Duration::from_secs(1)).await;
        governor.check_rate("fresh").unwrap();
        assert_eq!(store.tracked_callers(), 1);
        assert_eq!(governor.recent_requests("fresh"), 1);
    }

    #[tokio::test]
    async fn test_ticket_drop_releases_slot() {
        let governor = AdmissionGovernor::new(2, 100);
        let first = governor.admit("c").await.unwrap();
        let second = governor.admit("c").await.unwrap();
        assert_eq!(first.caller(), "c");
        assert_eq!(governor.available_slots(), 0);
        assert_eq!(governor.in_flight(), 2);
        drop(first);
        assert_eq!(governor.available_slots(), 1);
        drop(second);
        assert_eq!(governor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_after_ceiling() {
        let governor = AdmissionGovernor::new(4, 2);
        drop(governor.admit("x").await.unwrap());
        drop(governor.admit("x").await.unwrap());
        let err = governor.admit("x").await.unwrap_err();
        assert!(matches!(err, RecognitionError::RateLimited { .. }));
        assert_eq!(governor.recent_requests("x"), 2);
        assert_eq!(governor.available_slots(), 4);
    }

    #[test]
    fn test_zero_settings_are_clamped() {
        let governor = AdmissionGovernor::new(0, 0);
        assert_eq!(governor.capacity(), 1);
        assert_eq!(governor.rate_limit(), 1);
    }
}
