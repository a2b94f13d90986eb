//! Timing and outcome counters for search execution.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Timing captured for one execution attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExecutionTiming {
    /// Time spent waiting for an admission slot.
    pub admission_wait: Duration,

    /// Wall-clock duration of the backend call. `None` when no call was made.
    pub request: Option<Duration>,

    /// Duration reported by the backend itself.
    pub backend_took: Option<Duration>,
}

/// How an admitted request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Partial,
    Failure,
    Timeout,
}

/// A point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionMetrics {
    /// Requests that asked for a slot.
    pub total_requests: u64,

    /// Requests turned away without contacting the backend.
    pub rejected_requests: u64,

    pub successful_requests: u64,

    /// Successes that came back with partial results.
    pub partial_results: u64,

    pub failed_requests: u64,

    /// Requests abandoned at the client-side deadline.
    pub timeout_count: u64,

    /// Total backend call time across admitted requests.
    pub total_request_time: Duration,
    pub avg_request_time: Duration,
    pub max_request_time: Duration,
    pub min_request_time: Duration,

    /// Total admission wait across all requests.
    pub total_admission_wait: Duration,

    pub total_hits_returned: u64,
}

/// Process-wide atomic counters.
#[derive(Debug)]
pub struct MetricsCollector {
    total_requests: AtomicU64,
    rejected_requests: AtomicU64,
    successful_requests: AtomicU64,
    partial_results: AtomicU64,
    failed_requests: AtomicU64,
    timeout_count: AtomicU64,
    total_request_nanos: AtomicU64,
    max_request_nanos: AtomicU64,
    min_request_nanos: AtomicU64,
    total_admission_nanos: AtomicU64,
    total_hits_returned: AtomicU64,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            partial_results: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
            total_request_nanos: AtomicU64::new(0),
            max_request_nanos: AtomicU64::new(0),
            min_request_nanos: AtomicU64::new(u64::MAX),
            total_admission_nanos: AtomicU64::new(0),
            total_hits_returned: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a request that never got a slot.
    pub fn record_rejection(&self, admission_wait: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
        self.total_admission_nanos
            .fetch_add(admission_wait.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record an admitted request.
    pub fn record_request(&self, timing: &ExecutionTiming, outcome: RequestOutcome, hits: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_admission_nanos
            .fetch_add(timing.admission_wait.as_nanos() as u64, Ordering::Relaxed);

        match outcome {
            RequestOutcome::Success => {
                self.successful_requests.fetch_add(1, Ordering::Relaxed);
            }
            RequestOutcome::Partial => {
                self.successful_requests.fetch_add(1, Ordering::Relaxed);
                self.partial_results.fetch_add(1, Ordering::Relaxed);
            }
            RequestOutcome::Failure => {
                self.failed_requests.fetch_add(1, Ordering::Relaxed);
            }
            RequestOutcome::Timeout => {
                self.failed_requests.fetch_add(1, Ordering::Relaxed);
                self.timeout_count.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.total_hits_returned.fetch_add(hits, Ordering::Relaxed);

        let Some(request) = timing.request else {
            return;
        };
        let nanos = request.as_nanos() as u64;
        self.total_request_nanos.fetch_add(nanos, Ordering::Relaxed);

        // Update max request time
        loop {
            let current_max = self.max_request_nanos.load(Ordering::Relaxed);
            if nanos <= current_max {
                break;
            }
            if self
                .max_request_nanos
                .compare_exchange_weak(current_max, nanos, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }

        // Update min request time
        loop {
            let current_min = self.min_request_nanos.load(Ordering::Relaxed);
            if nanos >= current_min {
                break;
            }
            if self
                .min_request_nanos
                .compare_exchange_weak(current_min, nanos, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Get the current metrics snapshot.
    pub fn snapshot(&self) -> ExecutionMetrics {
        let admitted = self.successful_requests.load(Ordering::Relaxed)
            + self.failed_requests.load(Ordering::Relaxed);
        let total_nanos = self.total_request_nanos.load(Ordering::Relaxed);
        let avg_nanos = if admitted > 0 { total_nanos / admitted } else { 0 };

        let min_nanos = self.min_request_nanos.load(Ordering::Relaxed);
        let min_duration = if min_nanos == u64::MAX {
            Duration::ZERO
        } else {
            Duration::from_nanos(min_nanos)
        };

        ExecutionMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            partial_results: self.partial_results.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            timeout_count: self.timeout_count.load(Ordering::Relaxed),
            total_request_time: Duration::from_nanos(total_nanos),
            avg_request_time: Duration::from_nanos(avg_nanos),
            max_request_time: Duration::from_nanos(self.max_request_nanos.load(Ordering::Relaxed)),
            min_request_time: min_duration,
            total_admission_wait: Duration::from_nanos(
                self.total_admission_nanos.load(Ordering::Relaxed),
            ),
            total_hits_returned: self.total_hits_returned.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.rejected_requests,
            &self.successful_requests,
            &self.partial_results,
            &self.failed_requests,
            &self.timeout_count,
            &self.total_request_nanos,
            &self.max_request_nanos,
            &self.total_admission_nanos,
            &self.total_hits_returned,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.min_request_nanos.store(u64::MAX, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
