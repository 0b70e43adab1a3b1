use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Global runtime metrics for the coordinator.
///
/// Purpose:
/// - Track refresh throughput and failures
/// - Track how many requests the debouncer swallowed
/// - Track timer churn (retry / warm-up)
///
/// Design:
/// - Lock-free (Atomics)
/// - Safe in async + multithreaded contexts
#[derive(Default)]
pub struct RuntimeMetrics {
    // Registry
    pub symbols_tracked: AtomicUsize,

    // Refresh cycle
    pub refresh_requests: AtomicUsize,
    pub requests_coalesced: AtomicUsize,
    pub refresh_attempts: AtomicUsize,
    pub refresh_successes: AtomicUsize,
    pub refresh_failures: AtomicUsize,

    // Timers
    pub retries_armed: AtomicUsize,
    pub warmups_armed: AtomicUsize,

    pub last_success_ms: AtomicI64,
}

impl RuntimeMetrics {
    /// One-line summary for the periodic reporter.
    pub fn summary(&self) -> String {
        format!(
            "symbols={} requests={} coalesced={} attempts={} ok={} failed={} retries={} warmups={} last_ok_ms={}",
            self.symbols_tracked.load(Ordering::Relaxed),
            self.refresh_requests.load(Ordering::Relaxed),
            self.requests_coalesced.load(Ordering::Relaxed),
            self.refresh_attempts.load(Ordering::Relaxed),
            self.refresh_successes.load(Ordering::Relaxed),
            self.refresh_failures.load(Ordering::Relaxed),
            self.retries_armed.load(Ordering::Relaxed),
            self.warmups_armed.load(Ordering::Relaxed),
            self.last_success_ms.load(Ordering::Relaxed),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
