//! Metrics collection for the delivery service
//!
//! Thread-safe counters built on atomics. Requests, response classes,
//! cache behaviour, store traffic and latency are tracked.

use http::{Method, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector for media delivery
///
/// All operations are thread-safe using atomic operations.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    // Request statistics
    total_requests: AtomicU64,
    get_requests: AtomicU64,
    head_requests: AtomicU64,

    // Response statistics
    responses_ok: AtomicU64,
    responses_partial: AtomicU64,
    responses_not_modified: AtomicU64,
    responses_bad_request: AtomicU64,
    responses_forbidden: AtomicU64,
    responses_not_found: AtomicU64,
    responses_range_not_satisfiable: AtomicU64,
    responses_server_error: AtomicU64,

    // Cache statistics
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,

    // Store statistics
    store_fetches: AtomicU64,

    // Byte statistics
    bytes_to_client: AtomicU64,

    // Latency (microseconds)
    total_request_duration_us: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub get_requests: u64,
    pub head_requests: u64,

    pub responses_ok: u64,
    pub responses_partial: u64,
    pub responses_not_modified: u64,
    pub responses_bad_request: u64,
    pub responses_forbidden: u64,
    pub responses_not_found: u64,
    pub responses_range_not_satisfiable: u64,
    pub responses_server_error: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,

    pub store_fetches: u64,

    pub bytes_to_client: u64,

    pub total_request_duration_us: u64,
}

impl DeliveryMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming request
    pub fn record_request(&self, method: &Method) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if method == Method::GET {
            self.get_requests.fetch_add(1, Ordering::Relaxed);
        } else if method == Method::HEAD {
            self.head_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the status of a response sent to the client
    pub fn record_response(&self, status: StatusCode) {
        let counter = match status {
            StatusCode::OK => &self.responses_ok,
            StatusCode::PARTIAL_CONTENT => &self.responses_partial,
            StatusCode::NOT_MODIFIED => &self.responses_not_modified,
            StatusCode::BAD_REQUEST => &self.responses_bad_request,
            StatusCode::FORBIDDEN => &self.responses_forbidden,
            StatusCode::NOT_FOUND => &self.responses_not_found,
            StatusCode::RANGE_NOT_SATISFIABLE => &self.responses_range_not_satisfiable,
            s if s.is_server_error() => &self.responses_server_error,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_fetch(&self) {
        self.store_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_to_client(&self, bytes: u64) {
        self.bytes_to_client.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_request_duration(&self, duration: Duration) {
        self.total_request_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    ///
    /// Counters are read independently, so the snapshot may be slightly
    /// inconsistent under concurrent load.
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            get_requests: self.get_requests.load(Ordering::Relaxed),
            head_requests: self.head_requests.load(Ordering::Relaxed),
            responses_ok: self.responses_ok.load(Ordering::Relaxed),
            responses_partial: self.responses_partial.load(Ordering::Relaxed),
            responses_not_modified: self.responses_not_modified.load(Ordering::Relaxed),
            responses_bad_request: self.responses_bad_request.load(Ordering::Relaxed),
            responses_forbidden: self.responses_forbidden.load(Ordering::Relaxed),
            responses_not_found: self.responses_not_found.load(Ordering::Relaxed),
            responses_range_not_satisfiable: self
                .responses_range_not_satisfiable
                .load(Ordering::Relaxed),
            responses_server_error: self.responses_server_error.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            store_fetches: self.store_fetches.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
            total_request_duration_us: self.total_request_duration_us.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Calculate cache hit rate as a percentage (0.0 to 100.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate average request duration in milliseconds
    pub fn avg_request_duration_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.total_request_duration_us as f64 / self.total_requests as f64) / 1000.0
        }
    }
}
