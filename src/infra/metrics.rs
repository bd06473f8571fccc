//! Lock-free metrics for detection runs
//!
//! Counters are shared across concurrent runs and updated with atomics.
//! Reporting is the only operation that resets anything (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use crate::domain::error::DetectionError;
use crate::domain::types::RunStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Run duration bucket boundaries (milliseconds)
/// Buckets: ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, ≤5120, >5120 ms
const BUCKET_BOUNDS: [u64; 10] = [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a duration using binary search
#[inline]
fn bucket_index(duration_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < duration_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120, 10240];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector shared by all runs
pub struct Metrics {
    /// Completed runs (monotonic)
    runs_total: AtomicU64,
    /// Completed runs since last report (reset on report)
    runs_since_report: AtomicU64,
    /// Runs that found at least one convoy (monotonic)
    runs_with_convoys: AtomicU64,
    /// Sum of run durations in ms (reset on report)
    duration_sum_ms: AtomicU64,
    /// Max run duration in ms (reset on report)
    duration_max_ms: AtomicU64,
    /// Run duration histogram buckets (reset on report)
    duration_buckets: [AtomicU64; NUM_BUCKETS],
    /// Reads scanned (monotonic)
    events_scanned_total: AtomicU64,
    /// Pairs accepted as convoys (monotonic)
    pairs_accepted_total: AtomicU64,
    /// Reads skipped for unresolved reader metadata (monotonic)
    data_quality_skips_total: AtomicU64,
    /// Requests rejected for configuration/filter errors (monotonic)
    rejected_invalid: AtomicU64,
    /// Requests rejected by the density guard (monotonic)
    rejected_dense: AtomicU64,
    /// Runs abandoned after the wall-clock timeout (monotonic)
    timeouts_total: AtomicU64,
    /// Internal invariant failures (monotonic)
    invariant_failures: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_total: AtomicU64::new(0),
            runs_since_report: AtomicU64::new(0),
            runs_with_convoys: AtomicU64::new(0),
            duration_sum_ms: AtomicU64::new(0),
            duration_max_ms: AtomicU64::new(0),
            duration_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            events_scanned_total: AtomicU64::new(0),
            pairs_accepted_total: AtomicU64::new(0),
            data_quality_skips_total: AtomicU64::new(0),
            rejected_invalid: AtomicU64::new(0),
            rejected_dense: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
            invariant_failures: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed run (lock-free)
    #[inline]
    pub fn record_run(&self, stats: &RunStats, duration_ms: u64) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
        self.runs_since_report.fetch_add(1, Ordering::Relaxed);
        if stats.pairs_accepted > 0 {
            self.runs_with_convoys.fetch_add(1, Ordering::Relaxed);
        }
        self.events_scanned_total.fetch_add(stats.events_scanned, Ordering::Relaxed);
        self.pairs_accepted_total.fetch_add(stats.pairs_accepted, Ordering::Relaxed);
        self.data_quality_skips_total.fetch_add(stats.data_quality_skips(), Ordering::Relaxed);

        self.duration_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.duration_buckets[bucket_index(duration_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.duration_max_ms, duration_ms);
    }

    /// Record a failed run by error class (lock-free)
    #[inline]
    pub fn record_failure(&self, error: &DetectionError) {
        let counter = match error {
            DetectionError::Configuration(_) | DetectionError::Validation(_) => {
                &self.rejected_invalid
            }
            DetectionError::InputTooDense { .. } => &self.rejected_dense,
            DetectionError::Timeout { .. } => &self.timeouts_total,
            DetectionError::InternalInvariant(_) => &self.invariant_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn runs_total(&self) -> u64 {
        self.runs_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn timeouts_total(&self) -> u64 {
        self.timeouts_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rejected_dense(&self) -> u64 {
        self.rejected_dense.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rejected_invalid(&self) -> u64 {
        self.rejected_invalid.load(Ordering::Relaxed)
    }

    /// Generate a metrics summary and reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let runs_count = self.runs_since_report.swap(0, Ordering::Relaxed);
        let duration_sum = self.duration_sum_ms.swap(0, Ordering::Relaxed);
        let duration_max = self.duration_max_ms.swap(0, Ordering::Relaxed);
        let duration_buckets = swap_buckets(&self.duration_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let runs_per_min = if elapsed.as_secs_f64() > 0.0 {
            runs_count as f64 * 60.0 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            runs_total: self.runs_total.load(Ordering::Relaxed),
            runs_since_report: runs_count,
            runs_per_min,
            runs_with_convoys: self.runs_with_convoys.load(Ordering::Relaxed),
            avg_duration_ms: if runs_count > 0 { duration_sum / runs_count } else { 0 },
            max_duration_ms: duration_max,
            duration_buckets,
            duration_p50_ms: percentile_from_buckets(&duration_buckets, 0.50),
            duration_p99_ms: percentile_from_buckets(&duration_buckets, 0.99),
            events_scanned_total: self.events_scanned_total.load(Ordering::Relaxed),
            pairs_accepted_total: self.pairs_accepted_total.load(Ordering::Relaxed),
            data_quality_skips_total: self.data_quality_skips_total.load(Ordering::Relaxed),
            rejected_invalid: self.rejected_invalid.load(Ordering::Relaxed),
            rejected_dense: self.rejected_dense.load(Ordering::Relaxed),
            timeouts_total: self.timeouts_total.load(Ordering::Relaxed),
            invariant_failures: self.invariant_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub runs_total: u64,
    pub runs_since_report: u64,
    pub runs_per_min: f64,
    pub runs_with_convoys: u64,
    pub avg_duration_ms: u64,
    pub max_duration_ms: u64,
    /// Run duration histogram buckets
    /// Bounds: ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, ≤5120, >5120 ms
    pub duration_buckets: [u64; NUM_BUCKETS],
    pub duration_p50_ms: u64,
    pub duration_p99_ms: u64,
    pub events_scanned_total: u64,
    pub pairs_accepted_total: u64,
    pub data_quality_skips_total: u64,
    pub rejected_invalid: u64,
    pub rejected_dense: u64,
    pub timeouts_total: u64,
    pub invariant_failures: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            runs_total = %self.runs_total,
            runs_per_min = format!("{:.1}", self.runs_per_min),
            runs_with_convoys = %self.runs_with_convoys,
            avg_duration_ms = %self.avg_duration_ms,
            max_duration_ms = %self.max_duration_ms,
            p50_ms = %self.duration_p50_ms,
            p99_ms = %self.duration_p99_ms,
            events_scanned = %self.events_scanned_total,
            pairs_accepted = %self.pairs_accepted_total,
            data_quality_skips = %self.data_quality_skips_total,
            rejected_invalid = %self.rejected_invalid,
            rejected_dense = %self.rejected_dense,
            timeouts = %self.timeouts_total,
            invariant_failures = %self.invariant_failures,
            "metrics"
        );
    }
}
