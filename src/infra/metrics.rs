//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations so booths never contend on a mutex
//! just to count. Reporting swaps the periodic counters to zero.
//!
//! NOTE: All atomics use Relaxed ordering: these are statistical
//! counters only. Do NOT use these atomics for allocation decisions.

use crate::domain::types::SizeClass;
use crate::services::inventory::OccupancySnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤1, ≤2, ≤4, ≤8, ≤16, ≤32, ≤64, ≤128, ≤256, ≤512, >512
const BUCKET_BOUNDS: [u64; 10] = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
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

#[inline]
fn load_per_size(counters: &[AtomicU64; SizeClass::COUNT]) -> [u64; SizeClass::COUNT] {
    std::array::from_fn(|i| counters[i].load(Ordering::Relaxed))
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

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector shared by every panel
pub struct Metrics {
    /// Tickets issued (monotonic)
    entries_total: AtomicU64,
    /// Tickets issued per size class (monotonic)
    entries_by_size: [AtomicU64; SizeClass::COUNT],
    /// Entries since last report (reset on report)
    entries_since_report: AtomicU64,
    /// Entries turned away for lack of capacity (monotonic)
    rejections_total: AtomicU64,
    rejections_by_size: [AtomicU64; SizeClass::COUNT],
    /// Tickets closed (monotonic)
    exits_total: AtomicU64,
    /// Exits since last report (reset on report)
    exits_since_report: AtomicU64,
    /// Sum of charges billed at exit (monotonic)
    revenue_total: AtomicU64,
    /// Misuse errors surfaced to panels (monotonic)
    errors_total: AtomicU64,
    /// Spots handed back after a failed issuance (monotonic)
    compensations_total: AtomicU64,
    /// Reserve critical-section latency histogram (reset on report)
    reserve_latency_buckets: [AtomicU64; NUM_BUCKETS],
    reserve_latency_sum_us: AtomicU64,
    reserve_latency_max_us: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            entries_total: AtomicU64::new(0),
            entries_by_size: std::array::from_fn(|_| AtomicU64::new(0)),
            entries_since_report: AtomicU64::new(0),
            rejections_total: AtomicU64::new(0),
            rejections_by_size: std::array::from_fn(|_| AtomicU64::new(0)),
            exits_total: AtomicU64::new(0),
            exits_since_report: AtomicU64::new(0),
            revenue_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            compensations_total: AtomicU64::new(0),
            reserve_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            reserve_latency_sum_us: AtomicU64::new(0),
            reserve_latency_max_us: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_entry(&self, size: SizeClass) {
        self.entries_total.fetch_add(1, Ordering::Relaxed);
        self.entries_since_report.fetch_add(1, Ordering::Relaxed);
        self.entries_by_size[size.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejection(&self, size: SizeClass) {
        self.rejections_total.fetch_add(1, Ordering::Relaxed);
        self.rejections_by_size[size.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exit(&self, charge: u64) {
        self.exits_total.fetch_add(1, Ordering::Relaxed);
        self.exits_since_report.fetch_add(1, Ordering::Relaxed);
        self.revenue_total.fetch_add(charge, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_compensation(&self) {
        self.compensations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long a `reserve` call took, lock wait included
    #[inline]
    pub fn record_reserve_latency(&self, latency_us: u64) {
        self.reserve_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        let bucket = bucket_index(latency_us);
        self.reserve_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.reserve_latency_max_us, latency_us);
    }

    pub fn entries_total(&self) -> u64 {
        self.entries_total.load(Ordering::Relaxed)
    }

    pub fn rejections_total(&self) -> u64 {
        self.rejections_total.load(Ordering::Relaxed)
    }

    pub fn exits_total(&self) -> u64 {
        self.exits_total.load(Ordering::Relaxed)
    }

    pub fn revenue_total(&self) -> u64 {
        self.revenue_total.load(Ordering::Relaxed)
    }

    pub fn errors_total(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    pub fn compensations_total(&self) -> u64 {
        self.compensations_total.load(Ordering::Relaxed)
    }

    /// Generate a summary and reset the periodic counters.
    ///
    /// Occupancy and open ticket counts are point-in-time values supplied by
    /// the caller, since they live in the strategy and ledger.
    pub fn report(&self, occupancy: OccupancySnapshot, open_tickets: usize) -> MetricsSummary {
        let entries_count = self.entries_since_report.swap(0, Ordering::Relaxed);
        let exits_count = self.exits_since_report.swap(0, Ordering::Relaxed);
        let reserve_buckets = swap_buckets(&self.reserve_latency_buckets);
        let reserve_sum = self.reserve_latency_sum_us.swap(0, Ordering::Relaxed);
        let reserve_max = self.reserve_latency_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let secs = elapsed.as_secs_f64();
        let (entries_per_sec, exits_per_sec) = if secs > 0.0 {
            (entries_count as f64 / secs, exits_count as f64 / secs)
        } else {
            (0.0, 0.0)
        };

        let reserve_count: u64 = reserve_buckets.iter().sum();
        let reserve_avg = if reserve_count > 0 { reserve_sum / reserve_count } else { 0 };

        MetricsSummary {
            entries_total: self.entries_total.load(Ordering::Relaxed),
            entries_by_size: load_per_size(&self.entries_by_size),
            entries_per_sec,
            rejections_total: self.rejections_total.load(Ordering::Relaxed),
            rejections_by_size: load_per_size(&self.rejections_by_size),
            exits_total: self.exits_total.load(Ordering::Relaxed),
            exits_per_sec,
            revenue_total: self.revenue_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            compensations_total: self.compensations_total.load(Ordering::Relaxed),
            reserve_buckets,
            reserve_sum_us: reserve_sum,
            reserve_avg_us: reserve_avg,
            reserve_max_us: reserve_max,
            reserve_p50_us: percentile_from_buckets(&reserve_buckets, 0.50),
            reserve_p99_us: percentile_from_buckets(&reserve_buckets, 0.99),
            occupancy,
            open_tickets,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub entries_total: u64,
    pub entries_by_size: [u64; SizeClass::COUNT],
    pub entries_per_sec: f64,
    pub rejections_total: u64,
    pub rejections_by_size: [u64; SizeClass::COUNT],
    pub exits_total: u64,
    pub exits_per_sec: f64,
    pub revenue_total: u64,
    pub errors_total: u64,
    pub compensations_total: u64,
    /// Reserve latency histogram since last report
    /// Bounds: ≤1, ≤2, ≤4, ≤8, ≤16, ≤32, ≤64, ≤128, ≤256, ≤512, >512 µs
    pub reserve_buckets: [u64; NUM_BUCKETS],
    pub reserve_sum_us: u64,
    pub reserve_avg_us: u64,
    pub reserve_max_us: u64,
    pub reserve_p50_us: u64,
    pub reserve_p99_us: u64,
    pub occupancy: OccupancySnapshot,
    pub open_tickets: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            entries_total = %self.entries_total,
            entries_per_sec = format!("{:.1}", self.entries_per_sec),
            entries_by_size = ?self.entries_by_size,
            exits_total = %self.exits_total,
            exits_per_sec = format!("{:.1}", self.exits_per_sec),
            rejections_total = %self.rejections_total,
            revenue_total = %self.revenue_total,
            errors_total = %self.errors_total,
            open_tickets = %self.open_tickets,
            free_spots = %self.occupancy.total_available(),
            capacity = %self.occupancy.total_capacity(),
            reserve_p50_us = %self.reserve_p50_us,
            reserve_p99_us = %self.reserve_p99_us,
            reserve_max_us = %self.reserve_max_us,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.entries_total(), 0);
        assert_eq!(metrics.revenue_total(), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(1), 0);
        assert_eq!(bucket_index(3), 2);
        assert_eq!(bucket_index(512), 9);
        assert_eq!(bucket_index(10_000), 10);
    }

    #[test]
    fn test_update_atomic_max() {
        let max = AtomicU64::new(5);
        update_atomic_max(&max, 3);
        assert_eq!(max.load(Ordering::Relaxed), 5);
        update_atomic_max(&max, 9);
        assert_eq!(max.load(Ordering::Relaxed), 9);
    }

    #[test]
    fn test_percentile_from_buckets() {
        let empty = [0u64; NUM_BUCKETS];
        assert_eq!(percentile_from_buckets(&empty, 0.99), 0);

        let mut buckets = [0u64; NUM_BUCKETS];
        buckets[0] = 90;
        buckets[5] = 10;
        assert_eq!(percentile_from_buckets(&buckets, 0.50), 1);
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 32);
    }

    #[test]
    fn test_report_counts_and_resets() {
        let metrics = Metrics::new();
        metrics.record_entry(SizeClass::Small);
        metrics.record_entry(SizeClass::Large);
        metrics.record_rejection(SizeClass::Small);
        metrics.record_exit(30);
        metrics.record_reserve_latency(3);
        metrics.record_reserve_latency(700);

        let summary = metrics.report(OccupancySnapshot::default(), 1);
        assert_eq!(summary.entries_total, 2);
        assert_eq!(summary.entries_by_size[SizeClass::Small.index()], 1);
        assert_eq!(summary.rejections_by_size[SizeClass::Small.index()], 1);
        assert_eq!(summary.revenue_total, 30);
        assert_eq!(summary.reserve_buckets.iter().sum::<u64>(), 2);
        assert_eq!(summary.reserve_sum_us, 703);
        assert_eq!(summary.reserve_max_us, 700);
        assert_eq!(summary.reserve_p50_us, 4);
        assert_eq!(summary.open_tickets, 1);

        // Periodic histogram resets, monotonic totals do not
        let again = metrics.report(OccupancySnapshot::default(), 0);
        assert_eq!(again.reserve_buckets.iter().sum::<u64>(), 0);
        assert_eq!(again.reserve_sum_us, 0);
        assert_eq!(again.entries_total, 2);
    }
}
