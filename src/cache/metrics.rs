//! Cache Metrics Collection
//!
//! Lock-free counters shared by the coordinator, the write workers and the
//! background tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Read path
    hot_hits: AtomicU64,
    hot_misses: AtomicU64,
    shard_hits: AtomicU64,
    shard_misses: AtomicU64,
    unrouted_reads: AtomicU64,

    // Write path
    writes_enqueued: AtomicU64,
    writes_dropped: AtomicU64,
    writes_applied: AtomicU64,
    writes_unrouted: AtomicU64,

    // Eviction
    hot_evictions: AtomicU64,
    shard_evictions: AtomicU64,
    expirations: AtomicU64,
    memory_purges: AtomicU64,
    purged_entries: AtomicU64,

    // Membership
    nodes_added: AtomicU64,
    nodes_removed: AtomicU64,
    dropped_on_remove: AtomicU64,

    // Gauges, refreshed on snapshot
    hot_entries: AtomicU64,
    shard_entries: AtomicU64,
    queue_depth: AtomicU64,
    nodes: AtomicU64,

    // Operation latencies (microseconds, exponential moving average)
    get_latency_us: AtomicU64,
    set_latency_us: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    // Read path
    pub fn record_hot_hit(&self) {
        self.hot_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hot_miss(&self) {
        self.hot_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shard_hit(&self) {
        self.shard_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shard_miss(&self) {
        self.shard_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrouted_read(&self) {
        self.unrouted_reads.fetch_add(1, Ordering::Relaxed);
    }

    // Write path
    pub fn record_write_enqueued(&self) {
        self.writes_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_dropped(&self) {
        self.writes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_applied(&self) {
        self.writes_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_unrouted(&self) {
        self.writes_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn writes_enqueued(&self) -> u64 {
        self.writes_enqueued.load(Ordering::Relaxed)
    }

    pub fn writes_dropped(&self) -> u64 {
        self.writes_dropped.load(Ordering::Relaxed)
    }

    pub fn writes_applied(&self) -> u64 {
        self.writes_applied.load(Ordering::Relaxed)
    }

    pub fn writes_unrouted(&self) -> u64 {
        self.writes_unrouted.load(Ordering::Relaxed)
    }

    // Eviction
    pub fn record_hot_eviction(&self) {
        self.hot_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shard_eviction(&self) {
        self.shard_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: usize) {
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_memory_purge(&self, purged: usize) {
        self.memory_purges.fetch_add(1, Ordering::Relaxed);
        self.purged_entries.fetch_add(purged as u64, Ordering::Relaxed);
    }

    // Membership
    pub fn record_node_added(&self) {
        self.nodes_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_node_removed(&self, dropped_entries: usize) {
        self.nodes_removed.fetch_add(1, Ordering::Relaxed);
        self.dropped_on_remove
            .fetch_add(dropped_entries as u64, Ordering::Relaxed);
    }

    /// Refresh point-in-time gauges
    pub fn update_gauges(
        &self,
        hot_entries: usize,
        shard_entries: usize,
        queue_depth: usize,
        nodes: usize,
    ) {
        self.hot_entries.store(hot_entries as u64, Ordering::Relaxed);
        self.shard_entries.store(shard_entries as u64, Ordering::Relaxed);
        self.queue_depth.store(queue_depth as u64, Ordering::Relaxed);
        self.nodes.store(nodes as u64, Ordering::Relaxed);
    }

    // Latency tracking
    pub fn record_get_latency(&self, duration: Duration) {
        self.update_latency_ema(&self.get_latency_us, duration);
    }

    pub fn record_set_latency(&self, duration: Duration) {
        self.update_latency_ema(&self.set_latency_us, duration);
    }

    fn update_latency_ema(&self, target: &AtomicU64, duration: Duration) {
        let new_us = duration.as_micros() as u64;
        let alpha = 0.1;

        loop {
            let current = target.load(Ordering::Relaxed);
            let updated = if current == 0 {
                new_us
            } else {
                ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
            };

            if target
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn get_latency(&self) -> Duration {
        Duration::from_micros(self.get_latency_us.load(Ordering::Relaxed))
    }

    pub fn set_latency(&self) -> Duration {
        Duration::from_micros(self.set_latency_us.load(Ordering::Relaxed))
    }

    /// Fraction of reads answered by either tier
    pub fn overall_hit_ratio(&self) -> f64 {
        let hits =
            self.hot_hits.load(Ordering::Relaxed) + self.shard_hits.load(Ordering::Relaxed);
        // A hot miss is followed by a shard lookup (or an unrouted miss), so
        // final misses are counted once there.
        let misses =
            self.shard_misses.load(Ordering::Relaxed) + self.unrouted_reads.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            hot_misses: self.hot_misses.load(Ordering::Relaxed),
            shard_hits: self.shard_hits.load(Ordering::Relaxed),
            shard_misses: self.shard_misses.load(Ordering::Relaxed),
            unrouted_reads: self.unrouted_reads.load(Ordering::Relaxed),

            writes_enqueued: self.writes_enqueued(),
            writes_dropped: self.writes_dropped(),
            writes_applied: self.writes_applied(),
            writes_unrouted: self.writes_unrouted(),

            hot_evictions: self.hot_evictions.load(Ordering::Relaxed),
            shard_evictions: self.shard_evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            memory_purges: self.memory_purges.load(Ordering::Relaxed),
            purged_entries: self.purged_entries.load(Ordering::Relaxed),

            nodes_added: self.nodes_added.load(Ordering::Relaxed),
            nodes_removed: self.nodes_removed.load(Ordering::Relaxed),
            dropped_on_remove: self.dropped_on_remove.load(Ordering::Relaxed),

            hot_entries: self.hot_entries.load(Ordering::Relaxed),
            shard_entries: self.shard_entries.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            nodes: self.nodes.load(Ordering::Relaxed),

            get_latency: self.get_latency(),
            set_latency: self.set_latency(),
            overall_hit_ratio: self.overall_hit_ratio(),
        }
    }
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    // Read path
    pub hot_hits: u64,
    pub hot_misses: u64,
    pub shard_hits: u64,
    pub shard_misses: u64,
    pub unrouted_reads: u64,

    // Write path
    pub writes_enqueued: u64,
    pub writes_dropped: u64,
    pub writes_applied: u64,
    pub writes_unrouted: u64,

    // Eviction
    pub hot_evictions: u64,
    pub shard_evictions: u64,
    pub expirations: u64,
    pub memory_purges: u64,
    pub purged_entries: u64,

    // Membership
    pub nodes_added: u64,
    pub nodes_removed: u64,
    pub dropped_on_remove: u64,

    // Gauges
    pub hot_entries: u64,
    pub shard_entries: u64,
    pub queue_depth: u64,
    pub nodes: u64,

    // Latency
    pub get_latency: Duration,
    pub set_latency: Duration,
    pub overall_hit_ratio: f64,
}

/// Latency tracker helper
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    /// Start tracking latency
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let snapshot = CacheMetrics::new().snapshot();
        assert_eq!(snapshot.hot_hits, 0);
        assert_eq!(snapshot.writes_enqueued, 0);
        assert_eq!(snapshot.overall_hit_ratio, 0.0);
    }

    #[test]
    fn test_overall_hit_ratio() {
        let metrics = CacheMetrics::new();

        metrics.record_hot_hit();
        metrics.record_hot_hit();
        metrics.record_hot_miss();
        metrics.record_shard_hit();
        metrics.record_hot_miss();
        metrics.record_shard_miss();

        // 3 hits, 1 final miss
        assert!((metrics.overall_hit_ratio() - 0.75).abs() < 0.01);
    }

    #[test]
    fn test_write_path_counters() {
        let metrics = CacheMetrics::new();
        metrics.record_write_enqueued();
        metrics.record_write_enqueued();
        metrics.record_write_dropped();
        metrics.record_write_applied();
        metrics.record_write_unrouted();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.writes_enqueued, 2);
        assert_eq!(snapshot.writes_dropped, 1);
        assert_eq!(snapshot.writes_applied, 1);
        assert_eq!(snapshot.writes_unrouted, 1);
    }

    #[test]
    fn test_latency_tracking() {
        let metrics = CacheMetrics::new();

        metrics.record_get_latency(Duration::from_micros(100));
        assert_eq!(metrics.get_latency(), Duration::from_micros(100));

        metrics.record_get_latency(Duration::from_micros(200));
        let latency = metrics.get_latency().as_micros();
        assert!(latency > 100 && latency < 200);
    }

    #[test]
    fn test_gauges_and_membership() {
        let metrics = CacheMetrics::new();
        metrics.update_gauges(3, 40, 5, 2);
        metrics.record_node_added();
        metrics.record_node_removed(17);
        metrics.record_memory_purge(9);
        metrics.record_expirations(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hot_entries, 3);
        assert_eq!(snapshot.shard_entries, 40);
        assert_eq!(snapshot.queue_depth, 5);
        assert_eq!(snapshot.nodes, 2);
        assert_eq!(snapshot.nodes_added, 1);
        assert_eq!(snapshot.dropped_on_remove, 17);
        assert_eq!(snapshot.memory_purges, 1);
        assert_eq!(snapshot.purged_entries, 9);
        assert_eq!(snapshot.expirations, 4);
    }

    #[test]
    fn test_latency_tracker() {
        let tracker = LatencyTracker::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(tracker.elapsed() >= Duration::from_millis(10));
    }
}
