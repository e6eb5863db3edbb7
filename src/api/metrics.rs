//! Prometheus exposition of cache metrics.
//!
//! The cache keeps its own lock-free counters; this module mirrors a
//! snapshot of them into a private registry on every scrape.

use prometheus::{
    register_gauge_with_registry, register_int_gauge_with_registry, Encoder, Gauge, IntGauge,
    Registry, TextEncoder,
};

use crate::cache::MetricsSnapshot;
use crate::error::{Error, Result};

type Extract = fn(&MetricsSnapshot) -> u64;

/// (name, help, value) for every integer series
const INT_SERIES: &[(&str, &str, Extract)] = &[
    ("ringcache_hot_hits_total", "Reads answered by the hot tier", |s| s.hot_hits),
    ("ringcache_hot_misses_total", "Reads that missed the hot tier", |s| s.hot_misses),
    ("ringcache_shard_hits_total", "Reads answered by a shard", |s| s.shard_hits),
    ("ringcache_shard_misses_total", "Reads that missed the owning shard", |s| s.shard_misses),
    ("ringcache_unrouted_reads_total", "Reads with no owning node", |s| s.unrouted_reads),
    ("ringcache_writes_enqueued_total", "Shard writes accepted by the queue", |s| s.writes_enqueued),
    ("ringcache_writes_dropped_total", "Shard writes dropped by the queue", |s| s.writes_dropped),
    ("ringcache_writes_applied_total", "Shard writes applied by workers", |s| s.writes_applied),
    ("ringcache_writes_unrouted_total", "Shard writes with no owning node", |s| s.writes_unrouted),
    ("ringcache_hot_evictions_total", "LRU evictions from the hot tier", |s| s.hot_evictions),
    ("ringcache_shard_evictions_total", "LRU evictions from shards", |s| s.shard_evictions),
    ("ringcache_expirations_total", "Entries removed after expiry", |s| s.expirations),
    ("ringcache_memory_purges_total", "Hot tier purges under memory pressure", |s| s.memory_purges),
    ("ringcache_purged_entries_total", "Entries dropped by memory purges", |s| s.purged_entries),
    ("ringcache_nodes_added_total", "Nodes added", |s| s.nodes_added),
    ("ringcache_nodes_removed_total", "Nodes removed", |s| s.nodes_removed),
    ("ringcache_dropped_on_remove_total", "Entries discarded with removed nodes", |s| s.dropped_on_remove),
    ("ringcache_hot_entries", "Entries in the hot tier", |s| s.hot_entries),
    ("ringcache_shard_entries", "Entries across all shards", |s| s.shard_entries),
    ("ringcache_queue_depth", "Shard writes waiting in the queue", |s| s.queue_depth),
    ("ringcache_nodes", "Ring members", |s| s.nodes),
];

/// Renders [`MetricsSnapshot`]s in Prometheus text format
pub struct PrometheusExporter {
    registry: Registry,
    series: Vec<(IntGauge, Extract)>,
    hit_ratio: Gauge,
    get_latency: Gauge,
    set_latency: Gauge,
}

impl PrometheusExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let series = INT_SERIES
            .iter()
            .map(|(name, help, extract)| {
                register_int_gauge_with_registry!(*name, *help, registry)
                    .map(|gauge| (gauge, *extract))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let hit_ratio = register_gauge_with_registry!(
            "ringcache_hit_ratio",
            "Fraction of reads answered by either tier",
            registry
        )?;
        let get_latency = register_gauge_with_registry!(
            "ringcache_get_latency_seconds",
            "Moving average of get latency",
            registry
        )?;
        let set_latency = register_gauge_with_registry!(
            "ringcache_set_latency_seconds",
            "Moving average of set latency",
            registry
        )?;

        Ok(Self {
            registry,
            series,
            hit_ratio,
            get_latency,
            set_latency,
        })
    }

    /// Update every series from `snapshot` and encode the registry
    pub fn render(&self, snapshot: &MetricsSnapshot) -> Result<String> {
        for (gauge, extract) in &self.series {
            gauge.set(i64::try_from(extract(snapshot)).unwrap_or(i64::MAX));
        }
        self.hit_ratio.set(snapshot.overall_hit_ratio);
        self.get_latency.set(snapshot.get_latency.as_secs_f64());
        self.set_latency.set(snapshot.set_latency.as_secs_f64());

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("metrics output is not UTF-8: {}", e)))
    }

    /// Content type of [`render`](Self::render) output
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

impl std::fmt::Debug for PrometheusExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusExporter")
            .field("series", &(self.series.len() + 3))
            .finish()
    }
}
