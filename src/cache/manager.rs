//! Cache Coordinator
//!
//! Ties the hot tier, the hash ring, the per-node shards and the write
//! pipeline into the public `get`/`set`/membership API.
//!
//! # Locking
//!
//! Membership (ring + shard map) sits behind one `RwLock` in
//! [`ShardRouter`]. Reads and write application hold it shared while they
//! resolve an owner and touch that shard; `add_node`, `remove_node` and the
//! memory purge hold it exclusively. Shards and the hot tier each have their
//! own lock below that.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::{SharedClock, SystemClock};
use super::entry::DEFAULT_TTL;
use super::hot_tier::{HotTier, HotTierStats, DEFAULT_HOT_CAPACITY};
use super::metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
use super::monitor::MonitorConfig;
use super::pipeline::{
    EnqueueOutcome, PendingWrite, WritePipeline, WriteSink, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_WORKERS,
};
use super::ring::{HashRing, DEFAULT_REPLICAS};
use super::shard::{Shard, ShardRead, ShardStats};
use super::sweeper::DEFAULT_SWEEP_INTERVAL;
use crate::error::{Error, Result};

/// Default per-shard capacity (entries)
pub const DEFAULT_SHARD_CAPACITY: usize = 1000;

/// How long `shutdown` waits for queued writes before stopping workers
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Virtual points per node
    pub replicas: usize,
    /// Maximum entries per shard
    pub shard_capacity: usize,
    /// Maximum entries in the hot tier
    pub hot_capacity: usize,
    /// TTL applied when a write gives none
    pub default_ttl: Duration,
    /// Pending write queue size
    pub queue_capacity: usize,
    /// Write worker count
    pub workers: usize,
    /// Interval between TTL sweeps
    pub sweep_interval: Duration,
    /// Memory monitor settings
    pub monitor: MonitorConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_REPLICAS,
            shard_capacity: DEFAULT_SHARD_CAPACITY,
            hot_capacity: DEFAULT_HOT_CAPACITY,
            default_ttl: DEFAULT_TTL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            monitor: MonitorConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Reject settings the cache cannot run with
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("replicas", self.replicas),
            ("shard_capacity", self.shard_capacity),
            ("hot_capacity", self.hot_capacity),
            ("queue_capacity", self.queue_capacity),
            ("workers", self.workers),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(Error::Config(format!("{} must be at least 1", name)));
            }
        }
        if self.default_ttl.is_zero() {
            return Err(Error::Config("default_ttl must be non-zero".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("sweep_interval must be non-zero".into()));
        }
        self.monitor.validate()
    }
}

/// Entries discarded by a node removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeRemoval {
    shard_dropped: usize,
    hot_dropped: usize,
}

/// Ring plus the shard owned by each ring member
pub struct ShardRouter {
    ring: HashRing,
    shards: RwLock<HashMap<String, Arc<Shard>>>,
    shard_capacity: usize,
    default_ttl: Duration,
    clock: SharedClock,
    metrics: Arc<CacheMetrics>,
}

impl ShardRouter {
    fn new(config: &CacheConfig, clock: SharedClock, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            ring: HashRing::new(config.replicas),
            shards: RwLock::new(HashMap::new()),
            shard_capacity: config.shard_capacity,
            default_ttl: config.default_ttl,
            clock,
            metrics,
        }
    }

    fn add_node(&self, node: &str) -> bool {
        let mut shards = self.shards.write();
        if !self.ring.add(node) {
            return false;
        }
        let shard = Shard::new(
            node,
            self.shard_capacity,
            self.default_ttl,
            Arc::clone(&self.clock),
        );
        shards.insert(node.to_string(), Arc::new(shard));
        true
    }

    /// Remove a member along with everything it owned, including its keys
    /// in `hot`. Returns `None` when the node was not a member.
    fn remove_node(&self, node: &str, hot: &HotTier) -> Option<NodeRemoval> {
        let mut shards = self.shards.write();
        if !self.ring.contains(node) {
            return None;
        }

        // Ownership has to be resolved before the node's points leave the ring
        let hot_dropped =
            hot.remove_keys_where(|key| self.ring.get(key).as_deref() == Some(node));
        self.ring.remove(node);
        let shard_dropped = shards.remove(node).map_or(0, |shard| shard.drop_all());

        Some(NodeRemoval {
            shard_dropped,
            hot_dropped,
        })
    }

    /// Read through the owning shard; `None` when no node owns the key
    fn fetch(&self, key: &str) -> Option<ShardRead> {
        let shards = self.shards.read();
        let node = self.ring.get(key)?;
        shards.get(&node).map(|shard| shard.fetch(key))
    }

    fn snapshot(&self) -> Vec<Arc<Shard>> {
        self.shards.read().values().cloned().collect()
    }

    fn shard(&self, node: &str) -> Option<Arc<Shard>> {
        self.shards.read().get(node).cloned()
    }
}

impl WriteSink for ShardRouter {
    fn apply(&self, write: PendingWrite) -> bool {
        let shards = self.shards.read();
        let Some(shard) = self.ring.get(&write.key).and_then(|node| shards.get(&node)) else {
            debug!(key = %write.key, "No owner for write, discarding");
            return false;
        };

        debug!(key = %write.key, node = shard.node_id(), "Applying write");
        if let Some(evicted) = shard.put(write.key, write.value, write.ttl) {
            self.metrics.record_shard_eviction();
            debug!(key = evicted.key(), node = shard.node_id(), "Evicted LRU entry");
        }
        true
    }
}

impl std::fmt::Debug for ShardRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardRouter")
            .field("ring", &self.ring)
            .field("shard_capacity", &self.shard_capacity)
            .finish()
    }
}

/// Point-in-time view of every tier
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub nodes: Vec<String>,
    pub hot: HotTierStats,
    pub shards: Vec<ShardStats>,
    pub queue_depth: usize,
    pub queue_capacity: usize,
}

impl CacheStats {
    /// Entries held across all shards
    pub fn shard_entries(&self) -> usize {
        self.shards.iter().map(|s| s.entries).sum()
    }
}

/// Sharded cache with a hot tier and asynchronous shard writes
pub struct Cache {
    config: CacheConfig,
    router: Arc<ShardRouter>,
    hot: HotTier,
    pipeline: WritePipeline,
    metrics: Arc<CacheMetrics>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Cache {
    /// Validate `config` and start the write workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: CacheConfig) -> Result<Arc<Self>> {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    /// Start with an injected clock
    pub fn start_with_clock(config: CacheConfig, clock: SharedClock) -> Result<Arc<Self>> {
        config.validate()?;
        tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("cache requires a tokio runtime: {}", e)))?;

        let metrics = Arc::new(CacheMetrics::new());
        let router = Arc::new(ShardRouter::new(
            &config,
            Arc::clone(&clock),
            Arc::clone(&metrics),
        ));
        let hot = HotTier::new(config.hot_capacity, config.default_ttl, clock);
        let pipeline = WritePipeline::new(config.queue_capacity, Arc::clone(&metrics));
        let shutdown = CancellationToken::new();

        let sink: Arc<dyn WriteSink> = router.clone();
        let workers = pipeline.spawn_workers(config.workers, sink, shutdown.child_token());

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            shard_capacity = config.shard_capacity,
            hot_capacity = config.hot_capacity,
            "Cache started"
        );

        Ok(Arc::new(Self {
            config,
            router,
            hot,
            pipeline,
            metrics,
            shutdown,
            workers: Mutex::new(workers),
        }))
    }

    /// Store a value.
    ///
    /// The hot tier is updated before this returns, so a following `get`
    /// sees the value. The shard write is queued and may be dropped if the
    /// queue is full; the outcome says which.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<Bytes>,
        ttl: Option<Duration>,
    ) -> EnqueueOutcome {
        let tracker = LatencyTracker::start();
        let key = key.into();
        let value = value.into();

        if self.hot.put(key.clone(), value.clone(), ttl).is_some() {
            self.metrics.record_hot_eviction();
        }
        let outcome = self.pipeline.enqueue(PendingWrite { key, value, ttl });

        self.metrics.record_set_latency(tracker.elapsed());
        outcome
    }

    /// Look up a value in the hot tier, then in the owning shard.
    ///
    /// A shard hit is not copied back into the hot tier.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let tracker = LatencyTracker::start();
        let value = self.lookup(key);
        self.metrics.record_get_latency(tracker.elapsed());
        value
    }

    fn lookup(&self, key: &str) -> Option<Bytes> {
        if let Some(value) = self.hot.get(key) {
            self.metrics.record_hot_hit();
            return Some(value);
        }
        self.metrics.record_hot_miss();

        match self.router.fetch(key) {
            Some(ShardRead::Hit(value)) => {
                self.metrics.record_shard_hit();
                Some(value)
            }
            Some(ShardRead::Expired) => {
                self.metrics.record_shard_miss();
                self.metrics.record_expirations(1);
                None
            }
            Some(ShardRead::Miss) => {
                self.metrics.record_shard_miss();
                None
            }
            None => {
                self.metrics.record_unrouted_read();
                None
            }
        }
    }

    /// Add a node with an empty shard. Returns false if already a member.
    pub fn add_node(&self, node: &str) -> bool {
        let added = self.router.add_node(node);
        if added {
            self.metrics.record_node_added();
            info!(node, nodes = self.router.ring.len(), "Node added");
        }
        added
    }

    /// Remove a node and discard its data. Returns false if not a member.
    ///
    /// The node's shard goes, and so do hot tier entries for keys it owned.
    /// Those keys now resolve to another node, which does not have them.
    pub fn remove_node(&self, node: &str) -> bool {
        match self.router.remove_node(node, &self.hot) {
            Some(removal) => {
                self.metrics.record_node_removed(removal.shard_dropped);
                info!(
                    node,
                    dropped = removal.shard_dropped,
                    hot_dropped = removal.hot_dropped,
                    nodes = self.router.ring.len(),
                    "Node removed, data discarded"
                );
                true
            }
            None => false,
        }
    }

    /// Remove expired entries from every shard, then from the hot tier.
    ///
    /// Returns the total removed across both.
    pub fn clean_expired(&self) -> usize {
        let from_shards: usize = self
            .router
            .snapshot()
            .iter()
            .map(|shard| shard.clean_expired())
            .sum();
        let from_hot = self.hot.clean_expired();

        let removed = from_shards + from_hot;
        self.metrics.record_expirations(removed);
        debug!(from_shards, from_hot, "Swept expired entries");
        removed
    }

    /// Empty the hot tier while holding the membership lock exclusively
    pub fn purge_hot_tier(&self) -> usize {
        let _membership = self.router.shards.write();
        let purged = self.hot.purge_all();
        self.metrics.record_memory_purge(purged);
        purged
    }

    /// Wait until every accepted write has been applied or discarded.
    ///
    /// Returns early once the workers have been stopped, since writes still
    /// queued at that point will never land.
    pub async fn flush(&self) {
        while self.pending_writes() > 0 && !self.shutdown.is_cancelled() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn pending_writes(&self) -> u64 {
        let done = self.metrics.writes_applied() + self.metrics.writes_unrouted();
        self.metrics.writes_enqueued().saturating_sub(done)
    }

    /// Stop accepting writes, give queued writes a chance to land, then stop
    /// the workers. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.pipeline.close();

        if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, self.flush())
            .await
            .is_err()
        {
            warn!(
                pending = self.pending_writes(),
                "Timed out draining write queue"
            );
        }

        self.shutdown.cancel();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for result in join_all(workers).await {
            if let Err(e) = result {
                warn!("Write worker failed: {}", e);
            }
        }
        info!("Cache stopped");
    }

    /// Member nodes in sorted order
    pub fn nodes(&self) -> Vec<String> {
        self.router.ring.nodes()
    }

    /// Shard owned by `node`
    pub fn shard(&self, node: &str) -> Option<Arc<Shard>> {
        self.router.shard(node)
    }

    /// Node that currently owns `key`
    pub fn owner(&self, key: &str) -> Option<String> {
        self.router.ring.get(key)
    }

    pub fn ring(&self) -> &HashRing {
        &self.router.ring
    }

    pub fn hot_tier(&self) -> &HotTier {
        &self.hot
    }

    pub fn pipeline(&self) -> &WritePipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Per-tier statistics
    pub fn stats(&self) -> CacheStats {
        let mut shards: Vec<ShardStats> =
            self.router.snapshot().iter().map(|s| s.stats()).collect();
        shards.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        CacheStats {
            nodes: self.nodes(),
            hot: self.hot.stats(),
            shards,
            queue_depth: self.pipeline.len(),
            queue_capacity: self.pipeline.capacity(),
        }
    }

    /// Refresh gauges and return a metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        let shard_entries: usize = self.router.snapshot().iter().map(|s| s.len()).sum();
        self.metrics.update_gauges(
            self.hot.len(),
            shard_entries,
            self.pipeline.len(),
            self.router.ring.len(),
        );
        self.metrics.snapshot()
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("router", &self.router)
            .field("hot_entries", &self.hot.len())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
