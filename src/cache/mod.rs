//! Sharded In-Memory Cache
//!
//! Consistent-hash sharding, bounded LRU/TTL eviction, a hot front tier and
//! an asynchronous, backpressured shard write path.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               Cache                                      │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │   set ──▶ HotTier (sync) ──▶ WritePipeline ──▶ workers ──┐               │
//! │                                (bounded, drop on full)   │               │
//! │   get ──▶ HotTier ──miss──▶ HashRing ──▶ Shard ◀─────────┘               │
//! │                                                                          │
//! │   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐                 │
//! │   │  Shard N1    │   │  Shard N2    │   │  Shard N3    │  LRU heap + TTL │
//! │   └──────────────┘   └──────────────┘   └──────────────┘                 │
//! │                                                                          │
//! │   ExpirySweeper (1 min)          MemoryMonitor (5 s, purges HotTier)     │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Consistency
//!
//! A `set` is visible to the caller immediately through the hot tier. The
//! shard copy lands later, or not at all if the write queue was full. Once a
//! key falls out of the hot tier, readers see whatever the shard holds.
//! Removing a node discards its shard along with the hot tier entries for
//! keys it owned; nothing is rehomed.

mod clock;
mod entry;
mod hot_tier;
mod manager;
mod metrics;
mod monitor;
mod pipeline;
mod policy;
mod ring;
mod shard;
mod sweeper;

mod proptest;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use entry::{effective_ttl, expiry_from, CacheEntry, DEFAULT_TTL, MAX_TTL};
pub use hot_tier::{HotTier, HotTierStats, DEFAULT_HOT_CAPACITY};
pub use manager::{Cache, CacheConfig, CacheStats, DEFAULT_SHARD_CAPACITY};
pub use metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
pub use monitor::{
    MemoryMonitor, MemorySample, MemorySampler, MonitorConfig, PressureReading,
    ProcessMemorySampler,
};
pub use pipeline::{
    EnqueueOutcome, PendingWrite, WritePipeline, WriteSink, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_WORKERS,
};
pub use policy::{Lookup, LruStore};
pub use ring::{crc32_ieee, HashFn, HashRing, RingPoint, DEFAULT_REPLICAS};
pub use shard::{Shard, ShardRead, ShardStats};
pub use sweeper::{ExpirySweeper, DEFAULT_SWEEP_INTERVAL};

/// Longest accepted key, in bytes, at the request layer
pub const MAX_KEY_LEN: usize = 256;

/// Longest accepted value, in bytes, at the request layer
pub const MAX_VALUE_LEN: usize = 256;
