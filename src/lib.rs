//! ringcache - Sharded In-Memory Key-Value Cache
//!
//! A key-value cache that spreads keys over a consistent-hash ring of
//! logical nodes, each owning a bounded LRU shard with TTL expiry. Writes go
//! to a small hot tier immediately and reach their shard through a bounded
//! asynchronous pipeline that sheds load instead of blocking callers.
//!
//! # Architecture
//!
//! ```text
//! HTTP (api) → Cache → HotTier
//!                    ↘ WritePipeline → HashRing → Shard
//! ```
//!
//! # Modules
//!
//! - [`api`] - JSON-over-HTTP adapter and Prometheus exposition
//! - [`cache`] - Ring, shards, eviction, pipeline and background tasks
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```no_run
//! use ringcache::{Cache, CacheConfig};
//!
//! # async fn run() -> ringcache::Result<()> {
//! let cache = Cache::start(CacheConfig::default())?;
//! cache.add_node("node-1");
//! cache.set("greeting", "hello", None);
//! assert_eq!(cache.get("greeting").as_deref(), Some(&b"hello"[..]));
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod error;

// Re-export commonly used types
pub use cache::{Cache, CacheConfig, EnqueueOutcome, ExpirySweeper, MemoryMonitor, MonitorConfig};
pub use error::{Error, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
