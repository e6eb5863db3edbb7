//! ringcache server
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          ringcache                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  HTTP API    │───▶│    Cache     │───▶│ Write workers│       │
//! │  │  :7171       │    │  (hot tier)  │    │  → shards    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │        Expiry sweeper (1 min)     Memory monitor (5 s)          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ringcache::api::{self, ApiState};
use ringcache::cache::{Cache, CacheConfig, ExpirySweeper, MemoryMonitor, MonitorConfig};
use ringcache::error::{Error, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// ringcache - sharded in-memory key-value cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:7171")]
    listen_addr: String,

    /// Initial ring members
    #[arg(
        long,
        env = "CACHE_NODES",
        value_delimiter = ',',
        default_value = "node-1,node-2,node-3"
    )]
    nodes: Vec<String>,

    /// Virtual points per node
    #[arg(long, env = "CACHE_REPLICAS", default_value = "100")]
    replicas: usize,

    /// Maximum entries per shard
    #[arg(long, env = "SHARD_CAPACITY", default_value = "1000")]
    shard_capacity: usize,

    /// Maximum entries in the hot tier
    #[arg(long, env = "HOT_CAPACITY", default_value = "1024")]
    hot_capacity: usize,

    /// Default entry TTL in seconds
    #[arg(long, env = "DEFAULT_TTL_SECONDS", default_value = "3600")]
    default_ttl_seconds: u64,

    /// Pending shard write queue size
    #[arg(long, env = "WRITE_QUEUE_CAPACITY", default_value = "10000")]
    queue_capacity: usize,

    /// Shard write workers
    #[arg(long, env = "WRITE_WORKERS", default_value = "4")]
    workers: usize,

    /// Expiry sweep interval in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECONDS", default_value = "60")]
    sweep_interval_seconds: u64,

    /// Memory check interval in seconds
    #[arg(long, env = "MEMORY_CHECK_INTERVAL_SECONDS", default_value = "5")]
    memory_check_interval_seconds: u64,

    /// Fraction of the memory budget above which the hot tier is purged
    #[arg(long, env = "MEMORY_THRESHOLD", default_value = "0.7")]
    memory_threshold: f64,

    /// Memory budget in bytes (defaults to total system memory)
    #[arg(long, env = "MEMORY_BUDGET_BYTES")]
    memory_budget_bytes: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            replicas: self.replicas,
            shard_capacity: self.shard_capacity,
            hot_capacity: self.hot_capacity,
            default_ttl: Duration::from_secs(self.default_ttl_seconds),
            queue_capacity: self.queue_capacity,
            workers: self.workers,
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds),
            monitor: MonitorConfig {
                interval: Duration::from_secs(self.memory_check_interval_seconds),
                threshold: self.memory_threshold,
                memory_budget_bytes: self.memory_budget_bytes,
            },
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = args.cache_config();
    info!("Starting ringcache {}", ringcache::VERSION);
    info!("  Listen address: {}", args.listen_addr);
    info!("  Shard capacity: {}", config.shard_capacity);
    info!("  Hot tier capacity: {}", config.hot_capacity);
    info!("  Default TTL: {:?}", config.default_ttl);
    info!(
        "  Write queue: {} slots, {} workers",
        config.queue_capacity, config.workers
    );

    let cache = Cache::start(config.clone()).map_err(|e| {
        error!("Invalid cache configuration: {}", e);
        e
    })?;

    for node in args.nodes.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        cache.add_node(node);
    }
    info!("Ring members: {:?}", cache.nodes());

    let shutdown = CancellationToken::new();

    let sweeper = ExpirySweeper::new(config.sweep_interval)
        .spawn(Arc::clone(&cache), shutdown.child_token());
    let monitor = MemoryMonitor::new(config.monitor.clone())
        .spawn(Arc::clone(&cache), shutdown.child_token());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    let state = Arc::new(ApiState::new(Arc::clone(&cache))?);
    let served = api::serve(&args.listen_addr, state, shutdown.clone()).await;
    if let Err(e) = &served {
        error!("Cache server error: {}", e);
    }

    shutdown.cancel();
    for (name, handle) in [("sweeper", sweeper), ("monitor", monitor)] {
        if let Err(e) = handle.await {
            error!("Background task {} failed: {}", name, e);
        }
    }
    cache.shutdown().await;

    info!("ringcache shutdown complete");
    served
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let hyper_directive = "hyper=warn"
        .parse::<Directive>()
        .map_err(|e| Error::Config(format!("Invalid log directive: {}", e)))?;
    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(hyper_directive);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}
