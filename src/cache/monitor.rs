//! Memory Pressure Monitor
//!
//! Periodically compares process memory against a budget and purges the hot
//! tier when usage crosses the threshold. Shard data is never touched here;
//! shards are bounded by their own capacity.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::manager::Cache;
use crate::error::{Error, Result};

/// Memory monitor configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Time between samples
    pub interval: Duration,
    /// Utilization (0.0 - 1.0] above which the hot tier is purged
    pub threshold: f64,
    /// Memory budget in bytes; `None` uses total system memory
    pub memory_budget_bytes: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            threshold: 0.70,
            memory_budget_bytes: None,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(Error::Config(format!(
                "memory threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.interval.is_zero() {
            return Err(Error::Config("monitor interval must be non-zero".into()));
        }
        if self.memory_budget_bytes == Some(0) {
            return Err(Error::Config("memory budget must be non-zero".into()));
        }
        Ok(())
    }
}

/// A single memory reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub budget_bytes: u64,
}

impl MemorySample {
    /// Used memory as a fraction of the budget
    pub fn utilization(&self) -> f64 {
        if self.budget_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.budget_bytes as f64
    }
}

/// Source of memory readings
pub trait MemorySampler: Send + Sync {
    /// Take a reading, or `None` when memory cannot be measured
    fn sample(&self) -> Option<MemorySample>;
}

/// Samples resident memory of the current process
pub struct ProcessMemorySampler {
    system: Mutex<System>,
    pid: Option<Pid>,
    budget_bytes: Option<u64>,
}

impl ProcessMemorySampler {
    /// Create a sampler. With no budget, total system memory is used.
    pub fn new(budget_bytes: Option<u64>) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Cannot determine own pid, memory monitor disabled: {}", e);
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
            budget_bytes,
        }
    }
}

impl MemorySampler for ProcessMemorySampler {
    fn sample(&self) -> Option<MemorySample> {
        let pid = self.pid?;
        let mut system = self.system.lock();

        if !system.refresh_process(pid) {
            return None;
        }
        let used_bytes = system.process(pid)?.memory();

        let budget_bytes = match self.budget_bytes {
            Some(budget) => budget,
            None => {
                system.refresh_memory();
                system.total_memory()
            }
        };
        if budget_bytes == 0 {
            return None;
        }

        Some(MemorySample {
            used_bytes,
            budget_bytes,
        })
    }
}

/// Result of one monitor check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PressureReading {
    /// No sample could be taken
    Unavailable,
    /// Below threshold
    Normal { utilization: f64 },
    /// Above threshold; the hot tier was emptied
    Purged { utilization: f64, purged: usize },
}

/// Periodic memory-pressure valve for the hot tier
pub struct MemoryMonitor {
    config: MonitorConfig,
    sampler: Arc<dyn MemorySampler>,
}

impl MemoryMonitor {
    /// Monitor backed by process RSS
    pub fn new(config: MonitorConfig) -> Self {
        let sampler = Arc::new(ProcessMemorySampler::new(config.memory_budget_bytes));
        Self::with_sampler(config, sampler)
    }

    /// Monitor with an injected sampler
    pub fn with_sampler(config: MonitorConfig, sampler: Arc<dyn MemorySampler>) -> Self {
        Self { config, sampler }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Take one sample and purge the hot tier if it is over threshold
    pub fn check_once(&self, cache: &Cache) -> PressureReading {
        let Some(sample) = self.sampler.sample() else {
            return PressureReading::Unavailable;
        };

        let utilization = sample.utilization();
        if utilization <= self.config.threshold {
            debug!(utilization, "Memory within budget");
            return PressureReading::Normal { utilization };
        }

        let purged = cache.purge_hot_tier();
        warn!(
            utilization,
            threshold = self.config.threshold,
            used_bytes = sample.used_bytes,
            budget_bytes = sample.budget_bytes,
            purged,
            "Memory pressure, purged hot tier"
        );
        PressureReading::Purged {
            utilization,
            purged,
        }
    }

    /// Sample on every tick until cancelled
    #[instrument(skip(self, cache, shutdown))]
    pub async fn run(self, cache: Arc<Cache>, shutdown: CancellationToken) {
        info!(
            interval = ?self.config.interval,
            threshold = self.config.threshold,
            "Starting memory monitor"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Memory monitor shutting down");
                    break;
                }
                _ = tick.tick() => {
                    self.check_once(&cache);
                }
            }
        }
    }

    /// Run on a background task
    pub fn spawn(self, cache: Arc<Cache>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cache, shutdown))
    }
}

// =============================================================================
// Tests
// =============================================================================
