//! Periodic TTL sweep over every shard and the hot tier.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::manager::Cache;

/// Default sweep interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background task calling [`Cache::clean_expired`] on a fixed interval
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    interval: Duration,
}

impl Default for ExpirySweeper {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL)
    }
}

impl ExpirySweeper {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[instrument(skip(self, cache, shutdown))]
    pub async fn run(self, cache: Arc<Cache>, shutdown: CancellationToken) {
        info!(interval = ?self.interval, "Starting expiry sweeper");

        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper shutting down");
                    break;
                }
                _ = tick.tick() => {
                    let removed = cache.clean_expired();
                    if removed > 0 {
                        info!(removed, "Removed expired entries");
                    } else {
                        debug!("No expired entries");
                    }
                }
            }
        }
    }

    pub fn spawn(self, cache: Arc<Cache>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cache, shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::manager::CacheConfig;

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let clock = Arc::new(ManualClock::new());
        let cache = Cache::start_with_clock(CacheConfig::default(), clock.clone()).unwrap();
        cache.add_node("node-1");
        cache.set("short", "v", Some(Duration::from_secs(1)));
        cache.set("long", "v", None);
        cache.flush().await;

        clock.advance(Duration::from_secs(2));

        let shutdown = CancellationToken::new();
        let handle = ExpirySweeper::new(Duration::from_millis(10))
            .spawn(Arc::clone(&cache), shutdown.clone());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while cache.hot_tier().contains("short") {
            assert!(std::time::Instant::now() < deadline, "sweep never ran");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(cache.hot_tier().contains("long"));
        assert_eq!(cache.shard("node-1").map(|s| s.len()), Some(1));

        shutdown.cancel();
        handle.await.unwrap();
        cache.shutdown().await;
    }

    #[test]
    fn test_default_interval() {
        assert_eq!(ExpirySweeper::default().interval(), Duration::from_secs(60));
    }
}
