//! 退去スイープ
//!
//! 一定間隔でレジストリを走査し、応答の途絶えたProxyを削除する。

use crate::registry::ProxyRegistry;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// 退去スイープ
#[derive(Clone)]
pub struct EvictionSweeper {
    registry: ProxyRegistry,
    sweep_interval: Duration,
    stale_after: Duration,
}

impl EvictionSweeper {
    /// 新しいスイーパーを作成
    pub fn new(registry: ProxyRegistry, sweep_interval: Duration, stale_after: Duration) -> Self {
        Self {
            registry,
            sweep_interval,
            stale_after,
        }
    }

    /// 1回分のスイープを実行し、退去したProxy数を返す
    pub async fn sweep_once(&self) -> usize {
        let evicted = self.registry.evict_stale(self.stale_after).await;
        if evicted.is_empty() {
            debug!("Eviction sweep found no stale proxies");
        } else {
            info!(count = evicted.len(), proxies = ?evicted, "Eviction sweep completed");
        }
        evicted.len()
    }

    /// バックグラウンドでスイープを開始
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.sweep_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_secs = self.sweep_interval.as_secs(),
                stale_after_secs = self.stale_after.as_secs(),
                "Eviction sweeper started"
            );

            // 初回のtickは即時に完了するため読み捨てる
            timer.tick().await;

            loop {
                timer.tick().await;
                self.sweep_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatmesh_common::protocol::RegisterRequest;
    use chrono::Utc;

    async fn registry_with(proxy_id: &str, age_secs: i64) -> ProxyRegistry {
        let registry = ProxyRegistry::default();
        registry
            .register(RegisterRequest {
                proxy_id: proxy_id.to_string(),
                instance_name: "alice".to_string(),
                host: "127.0.0.1".to_string(),
                port: Some(8081),
            })
            .await
            .unwrap();
        registry
            .set_last_seen(proxy_id, Utc::now() - chrono::Duration::seconds(age_secs))
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn sweep_once_evicts_only_stale_entries() {
        let registry = registry_with("p1", 121).await;
        let sweeper = EvictionSweeper::new(
            registry.clone(),
            Duration::from_secs(60),
            Duration::from_secs(120),
        );

        assert_eq!(sweeper.sweep_once().await, 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn background_sweep_runs_on_each_tick() {
        let registry = registry_with("p1", 121).await;
        let handle = EvictionSweeper::new(
            registry.clone(),
            Duration::from_millis(20),
            Duration::from_secs(120),
        )
        .start();

        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn background_sweep_keeps_recent_entries() {
        let registry = registry_with("p1", 119).await;
        let handle = EvictionSweeper::new(
            registry.clone(),
            Duration::from_millis(20),
            Duration::from_secs(120),
        )
        .start();

        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();
        assert_eq!(registry.len().await, 1);
    }
}
