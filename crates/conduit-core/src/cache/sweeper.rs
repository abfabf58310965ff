//! Sweeper - 期限切れエントリを定期的に掃除するバックグラウンドタスク

use std::ops::Deref;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::Cache;
use crate::ports::Clock;

/// 定期的に [`Cache::purge_expired`] を呼ぶバックグラウンドタスクのハンドル
/// - `shutdown_tx` を drop してもタスクは止まる
/// - `shutdown_and_join()` で終了を待てる
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn request_shutdown(&self) {
        // receiver がもういない場合は無視
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

/// `Arc<Cache<_>>` でも `Cache::global()` の `&'static` でも渡せる
pub fn spawn_sweeper<S, C>(cache: S, interval: Duration) -> SweeperHandle
where
    S: Deref<Target = Cache<C>> + Send + Sync + 'static,
    C: Clock + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // sender が drop されたら終了
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    cache.purge_expired();
                }
            }
        }
        tracing::debug!("cache sweeper stopped");
    });

    SweeperHandle { shutdown_tx, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use crate::domain::Value;
    use crate::ports::ManualClock;
    use chrono::{TimeDelta, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn sweeper_purges_in_background() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(Cache::new(clock.clone(), Duration::from_secs(60)));
        cache
            .create(CacheKey::alias("abc123").unwrap(), Value::Integer(1))
            .unwrap();
        clock.advance(TimeDelta::seconds(61));

        let sweeper = spawn_sweeper(Arc::clone(&cache), Duration::from_millis(5));
        for _ in 0..100 {
            if cache.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        sweeper.shutdown_and_join().await;

        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let cache = Arc::new(Cache::new(
            Arc::new(ManualClock::new(Utc::now())),
            Duration::from_secs(60),
        ));
        let sweeper = spawn_sweeper(cache, Duration::from_secs(3600));

        tokio::time::timeout(Duration::from_secs(1), sweeper.shutdown_and_join())
            .await
            .expect("sweeper should stop promptly");
    }
}
