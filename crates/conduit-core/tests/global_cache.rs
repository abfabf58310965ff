//! 設定ファイルの TTL がプロセス共通キャッシュまで届くこと
//!
//! グローバルはプロセスに 1 つなので、このファイルには 1 テストだけ置く。

use std::time::Duration;

use conduit_core::cache::{Cache, CacheError};
use conduit_core::config::ConduitConfig;

#[test]
fn file_ttl_reaches_the_global_cache() {
    let path = std::env::temp_dir().join(format!("conduit-global-cache-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"cache":{"sliding_ttl_secs":5}}"#).unwrap();
    let config = ConduitConfig::load(Some(&path)).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(config.cache.sliding_ttl(), Duration::from_secs(5));

    let cache = Cache::init_global(&config.cache).unwrap();
    assert_eq!(cache.sliding_ttl(), Duration::from_secs(5));
    assert!(std::ptr::eq(cache, Cache::global()));

    // 同じ設定なら何度呼んでもよい
    assert!(std::ptr::eq(Cache::init_global(&config.cache).unwrap(), cache));

    let mut other = config.cache.clone();
    other.sliding_ttl_secs = 60;
    assert_eq!(
        Cache::init_global(&other).unwrap_err(),
        CacheError::AlreadyInitialized {
            active: Duration::from_secs(5),
            requested: Duration::from_secs(60),
        }
    );
}
