//! Cache - プロセス共通の sliding expiration 付き key/value ストア
//!
//! # 学習ポイント
//! - `Mutex<HashMap>` による排他（1 操作 = 1 回のロック、ロックを跨いだ await はしない）
//! - `OnceLock` による遅延初期化シングルトン
//! - Clock port による TTL のテスト容易性
//!
//! # 実装
//! - アクセス（get / create / update）のたびに TTL の窓をリセットする
//! - 窓のあいだ一度も触られなかったエントリは黙って消える
//!   （get 時に遅延削除、または [`Cache::purge_expired`] / sweeper で一括削除）

mod sweeper;

pub use sweeper::{SweeperHandle, spawn_sweeper};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::config::CacheConfig;
use crate::domain::{Envelope, Identifier, Value};
use crate::ports::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("invalid cache key: alias must not be empty")]
    InvalidKey,

    #[error("global cache already initialized with ttl {active:?} (requested {requested:?})")]
    AlreadyInitialized { active: Duration, requested: Duration },
}

/// Identifier か任意の別名（unique id など）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Id(Identifier),
    Alias(String),
}

impl CacheKey {
    pub fn alias(alias: impl Into<String>) -> Result<Self, CacheError> {
        let key = CacheKey::Alias(alias.into());
        key.validate()?;
        Ok(key)
    }

    fn validate(&self) -> Result<(), CacheError> {
        match self {
            CacheKey::Alias(alias) if alias.is_empty() => Err(CacheError::InvalidKey),
            _ => Ok(()),
        }
    }
}

impl From<Identifier> for CacheKey {
    fn from(id: Identifier) -> Self {
        CacheKey::Id(id)
    }
}

impl From<&Identifier> for CacheKey {
    fn from(id: &Identifier) -> Self {
        CacheKey::Id(id.clone())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Id(id) => write!(f, "id:{id}"),
            CacheKey::Alias(alias) => write!(f, "alias:{alias}"),
        }
    }
}

/// キャッシュに置けるもの
#[derive(Debug, Clone, PartialEq)]
pub enum CachedItem {
    Envelope(Arc<Envelope>),
    Payload(Value),
}

impl CachedItem {
    pub fn as_envelope(&self) -> Option<&Envelope> {
        match self {
            CachedItem::Envelope(env) => Some(env),
            CachedItem::Payload(_) => None,
        }
    }

    pub fn as_payload(&self) -> Option<&Value> {
        match self {
            CachedItem::Payload(value) => Some(value),
            CachedItem::Envelope(_) => None,
        }
    }
}

impl From<Envelope> for CachedItem {
    fn from(env: Envelope) -> Self {
        CachedItem::Envelope(Arc::new(env))
    }
}

impl From<Value> for CachedItem {
    fn from(value: Value) -> Self {
        CachedItem::Payload(value)
    }
}

#[derive(Debug)]
struct Slot {
    item: CachedItem,
    last_access: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Cache<C = SystemClock> {
    clock: C,
    ttl: TimeDelta,
    entries: Mutex<HashMap<CacheKey, Slot>>,
}

static GLOBAL: OnceLock<Cache<SystemClock>> = OnceLock::new();

impl Cache<SystemClock> {
    /// 読み込んだ設定でプロセス共通のインスタンスを作る（[`Cache::global`] より先に呼ぶ）
    ///
    /// 同じ TTL での再呼び出しは同じインスタンスを返す。
    pub fn init_global(config: &CacheConfig) -> Result<&'static Cache<SystemClock>, CacheError> {
        let requested = config.sliding_ttl();
        let cache = GLOBAL.get_or_init(|| Cache::from_config(SystemClock, config));
        let active = cache.sliding_ttl();
        if active != requested {
            tracing::warn!(?active, ?requested, "global cache already initialized");
            return Err(CacheError::AlreadyInitialized { active, requested });
        }
        Ok(cache)
    }

    /// プロセス共通のインスタンス
    ///
    /// [`Cache::init_global`] が呼ばれていなければ、既定値 + 環境変数の設定で 1 回だけ作る。
    pub fn global() -> &'static Cache<SystemClock> {
        GLOBAL.get_or_init(|| {
            Cache::from_config(SystemClock, &CacheConfig::default().with_env_overrides())
        })
    }
}

impl<C: Clock> Cache<C> {
    pub fn new(clock: C, sliding_ttl: Duration) -> Self {
        Self {
            clock,
            ttl: TimeDelta::from_std(sliding_ttl).unwrap_or(TimeDelta::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(clock: C, config: &CacheConfig) -> Self {
        Self::new(clock, config.sliding_ttl())
    }

    pub fn sliding_ttl(&self) -> Duration {
        self.ttl.to_std().unwrap_or(Duration::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, slot: &Slot, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(slot.last_access) >= self.ttl
    }

    fn checked(key: &CacheKey) -> Result<(), CacheError> {
        key.validate().inspect_err(|_| {
            tracing::warn!(%key, "rejected cache key");
        })
    }

    /// 挿入する（同じキーがあれば置き換える）
    pub fn create(&self, key: CacheKey, item: impl Into<CachedItem>) -> Result<(), CacheError> {
        Self::checked(&key)?;
        let slot = Slot {
            item: item.into(),
            last_access: self.clock.now(),
        };
        self.lock().insert(key, slot);
        Ok(())
    }

    /// ヒットしたら TTL の窓をリセットして値を返す。期限切れはここで消す。
    pub fn get(&self, key: &CacheKey) -> Result<Option<CachedItem>, CacheError> {
        Self::checked(key)?;
        let now = self.clock.now();
        let mut entries = self.lock();
        Ok(self.touch(&mut entries, key, now))
    }

    /// 見つかったキーだけを返す
    pub fn get_many<'k, I>(&self, keys: I) -> Result<HashMap<CacheKey, CachedItem>, CacheError>
    where
        I: IntoIterator<Item = &'k CacheKey>,
    {
        let keys: Vec<&CacheKey> = keys.into_iter().collect();
        for key in &keys {
            Self::checked(key)?;
        }

        let now = self.clock.now();
        let mut entries = self.lock();
        Ok(keys
            .into_iter()
            .filter_map(|key| {
                self.touch(&mut entries, key, now)
                    .map(|item| (key.clone(), item))
            })
            .collect())
    }

    fn touch(
        &self,
        entries: &mut HashMap<CacheKey, Slot>,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> Option<CachedItem> {
        let expired = self.is_expired(entries.get(key)?, now);
        if expired {
            entries.remove(key);
            tracing::debug!(%key, "cache entry expired");
            return None;
        }
        let slot = entries.get_mut(key)?;
        slot.last_access = now;
        Some(slot.item.clone())
    }

    /// delete + create を 1 回のロックで行う（途中のミスは外から見えない）
    pub fn update(&self, key: CacheKey, item: impl Into<CachedItem>) -> Result<(), CacheError> {
        Self::checked(&key)?;
        let slot = Slot {
            item: item.into(),
            last_access: self.clock.now(),
        };
        let mut entries = self.lock();
        entries.remove(&key);
        entries.insert(key, slot);
        Ok(())
    }

    /// 冪等。消したかどうかを返す。
    pub fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Self::checked(key)?;
        Ok(self.lock().remove(key).is_some())
    }

    /// 期限切れを一括削除して件数を返す
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, slot| !self.is_expired(slot, now));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = entries.len(), "purged expired cache entries");
        }
        purged
    }

    /// 期限切れ未回収のエントリも数える
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
