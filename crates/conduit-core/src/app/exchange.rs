//! Exchange - Request Envelope を解決して Result Envelope を返すサービス
//!
//! # 学習ポイント
//! - Builder パターン + 起動時検証（Scanner が 1 つもなければ build できない）
//! - 同期の Dispatcher と非同期の RecordSink の組み合わせ（ロックを跨いだ await はしない）
//! - `Deref<Target = Cache<C>>` で `Cache::global()` とテスト用の `Arc<Cache<_>>` を同じ型で扱う
//!
//! # RequestType ごとの処理
//! - **Get**: キーが全部キャッシュにあればそれを返す。なければ scan してキャッシュに写す
//! - **Post**: 必ず scan し直してキャッシュを上書きする
//! - **Put**: payload の entry をキャッシュに置き、RecordSink があればエンコードして渡す
//! - **Delete**: キャッシュから消す
//!
//! 解決した Envelope は Identifier をキーにキャッシュへ置く。

use std::ops::Deref;
use std::sync::Arc;

use crate::cache::{Cache, CacheKey, CachedItem};
use crate::codec;
use crate::config::ConduitConfig;
use crate::dispatch::{Aggregator, DispatchReport};
use crate::domain::envelope::{KEY_PROPERTY, PAYLOAD_PROPERTY};
use crate::domain::{
    ElementRecord, Envelope, EnvelopeError, MessageType, Properties, RequestType, Resolution,
    Value,
};
use crate::error::ConduitError;
use crate::ports::{Clock, CuidGenerator, IdGenerator, RecordSink, Scanner, SystemClock};

use super::scan::ScanInstruction;

/// 失敗した Worker の理由を載せる property
pub const ERRORS_PROPERTY: &str = "errors";

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no scanner registered; an exchange needs at least one")]
    NoScanners,
}

pub struct ExchangeBuilder<K> {
    scanners: Vec<Arc<dyn Scanner>>,
    ids: Option<Arc<dyn IdGenerator>>,
    sink: Option<Arc<dyn RecordSink>>,
    cache: K,
}

impl ExchangeBuilder<&'static Cache> {
    pub fn new() -> Self {
        Self {
            scanners: Vec::new(),
            ids: None,
            sink: None,
            cache: Cache::global(),
        }
    }
}

impl Default for ExchangeBuilder<&'static Cache> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ExchangeBuilder<K> {
    pub fn scanner(mut self, scanner: impl Scanner + 'static) -> Self {
        self.scanners.push(Arc::new(scanner));
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn record_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// identifier.prefix を反映した generator を使う
    pub fn config(self, config: &ConduitConfig) -> Self {
        let ids = CuidGenerator::with_prefix(SystemClock, config.identifier.prefix);
        self.id_generator(Arc::new(ids))
    }

    /// プロセス共通のキャッシュ以外を使う（テストなど）
    pub fn cache<K2>(self, cache: K2) -> ExchangeBuilder<K2> {
        ExchangeBuilder {
            scanners: self.scanners,
            ids: self.ids,
            sink: self.sink,
            cache,
        }
    }

    pub fn build(self) -> Result<Exchange<K>, BuildError> {
        if self.scanners.is_empty() {
            return Err(BuildError::NoScanners);
        }
        Ok(Exchange {
            scanners: self.scanners,
            ids: self
                .ids
                .unwrap_or_else(|| Arc::new(CuidGenerator::new(SystemClock))),
            sink: self.sink,
            cache: self.cache,
        })
    }
}

pub struct Exchange<K = &'static Cache> {
    scanners: Vec<Arc<dyn Scanner>>,
    ids: Arc<dyn IdGenerator>,
    sink: Option<Arc<dyn RecordSink>>,
    cache: K,
}

impl Exchange {
    pub fn builder() -> ExchangeBuilder<&'static Cache> {
        ExchangeBuilder::new()
    }
}

/// 1 回の scan の結果（Den の中身 + 集計）
struct Scanned {
    records: Vec<ElementRecord>,
    failures: Vec<String>,
    report: DispatchReport,
}

impl Scanned {
    /// 全 Worker が失敗したときだけ Rejected
    fn resolution(&self) -> Resolution {
        if self.report.succeeded() == 0 && self.report.failed() > 0 {
            Resolution::Rejected
        } else {
            Resolution::Accepted
        }
    }
}

impl<K, C> Exchange<K>
where
    K: Deref<Target = Cache<C>>,
    C: Clock,
{
    pub fn cache(&self) -> &Cache<C> {
        &self.cache
    }

    /// Request を解決する。Request 以外を渡すと `EnvelopeError::AlreadyResolved`。
    pub async fn resolve(&self, request: &Envelope) -> Result<Envelope, ConduitError> {
        if request.message_type() != MessageType::Request {
            return Err(EnvelopeError::AlreadyResolved(request.message_type()).into());
        }
        tracing::debug!(
            id = %request.id(),
            request_type = %request.request_type(),
            "resolving request"
        );

        let (resolution, properties) = match request.request_type() {
            RequestType::Get => self.read(&request.keys())?,
            RequestType::Post => self.refresh(&request.keys())?,
            RequestType::Put => self.store(request.payload()).await?,
            RequestType::Delete => self.forget(&request.keys())?,
        };

        let resolved = request.deep_copy(resolution, properties)?;
        self.cache
            .update(CacheKey::from(resolved.id()), resolved.clone())?;
        tracing::info!(
            id = %resolved.id(),
            message_type = %resolved.message_type(),
            "request resolved"
        );
        Ok(resolved)
    }

    fn read(&self, keys: &[&str]) -> Result<(Resolution, Properties), ConduitError> {
        if let Some(records) = self.cached(keys)? {
            tracing::debug!(hits = records.len(), "served from cache");
            return Ok((Resolution::Accepted, payload_properties(records, Vec::new())));
        }
        self.refresh(keys)
    }

    fn refresh(&self, keys: &[&str]) -> Result<(Resolution, Properties), ConduitError> {
        let scanned = self.scan(keys);
        for record in &scanned.records {
            self.mirror(record)?;
        }
        let resolution = scanned.resolution();
        Ok((resolution, payload_properties(scanned.records, scanned.failures)))
    }

    async fn store(
        &self,
        payload: &[ElementRecord],
    ) -> Result<(Resolution, Properties), ConduitError> {
        let mut stored = Vec::with_capacity(payload.len());
        for record in payload {
            self.mirror(record)?;
            if let Some(sink) = &self.sink {
                let encoded = codec::write_entry(record)?;
                sink.store(&record.unique_id, encoded).await?;
            }
            stored.push(Value::Text(record.unique_id.clone()));
        }
        Ok((Resolution::Accepted, keyed_properties(stored)))
    }

    fn forget(&self, keys: &[&str]) -> Result<(Resolution, Properties), ConduitError> {
        let mut deleted = Vec::new();
        for key in keys {
            if self.cache.delete(&CacheKey::alias(*key)?)? {
                deleted.push(Value::from(*key));
            }
        }
        Ok((Resolution::Accepted, keyed_properties(deleted)))
    }

    /// 全キーがキャッシュにあるときだけ Some（キー指定なしは常に scan）
    fn cached(&self, keys: &[&str]) -> Result<Option<Vec<ElementRecord>>, ConduitError> {
        if keys.is_empty() {
            return Ok(None);
        }
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let hit = self.cache.get(&CacheKey::alias(*key)?)?;
            match hit
                .as_ref()
                .and_then(CachedItem::as_payload)
                .and_then(Value::as_element)
            {
                Some(record) => records.push(record.clone()),
                None => return Ok(None),
            }
        }
        Ok(Some(records))
    }

    fn mirror(&self, record: &ElementRecord) -> Result<(), ConduitError> {
        let key = CacheKey::alias(record.unique_id.as_str())?;
        self.cache.update(key, Value::from(record.clone()))?;
        Ok(())
    }

    fn scan(&self, keys: &[&str]) -> Scanned {
        let mut aggregator = Aggregator::new();
        for scanner in &self.scanners {
            let instruction = ScanInstruction::new(Arc::clone(scanner), Arc::clone(&self.ids))
                .only(keys.iter().copied());
            aggregator.register(instruction);
        }
        let report = aggregator.dispatch();
        let den = aggregator.take_den();
        let failures = den
            .failures()
            .map(|(worker, reason)| format!("{worker}: {reason}"))
            .collect();
        Scanned {
            records: den.into_results(),
            failures,
            report,
        }
    }
}

fn payload_properties(records: Vec<ElementRecord>, failures: Vec<String>) -> Properties {
    let mut properties = Properties::new();
    properties.insert(PAYLOAD_PROPERTY.to_string(), Value::Payload(records));
    if !failures.is_empty() {
        properties.insert(ERRORS_PROPERTY.to_string(), Value::list(failures));
    }
    properties
}

fn keyed_properties(keys: Vec<Value>) -> Properties {
    let mut properties = Properties::new();
    properties.insert(KEY_PROPERTY.to_string(), Value::List(keys));
    properties
}
