//! Scanner / RecordSink port - ホスト側コラボレータとの境界
//!
//! # 実装
//! - **Scanner**: 名前とプレーンな key/value の事実（ScannedFact）をコアに渡す
//! - **RecordSink**: エンコード済みの payload entry を受け取る（リレーショナル DB の代役）
//!
//! テスト・デモ用に in-memory 実装（StaticScanner / MemoryRecordSink）を置く。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

/// ホストから取れた 1 要素分の事実
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannedFact {
    pub unique_id: String,
    pub element_id: Option<i64>,
    pub element_type_id: Option<i64>,
    pub name: String,
    /// `OST_Doors` のような組み込みカテゴリ名
    pub category: Option<String>,
    pub values: BTreeMap<String, String>,
}

impl ScannedFact {
    pub fn new(unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_element_id(mut self, element_id: i64) -> Self {
        self.element_id = Some(element_id);
        self
    }

    pub fn with_element_type_id(mut self, element_type_id: i64) -> Self {
        self.element_type_id = Some(element_type_id);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("scanner {scanner} unavailable: {reason}")]
    Unavailable { scanner: String, reason: String },
}

/// Scanner は同期的に事実を列挙する（Dispatcher が同期なので）
pub trait Scanner: Send + Sync {
    fn name(&self) -> &str;
    fn scan(&self) -> Result<Vec<ScannedFact>, ScanError>;
}

impl<S: Scanner + ?Sized> Scanner for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn scan(&self) -> Result<Vec<ScannedFact>, ScanError> {
        (**self).scan()
    }
}

/// 決まった事実を返すだけの Scanner
#[derive(Debug, Clone)]
pub struct StaticScanner {
    name: String,
    facts: Vec<ScannedFact>,
}

impl StaticScanner {
    pub fn new(name: impl Into<String>, facts: Vec<ScannedFact>) -> Self {
        Self {
            name: name.into(),
            facts,
        }
    }
}

impl Scanner for StaticScanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan(&self) -> Result<Vec<ScannedFact>, ScanError> {
        Ok(self.facts.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("record sink rejected {unique_id}: {reason}")]
    Rejected { unique_id: String, reason: String },
}

/// RecordSink はエンコード済み entry を unique id 単位で受け取る
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn store(&self, unique_id: &str, encoded: Vec<u8>) -> Result<(), SinkError>;
}

/// 受け取った entry を順番に保持するだけの sink
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(String, Vec<u8>)> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn store(&self, unique_id: &str, encoded: Vec<u8>) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((unique_id.to_string(), encoded));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_scanner_returns_its_facts() {
        let fact = ScannedFact::new("door-42", "Single Flush")
            .with_element_id(987)
            .with_category("OST_Doors")
            .with_value("Mark", "D1");
        let scanner = StaticScanner::new("doors", vec![fact.clone()]);

        assert_eq!(scanner.name(), "doors");
        assert_eq!(scanner.scan().unwrap(), vec![fact]);
    }

    #[tokio::test]
    async fn memory_sink_keeps_arrival_order() {
        let sink = MemoryRecordSink::new();
        sink.store("a", b"1".to_vec()).await.unwrap();
        sink.store("b", b"2".to_vec()).await.unwrap();

        let ids: Vec<_> = sink.records().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
