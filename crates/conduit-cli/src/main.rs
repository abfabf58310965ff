use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use conduit_core::app::Exchange;
use conduit_core::cache::{Cache, spawn_sweeper};
use conduit_core::codec;
use conduit_core::config::ConduitConfig;
use conduit_core::domain::Envelope;
use conduit_core::ports::{RecordSink, ScanError, ScannedFact, Scanner, SinkError};

/// facts ファイルの 1 行分（`[{"uniqueId": ..., "name": ..., ...}]`）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FactFile {
    unique_id: String,
    name: String,
    element_id: Option<i64>,
    element_type_id: Option<i64>,
    category: Option<String>,
    #[serde(default)]
    values: BTreeMap<String, String>,
}

impl From<FactFile> for ScannedFact {
    fn from(f: FactFile) -> Self {
        ScannedFact {
            unique_id: f.unique_id,
            element_id: f.element_id,
            element_type_id: f.element_type_id,
            name: f.name,
            category: f.category,
            values: f.values,
        }
    }
}

/// ホストの代わりに facts を返す scanner
struct DemoScanner {
    facts: Vec<ScannedFact>,
}

impl DemoScanner {
    fn builtin() -> Self {
        Self {
            facts: vec![
                ScannedFact::new("door-42", "Single Flush 0915 x 2134mm")
                    .with_element_id(987)
                    .with_element_type_id(512)
                    .with_category("OST_Doors")
                    .with_value("Mark", "D1")
                    .with_value("Fire Rating", "30min"),
                ScannedFact::new("wall-7", "Basic Wall 200mm")
                    .with_element_id(311)
                    .with_category("OST_Walls")
                    .with_value("Unconnected Height", "3000"),
            ],
        }
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read(path).with_context(|| format!("read facts {}", path.display()))?;
        let facts: Vec<FactFile> = serde_json::from_slice(&raw)
            .with_context(|| format!("parse facts {}", path.display()))?;
        Ok(Self {
            facts: facts.into_iter().map(ScannedFact::from).collect(),
        })
    }
}

impl Scanner for DemoScanner {
    fn name(&self) -> &str {
        "demo"
    }

    fn scan(&self) -> Result<Vec<ScannedFact>, ScanError> {
        Ok(self.facts.clone())
    }
}

/// 受け取った entry を stdout に出すだけの sink
struct StdoutSink;

#[async_trait]
impl RecordSink for StdoutSink {
    async fn store(&self, unique_id: &str, encoded: Vec<u8>) -> Result<(), SinkError> {
        println!("sink <- {unique_id}: {}", String::from_utf8_lossy(&encoded));
        Ok(())
    }
}

/// conduit: scan → dispatch → wire → cache を一通り回すデモ
#[derive(Parser, Debug)]
#[command(name = "conduit")]
#[command(about = "Resolve element requests against a demo scanner")]
struct Args {
    /// JSON 設定ファイル（省略時は既定値 + 環境変数）
    #[arg(long)]
    config: Option<PathBuf>,

    /// facts JSON（省略時は組み込みのデモデータ）
    #[arg(long)]
    facts: Option<PathBuf>,

    /// 取得する unique id（空なら全件）
    keys: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = ConduitConfig::load(args.config.as_deref())?;
    tracing::info!(?config, "loaded config");

    let scanner = match &args.facts {
        Some(path) => DemoScanner::from_file(path)?,
        None => DemoScanner::builtin(),
    };

    // (A) プロセス共通キャッシュを設定から作り、掃除を裏で回す
    let cache = Cache::init_global(&config.cache)?;
    let sweeper = spawn_sweeper(cache, config.cache.sweep_interval());

    let exchange = Exchange::builder()
        .scanner(scanner)
        .config(&config)
        .record_sink(Arc::new(StdoutSink))
        .build()?;

    // (B) Get: scan → Den → Result Envelope
    let request = Envelope::read(args.keys.clone());
    let resolved = exchange.resolve(&request).await?;
    println!("{}", String::from_utf8_lossy(&codec::write_envelope(&resolved)?));

    // (C) wire から読み戻せることを確認
    let decoded = codec::read_envelope(&codec::write_envelope(&resolved)?)?;
    tracing::info!(id = %decoded.id(), entries = decoded.payload().len(), "round trip ok");

    // (D) Put: 読んだ entry をそのまま sink へ
    let put = Envelope::add("demo", "echo of the scanned entries", decoded.payload().to_vec());
    let stored = exchange.resolve(&put).await?;
    tracing::info!(stored = ?stored.keys(), "put resolved");

    // (E) 二度目の Get（キー指定があればキャッシュから返る）
    let again = exchange.resolve(&Envelope::read(args.keys)).await?;
    tracing::info!(entries = again.payload().len(), cached = cache.len(), "second read");

    sweeper.shutdown_and_join().await;
    Ok(())
}
