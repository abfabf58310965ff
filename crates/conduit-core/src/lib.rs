//! conduit-core
//!
//! BIM ホストと外部システムのあいだでメッセージを受け渡すためのコア。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（Identifier, Envelope, ElementRecord, Value, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, Scanner, RecordSink）
//! - **codec**: Envelope / payload entry の JSON wire 形式（前方向ストリーミング）
//! - **dispatch**: Instruction / Worker / Aggregator による同期バッチ実行
//! - **cache**: sliding expiration 付きのプロセス共通キャッシュ
//! - **app**: 上記を組み合わせた Exchange サービス
//! - **config**: JSON ファイル + 環境変数による設定

pub mod app;
pub mod cache;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod ports;

pub use crate::error::ConduitError;
