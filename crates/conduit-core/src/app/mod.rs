//! App - アプリケーション層
//!
//! ports と dispatch / cache / codec を組み合わせて request を解決する。
//!
//! # 主要コンポーネント
//! - **Exchange**: Request Envelope → Result Envelope（ExchangeBuilder で構築）
//! - **ScanInstruction**: Scanner を Dispatcher の Instruction にする

pub mod exchange;
pub mod scan;

// 主要な型を再エクスポート
pub use self::exchange::{BuildError, ERRORS_PROPERTY, Exchange, ExchangeBuilder};
pub use self::scan::ScanInstruction;
