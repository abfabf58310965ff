//! Ports - 抽象化レイヤー
//!
//! 時刻・ID 生成・ホスト側コラボレータ（Scanner / RecordSink）への
//! インターフェースを trait として定義し、テストで差し替えられるようにする。

pub mod clock;
pub mod id_generator;
pub mod scanner;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{CuidGenerator, IdGenerator};
pub use self::scanner::{
    MemoryRecordSink, RecordSink, ScanError, ScannedFact, Scanner, SinkError, StaticScanner,
};
