//! Execution Dispatcher
//!
//! Aggregator が Worker を登録順に同期実行し、結果を Den に集める。
//! Worker の失敗（Err / panic）は Worker の境界で止まり、dispatch 全体は止まらない。

pub mod aggregator;
pub mod instruction;
pub mod worker;

pub use aggregator::{Aggregator, AggregatorId, Den, DenSlot, DispatchReport};
pub use instruction::{Emitter, Instruction, InstructionError};
pub use worker::{RunOutcome, Worker, WorkerId, WorkerState};
