//! Worker - 1 つの Instruction を 1 つの Aggregator に結びつけて実行する
//!
//! # 状態遷移
//! ```text
//! Idle --run()--> Attached --execute()--> Succeeded | Failed
//! ```
//! Instruction が付いていない Worker は `NoOp` を返し、成功とは区別する。

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use super::aggregator::{AggregatorId, Den};
use super::instruction::{Emitter, Instruction, InstructionError};

/// Worker の識別子（所属 Aggregator + 登録順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId {
    aggregator: AggregatorId,
    index: usize,
}

impl WorkerId {
    pub(super) fn new(aggregator: AggregatorId, index: usize) -> Self {
        Self { aggregator, index }
    }

    pub fn aggregator(self) -> AggregatorId {
        self.aggregator
    }

    /// 登録順（0 始まり）
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/worker-{}", self.aggregator, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Attached,
    Succeeded,
    Failed,
}

/// 1 回の `run` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Instruction が付いていなかった
    NoOp,
    Succeeded { emitted: usize },
    Failed { reason: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

pub struct Worker<R> {
    id: WorkerId,
    instruction: Option<Box<dyn Instruction<R>>>,
    state: WorkerState,
}

impl<R> Worker<R> {
    pub(super) fn new(id: WorkerId, instruction: Option<Box<dyn Instruction<R>>>) -> Self {
        Self {
            id,
            instruction,
            state: WorkerState::Idle,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn has_instruction(&self) -> bool {
        self.instruction.is_some()
    }

    /// Instruction を 1 回だけ実行する。失敗・panic はここで止めて外に漏らさない。
    pub(super) fn run(&mut self, den: &mut Den<R>) -> RunOutcome {
        let id = self.id;
        let Some(instruction) = self.instruction.as_mut() else {
            return RunOutcome::NoOp;
        };
        self.state = WorkerState::Attached;

        let mut buffer = Vec::new();
        let executed = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut emitter = Emitter::new(id, &mut buffer);
            instruction.execute(&mut emitter)
        }));
        let error = match executed {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(InstructionError::Panicked(panic_message(payload.as_ref()))),
        };

        match error {
            None => {
                self.state = WorkerState::Succeeded;
                let emitted = buffer.len();
                den.commit(id, buffer);
                RunOutcome::Succeeded { emitted }
            }
            Some(err) => {
                // 失敗した Worker が途中まで emit したものは Den に入れない
                self.state = WorkerState::Failed;
                let reason = err.to_string();
                den.fail(id, reason.clone());
                RunOutcome::Failed { reason }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker<R>(instruction: Option<Box<dyn Instruction<R>>>) -> Worker<R> {
        Worker::new(WorkerId::new(AggregatorId::next(), 0), instruction)
    }

    #[test]
    fn run_without_instruction_is_noop() {
        let mut den = Den::<u32>::default();
        let mut w = worker(None);

        assert_eq!(w.run(&mut den), RunOutcome::NoOp);
        assert_eq!(w.state(), WorkerState::Idle);
        assert!(den.is_empty());
    }

    #[test]
    fn successful_run_commits_results() {
        let mut den = Den::default();
        let mut w = worker(Some(Box::new(|emit: &mut Emitter<'_, u32>| -> Result<(), InstructionError> {
            emit.emit(1);
            emit.emit(2);
            Ok(())
        })));

        assert_eq!(w.run(&mut den), RunOutcome::Succeeded { emitted: 2 });
        assert_eq!(w.state(), WorkerState::Succeeded);
        assert_eq!(den.results().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn failed_run_discards_partial_results() {
        let mut den = Den::default();
        let mut w = worker(Some(Box::new(|emit: &mut Emitter<'_, u32>| -> Result<(), InstructionError> {
            emit.emit(1);
            Err(InstructionError::failed("host call failed"))
        })));

        let outcome = w.run(&mut den);
        assert_eq!(
            outcome,
            RunOutcome::Failed {
                reason: "host call failed".into()
            }
        );
        assert_eq!(w.state(), WorkerState::Failed);
        assert_eq!(den.results().count(), 0);
        assert_eq!(
            den.failures().map(|(_, r)| r).collect::<Vec<_>>(),
            vec!["host call failed"]
        );
    }

    #[test]
    fn panic_is_contained() {
        let mut den = Den::<u32>::default();
        let mut w = worker(Some(Box::new(|_: &mut Emitter<'_, u32>| -> Result<(), InstructionError> {
            panic!("boom")
        })));

        let outcome = w.run(&mut den);
        assert!(outcome.is_failure());
        assert_eq!(
            outcome,
            RunOutcome::Failed {
                reason: "instruction panicked: boom".into()
            }
        );
    }
}
