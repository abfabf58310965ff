//! Instruction - 1 つの execute 能力だけを持つ作業単位

use thiserror::Error;

use super::worker::WorkerId;

/// Instruction の失敗。Worker の境界で捕まえられ、外には `RunOutcome` としてだけ出る。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("{0}")]
    Failed(String),

    #[error("instruction panicked: {0}")]
    Panicked(String),
}

impl InstructionError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Instruction は結果コンテナを Emitter 経由で Worker に返す
///
/// # 使用例
/// ```ignore
/// struct CountDoors;
///
/// impl Instruction<usize> for CountDoors {
///     fn execute(&mut self, emit: &mut Emitter<'_, usize>) -> Result<(), InstructionError> {
///         emit.emit(42);
///         Ok(())
///     }
/// }
/// ```
///
/// `FnMut(&mut Emitter<'_, R>) -> Result<(), InstructionError>` のクロージャもそのまま使える。
pub trait Instruction<R>: Send {
    fn execute(&mut self, emit: &mut Emitter<'_, R>) -> Result<(), InstructionError>;
}

impl<R, F> Instruction<R> for F
where
    F: FnMut(&mut Emitter<'_, R>) -> Result<(), InstructionError> + Send,
{
    fn execute(&mut self, emit: &mut Emitter<'_, R>) -> Result<(), InstructionError> {
        self(emit)
    }
}

/// Worker への非所有の戻り経路
///
/// `run` の間だけ借用される。emit した結果は Worker が成功したときだけ Den に入る。
pub struct Emitter<'a, R> {
    worker: WorkerId,
    buffer: &'a mut Vec<R>,
}

impl<'a, R> Emitter<'a, R> {
    pub(super) fn new(worker: WorkerId, buffer: &'a mut Vec<R>) -> Self {
        Self { worker, buffer }
    }

    pub fn emit(&mut self, result: R) {
        self.buffer.push(result);
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// この実行で emit した件数
    pub fn emitted(&self) -> usize {
        self.buffer.len()
    }
}
