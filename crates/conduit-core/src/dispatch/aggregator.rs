//! Aggregator - Worker の束と Den を所有し、登録順に 1 回ずつ実行する
//!
//! # 実装
//! - Worker は Vec のインデックスで所有する（Worker → Aggregator の参照は `AggregatorId` だけ）
//! - `dispatch()` は同期・直列。失敗しても次の Worker に進む（short-circuit しない）
//! - 1 回の dispatch で各 Worker はちょうど 1 回だけ試行される（リトライなし）

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::instruction::Instruction;
use super::worker::{RunOutcome, Worker, WorkerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregatorId(u64);

impl AggregatorId {
    pub(super) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for AggregatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aggregator-{}", self.0)
    }
}

/// Den の 1 スロット
#[derive(Debug, Clone, PartialEq)]
pub enum DenSlot<R> {
    Result { worker: WorkerId, value: R },
    Failure { worker: WorkerId, reason: String },
}

impl<R> DenSlot<R> {
    pub fn worker(&self) -> WorkerId {
        match self {
            DenSlot::Result { worker, .. } | DenSlot::Failure { worker, .. } => *worker,
        }
    }
}

/// dispatch 中に作られた結果コンテナの順序付き集合
#[derive(Debug, Clone, PartialEq)]
pub struct Den<R> {
    slots: Vec<DenSlot<R>>,
}

impl<R> Default for Den<R> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<R> Den<R> {
    pub(super) fn commit(&mut self, worker: WorkerId, results: Vec<R>) {
        self.slots
            .extend(results.into_iter().map(|value| DenSlot::Result { worker, value }));
    }

    pub(super) fn fail(&mut self, worker: WorkerId, reason: String) {
        self.slots.push(DenSlot::Failure { worker, reason });
    }

    pub fn slots(&self) -> &[DenSlot<R>] {
        &self.slots
    }

    pub fn results(&self) -> impl Iterator<Item = &R> {
        self.slots.iter().filter_map(|slot| match slot {
            DenSlot::Result { value, .. } => Some(value),
            DenSlot::Failure { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (WorkerId, &str)> {
        self.slots.iter().filter_map(|slot| match slot {
            DenSlot::Failure { worker, reason } => Some((*worker, reason.as_str())),
            DenSlot::Result { .. } => None,
        })
    }

    pub fn into_results(self) -> Vec<R> {
        self.slots
            .into_iter()
            .filter_map(|slot| match slot {
                DenSlot::Result { value, .. } => Some(value),
                DenSlot::Failure { .. } => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// 1 回の dispatch の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcomes: Vec<(WorkerId, RunOutcome)>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RunOutcome::NoOp))
            .count()
    }
}

pub struct Aggregator<R> {
    id: AggregatorId,
    workers: Vec<Worker<R>>,
    den: Den<R>,
}

impl<R> Default for Aggregator<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Aggregator<R> {
    pub fn new() -> Self {
        Self {
            id: AggregatorId::next(),
            workers: Vec::new(),
            den: Den::default(),
        }
    }

    pub fn id(&self) -> AggregatorId {
        self.id
    }

    /// Instruction を持つ Worker を登録する
    pub fn register(&mut self, instruction: impl Instruction<R> + 'static) -> WorkerId {
        self.push(Some(Box::new(instruction)))
    }

    /// Instruction なしの Worker を登録する（dispatch では NoOp になる）
    pub fn register_idle(&mut self) -> WorkerId {
        self.push(None)
    }

    fn push(&mut self, instruction: Option<Box<dyn Instruction<R>>>) -> WorkerId {
        let id = WorkerId::new(self.id, self.workers.len());
        self.workers.push(Worker::new(id, instruction));
        id
    }

    pub fn workers(&self) -> &[Worker<R>] {
        &self.workers
    }

    pub fn den(&self) -> &Den<R> {
        &self.den
    }

    /// 直近の dispatch の Den を取り出す
    pub fn take_den(&mut self) -> Den<R> {
        std::mem::take(&mut self.den)
    }

    /// 全 Worker を登録順に 1 回ずつ実行する。Den は毎回作り直す。
    pub fn dispatch(&mut self) -> DispatchReport {
        let span = tracing::debug_span!("dispatch", aggregator = %self.id, workers = self.workers.len());
        let _enter = span.enter();

        self.den = Den::default();
        let mut report = DispatchReport::default();
        for worker in &mut self.workers {
            let outcome = worker.run(&mut self.den);
            match &outcome {
                RunOutcome::NoOp => tracing::debug!(worker = %worker.id(), "no instruction attached"),
                RunOutcome::Succeeded { emitted } => {
                    tracing::debug!(worker = %worker.id(), emitted, "worker succeeded")
                }
                RunOutcome::Failed { reason } => {
                    tracing::warn!(worker = %worker.id(), %reason, "worker failed")
                }
            }
            report.outcomes.push((worker.id(), outcome));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Emitter, InstructionError};
    use rstest::rstest;

    fn push(value: &'static str) -> impl Instruction<&'static str> {
        move |emit: &mut Emitter<'_, &'static str>| -> Result<(), InstructionError> {
            emit.emit(value);
            Ok(())
        }
    }

    fn fail(reason: &'static str) -> impl Instruction<&'static str> {
        move |_: &mut Emitter<'_, &'static str>| -> Result<(), InstructionError> {
            Err(InstructionError::failed(reason))
        }
    }

    #[test]
    fn den_follows_registration_order() {
        let mut agg = Aggregator::new();
        for value in ["r1", "r2", "r3"] {
            agg.register(push(value));
        }

        let report = agg.dispatch();

        assert_eq!(report.succeeded(), 3);
        assert_eq!(agg.den().results().copied().collect::<Vec<_>>(), vec!["r1", "r2", "r3"]);
    }

    #[rstest]
    #[case::first_fails(0, vec!["r2", "r3"])]
    #[case::middle_fails(1, vec!["r1", "r3"])]
    #[case::last_fails(2, vec!["r1", "r2"])]
    fn failing_worker_is_skipped(#[case] failing: usize, #[case] expected: Vec<&'static str>) {
        let mut agg = Aggregator::new();
        for (i, value) in ["r1", "r2", "r3"].into_iter().enumerate() {
            if i == failing {
                agg.register(fail("scan failed"));
            } else {
                agg.register(push(value));
            }
        }

        let report = agg.dispatch();

        assert_eq!(report.failed(), 1);
        assert_eq!(agg.den().results().copied().collect::<Vec<_>>(), expected);
        let failures: Vec<_> = agg.den().failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.index(), failing);
        assert_eq!(failures[0].1, "scan failed");
    }

    #[test]
    fn panic_does_not_stop_later_workers() {
        let mut agg = Aggregator::new();
        agg.register(push("r1"));
        agg.register(|_: &mut Emitter<'_, &'static str>| -> Result<(), InstructionError> {
            panic!("host crashed")
        });
        agg.register(push("r3"));

        let report = agg.dispatch();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(agg.take_den().into_results(), vec!["r1", "r3"]);
    }

    #[test]
    fn idle_worker_is_noop() {
        let mut agg = Aggregator::new();
        agg.register_idle();
        agg.register(push("r1"));

        let report = agg.dispatch();

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.outcomes[0].1, RunOutcome::NoOp);
        assert_eq!(agg.den().len(), 1);
    }

    #[test]
    fn each_dispatch_starts_a_fresh_den() {
        let mut agg = Aggregator::new();
        agg.register(push("r1"));

        agg.dispatch();
        agg.dispatch();

        assert_eq!(agg.den().results().count(), 1);
    }

    #[test]
    fn worker_ids_belong_to_their_aggregator() {
        let mut a = Aggregator::<&'static str>::new();
        let mut b = Aggregator::<&'static str>::new();
        let wa = a.register_idle();
        let wb = b.register_idle();

        assert_eq!(wa.aggregator(), a.id());
        assert_ne!(wa, wb);
    }
}
