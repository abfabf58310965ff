//! ScanInstruction - Scanner を Instruction に変換する
//!
//! # 実装
//! 1. Scanner から事実を取る（失敗は InstructionError として Worker に返す）
//! 2. unique id で絞り込む（キー指定がなければ全件）
//! 3. 1 事実 = 1 ElementRecord として emit する

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::dispatch::{Emitter, Instruction, InstructionError};
use crate::domain::{BuiltInCategory, CategoryType, ElementRecord, Parameter};
use crate::ports::{IdGenerator, ScannedFact, Scanner};

pub struct ScanInstruction<S> {
    scanner: S,
    ids: Arc<dyn IdGenerator>,
    only: BTreeSet<String>,
}

impl<S: Scanner> ScanInstruction<S> {
    pub fn new(scanner: S, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            scanner,
            ids,
            only: BTreeSet::new(),
        }
    }

    /// 指定した unique id だけを emit する（空なら全件）
    pub fn only<I, K>(mut self, unique_ids: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.only = unique_ids.into_iter().map(Into::into).collect();
        self
    }

    fn wanted(&self, fact: &ScannedFact) -> bool {
        self.only.is_empty() || self.only.contains(&fact.unique_id)
    }

    fn record(&self, fact: ScannedFact) -> ElementRecord {
        let mut record = ElementRecord::new(fact.unique_id, self.ids.generate()).with_name(fact.name);
        if let Some(element_id) = fact.element_id {
            record = record.with_element_id(element_id);
        }
        if let Some(element_type_id) = fact.element_type_id {
            record = record.with_element_type_id(element_type_id);
        }
        if let Some(raw) = fact.category {
            match raw.parse::<BuiltInCategory>() {
                Ok(category) => record = record.with_category(CategoryType::Model, category),
                Err(raw) => tracing::warn!(
                    scanner = self.scanner.name(),
                    unique_id = %record.unique_id,
                    category = %raw,
                    "malformed built-in category, leaving it invalid"
                ),
            }
        }
        fact.values
            .into_iter()
            .fold(record, |record, (key, value)| record.with_parameter(Parameter::text(key, value)))
    }
}

impl<S: Scanner> Instruction<ElementRecord> for ScanInstruction<S> {
    fn execute(&mut self, emit: &mut Emitter<'_, ElementRecord>) -> Result<(), InstructionError> {
        let facts = self
            .scanner
            .scan()
            .map_err(|err| InstructionError::failed(err.to_string()))?;
        for fact in facts.into_iter().filter(|fact| self.wanted(fact)) {
            let record = self.record(fact);
            emit.emit(record);
        }
        tracing::debug!(scanner = self.scanner.name(), emitted = emit.emitted(), "scan finished");
        Ok(())
    }
}
