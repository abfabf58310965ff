//! Wire codec - Envelope / payload entry と JSON 形の wire の相互変換
//!
//! wire の文法はメモリ上の形と意図的に違う:
//! - Identifier は裸の文字列
//! - Properties は map ではなく `{key, storageType, value}` の配列
//! - 値がないところは省略せず `"undefined"` を書く
//!
//! そのため汎用の中間ツリー（`serde_json::Value`）は作らず、手書きの
//! `Serialize` と `Visitor` でトークン列を前から順に読み書きする。
//!
//! # Decode の方針
//! - root が object でない、必須フィールドがない・空・短すぎる、enum が
//!   パースできない場合は [`DecodeError`] で失敗し、途中まで埋まった値は返さない
//! - 知らないキーは読み飛ばす（前方互換）

mod entry;
mod envelope;
mod value;

use std::cell::RefCell;
use std::io;
use std::marker::PhantomData;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, DeserializeSeed};

use crate::domain::{DecodeError, ElementRecord, EncodeError, Envelope, Identifier};

/// Envelope に必ず書かれるプロトコル識別子
pub const PROTOCOL: &str = "conduit/1";

/// 値がないことを表すリテラル
pub const UNDEFINED: &str = "undefined";

/// Envelope を wire bytes に書く（フィールド順は固定）
pub fn write_envelope(envelope: &Envelope) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(&envelope::EnvelopeWire(envelope))?)
}

/// Envelope を `writer` に直接書く
pub fn write_envelope_to<W: io::Write>(writer: W, envelope: &Envelope) -> Result<(), EncodeError> {
    serde_json::to_writer(writer, &envelope::EnvelopeWire(envelope))?;
    Ok(())
}

/// wire bytes から Envelope を読む
pub fn read_envelope(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let fault = Fault::default();
    read_root(bytes, &fault, envelope::EnvelopeSeed { fault: &fault })
}

/// payload entry 1 件を `{"<uniqueId>": {...}}` として書く
pub fn write_entry(record: &ElementRecord) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(&entry::EntryWire(record))?)
}

/// `{"<uniqueId>": {...}}` を 1 件読む
pub fn read_entry(bytes: &[u8]) -> Result<ElementRecord, DecodeError> {
    let fault = Fault::default();
    read_root(bytes, &fault, entry::EntrySeed { fault: &fault })
}

/// root が object であることを確かめてから seed で読み、末尾のゴミも拒否する
fn read_root<'a, S>(bytes: &'a [u8], fault: &Fault, seed: S) -> Result<S::Value, DecodeError>
where
    S: DeserializeSeed<'a>,
{
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    if first != Some(&b'{') {
        return Err(DecodeError::RootNotObject);
    }

    let mut de = serde_json::Deserializer::from_slice(bytes);
    let decoded = seed
        .deserialize(&mut de)
        .and_then(|value| de.end().map(|()| value));

    decoded.map_err(|err| {
        let cause = fault.take().unwrap_or_else(|| DecodeError::Syntax {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        });
        tracing::debug!(error = %cause, "wire decode failed");
        cause
    })
}

/// Visitor の奥で起きた [`DecodeError`] を呼び出し元まで運ぶ
///
/// serde の Error は文字列しか運べないので、最初の原因だけをここに残す。
#[derive(Debug, Default)]
pub(crate) struct Fault(RefCell<Option<DecodeError>>);

impl Fault {
    pub(crate) fn raise<E: de::Error>(&self, cause: DecodeError) -> E {
        let message = cause.to_string();
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(cause);
        }
        E::custom(message)
    }

    fn take(&self) -> Option<DecodeError> {
        self.0.borrow_mut().take()
    }

    /// visitor ごとの error 型に固定した検査ヘルパ
    pub(crate) fn scope<E: de::Error>(&self) -> Scope<'_, E> {
        Scope {
            fault: self,
            _error: PhantomData,
        }
    }
}

pub(crate) struct Scope<'f, E> {
    fault: &'f Fault,
    _error: PhantomData<E>,
}

impl<E: de::Error> Scope<'_, E> {
    pub(crate) fn raise(&self, cause: DecodeError) -> E {
        self.fault.raise(cause)
    }

    pub(crate) fn identifier(&self, field: &'static str, raw: &str) -> Result<Identifier, E> {
        if raw.is_empty() {
            return Err(self.raise(DecodeError::EmptyField(field)));
        }
        Identifier::parse(raw).map_err(|cause| self.raise(cause))
    }

    pub(crate) fn enumeration<T: FromStr>(&self, field: &'static str, raw: &str) -> Result<T, E> {
        raw.parse().map_err(|_| {
            self.raise(DecodeError::InvalidEnum {
                field,
                value: raw.to_string(),
            })
        })
    }

    pub(crate) fn timestamp(&self, field: &'static str, raw: &str) -> Result<DateTime<Utc>, E> {
        DateTime::parse_from_rfc3339(raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|_| {
                self.raise(DecodeError::InvalidTimestamp {
                    field,
                    value: raw.to_string(),
                })
            })
    }

    pub(crate) fn require<T>(&self, field: &'static str, value: Option<T>) -> Result<T, E> {
        value.ok_or_else(|| self.raise(DecodeError::MissingField(field)))
    }
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `"undefined"` と null を `None` に寄せる
pub(crate) fn defined(raw: Option<String>) -> Option<String> {
    raw.filter(|s| s != UNDEFINED)
}
