//! Errors - ドメインエラー
//!
//! Wire 入力の不正は [`DecodeError`]、Envelope の不変条件違反は
//! [`EnvelopeError`] で表現します。

use thiserror::Error;

use super::envelope::{DataType, MessageType};

/// 不正・途中切れの wire 入力（identifier 文字列を含む）
///
/// decode は一回の呼び出し単位で中断され、部分的に埋まった値は返さない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("identifier too short: expected {expected} chars, got {actual}")]
    IdentifierTooShort { expected: usize, actual: usize },

    #[error("identifier too long: expected {expected} chars, got {actual}")]
    IdentifierTooLong { expected: usize, actual: usize },

    #[error("identifier prefix must be a lowercase ascii letter, got {0:?}")]
    IdentifierPrefix(char),

    #[error("identifier {segment} segment is not base36: {value:?}")]
    IdentifierSegment { segment: &'static str, value: String },

    #[error("identifier timestamp out of range: {0}")]
    IdentifierTimestamp(u64),

    #[error("expected a JSON object at the root")]
    RootNotObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("required field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("field `{field}` has unknown value {value:?}")]
    InvalidEnum { field: &'static str, value: String },

    #[error("field `{field}` is not a valid timestamp: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("unsupported protocol marker {0:?}")]
    UnsupportedProtocol(String),

    #[error("payload entry must contain exactly one member, found {0}")]
    EntryArity(usize),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("malformed input at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
}

/// Envelope の構築・コピー時のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("data type {declared:?} does not match the shape of the properties")]
    ShapeMismatch { declared: DataType },

    #[error("only a request can be resolved, this envelope is a {0:?}")]
    AlreadyResolved(MessageType),
}

/// Encode 側の失敗（出力先の I/O など）
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to write wire output: {0}")]
    Write(#[from] serde_json::Error),
}
