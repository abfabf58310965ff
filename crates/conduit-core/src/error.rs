use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::dispatch::InstructionError;
use crate::domain::{DecodeError, EncodeError, EnvelopeError};
use crate::ports::{ScanError, SinkError};

/// crate 全体のエラー。個別のエラーはそれぞれのモジュールにある。
#[derive(Debug, Error)]
pub enum ConduitError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Instruction(#[from] InstructionError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
