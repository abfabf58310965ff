//! Domain model (identifier, envelope, payload entries, errors).
//!
//! ここに置く型はすべて不変値で、同期なしにスレッド間で共有できる。

pub mod element;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod value;

pub use element::{BuiltInCategory, CategoryType, ElementId, ElementRecord, Parameter};
pub use envelope::{
    DataType, Envelope, EnvelopeParts, MessageType, RequestType, Resolution,
};
pub use errors::{DecodeError, EncodeError, EnvelopeError};
pub use ids::{Identifier, IdentifierParts};
pub use value::{Properties, StorageType, Value};
