use std::any::TypeId;

use thiserror::Error;
use undine_serde::CapacityError;

use crate::key::ValueKind;

/// Errors surfaced while encoding or decoding values and deltas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The underlying bit buffer rejected the operation.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Attempted to write a value type with no registered writer.
    #[error("no writer registered for value type `{type_name}`. Register the type before locking the protocol")]
    MissingWriter { type_name: &'static str },

    /// Attempted to read a value type with no registered reader.
    #[error("no reader registered for value type `{type_name}`. Register the type before locking the protocol")]
    MissingReader { type_name: &'static str },

    /// An operation that needs a registration table entry found none.
    #[error("value type `{type_name}` is not registered. Register the type before locking the protocol")]
    Unregistered { type_name: &'static str },

    /// A polymorphic write was handed a value whose runtime type was never
    /// registered, so neither its kind nor its payload can be produced.
    #[error("polymorphic value of unregistered runtime type {type_id:?} cannot be written")]
    UnregisteredDynValue { type_id: TypeId },

    /// A polymorphic payload named a kind this side has no registration
    /// for. The sending side knows a type this side does not.
    #[error("unresolved value kind {kind} in polymorphic payload")]
    UnresolvedType { kind: ValueKind },

    /// A polymorphic payload referenced an asset index missing from the
    /// asset table.
    #[error("asset index {index} is not present in the asset table")]
    UnknownAssetIndex { index: u64 },

    /// A decoded string payload was not valid UTF-8.
    #[error("decoded string payload of {length} bytes is not valid UTF-8")]
    InvalidUtf8 { length: usize },
}

/// A registered disposer failed to release a value. History pruning logs
/// these and keeps going; a failed release never wedges a tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to release value of type `{type_name}`: {reason}")]
pub struct DisposalError {
    pub type_name: &'static str,
    pub reason: String,
}
