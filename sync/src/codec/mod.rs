//! Typed value and delta codecs.
//!
//! [`ValueKinds`] turns full values into bits and back; [`DeltaKinds`]
//! encodes the difference between two values, spending a single bit when
//! nothing changed. Both registries dispatch on `TypeId`, keep the first
//! registration per slot and are completed with built-in defaults when the
//! protocol locks.

mod builtin;
mod delta_kinds;
mod error;
mod numeric;
mod value_kinds;

pub use builtin::{register_option_of, register_vec_of};
pub use delta_kinds::{CodecContext, DeltaKinds};
pub use error::{CodecError, DisposalError};
pub use numeric::FloatStrategy;
pub use value_kinds::ValueKinds;

pub(crate) use builtin::register_defaults;
pub(crate) use numeric::register_float_deltas;
