//! # Undine Serde
//! Bit-level serialization primitives shared by the undine sync protocol:
//! a growable bit-addressable buffer and the variable-width integer ladder
//! every wire frame is built from.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod bit_buffer;
mod error;
mod integer;

pub use bit_buffer::{BitBuffer, BufferMode};
pub use error::CapacityError;
pub use integer::{var_i64_bits, var_u64_bits};

/// Target size for an outgoing batch body before compression. Batches are
/// split so that no body exceeds this bound.
pub const MTU_SIZE_BYTES: usize = 1024;

/// [`MTU_SIZE_BYTES`] in bits.
pub const MTU_SIZE_BITS: usize = MTU_SIZE_BYTES * 8;
