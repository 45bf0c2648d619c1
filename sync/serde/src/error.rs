use thiserror::Error;

/// Errors raised by [`BitBuffer`](crate::BitBuffer) operations.
///
/// Every variant is fatal to the operation that raised it: the buffer is
/// left unchanged and the caller must not treat partial output as valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// A read would pass the committed length of the buffer
    #[error("read of {width} bits at bit {cursor} passes the committed length of {committed} bits")]
    ReadOverrun {
        cursor: usize,
        width: u32,
        committed: usize,
    },

    /// A buffer in read mode was asked to grow
    #[error("buffer in read mode cannot grow to {required} bits (capacity is {capacity} bits)")]
    GrowthWhileReading {
        capacity: usize,
        required: usize,
    },

    /// A buffer wrapping external memory was asked to grow or be written
    #[error("buffer wrapping external memory cannot be written or grown to {required} bits (capacity is {capacity} bits)")]
    GrowthWhileWrapped {
        capacity: usize,
        required: usize,
    },

    /// A positional patch landed outside the region written so far
    #[error("patch of {width} bits at bit {position} lands outside the {written} bits written so far")]
    PatchOutOfRange {
        position: usize,
        width: u32,
        written: usize,
    },

    /// The cursor was moved out of bounds
    #[error("cursor {requested} is out of bounds ({limit} bits are addressable)")]
    CursorOutOfRange {
        requested: usize,
        limit: usize,
    },
}
