use thiserror::Error;
use undine_serde::CapacityError;

use crate::codec::CodecError;
use crate::history::HistoryError;

/// Errors setting up or running batch compression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncoderError {
    #[error("failed to create compressor with level {level}")]
    CreationFailed { level: i32 },

    #[error("failed to create compressor with dictionary at level {level}")]
    DictionaryCreationFailed { level: i32 },

    #[error("failed to compress a payload of {payload_size} bytes")]
    CompressionFailed { payload_size: usize },
}

/// Errors setting up or running batch decompression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    #[error("failed to create decompressor")]
    CreationFailed,

    #[error("failed to create decompressor with dictionary")]
    DictionaryCreationFailed,

    #[error("failed to decompress a payload of {payload_size} bytes")]
    DecompressionFailed { payload_size: usize },
}

/// Errors reading or writing outer batch frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Decoder(#[from] DecoderError),

    /// The frame led with a kind index outside the valid range. The packet
    /// is malformed or malicious.
    #[error("invalid batch kind index {index} received (valid range: 0-1)")]
    InvalidKind { index: u8 },

    /// A compressed frame arrived on a connection with compression off.
    #[error("compressed batch received but compression is not configured")]
    NotConfigured,

    /// The decompressed body did not match the bit length the header
    /// declared.
    #[error("batch header declares {declared_bits} bits but the body decompressed to {actual_bits}")]
    LengthMismatch {
        declared_bits: usize,
        actual_bits: usize,
    },
}

/// Any error the synchronization engine can surface. Wraps the layer
/// errors so manager entry points return one type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}
