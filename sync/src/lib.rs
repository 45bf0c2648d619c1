//! # Undine Sync
//! Delta synchronization of typed values between peers: per-key snapshot
//! histories, acknowledgment-driven baselines and bit-level delta codecs.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

pub use undine_serde::{
    var_i64_bits, var_u64_bits, BitBuffer, BufferMode, CapacityError, MTU_SIZE_BITS,
    MTU_SIZE_BYTES,
};

mod buffer_pool;
mod codec;
mod delta;
mod history;
mod key;
mod protocol;
mod transport;
mod types;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use codec::{
    register_option_of, register_vec_of, CodecContext, CodecError, DeltaKinds, DisposalError,
    FloatStrategy, ValueKinds,
};
pub use delta::{
    ack::{
        read_ack_batch, read_cleanup_batch, write_ack_batches, write_cleanup_batches, AckEntry,
        CleanupEntry,
    },
    batch::{read_batch, write_batch, BatchKind},
    compression_config::{CompressionConfig, CompressionMode},
    decoder::Decoder,
    encoder::Encoder,
    error::{BatchError, DecoderError, EncoderError, SyncError},
    manager::DeltaManager,
};
pub use history::{DeltaHistory, HistoryError, MAX_HISTORY_ENTRIES};
pub use key::{SyncKey, ValueKind};
pub use protocol::{Protocol, ProtocolError, SyncConfig};
pub use transport::{AssetTable, EmptyAssetTable, Transport, TransportError};
pub use types::{PeerId, SyncId};
