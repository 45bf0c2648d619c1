use undine_serde::{BitBuffer, MTU_SIZE_BYTES};

use super::decoder::Decoder;
use super::encoder::Encoder;
use super::error::{BatchError, SyncError};

/// What a batch frame carries, leading every frame as a 2-bit index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchKind {
    /// Snapshot acknowledgments, sent unreliably.
    Ack,
    /// History cleanup notifications, sent reliable-ordered.
    Cleanup,
}

impl BatchKind {
    const BITS: u32 = 2;

    fn to_index(self) -> u64 {
        match self {
            BatchKind::Ack => 0,
            BatchKind::Cleanup => 1,
        }
    }

    fn try_from_index(index: u8) -> Result<Self, BatchError> {
        match index {
            0 => Ok(BatchKind::Ack),
            1 => Ok(BatchKind::Cleanup),
            _ => Err(BatchError::InvalidKind { index }),
        }
    }
}

/// Writes one outer frame: the kind index, the body's bit length, the
/// shipped payload's bit length, then the payload bytes.
///
/// When an encoder is present the body is compressed, but the compressed
/// form only ships if it is actually smaller; otherwise the original body
/// ships and both header lengths are equal. That equality is the
/// uncompressed marker, so no separate flag bit is spent.
pub fn write_batch(
    out: &mut BitBuffer<'_>,
    kind: BatchKind,
    body: &BitBuffer<'_>,
    encoder: Option<&mut Encoder>,
) -> Result<(), SyncError> {
    let original_bits = body.bit_length() as u64;
    let original_bytes = body.to_slice();
    out.write_bits(kind.to_index(), BatchKind::BITS)?;

    let compressed = match encoder {
        Some(encoder) => {
            let packed = encoder.try_encode(original_bytes).map_err(BatchError::from)?;
            (packed.len() < original_bytes.len()).then_some(packed)
        }
        None => None,
    };
    match compressed {
        Some(packed) => {
            out.write_var_u64(original_bits)?;
            out.write_var_u64(packed.len() as u64 * 8)?;
            for byte in packed {
                out.write_bits(u64::from(*byte), 8)?;
            }
        }
        None => {
            out.write_var_u64(original_bits)?;
            out.write_var_u64(original_bits)?;
            for byte in original_bytes {
                out.write_bits(u64::from(*byte), 8)?;
            }
        }
    }
    Ok(())
}

/// Reads one outer frame, undoing [`write_batch`]. Returns the kind and
/// the body as an owned read-mode buffer committed to its exact bit
/// length.
pub fn read_batch(
    frame: &mut BitBuffer<'_>,
    decoder: Option<&mut Decoder>,
) -> Result<(BatchKind, BitBuffer<'static>), SyncError> {
    let kind = BatchKind::try_from_index(frame.read_bits(BatchKind::BITS)? as u8)?;
    let original_bits = frame.read_var_u64()? as usize;
    let payload_bits = frame.read_var_u64()? as usize;

    let payload_bytes = payload_bits.div_ceil(8);
    let mut payload = Vec::with_capacity(payload_bytes.min(MTU_SIZE_BYTES * 2));
    for _ in 0..payload_bytes {
        payload.push(frame.read_bits(8)? as u8);
    }

    let body = if payload_bits == original_bits {
        BitBuffer::from_vec_bits(payload, original_bits)
    } else {
        let Some(decoder) = decoder else {
            return Err(BatchError::NotConfigured.into());
        };
        let bytes = decoder
            .try_decode(&payload, original_bits.div_ceil(8))
            .map_err(BatchError::from)?;
        if bytes.len() * 8 < original_bits {
            return Err(BatchError::LengthMismatch {
                declared_bits: original_bits,
                actual_bits: bytes.len() * 8,
            }
            .into());
        }
        BitBuffer::from_vec_bits(bytes.to_vec(), original_bits)
    };
    Ok((kind, body))
}
