use undine_serde::{var_i64_bits, var_u64_bits, BitBuffer, MTU_SIZE_BITS};

use crate::buffer_pool::{BufferPool, PooledBuffer};
use crate::key::SyncKey;
use crate::types::SyncId;

use super::error::SyncError;

/// One snapshot acknowledgment: the snapshot `id` of `key` arrived and is
/// now a valid baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckEntry {
    pub key: SyncKey,
    pub id: SyncId,
}

/// One cleanup notification: stored snapshots of `key` below `up_to` will
/// never be used as a baseline again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanupEntry {
    pub key: SyncKey,
    pub up_to: SyncId,
}

// Entry streams are continue-bit encoded: a 1 bit announces another entry,
// a 0 bit ends the batch. Acknowledgments lean on their sort order: the
// first entry is absolute, later ones encode the key distance and signed id
// distance from their predecessor, so a run of acks for one key costs a
// handful of bits each.

/// Packs acknowledgments into pooled bodies, each at most
/// [`MTU_SIZE_BITS`] long. `entries` must be sorted by key then id.
pub fn write_ack_batches<'p>(
    pool: &'p BufferPool,
    entries: &[AckEntry],
) -> Result<Vec<PooledBuffer<'p>>, SyncError> {
    debug_assert!(
        entries
            .windows(2)
            .all(|pair| (pair[0].key, pair[0].id) <= (pair[1].key, pair[1].id)),
        "acknowledgment entries must be sorted by key then id"
    );
    let mut batches = Vec::new();
    if entries.is_empty() {
        return Ok(batches);
    }

    let mut current = pool.acquire();
    let mut previous: Option<AckEntry> = None;
    for entry in entries {
        let projected = ack_entry_bits(previous.as_ref(), entry);
        if previous.is_some() && current.bit_cursor() + projected + 1 > MTU_SIZE_BITS {
            current.write_bits(0, 1)?;
            batches.push(current);
            current = pool.acquire();
            previous = None;
        }
        write_ack_entry(&mut current, previous.as_ref(), entry)?;
        previous = Some(*entry);
    }
    current.write_bits(0, 1)?;
    batches.push(current);
    Ok(batches)
}

/// Reads one acknowledgment body written by [`write_ack_batches`].
pub fn read_ack_batch(body: &mut BitBuffer<'_>) -> Result<Vec<AckEntry>, SyncError> {
    let mut entries = Vec::new();
    let mut previous: Option<AckEntry> = None;
    while body.read_bits(1)? == 1 {
        let entry = match previous {
            None => AckEntry {
                key: SyncKey::from_u64(body.read_var_u64()?),
                id: body.read_var_u64()?,
            },
            Some(prev) => AckEntry {
                key: SyncKey::from_u64(prev.key.as_u64().wrapping_add(body.read_var_u64()?)),
                id: prev.id.wrapping_add(body.read_var_i64()? as u64),
            },
        };
        entries.push(entry);
        previous = Some(entry);
    }
    Ok(entries)
}

/// Packs cleanup notifications into pooled bodies, each at most
/// [`MTU_SIZE_BITS`] long. Cleanup entries are rare and travel a reliable
/// channel, so each is encoded absolutely.
pub fn write_cleanup_batches<'p>(
    pool: &'p BufferPool,
    entries: &[CleanupEntry],
) -> Result<Vec<PooledBuffer<'p>>, SyncError> {
    let mut batches = Vec::new();
    if entries.is_empty() {
        return Ok(batches);
    }

    let mut current = pool.acquire();
    let mut empty = true;
    for entry in entries {
        let projected = 1
            + var_u64_bits(entry.key.as_u64()) as usize
            + var_u64_bits(entry.up_to) as usize;
        if !empty && current.bit_cursor() + projected + 1 > MTU_SIZE_BITS {
            current.write_bits(0, 1)?;
            batches.push(current);
            current = pool.acquire();
        }
        current.write_bits(1, 1)?;
        current.write_var_u64(entry.key.as_u64())?;
        current.write_var_u64(entry.up_to)?;
        empty = false;
    }
    current.write_bits(0, 1)?;
    batches.push(current);
    Ok(batches)
}

/// Reads one cleanup body written by [`write_cleanup_batches`].
pub fn read_cleanup_batch(body: &mut BitBuffer<'_>) -> Result<Vec<CleanupEntry>, SyncError> {
    let mut entries = Vec::new();
    while body.read_bits(1)? == 1 {
        entries.push(CleanupEntry {
            key: SyncKey::from_u64(body.read_var_u64()?),
            up_to: body.read_var_u64()?,
        });
    }
    Ok(entries)
}

fn ack_entry_bits(previous: Option<&AckEntry>, entry: &AckEntry) -> usize {
    match previous {
        None => 1 + var_u64_bits(entry.key.as_u64()) as usize + var_u64_bits(entry.id) as usize,
        Some(prev) => {
            let key_delta = entry.key.as_u64().wrapping_sub(prev.key.as_u64());
            let id_delta = entry.id.wrapping_sub(prev.id) as i64;
            1 + var_u64_bits(key_delta) as usize + var_i64_bits(id_delta) as usize
        }
    }
}

fn write_ack_entry(
    buffer: &mut BitBuffer<'_>,
    previous: Option<&AckEntry>,
    entry: &AckEntry,
) -> Result<(), SyncError> {
    buffer.write_bits(1, 1)?;
    match previous {
        None => {
            buffer.write_var_u64(entry.key.as_u64())?;
            buffer.write_var_u64(entry.id)?;
        }
        Some(prev) => {
            buffer.write_var_u64(entry.key.as_u64().wrapping_sub(prev.key.as_u64()))?;
            buffer.write_var_i64(entry.id.wrapping_sub(prev.id) as i64)?;
        }
    }
    Ok(())
}
