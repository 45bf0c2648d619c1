use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::time::Instant;

use log::{trace, warn};

use undine_serde::BitBuffer;

use crate::buffer_pool::BufferPool;
use crate::codec::{CodecContext, ValueKinds};
use crate::history::{DeltaHistory, HistoryError};
use crate::key::SyncKey;
use crate::protocol::Protocol;
use crate::transport::Transport;
use crate::types::{PeerId, SyncId};

use super::ack::{
    read_ack_batch, read_cleanup_batch, write_ack_batches, write_cleanup_batches, AckEntry,
    CleanupEntry,
};
use super::batch::{read_batch, write_batch, BatchKind};
use super::decoder::Decoder;
use super::encoder::Encoder;
use super::error::{BatchError, SyncError};

/// Drives delta synchronization for any number of peers.
///
/// Each peer gets two independent sides: snapshots of values written to it
/// and snapshots of values read from it, tracked per sync key. Writes delta
/// against the latest snapshot the peer acknowledged; reads resolve the
/// baseline the sender named, queue an acknowledgment and store what was
/// reconstructed. [`DeltaManager::flush`] moves the queued acknowledgments
/// and cleanup notifications onto the transport.
pub struct DeltaManager {
    protocol: Protocol,
    pool: BufferPool,
    sending: HashMap<PeerId, HashMap<SyncKey, DeltaHistory>>,
    receiving: HashMap<PeerId, HashMap<SyncKey, DeltaHistory>>,
    pending_acks: HashMap<PeerId, Vec<AckEntry>>,
    pending_cleanups: HashMap<PeerId, HashMap<SyncKey, SyncId>>,
    encoder: Option<Encoder>,
    decoder: Option<Decoder>,
}

impl DeltaManager {
    /// Creates a manager from a protocol, locking it first if the
    /// application has not done so already.
    pub fn try_new(mut protocol: Protocol) -> Result<Self, SyncError> {
        if !protocol.is_locked() {
            protocol.lock();
        }
        let (encoder, decoder) = match &protocol.compression {
            Some(config) => (
                Some(Encoder::try_new(&config.mode).map_err(BatchError::from)?),
                Some(Decoder::try_new(&config.mode).map_err(BatchError::from)?),
            ),
            None => (None, None),
        };
        Ok(Self {
            protocol,
            pool: BufferPool::new(),
            sending: HashMap::new(),
            receiving: HashMap::new(),
            pending_acks: HashMap::new(),
            pending_cleanups: HashMap::new(),
            encoder,
            decoder,
        })
    }

    pub fn new(protocol: Protocol) -> Self {
        Self::try_new(protocol).expect("Failed to create DeltaManager")
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Writes `value` for `peer` as a delta against the latest snapshot the
    /// peer acknowledged, or against the zero value when nothing is
    /// acknowledged yet.
    ///
    /// When a change is encoded, the stored snapshot is the receiver's
    /// reconstruction: the manager re-reads the delta it just wrote and
    /// keeps the result, so both sides hold bit-identical baselines even
    /// under lossy codecs.
    pub fn write_value<T: Any + Send>(
        &mut self,
        now: &Instant,
        buffer: &mut BitBuffer<'_>,
        peer: PeerId,
        key: SyncKey,
        value: &T,
    ) -> Result<(), SyncError> {
        let history = self
            .sending
            .entry(peer)
            .or_default()
            .entry(key)
            .or_insert_with(DeltaHistory::new::<T>);
        if history.value_type() != TypeId::of::<T>() {
            return Err(HistoryError::TypeMismatch {
                expected: history.value_type_name(),
                found: type_name::<T>(),
            }
            .into());
        }

        let context = CodecContext::new(&self.protocol.value_kinds, &self.protocol.delta_kinds, &self.pool);
        let baseline_owned;
        let (baseline_id, baseline): (SyncId, &T) = match history.baseline() {
            Some((id, value)) => (
                id,
                value
                    .downcast_ref::<T>()
                    .expect("history stores the tracker's value type"),
            ),
            None => {
                if history.acked() != 0 {
                    warn!(
                        "acknowledged snapshot {} of {} aged out; writing against the zero value",
                        history.acked(),
                        key
                    );
                }
                baseline_owned = context.values.default_of::<T>()?;
                (0, &baseline_owned)
            }
        };

        buffer.write_var_u64(baseline_id)?;
        let delta_start = buffer.bit_cursor();
        let changed = context.deltas.write(&context, buffer, baseline, value)?;
        if !changed {
            return Ok(());
        }

        // Re-read the written delta instead of snapshotting `value`: what
        // the receiver reconstructs is what the next delta must build on.
        let reconstruction = {
            let mut view = BitBuffer::wrap_external_bits(buffer.to_slice(), buffer.bit_length());
            view.set_cursor(delta_start)?;
            let (_, reconstruction) = context.deltas.read(&context, &mut view, baseline)?;
            reconstruction
        };

        let new_id = history.alloc_id();
        buffer.write_var_u64(new_id)?;
        if let Some(displaced) = history.store(new_id, reconstruction, now)? {
            dispose_boxed(&self.protocol.value_kinds, displaced);
        }
        Ok(())
    }

    /// Reads a value of `T` written by `peer`'s [`DeltaManager::write_value`].
    ///
    /// A changed value is stored as the new snapshot and its acknowledgment
    /// queued for the next [`DeltaManager::flush`]. A baseline this side no
    /// longer retains is logged and read against the zero value, which
    /// degrades the reconstruction but keeps the stream decodable.
    pub fn read_value<T: Any + Send>(
        &mut self,
        now: &Instant,
        buffer: &mut BitBuffer<'_>,
        peer: PeerId,
        key: SyncKey,
    ) -> Result<T, SyncError> {
        let history = self
            .receiving
            .entry(peer)
            .or_default()
            .entry(key)
            .or_insert_with(DeltaHistory::new::<T>);
        if history.value_type() != TypeId::of::<T>() {
            return Err(HistoryError::TypeMismatch {
                expected: history.value_type_name(),
                found: type_name::<T>(),
            }
            .into());
        }

        let context = CodecContext::new(&self.protocol.value_kinds, &self.protocol.delta_kinds, &self.pool);
        let baseline_id = buffer.read_var_u64()?;
        let baseline_owned;
        let baseline: &T = if baseline_id == 0 {
            baseline_owned = context.values.default_of::<T>()?;
            &baseline_owned
        } else {
            match history.get(baseline_id) {
                Some(value) => value
                    .downcast_ref::<T>()
                    .expect("history stores the tracker's value type"),
                None => {
                    warn!(
                        "baseline {} of {} from peer {} is not retained; reading against the zero value",
                        baseline_id, key, peer
                    );
                    baseline_owned = context.values.default_of::<T>()?;
                    &baseline_owned
                }
            }
        };

        let (changed, value) = context.deltas.read(&context, buffer, baseline)?;
        if changed {
            let new_id = buffer.read_var_u64()?;
            let snapshot = context.values.deep_copy(context.pool, &value)?;
            if let Some(displaced) = history.store(new_id, snapshot, now)? {
                dispose_boxed(&self.protocol.value_kinds, displaced);
            }
            for evicted in history.cleanup_by_age(self.protocol.sync.history_max_age, now) {
                dispose_boxed(&self.protocol.value_kinds, evicted);
            }
            self.pending_acks
                .entry(peer)
                .or_default()
                .push(AckEntry { key, id: new_id });
        }
        Ok(value)
    }

    /// Sends queued acknowledgments unreliably and queued cleanup
    /// notifications reliable-ordered, packed into bounded batches. A
    /// transport refusal drops that batch with a warning; acknowledgments
    /// regenerate on the next read and cleanups are advisory.
    pub fn flush(&mut self, transport: &mut dyn Transport) -> Result<(), SyncError> {
        let mut ack_frames = 0;
        let mut cleanup_frames = 0;

        let pending_acks = std::mem::take(&mut self.pending_acks);
        for (peer, mut entries) in pending_acks {
            entries.sort_unstable_by_key(|entry| (entry.key, entry.id));
            for body in write_ack_batches(&self.pool, &entries)? {
                let mut frame = self.pool.acquire();
                write_batch(&mut frame, BatchKind::Ack, &body, self.encoder.as_mut())?;
                ack_frames += 1;
                if let Err(error) = transport.send_unreliable(peer, frame.to_slice()) {
                    warn!("acknowledgment batch to peer {peer} dropped: {error}");
                }
            }
        }

        let pending_cleanups = std::mem::take(&mut self.pending_cleanups);
        for (peer, keys) in pending_cleanups {
            let mut entries: Vec<CleanupEntry> = keys
                .into_iter()
                .map(|(key, up_to)| CleanupEntry { key, up_to })
                .collect();
            entries.sort_unstable_by_key(|entry| entry.key);
            for body in write_cleanup_batches(&self.pool, &entries)? {
                let mut frame = self.pool.acquire();
                write_batch(&mut frame, BatchKind::Cleanup, &body, self.encoder.as_mut())?;
                cleanup_frames += 1;
                if let Err(error) = transport.send_reliable_ordered(peer, frame.to_slice()) {
                    warn!("cleanup batch to peer {peer} dropped: {error}");
                }
            }
        }

        if ack_frames > 0 || cleanup_frames > 0 {
            trace!("flushed {ack_frames} acknowledgment and {cleanup_frames} cleanup frames");
        }
        Ok(())
    }

    /// Ingests one batch frame received from `peer`.
    ///
    /// Acknowledgments raise the matching tracker's watermark and prune its
    /// history; anything pruned is reported back to the peer as a cleanup
    /// notification on the next flush. Cleanup notifications prune the
    /// receiving side. Batches for unknown peers or keys are ignored.
    pub fn receive(
        &mut self,
        now: &Instant,
        peer: PeerId,
        payload: &[u8],
    ) -> Result<(), SyncError> {
        let mut frame = BitBuffer::wrap_external(payload);
        let (kind, mut body) = read_batch(&mut frame, self.decoder.as_mut())?;
        match kind {
            BatchKind::Ack => {
                let entries = read_ack_batch(&mut body)?;
                let Some(histories) = self.sending.get_mut(&peer) else {
                    return Ok(());
                };
                let max_age = self.protocol.sync.history_max_age;
                for entry in entries {
                    let Some(history) = histories.get_mut(&entry.key) else {
                        continue;
                    };
                    if !history.validate_id(entry.id) {
                        warn!(
                            "peer {} acknowledged snapshot {} of {} which was never sent",
                            peer, entry.id, entry.key
                        );
                        continue;
                    }
                    let mut evicted = history.cleanup_by_ack_id(entry.id);
                    evicted.extend(history.cleanup_by_age(max_age, now));
                    if evicted.is_empty() {
                        continue;
                    }
                    for value in evicted {
                        dispose_boxed(&self.protocol.value_kinds, value);
                    }
                    let bound = history.oldest_id().unwrap_or_else(|| history.acked());
                    let slot = self
                        .pending_cleanups
                        .entry(peer)
                        .or_default()
                        .entry(entry.key)
                        .or_insert(0);
                    if bound > *slot {
                        *slot = bound;
                    }
                }
            }
            BatchKind::Cleanup => {
                let Some(histories) = self.receiving.get_mut(&peer) else {
                    return Ok(());
                };
                for entry in read_cleanup_batch(&mut body)? {
                    let Some(history) = histories.get_mut(&entry.key) else {
                        continue;
                    };
                    for value in history.cleanup_by_ack_id(entry.up_to) {
                        dispose_boxed(&self.protocol.value_kinds, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Drops all state for `peer`, running disposers over every retained
    /// snapshot in both directions.
    pub fn disconnect(&mut self, peer: PeerId) {
        if let Some(histories) = self.sending.remove(&peer) {
            for (_, mut history) in histories {
                for value in history.drain_all() {
                    dispose_boxed(&self.protocol.value_kinds, value);
                }
            }
        }
        if let Some(histories) = self.receiving.remove(&peer) {
            for (_, mut history) in histories {
                for value in history.drain_all() {
                    dispose_boxed(&self.protocol.value_kinds, value);
                }
            }
        }
        self.pending_acks.remove(&peer);
        self.pending_cleanups.remove(&peer);
    }

    pub fn sending_history(&self, peer: PeerId, key: SyncKey) -> Option<&DeltaHistory> {
        self.sending.get(&peer)?.get(&key)
    }

    pub fn receiving_history(&self, peer: PeerId, key: SyncKey) -> Option<&DeltaHistory> {
        self.receiving.get(&peer)?.get(&key)
    }
}

// Pruning must not stall on a failed release hook.
fn dispose_boxed(values: &ValueKinds, mut value: Box<dyn Any + Send>) {
    if let Err(error) = values.dispose(value.as_mut()) {
        warn!("history pruning continues after disposal failure: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DeltaManager {
        let mut protocol = Protocol::builder().build();
        protocol.lock();
        DeltaManager::new(protocol)
    }

    #[test]
    fn a_key_keeps_one_value_type_per_direction() {
        let now = Instant::now();
        let mut manager = manager();
        let key = SyncKey::of::<u32>(1);

        let mut buffer = BitBuffer::new();
        manager.write_value(&now, &mut buffer, 7, key, &5u32).unwrap();

        let mut buffer = BitBuffer::new();
        let result = manager.write_value(&now, &mut buffer, 7, key, &5u64);
        assert!(matches!(
            result,
            Err(SyncError::History(HistoryError::TypeMismatch { expected, found }))
                if expected.contains("u32") && found.contains("u64")
        ));
    }

    #[test]
    fn batches_for_unknown_peers_are_ignored() {
        let now = Instant::now();
        let mut manager = manager();

        // a valid ack batch, addressed to a manager that never wrote anything
        let pool = BufferPool::new();
        let entries = [AckEntry { key: SyncKey::of::<u32>(1), id: 1 }];
        let bodies = write_ack_batches(&pool, &entries).unwrap();
        let mut frame = BitBuffer::new();
        write_batch(&mut frame, BatchKind::Ack, &bodies[0], None).unwrap();

        manager.receive(&now, 99, frame.to_slice()).unwrap();
    }

    #[test]
    fn disconnect_forgets_the_peer() {
        let now = Instant::now();
        let mut manager = manager();
        let key = SyncKey::of::<u32>(1);

        let mut buffer = BitBuffer::new();
        manager.write_value(&now, &mut buffer, 7, key, &5u32).unwrap();
        assert!(manager.sending_history(7, key).is_some());

        manager.disconnect(7);
        assert!(manager.sending_history(7, key).is_none());
    }
}
