/// PROPERTY-BASED TESTS: Delta codec invariants
///
/// Uses proptest to verify delta encoding properties hold across random inputs.
///
/// Key invariants:
/// 1. A delta decoded against the same baseline reproduces the new value
/// 2. Unchanged values cost exactly one bit
/// 3. Acknowledgment batches never exceed the MTU and concatenate losslessly
/// 4. Outer batch frames are transparent containers for any body

use std::time::Instant;

use proptest::prelude::*;
use undine_sync::{
    read_ack_batch, read_batch, write_ack_batches, write_batch, AckEntry, BatchKind, BitBuffer,
    BufferPool, CodecContext, DeltaManager, FloatStrategy, Protocol, SyncKey, MTU_SIZE_BITS,
};

fn locked_protocol() -> Protocol {
    let mut protocol = Protocol::builder().build();
    protocol.lock();
    protocol
}

// Strategy for floats the adaptive lattice can represent without saturating
fn finite_f64() -> impl Strategy<Value = f64> {
    -1.0e6..1.0e6
}

// Strategy for sorted acknowledgment runs, large enough to force splitting
fn ack_entries() -> impl Strategy<Value = Vec<AckEntry>> {
    prop::collection::vec((any::<u64>(), any::<u64>()), 0..300).prop_map(|raw| {
        let mut entries: Vec<AckEntry> = raw
            .into_iter()
            .map(|(key, id)| AckEntry {
                key: SyncKey::from_u64(key),
                id,
            })
            .collect();
        entries.sort_unstable_by_key(|entry| (entry.key, entry.id));
        entries
    })
}

proptest! {
    /// Test that integer deltas reproduce the new value bit-exactly
    #[test]
    fn prop_integer_deltas_round_trip_exactly(old: u64, new: u64) {
        let protocol = locked_protocol();
        let pool = BufferPool::new();
        let context = CodecContext::new(&protocol.value_kinds, &protocol.delta_kinds, &pool);

        let mut buffer = BitBuffer::new();
        let changed = protocol
            .delta_kinds
            .write::<u64>(&context, &mut buffer, &old, &new)
            .unwrap();
        prop_assert_eq!(changed, old != new);
        if !changed {
            prop_assert_eq!(buffer.bit_cursor(), 1);
        }

        buffer.begin_read();
        let (read_changed, decoded) = protocol
            .delta_kinds
            .read::<u64>(&context, &mut buffer, &old)
            .unwrap();
        prop_assert_eq!(read_changed, changed);
        prop_assert_eq!(decoded, new);
    }

    /// Test that the bitwise float strategy preserves every bit pattern,
    /// NaN payloads and signed zeros included
    #[test]
    fn prop_bitwise_floats_round_trip_to_the_same_bits(old_bits: u64, new_bits: u64) {
        let mut protocol = Protocol::builder().build();
        protocol.add_float_delta(FloatStrategy::Bitwise);
        protocol.lock();
        let pool = BufferPool::new();
        let context = CodecContext::new(&protocol.value_kinds, &protocol.delta_kinds, &pool);

        let old = f64::from_bits(old_bits);
        let new = f64::from_bits(new_bits);
        let mut buffer = BitBuffer::new();
        protocol
            .delta_kinds
            .write::<f64>(&context, &mut buffer, &old, &new)
            .unwrap();

        buffer.begin_read();
        let (_, decoded) = protocol
            .delta_kinds
            .read::<f64>(&context, &mut buffer, &old)
            .unwrap();
        prop_assert_eq!(decoded.to_bits(), new_bits);
    }

    /// Test that the default adaptive strategy lands within half a lattice
    /// step of the true value, whichever branch it picks
    #[test]
    fn prop_adaptive_floats_land_within_half_a_step(
        old in finite_f64(),
        new in finite_f64(),
    ) {
        let protocol = locked_protocol();
        let pool = BufferPool::new();
        let context = CodecContext::new(&protocol.value_kinds, &protocol.delta_kinds, &pool);

        let mut buffer = BitBuffer::new();
        protocol
            .delta_kinds
            .write::<f64>(&context, &mut buffer, &old, &new)
            .unwrap();

        buffer.begin_read();
        let (_, decoded) = protocol
            .delta_kinds
            .read::<f64>(&context, &mut buffer, &old)
            .unwrap();
        prop_assert!((decoded - new).abs() <= 0.5 / 1_000.0);
    }

    /// Test that types without a registered delta codec fall back to a
    /// structural diff that still reproduces the value
    #[test]
    fn prop_vectors_survive_the_structural_fallback(
        old in prop::collection::vec(any::<u32>(), 0..20),
        new in prop::collection::vec(any::<u32>(), 0..20),
    ) {
        let mut protocol = Protocol::builder().build();
        protocol.add_vec_of::<u32>();
        protocol.lock();
        let pool = BufferPool::new();
        let context = CodecContext::new(&protocol.value_kinds, &protocol.delta_kinds, &pool);

        let mut buffer = BitBuffer::new();
        let changed = protocol
            .delta_kinds
            .write::<Vec<u32>>(&context, &mut buffer, &old, &new)
            .unwrap();
        prop_assert_eq!(changed, old != new);

        buffer.begin_read();
        let (_, decoded) = protocol
            .delta_kinds
            .read::<Vec<u32>>(&context, &mut buffer, &old)
            .unwrap();
        prop_assert_eq!(decoded, new);
    }

    /// Test that acknowledgment runs split at the MTU and concatenate back
    /// to the exact input
    #[test]
    fn prop_acknowledgment_batches_split_and_concatenate(entries in ack_entries()) {
        let pool = BufferPool::new();
        let bodies = write_ack_batches(&pool, &entries).unwrap();

        if entries.is_empty() {
            prop_assert!(bodies.is_empty());
        } else {
            let mut decoded = Vec::new();
            for mut body in bodies {
                prop_assert!(body.bit_cursor() <= MTU_SIZE_BITS);
                body.begin_read();
                decoded.extend(read_ack_batch(&mut body).unwrap());
            }
            prop_assert_eq!(decoded, entries);
        }
    }

    /// Test that outer frames carry arbitrary bodies unchanged on the
    /// uncompressed path
    #[test]
    fn prop_batch_frames_round_trip_any_body(bytes in prop::collection::vec(any::<u8>(), 0..200)) {
        let mut body = BitBuffer::new();
        for byte in &bytes {
            body.write_bits(u64::from(*byte), 8).unwrap();
        }

        let mut frame = BitBuffer::new();
        write_batch(&mut frame, BatchKind::Cleanup, &body, None).unwrap();

        frame.begin_read();
        let (kind, mut decoded) = read_batch(&mut frame, None).unwrap();
        prop_assert_eq!(kind, BatchKind::Cleanup);
        prop_assert_eq!(decoded.bit_length(), bytes.len() * 8);
        for byte in &bytes {
            prop_assert_eq!(decoded.read_bits(8).unwrap() as u8, *byte);
        }
    }

    /// Test that two managers stay in lockstep over consecutive frames
    #[test]
    fn prop_managers_round_trip_consecutive_writes(first: u64, second: u64) {
        let now = Instant::now();
        let mut alice = DeltaManager::new(Protocol::builder().build());
        let mut bob = DeltaManager::new(Protocol::builder().build());
        let key = SyncKey::of::<u64>(1);

        let mut frame = BitBuffer::new();
        alice.write_value(&now, &mut frame, 2, key, &first).unwrap();
        frame.begin_read();
        prop_assert_eq!(bob.read_value::<u64>(&now, &mut frame, 1, key).unwrap(), first);

        let mut frame = BitBuffer::new();
        alice.write_value(&now, &mut frame, 2, key, &second).unwrap();
        frame.begin_read();
        prop_assert_eq!(bob.read_value::<u64>(&now, &mut frame, 1, key).unwrap(), second);
    }
}
