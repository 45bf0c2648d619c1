//! Property coverage for the bit buffer and the variable-integer ladder.

use proptest::collection::vec;
use proptest::prelude::*;
use undine_serde::{var_i64_bits, var_u64_bits, BitBuffer};

fn mask(value: u64, width: u32) -> u64 {
    if width == 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

proptest! {
    #[test]
    fn write_then_read_returns_masked_value(value: u64, width in 1u32..=64) {
        let mut buffer = BitBuffer::new();
        buffer.write_bits(value, width).unwrap();
        buffer.begin_read();
        prop_assert_eq!(buffer.read_bits(width).unwrap(), mask(value, width));
    }

    #[test]
    fn mixed_sequences_round_trip(fields in vec((any::<u64>(), 1u32..=64), 1..64)) {
        let mut buffer = BitBuffer::new();
        for (value, width) in &fields {
            buffer.write_bits(*value, *width).unwrap();
        }
        buffer.begin_read();
        for (value, width) in &fields {
            prop_assert_eq!(buffer.read_bits(*width).unwrap(), mask(*value, *width));
        }
    }

    #[test]
    fn committed_bytes_survive_a_wrap(fields in vec((any::<u64>(), 1u32..=64), 1..64)) {
        let mut buffer = BitBuffer::new();
        for (value, width) in &fields {
            buffer.write_bits(*value, *width).unwrap();
        }
        let bit_length = buffer.bit_length();
        let bytes = buffer.to_slice().to_vec();

        let mut view = BitBuffer::wrap_external_bits(&bytes, bit_length);
        for (value, width) in &fields {
            prop_assert_eq!(view.read_bits(*width).unwrap(), mask(*value, *width));
        }
    }

    #[test]
    fn var_u64_round_trips_with_projected_size(value: u64) {
        let mut buffer = BitBuffer::new();
        buffer.write_var_u64(value).unwrap();
        prop_assert_eq!(buffer.bit_length() as u32, var_u64_bits(value));
        buffer.begin_read();
        prop_assert_eq!(buffer.read_var_u64().unwrap(), value);
    }

    #[test]
    fn var_i64_round_trips_with_projected_size(value: i64) {
        let mut buffer = BitBuffer::new();
        buffer.write_var_i64(value).unwrap();
        prop_assert_eq!(buffer.bit_length() as u32, var_i64_bits(value));
        buffer.begin_read();
        prop_assert_eq!(buffer.read_var_i64().unwrap(), value);
    }

    #[test]
    fn patching_never_disturbs_neighbors(
        prefix: u64,
        patched: u64,
        suffix: u64,
        width in 1u32..=64,
    ) {
        let mut buffer = BitBuffer::new();
        buffer.write_bits(prefix, 64).unwrap();
        let patch_pos = buffer.bit_cursor();
        buffer.write_bits(0, width).unwrap();
        buffer.write_bits(suffix, 64).unwrap();

        buffer.write_at(patch_pos, patched, width).unwrap();

        buffer.begin_read();
        prop_assert_eq!(buffer.read_bits(64).unwrap(), prefix);
        prop_assert_eq!(buffer.read_bits(width).unwrap(), mask(patched, width));
        prop_assert_eq!(buffer.read_bits(64).unwrap(), suffix);
    }
}
