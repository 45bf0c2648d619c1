use std::any::Any;

use crate::codec::delta_kinds::DeltaKinds;
use crate::codec::error::CodecError;
use crate::codec::numeric::{register_float_deltas, register_int_deltas, FloatStrategy};
use crate::codec::value_kinds::ValueKinds;

// Collection payloads cap their pre-allocation; a hostile length header can
// make reads fail but cannot make us reserve unbounded memory up front.
const MAX_PREALLOCATED_ITEMS: usize = 4096;

macro_rules! unsigned_value {
    ($values:expr, $($t:ty => $width:expr),* $(,)?) => {$(
        $values.register_writer::<$t, _>(|_, buffer, value| {
            buffer.write_bits(u64::from(*value), $width)?;
            Ok(())
        });
        $values.register_reader::<$t, _>(|_, buffer| Ok(buffer.read_bits($width)? as $t));
    )*};
}

macro_rules! signed_value {
    ($values:expr, $($t:ty as $u:ty => $width:expr),* $(,)?) => {$(
        $values.register_writer::<$t, _>(|_, buffer, value| {
            buffer.write_bits(u64::from(*value as $u), $width)?;
            Ok(())
        });
        $values.register_reader::<$t, _>(|_, buffer| Ok(buffer.read_bits($width)? as $u as $t));
    )*};
}

/// Fills every built-in codec slot that is still unregistered. Runs when
/// the protocol locks, after all application registrations, so first-wins
/// slots keep whatever the application put there.
pub(crate) fn register_defaults(
    values: &mut ValueKinds,
    deltas: &mut DeltaKinds,
    floats: FloatStrategy,
) {
    register_value_defaults(values);
    register_int_deltas(deltas);
    register_float_deltas(deltas, floats);
}

fn register_value_defaults(values: &mut ValueKinds) {
    values.register_writer::<bool, _>(|_, buffer, value| {
        buffer.write_bits(u64::from(*value), 1)?;
        Ok(())
    });
    values.register_reader::<bool, _>(|_, buffer| Ok(buffer.read_bits(1)? != 0));

    unsigned_value!(values, u8 => 8, u16 => 16, u32 => 32);
    signed_value!(values, i8 as u8 => 8, i16 as u16 => 16, i32 as u32 => 32);

    values.register_writer::<u64, _>(|_, buffer, value| {
        buffer.write_bits(*value, 64)?;
        Ok(())
    });
    values.register_reader::<u64, _>(|_, buffer| buffer.read_bits(64).map_err(CodecError::from));

    values.register_writer::<i64, _>(|_, buffer, value| {
        buffer.write_bits(*value as u64, 64)?;
        Ok(())
    });
    values.register_reader::<i64, _>(|_, buffer| Ok(buffer.read_bits(64)? as i64));

    values.register_writer::<f32, _>(|_, buffer, value| {
        buffer.write_bits(u64::from(value.to_bits()), 32)?;
        Ok(())
    });
    values.register_reader::<f32, _>(|_, buffer| Ok(f32::from_bits(buffer.read_bits(32)? as u32)));

    values.register_writer::<f64, _>(|_, buffer, value| {
        buffer.write_bits(value.to_bits(), 64)?;
        Ok(())
    });
    values.register_reader::<f64, _>(|_, buffer| Ok(f64::from_bits(buffer.read_bits(64)?)));

    values.register_writer::<String, _>(|_, buffer, value| {
        buffer.write_var_u64(value.len() as u64)?;
        for byte in value.as_bytes() {
            buffer.write_bits(u64::from(*byte), 8)?;
        }
        Ok(())
    });
    values.register_reader::<String, _>(|_, buffer| {
        let length = buffer.read_var_u64()? as usize;
        let mut bytes = Vec::with_capacity(length.min(MAX_PREALLOCATED_ITEMS));
        for _ in 0..length {
            bytes.push(buffer.read_bits(8)? as u8);
        }
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { length })
    });
}

/// Registers the full-value codec for `Vec<T>`: an element count followed
/// by each element through the registry. Deltas for vectors go through the
/// structural fallback, so an unchanged vector still costs a single bit.
pub fn register_vec_of<T: Any + Send + Default>(values: &mut ValueKinds) {
    values.register_writer::<Vec<T>, _>(|kinds, buffer, value| {
        buffer.write_var_u64(value.len() as u64)?;
        for item in value {
            kinds.write(buffer, item)?;
        }
        Ok(())
    });
    values.register_reader::<Vec<T>, _>(|kinds, buffer| {
        let length = buffer.read_var_u64()? as usize;
        let mut items = Vec::with_capacity(length.min(MAX_PREALLOCATED_ITEMS));
        for _ in 0..length {
            items.push(kinds.read(buffer)?);
        }
        Ok(items)
    });
}

/// Registers the full-value and delta codecs for `Option<T>`.
pub fn register_option_of<T: Any + Send + Default>(
    values: &mut ValueKinds,
    deltas: &mut DeltaKinds,
) {
    values.register_writer::<Option<T>, _>(|kinds, buffer, value| match value {
        None => {
            buffer.write_bits(0, 1)?;
            Ok(())
        }
        Some(inner) => {
            buffer.write_bits(1, 1)?;
            kinds.write(buffer, inner)
        }
    });
    values.register_reader::<Option<T>, _>(|kinds, buffer| {
        if buffer.read_bits(1)? == 0 {
            return Ok(None);
        }
        Ok(Some(kinds.read(buffer)?))
    });
    deltas.register_option::<T>();
}

#[cfg(test)]
mod tests {
    use undine_serde::BitBuffer;

    use super::*;
    use crate::buffer_pool::BufferPool;

    fn default_values() -> ValueKinds {
        let mut values = ValueKinds::new();
        register_value_defaults(&mut values);
        values
    }

    #[test]
    fn primitives_use_their_natural_widths() {
        let values = default_values();
        let mut buffer = BitBuffer::new();
        values.write(&mut buffer, &true).unwrap();
        values.write(&mut buffer, &200u8).unwrap();
        values.write(&mut buffer, &(-77i16)).unwrap();
        values.write(&mut buffer, &3.5f32).unwrap();
        values.write(&mut buffer, &u64::MAX).unwrap();
        assert_eq!(buffer.bit_length(), 1 + 8 + 16 + 32 + 64);

        buffer.begin_read();
        assert!(values.read::<bool>(&mut buffer).unwrap());
        assert_eq!(values.read::<u8>(&mut buffer).unwrap(), 200);
        assert_eq!(values.read::<i16>(&mut buffer).unwrap(), -77);
        assert_eq!(values.read::<f32>(&mut buffer).unwrap(), 3.5);
        assert_eq!(values.read::<u64>(&mut buffer).unwrap(), u64::MAX);
    }

    #[test]
    fn negative_and_non_finite_values_survive() {
        let values = default_values();
        let mut buffer = BitBuffer::new();
        values.write(&mut buffer, &i64::MIN).unwrap();
        values.write(&mut buffer, &f64::NAN).unwrap();
        values.write(&mut buffer, &(-0.0f32)).unwrap();

        buffer.begin_read();
        assert_eq!(values.read::<i64>(&mut buffer).unwrap(), i64::MIN);
        assert!(values.read::<f64>(&mut buffer).unwrap().is_nan());
        assert_eq!(
            values.read::<f32>(&mut buffer).unwrap().to_bits(),
            (-0.0f32).to_bits()
        );
    }

    #[test]
    fn strings_carry_length_then_bytes() {
        let values = default_values();
        let mut buffer = BitBuffer::new();
        values.write(&mut buffer, &String::from("héllo")).unwrap();

        buffer.begin_read();
        assert_eq!(values.read::<String>(&mut buffer).unwrap(), "héllo");
    }

    #[test]
    fn malformed_string_bytes_error() {
        let values = default_values();
        let mut buffer = BitBuffer::new();
        buffer.write_var_u64(2).unwrap();
        buffer.write_bits(0xFF, 8).unwrap();
        buffer.write_bits(0xFE, 8).unwrap();

        buffer.begin_read();
        assert!(matches!(
            values.read::<String>(&mut buffer),
            Err(CodecError::InvalidUtf8 { length: 2 })
        ));
    }

    #[test]
    fn vectors_recurse_through_element_codecs() {
        let mut values = default_values();
        register_vec_of::<String>(&mut values);

        let mut buffer = BitBuffer::new();
        let value = vec![String::from("a"), String::new(), String::from("bc")];
        values.write(&mut buffer, &value).unwrap();

        buffer.begin_read();
        assert_eq!(values.read::<Vec<String>>(&mut buffer).unwrap(), value);
    }

    #[test]
    fn option_values_spend_one_presence_bit() {
        let mut values = default_values();
        let mut deltas = DeltaKinds::new();
        register_option_of::<u16>(&mut values, &mut deltas);

        let mut buffer = BitBuffer::new();
        values.write(&mut buffer, &None::<u16>).unwrap();
        values.write(&mut buffer, &Some(512u16)).unwrap();
        assert_eq!(buffer.bit_length(), 1 + 1 + 16);

        buffer.begin_read();
        assert_eq!(values.read::<Option<u16>>(&mut buffer).unwrap(), None);
        assert_eq!(values.read::<Option<u16>>(&mut buffer).unwrap(), Some(512));
    }

    #[test]
    fn structural_fallback_composes_with_vec_codecs() {
        let mut values = default_values();
        register_vec_of::<u32>(&mut values);
        let mut deltas = DeltaKinds::new();
        register_int_deltas(&mut deltas);
        let pool = BufferPool::new();
        let context = crate::codec::delta_kinds::CodecContext::new(&values, &deltas, &pool);

        let old = vec![5u32, 6, 7];
        let mut unchanged = BitBuffer::new();
        assert!(!deltas
            .write(&context, &mut unchanged, &old, &old.clone())
            .unwrap());
        assert_eq!(unchanged.bit_length(), 1);

        let new = vec![5u32, 9, 7];
        let mut changed = BitBuffer::new();
        assert!(deltas.write(&context, &mut changed, &old, &new).unwrap());
        changed.begin_read();
        let (_, decoded) = deltas.read::<Vec<u32>>(&context, &mut changed, &old).unwrap();
        assert_eq!(decoded, new);
    }
}
