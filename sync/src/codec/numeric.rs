use undine_serde::BitBuffer;

use crate::codec::delta_kinds::{CodecContext, DeltaKinds};
use crate::codec::error::CodecError;

/// How float deltas are packed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatStrategy {
    /// Component-wise diffs of the raw bit representation. Exact for every
    /// value, including NaN, infinities and signed zero.
    Bitwise,
    /// Snaps values to a lattice of `10^-digits` steps and diffs lattice
    /// indices. Compact for values that move in small steps; changes below
    /// the lattice resolution are lost, and values are assumed to stay
    /// within the lattice's integer range.
    Quantized { digits: u8 },
    /// Measures both encodings per change and ships the smaller behind a
    /// discriminator bit. Unchanged detection is exact bit equality; the
    /// lattice branch is only eligible when it reconstructs within half a
    /// step of the true value, so NaN and out-of-range values always take
    /// the exact branch.
    Adaptive { digits: u8 },
}

// Integer deltas ship the wrapping difference in the 64-bit domain, so a
// wrap-around step like u8 250 -> 3 still encodes as a small signed diff.

macro_rules! unsigned_delta {
    ($deltas:expr, $($t:ty),*) => {$(
        $deltas.register::<$t, _, _>(
            |_, buffer, old, new| {
                let diff = u64::from(*new).wrapping_sub(u64::from(*old)) as i64;
                if diff == 0 {
                    buffer.write_bits(0, 1)?;
                    return Ok(false);
                }
                buffer.write_bits(1, 1)?;
                buffer.write_var_i64(diff)?;
                Ok(true)
            },
            |_, buffer, old| {
                if buffer.read_bits(1)? == 0 {
                    return Ok((false, *old));
                }
                let diff = buffer.read_var_i64()?;
                Ok((true, u64::from(*old).wrapping_add(diff as u64) as $t))
            },
        );
    )*};
}

macro_rules! signed_delta {
    ($deltas:expr, $($t:ty),*) => {$(
        $deltas.register::<$t, _, _>(
            |_, buffer, old, new| {
                let diff = i64::from(*new).wrapping_sub(i64::from(*old));
                if diff == 0 {
                    buffer.write_bits(0, 1)?;
                    return Ok(false);
                }
                buffer.write_bits(1, 1)?;
                buffer.write_var_i64(diff)?;
                Ok(true)
            },
            |_, buffer, old| {
                if buffer.read_bits(1)? == 0 {
                    return Ok((false, *old));
                }
                let diff = buffer.read_var_i64()?;
                Ok((true, i64::from(*old).wrapping_add(diff) as $t))
            },
        );
    )*};
}

pub(crate) fn register_int_deltas(deltas: &mut DeltaKinds) {
    unsigned_delta!(deltas, u8, u16, u32);
    signed_delta!(deltas, i8, i16, i32);
    deltas.register::<u64, _, _>(
        |_, buffer, old, new| {
            let diff = new.wrapping_sub(*old) as i64;
            if diff == 0 {
                buffer.write_bits(0, 1)?;
                return Ok(false);
            }
            buffer.write_bits(1, 1)?;
            buffer.write_var_i64(diff)?;
            Ok(true)
        },
        |_, buffer, old| {
            if buffer.read_bits(1)? == 0 {
                return Ok((false, *old));
            }
            let diff = buffer.read_var_i64()?;
            Ok((true, old.wrapping_add(diff as u64)))
        },
    );
    deltas.register::<i64, _, _>(
        |_, buffer, old, new| {
            let diff = new.wrapping_sub(*old);
            if diff == 0 {
                buffer.write_bits(0, 1)?;
                return Ok(false);
            }
            buffer.write_bits(1, 1)?;
            buffer.write_var_i64(diff)?;
            Ok(true)
        },
        |_, buffer, old| {
            if buffer.read_bits(1)? == 0 {
                return Ok((false, *old));
            }
            let diff = buffer.read_var_i64()?;
            Ok((true, old.wrapping_add(diff)))
        },
    );
}

pub(crate) fn register_float_deltas(deltas: &mut DeltaKinds, strategy: FloatStrategy) {
    match strategy {
        FloatStrategy::Bitwise => {
            deltas.register::<f32, _, _>(
                |_, buffer, old, new| {
                    if old.to_bits() == new.to_bits() {
                        buffer.write_bits(0, 1)?;
                        return Ok(false);
                    }
                    buffer.write_bits(1, 1)?;
                    write_f32_components(buffer, *old, *new)?;
                    Ok(true)
                },
                |_, buffer, old| {
                    if buffer.read_bits(1)? == 0 {
                        return Ok((false, *old));
                    }
                    Ok((true, read_f32_components(buffer, *old)?))
                },
            );
            deltas.register::<f64, _, _>(
                |_, buffer, old, new| {
                    if old.to_bits() == new.to_bits() {
                        buffer.write_bits(0, 1)?;
                        return Ok(false);
                    }
                    buffer.write_bits(1, 1)?;
                    write_f64_components(buffer, *old, *new)?;
                    Ok(true)
                },
                |_, buffer, old| {
                    if buffer.read_bits(1)? == 0 {
                        return Ok((false, *old));
                    }
                    Ok((true, read_f64_components(buffer, *old)?))
                },
            );
        }
        FloatStrategy::Quantized { digits } => {
            deltas.register::<f32, _, _>(
                move |_, buffer, old, new| {
                    let old_index = quantize(f64::from(*old), digits);
                    let new_index = quantize(f64::from(*new), digits);
                    if old_index == new_index {
                        buffer.write_bits(0, 1)?;
                        return Ok(false);
                    }
                    buffer.write_bits(1, 1)?;
                    buffer.write_var_i64(new_index.wrapping_sub(old_index))?;
                    Ok(true)
                },
                move |_, buffer, old| {
                    if buffer.read_bits(1)? == 0 {
                        return Ok((false, *old));
                    }
                    let diff = buffer.read_var_i64()?;
                    let index = quantize(f64::from(*old), digits).wrapping_add(diff);
                    Ok((true, dequantize(index, digits) as f32))
                },
            );
            deltas.register::<f64, _, _>(
                move |_, buffer, old, new| {
                    let old_index = quantize(*old, digits);
                    let new_index = quantize(*new, digits);
                    if old_index == new_index {
                        buffer.write_bits(0, 1)?;
                        return Ok(false);
                    }
                    buffer.write_bits(1, 1)?;
                    buffer.write_var_i64(new_index.wrapping_sub(old_index))?;
                    Ok(true)
                },
                move |_, buffer, old| {
                    if buffer.read_bits(1)? == 0 {
                        return Ok((false, *old));
                    }
                    let diff = buffer.read_var_i64()?;
                    let index = quantize(*old, digits).wrapping_add(diff);
                    Ok((true, dequantize(index, digits)))
                },
            );
        }
        FloatStrategy::Adaptive { digits } => {
            deltas.register::<f32, _, _>(
                move |context, buffer, old, new| {
                    if old.to_bits() == new.to_bits() {
                        buffer.write_bits(0, 1)?;
                        return Ok(false);
                    }
                    buffer.write_bits(1, 1)?;
                    let mut exact = context.pool.acquire();
                    write_f32_components(&mut exact, *old, *new)?;
                    let mut lattice = context.pool.acquire();
                    let new_index = quantize(f64::from(*new), digits);
                    let diff = new_index.wrapping_sub(quantize(f64::from(*old), digits));
                    lattice.write_var_i64(diff)?;
                    let use_lattice = lattice_is_faithful(f64::from(*new), new_index, digits)
                        && lattice.bit_length() < exact.bit_length();
                    buffer.write_bits(u64::from(use_lattice), 1)?;
                    let chosen = if use_lattice { &lattice } else { &exact };
                    buffer.copy_bits_from(chosen, chosen.bit_length())?;
                    Ok(true)
                },
                move |_, buffer, old| {
                    if buffer.read_bits(1)? == 0 {
                        return Ok((false, *old));
                    }
                    if buffer.read_bits(1)? == 1 {
                        let diff = buffer.read_var_i64()?;
                        let index = quantize(f64::from(*old), digits).wrapping_add(diff);
                        Ok((true, dequantize(index, digits) as f32))
                    } else {
                        Ok((true, read_f32_components(buffer, *old)?))
                    }
                },
            );
            deltas.register::<f64, _, _>(
                move |context, buffer, old, new| {
                    if old.to_bits() == new.to_bits() {
                        buffer.write_bits(0, 1)?;
                        return Ok(false);
                    }
                    buffer.write_bits(1, 1)?;
                    let mut exact = context.pool.acquire();
                    write_f64_components(&mut exact, *old, *new)?;
                    let mut lattice = context.pool.acquire();
                    let new_index = quantize(*new, digits);
                    let diff = new_index.wrapping_sub(quantize(*old, digits));
                    lattice.write_var_i64(diff)?;
                    let use_lattice = lattice_is_faithful(*new, new_index, digits)
                        && lattice.bit_length() < exact.bit_length();
                    buffer.write_bits(u64::from(use_lattice), 1)?;
                    let chosen = if use_lattice { &lattice } else { &exact };
                    buffer.copy_bits_from(chosen, chosen.bit_length())?;
                    Ok(true)
                },
                move |_, buffer, old| {
                    if buffer.read_bits(1)? == 0 {
                        return Ok((false, *old));
                    }
                    if buffer.read_bits(1)? == 1 {
                        let diff = buffer.read_var_i64()?;
                        let index = quantize(*old, digits).wrapping_add(diff);
                        Ok((true, dequantize(index, digits)))
                    } else {
                        Ok((true, read_f64_components(buffer, *old)?))
                    }
                },
            );
        }
    }
}

// Component layout for changed floats: a sign-flip bit, then a flagged
// exponent diff, then a flagged mantissa diff. Typical smooth motion flips
// nothing and moves the mantissa a little.

fn write_f32_components(
    buffer: &mut BitBuffer<'_>,
    old: f32,
    new: f32,
) -> Result<(), CodecError> {
    let old_bits = old.to_bits();
    let new_bits = new.to_bits();
    buffer.write_bits(u64::from((old_bits ^ new_bits) >> 31), 1)?;

    let old_exponent = i64::from((old_bits >> 23) & 0xFF);
    let new_exponent = i64::from((new_bits >> 23) & 0xFF);
    if old_exponent == new_exponent {
        buffer.write_bits(0, 1)?;
    } else {
        buffer.write_bits(1, 1)?;
        buffer.write_var_i64(new_exponent - old_exponent)?;
    }

    let old_mantissa = i64::from(old_bits & 0x7F_FFFF);
    let new_mantissa = i64::from(new_bits & 0x7F_FFFF);
    if old_mantissa == new_mantissa {
        buffer.write_bits(0, 1)?;
    } else {
        buffer.write_bits(1, 1)?;
        buffer.write_var_i64(new_mantissa - old_mantissa)?;
    }
    Ok(())
}

fn read_f32_components(buffer: &mut BitBuffer<'_>, old: f32) -> Result<f32, CodecError> {
    let old_bits = old.to_bits();
    let mut sign = old_bits >> 31;
    let mut exponent = (old_bits >> 23) & 0xFF;
    let mut mantissa = old_bits & 0x7F_FFFF;
    if buffer.read_bits(1)? == 1 {
        sign ^= 1;
    }
    if buffer.read_bits(1)? == 1 {
        let diff = buffer.read_var_i64()?;
        exponent = (i64::from(exponent).wrapping_add(diff) as u32) & 0xFF;
    }
    if buffer.read_bits(1)? == 1 {
        let diff = buffer.read_var_i64()?;
        mantissa = (i64::from(mantissa).wrapping_add(diff) as u32) & 0x7F_FFFF;
    }
    Ok(f32::from_bits((sign << 31) | (exponent << 23) | mantissa))
}

fn write_f64_components(
    buffer: &mut BitBuffer<'_>,
    old: f64,
    new: f64,
) -> Result<(), CodecError> {
    let old_bits = old.to_bits();
    let new_bits = new.to_bits();
    buffer.write_bits((old_bits ^ new_bits) >> 63, 1)?;

    let old_exponent = ((old_bits >> 52) & 0x7FF) as i64;
    let new_exponent = ((new_bits >> 52) & 0x7FF) as i64;
    if old_exponent == new_exponent {
        buffer.write_bits(0, 1)?;
    } else {
        buffer.write_bits(1, 1)?;
        buffer.write_var_i64(new_exponent - old_exponent)?;
    }

    let old_mantissa = (old_bits & 0xF_FFFF_FFFF_FFFF) as i64;
    let new_mantissa = (new_bits & 0xF_FFFF_FFFF_FFFF) as i64;
    if old_mantissa == new_mantissa {
        buffer.write_bits(0, 1)?;
    } else {
        buffer.write_bits(1, 1)?;
        buffer.write_var_i64(new_mantissa - old_mantissa)?;
    }
    Ok(())
}

fn read_f64_components(buffer: &mut BitBuffer<'_>, old: f64) -> Result<f64, CodecError> {
    let old_bits = old.to_bits();
    let mut sign = old_bits >> 63;
    let mut exponent = (old_bits >> 52) & 0x7FF;
    let mut mantissa = old_bits & 0xF_FFFF_FFFF_FFFF;
    if buffer.read_bits(1)? == 1 {
        sign ^= 1;
    }
    if buffer.read_bits(1)? == 1 {
        let diff = buffer.read_var_i64()?;
        exponent = ((exponent as i64).wrapping_add(diff) as u64) & 0x7FF;
    }
    if buffer.read_bits(1)? == 1 {
        let diff = buffer.read_var_i64()?;
        mantissa = ((mantissa as i64).wrapping_add(diff) as u64) & 0xF_FFFF_FFFF_FFFF;
    }
    Ok(f64::from_bits((sign << 63) | (exponent << 52) | mantissa))
}

fn quantize(value: f64, digits: u8) -> i64 {
    (value * 10f64.powi(i32::from(digits))).round() as i64
}

fn dequantize(index: i64, digits: u8) -> f64 {
    index as f64 / 10f64.powi(i32::from(digits))
}

/// Whether decoding `index` lands within half a lattice step of `value`.
/// Rules the lattice branch out for NaN, infinities and values past the
/// lattice's integer range, where the quantized index is meaningless.
fn lattice_is_faithful(value: f64, index: i64, digits: u8) -> bool {
    (dequantize(index, digits) - value).abs() <= 0.5 / 10f64.powi(i32::from(digits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::codec::value_kinds::ValueKinds;

    struct Fixture {
        values: ValueKinds,
        deltas: DeltaKinds,
        pool: BufferPool,
    }

    impl Fixture {
        fn ints() -> Self {
            let mut deltas = DeltaKinds::new();
            register_int_deltas(&mut deltas);
            Self {
                values: ValueKinds::new(),
                deltas,
                pool: BufferPool::new(),
            }
        }

        fn floats(strategy: FloatStrategy) -> Self {
            let mut deltas = DeltaKinds::new();
            register_float_deltas(&mut deltas, strategy);
            Self {
                values: ValueKinds::new(),
                deltas,
                pool: BufferPool::new(),
            }
        }

        fn context(&self) -> CodecContext<'_> {
            CodecContext::new(&self.values, &self.deltas, &self.pool)
        }

        fn round_trip<T: std::any::Any + Send>(&self, old: &T, new: &T) -> (usize, T) {
            let context = self.context();
            let mut buffer = BitBuffer::new();
            self.deltas.write(&context, &mut buffer, old, new).unwrap();
            let written = buffer.bit_length();
            buffer.begin_read();
            let (_, value) = self.deltas.read(&context, &mut buffer, old).unwrap();
            (written, value)
        }
    }

    #[test]
    fn unchanged_integers_cost_one_bit() {
        let fixture = Fixture::ints();
        let (bits, value) = fixture.round_trip(&1000u32, &1000u32);
        assert_eq!(bits, 1);
        assert_eq!(value, 1000);
    }

    #[test]
    fn small_steps_reconstruct_exactly() {
        let fixture = Fixture::ints();
        let (_, value) = fixture.round_trip(&10u32, &15u32);
        assert_eq!(value, 15);
        let (_, value) = fixture.round_trip(&-3i16, &-90i16);
        assert_eq!(value, -90);
    }

    #[test]
    fn wrap_around_steps_stay_small_and_exact() {
        let fixture = Fixture::ints();

        let (bits, value) = fixture.round_trip(&250u8, &3u8);
        assert_eq!(value, 3);
        // -247 fits the second varint rung: flag + sign + selector + 12
        assert_eq!(bits, 16);

        let (_, value) = fixture.round_trip(&u64::MAX, &0u64);
        assert_eq!(value, 0);
        let (_, value) = fixture.round_trip(&i64::MAX, &i64::MIN);
        assert_eq!(value, i64::MIN);
        let (_, value) = fixture.round_trip(&i32::MIN, &i32::MAX);
        assert_eq!(value, i32::MAX);
    }

    #[test]
    fn bitwise_floats_are_exact_for_every_value() {
        let fixture = Fixture::floats(FloatStrategy::Bitwise);
        for (old, new) in [
            (1.5f32, 1.75f32),
            (0.0, -0.0),
            (f32::MAX, f32::MIN_POSITIVE),
            (3.25, f32::NAN),
            (f32::INFINITY, 7.0),
        ] {
            let (_, value) = fixture.round_trip(&old, &new);
            assert_eq!(value.to_bits(), new.to_bits());
        }

        let (bits, value) = fixture.round_trip(&2.5f64, &2.5f64);
        assert_eq!(bits, 1);
        assert_eq!(value, 2.5);
    }

    #[test]
    fn quantized_floats_snap_to_the_lattice() {
        let fixture = Fixture::floats(FloatStrategy::Quantized { digits: 2 });

        let (_, value) = fixture.round_trip(&1.25f32, &1.75f32);
        assert_eq!(value, 1.75);

        // below the lattice resolution nothing ships
        let (bits, value) = fixture.round_trip(&1.251f32, &1.252f32);
        assert_eq!(bits, 1);
        assert_eq!(value, 1.251);

        let (_, value) = fixture.round_trip(&-200.50f64, &-200.25f64);
        assert_eq!(value, -200.25);
    }

    #[test]
    fn adaptive_floats_spend_one_bit_when_bit_equal() {
        let fixture = Fixture::floats(FloatStrategy::Adaptive { digits: 3 });
        let (bits, value) = fixture.round_trip(&9.125f32, &9.125f32);
        assert_eq!(bits, 1);
        assert_eq!(value, 9.125);
    }

    #[test]
    fn adaptive_floats_prefer_the_smaller_encoding() {
        let fixture = Fixture::floats(FloatStrategy::Adaptive { digits: 3 });

        // a lattice-aligned step decodes exactly from either encoding
        let (_, value) = fixture.round_trip(&10.0f32, &15.0f32);
        assert_eq!(value, 15.0);

        // NaN has no lattice encoding; the exact branch must carry it
        let (_, value) = fixture.round_trip(&1.0f64, &f64::NAN);
        assert!(value.is_nan());
    }
}
