use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use undine_serde::BitBuffer;

use crate::buffer_pool::BufferPool;
use crate::codec::error::CodecError;
use crate::codec::value_kinds::ValueKinds;

/// Everything a delta codec may need while encoding: the value registry for
/// full-value payloads and zero values, the delta registry for recursing
/// into element types, and the scratch pool.
pub struct CodecContext<'a> {
    pub values: &'a ValueKinds,
    pub deltas: &'a DeltaKinds,
    pub pool: &'a BufferPool,
}

impl<'a> CodecContext<'a> {
    pub fn new(values: &'a ValueKinds, deltas: &'a DeltaKinds, pool: &'a BufferPool) -> Self {
        Self {
            values,
            deltas,
            pool,
        }
    }
}

type DeltaWriteFn = Box<
    dyn Fn(&CodecContext<'_>, &mut BitBuffer<'_>, &dyn Any, &dyn Any) -> Result<bool, CodecError>
        + Send
        + Sync,
>;
type DeltaReadFn = Box<
    dyn Fn(
            &CodecContext<'_>,
            &mut BitBuffer<'_>,
            &dyn Any,
        ) -> Result<(bool, Box<dyn Any + Send>), CodecError>
        + Send
        + Sync,
>;

struct DeltaEntry {
    writer: DeltaWriteFn,
    reader: DeltaReadFn,
}

/// Registry of differential codecs.
///
/// Every delta encoding leads with a single changed bit, so an unchanged
/// value costs exactly one bit on the wire. Types without a registered
/// delta codec fall back to structural comparison: equal encodings ship the
/// single unchanged bit, anything else ships the changed bit followed by a
/// full re-encoding of the new value.
///
/// Registration is first-wins, like [`ValueKinds`].
pub struct DeltaKinds {
    by_type: HashMap<TypeId, DeltaEntry>,
}

impl DeltaKinds {
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
        }
    }

    /// Registers the delta codec for `T`, unless one is already registered.
    ///
    /// The writer receives the baseline and the new value and reports
    /// whether it encoded a change. The reader receives the baseline and
    /// returns the changed flag along with the reconstructed value, which
    /// must be a fresh instance even when unchanged.
    pub fn register<T, W, R>(&mut self, writer: W, reader: R)
    where
        T: Any + Send,
        W: Fn(&CodecContext<'_>, &mut BitBuffer<'_>, &T, &T) -> Result<bool, CodecError>
            + Send
            + Sync
            + 'static,
        R: Fn(&CodecContext<'_>, &mut BitBuffer<'_>, &T) -> Result<(bool, T), CodecError>
            + Send
            + Sync
            + 'static,
    {
        self.by_type
            .entry(TypeId::of::<T>())
            .or_insert_with(|| DeltaEntry {
                writer: Box::new(move |context, buffer, old, new| {
                    let old = old
                        .downcast_ref::<T>()
                        .expect("delta dispatch is keyed by the value's type id");
                    let new = new
                        .downcast_ref::<T>()
                        .expect("delta dispatch is keyed by the value's type id");
                    writer(context, buffer, old, new)
                }),
                reader: Box::new(move |context, buffer, old| {
                    let old = old
                        .downcast_ref::<T>()
                        .expect("delta dispatch is keyed by the value's type id");
                    let (changed, value) = reader(context, buffer, old)?;
                    Ok((changed, Box::new(value) as Box<dyn Any + Send>))
                }),
            });
    }

    /// Registers the delta codec for `Option<T>`, unless one is already
    /// registered.
    ///
    /// Layout after the changed bit: a presence bit, then for present
    /// values the inner delta. A transition out of nothing runs the inner
    /// delta against the zero value of `T`, so the payload only spends bits
    /// on the parts of the new value that differ from zero.
    pub fn register_option<T: Any + Send>(&mut self) {
        self.register::<Option<T>, _, _>(write_option::<T>, read_option::<T>);
    }

    /// Whether `T` has a registered delta codec, as opposed to relying on
    /// the structural fallback.
    pub fn has<T: Any>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Encodes the difference from `old` to `new`. Returns whether a
    /// change was encoded; an unchanged value costs exactly one bit.
    pub fn write<T: Any>(
        &self,
        context: &CodecContext<'_>,
        buffer: &mut BitBuffer<'_>,
        old: &T,
        new: &T,
    ) -> Result<bool, CodecError> {
        match self.by_type.get(&TypeId::of::<T>()) {
            Some(entry) => (entry.writer)(context, buffer, old, new),
            None => fallback_write(context, buffer, old, new),
        }
    }

    /// Decodes a delta against the baseline, returning the changed flag and
    /// the reconstructed value.
    pub fn read<T: Any + Send>(
        &self,
        context: &CodecContext<'_>,
        buffer: &mut BitBuffer<'_>,
        old: &T,
    ) -> Result<(bool, T), CodecError> {
        match self.by_type.get(&TypeId::of::<T>()) {
            Some(entry) => {
                let (changed, value) = (entry.reader)(context, buffer, old)?;
                let boxed = value
                    .downcast::<T>()
                    .expect("delta readers produce the type they are registered under");
                Ok((changed, *boxed))
            }
            None => fallback_read(context, buffer, old),
        }
    }
}

impl Default for DeltaKinds {
    fn default() -> Self {
        Self::new()
    }
}

fn fallback_write<T: Any>(
    context: &CodecContext<'_>,
    buffer: &mut BitBuffer<'_>,
    old: &T,
    new: &T,
) -> Result<bool, CodecError> {
    if context.values.structural_eq(context.pool, old, new)? {
        buffer.write_bits(0, 1)?;
        return Ok(false);
    }
    buffer.write_bits(1, 1)?;
    context.values.write(buffer, new)?;
    Ok(true)
}

fn fallback_read<T: Any>(
    context: &CodecContext<'_>,
    buffer: &mut BitBuffer<'_>,
    old: &T,
) -> Result<(bool, T), CodecError> {
    if buffer.read_bits(1)? == 0 {
        return Ok((false, context.values.deep_copy(context.pool, old)?));
    }
    Ok((true, context.values.read(buffer)?))
}

fn write_option<T: Any + Send>(
    context: &CodecContext<'_>,
    buffer: &mut BitBuffer<'_>,
    old: &Option<T>,
    new: &Option<T>,
) -> Result<bool, CodecError> {
    let flag_position = buffer.bit_cursor();
    buffer.write_bits(0, 1)?;
    match (old, new) {
        (None, None) => Ok(false),
        (Some(old_inner), Some(new_inner)) => {
            buffer.write_bits(1, 1)?;
            if context.deltas.write(context, buffer, old_inner, new_inner)? {
                buffer.write_at(flag_position, 1, 1)?;
                Ok(true)
            } else {
                // inner value unchanged: rewind to the single flag bit
                buffer.truncate(flag_position + 1)?;
                Ok(false)
            }
        }
        (None, Some(new_inner)) => {
            buffer.write_at(flag_position, 1, 1)?;
            buffer.write_bits(1, 1)?;
            let zero = context.values.default_of::<T>()?;
            context.deltas.write(context, buffer, &zero, new_inner)?;
            Ok(true)
        }
        (Some(_), None) => {
            buffer.write_at(flag_position, 1, 1)?;
            buffer.write_bits(0, 1)?;
            Ok(true)
        }
    }
}

fn read_option<T: Any + Send>(
    context: &CodecContext<'_>,
    buffer: &mut BitBuffer<'_>,
    old: &Option<T>,
) -> Result<(bool, Option<T>), CodecError> {
    if buffer.read_bits(1)? == 0 {
        let copy = match old {
            None => None,
            Some(inner) => Some(context.values.deep_copy(context.pool, inner)?),
        };
        return Ok((false, copy));
    }
    if buffer.read_bits(1)? == 0 {
        return Ok((true, None));
    }
    let zero;
    let baseline = match old {
        Some(inner) => inner,
        None => {
            zero = context.values.default_of::<T>()?;
            &zero
        }
    };
    let (_, value) = context.deltas.read(context, buffer, baseline)?;
    Ok((true, Some(value)))
}
