use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use undine_serde::BitBuffer;

use crate::buffer_pool::BufferPool;
use crate::codec::error::{CodecError, DisposalError};
use crate::key::ValueKind;
use crate::transport::AssetTable;

/// Bits spent on an inline kind tag in polymorphic payloads.
const KIND_BITS: u32 = 32;

type WriteFn =
    Box<dyn Fn(&ValueKinds, &mut BitBuffer<'_>, &dyn Any) -> Result<(), CodecError> + Send + Sync>;
type ReadFn = Box<
    dyn Fn(&ValueKinds, &mut BitBuffer<'_>) -> Result<Box<dyn Any + Send>, CodecError>
        + Send
        + Sync,
>;
type DisposeFn = Box<dyn Fn(&mut (dyn Any + Send)) -> Result<(), DisposalError> + Send + Sync>;
type ZeroFn = Box<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

struct ValueEntry {
    kind: ValueKind,
    type_name: &'static str,
    writer: Option<WriteFn>,
    reader: Option<ReadFn>,
    disposer: Option<DisposeFn>,
    zero: ZeroFn,
}

/// Registry of full-value codecs, keyed both by compile-time type and by
/// wire kind.
///
/// Registration is first-wins per slot: a writer, reader or disposer
/// already in place stays, so application registrations made before the
/// protocol locks take precedence over the built-in defaults filled in at
/// lock time. Registering any slot for a type also captures the type's
/// zero value through its `Default` impl.
///
/// Writers and readers receive the registry itself so composite codecs can
/// recurse into element types.
pub struct ValueKinds {
    by_type: HashMap<TypeId, ValueEntry>,
    by_kind: HashMap<ValueKind, TypeId>,
}

impl ValueKinds {
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            by_kind: HashMap::new(),
        }
    }

    /// Registers the full-value writer for `T`, unless one is already
    /// registered.
    ///
    /// # Panics
    /// Panics if the kind derived for `T` collides with a different
    /// registered type, which would corrupt polymorphic dispatch.
    pub fn register_writer<T, F>(&mut self, writer: F)
    where
        T: Any + Send + Default,
        F: Fn(&ValueKinds, &mut BitBuffer<'_>, &T) -> Result<(), CodecError> + Send + Sync + 'static,
    {
        let entry = self.entry_mut::<T>();
        if entry.writer.is_none() {
            entry.writer = Some(Box::new(move |kinds, buffer, value| {
                let value = value
                    .downcast_ref::<T>()
                    .expect("write dispatch is keyed by the value's type id");
                writer(kinds, buffer, value)
            }));
        }
    }

    /// Registers the full-value reader for `T`, unless one is already
    /// registered.
    pub fn register_reader<T, F>(&mut self, reader: F)
    where
        T: Any + Send + Default,
        F: Fn(&ValueKinds, &mut BitBuffer<'_>) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        let entry = self.entry_mut::<T>();
        if entry.reader.is_none() {
            entry.reader = Some(Box::new(move |kinds, buffer| {
                let value = reader(kinds, buffer)?;
                Ok(Box::new(value) as Box<dyn Any + Send>)
            }));
        }
    }

    /// Registers a release hook run when history pruning discards values of
    /// `T`, unless one is already registered. Types without a disposer are
    /// simply dropped.
    pub fn register_disposer<T, F>(&mut self, disposer: F)
    where
        T: Any + Send + Default,
        F: Fn(&mut T) -> Result<(), DisposalError> + Send + Sync + 'static,
    {
        let entry = self.entry_mut::<T>();
        if entry.disposer.is_none() {
            entry.disposer = Some(Box::new(move |value| {
                let value = value
                    .downcast_mut::<T>()
                    .expect("dispose dispatch is keyed by the value's type id");
                disposer(value)
            }));
        }
    }

    /// Encodes a full value.
    pub fn write<T: Any>(&self, buffer: &mut BitBuffer<'_>, value: &T) -> Result<(), CodecError> {
        let writer = self
            .by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.writer.as_ref())
            .ok_or(CodecError::MissingWriter {
                type_name: type_name::<T>(),
            })?;
        writer(self, buffer, value)
    }

    /// Decodes a full value.
    pub fn read<T: Any>(&self, buffer: &mut BitBuffer<'_>) -> Result<T, CodecError> {
        let reader = self
            .by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.reader.as_ref())
            .ok_or(CodecError::MissingReader {
                type_name: type_name::<T>(),
            })?;
        let value = reader(self, buffer)?;
        let boxed = value
            .downcast::<T>()
            .expect("readers produce the type they are registered under");
        Ok(*boxed)
    }

    /// Encodes a value whose type is only known at runtime.
    ///
    /// Layout: a presence bit; for present values an asset bit; then either
    /// a variable-width asset index or an inline kind tag followed by the
    /// value payload.
    pub fn write_dyn(
        &self,
        buffer: &mut BitBuffer<'_>,
        value: Option<&dyn Any>,
        assets: &dyn AssetTable,
    ) -> Result<(), CodecError> {
        let Some(value) = value else {
            buffer.write_bits(0, 1)?;
            return Ok(());
        };
        buffer.write_bits(1, 1)?;

        if let Some(index) = assets.try_get_index(value) {
            buffer.write_bits(1, 1)?;
            buffer.write_var_u64(index)?;
            return Ok(());
        }
        buffer.write_bits(0, 1)?;

        let entry = self
            .by_type
            .get(&value.type_id())
            .ok_or(CodecError::UnregisteredDynValue {
                type_id: value.type_id(),
            })?;
        let writer = entry
            .writer
            .as_ref()
            .ok_or(CodecError::MissingWriter {
                type_name: entry.type_name,
            })?;
        buffer.write_bits(u64::from(entry.kind.to_raw()), KIND_BITS)?;
        writer(self, buffer, value)
    }

    /// Decodes a value written by [`ValueKinds::write_dyn`].
    pub fn read_dyn(
        &self,
        buffer: &mut BitBuffer<'_>,
        assets: &dyn AssetTable,
    ) -> Result<Option<Box<dyn Any + Send>>, CodecError> {
        if buffer.read_bits(1)? == 0 {
            return Ok(None);
        }
        if buffer.read_bits(1)? == 1 {
            let index = buffer.read_var_u64()?;
            let value = assets
                .get_by_index(index)
                .ok_or(CodecError::UnknownAssetIndex { index })?;
            return Ok(Some(value));
        }

        let kind = ValueKind::from_raw(buffer.read_bits(KIND_BITS)? as u32);
        let type_id = self
            .by_kind
            .get(&kind)
            .ok_or(CodecError::UnresolvedType { kind })?;
        let entry = self
            .by_type
            .get(type_id)
            .expect("kind table entries always have a type table entry");
        let reader = entry
            .reader
            .as_ref()
            .ok_or(CodecError::MissingReader {
                type_name: entry.type_name,
            })?;
        Ok(Some(reader(self, buffer)?))
    }

    /// Whether two values encode to identical bits. This is the engine's
    /// equality: it works for any registered type without an `Eq` bound.
    pub fn structural_eq<T: Any>(
        &self,
        pool: &BufferPool,
        left: &T,
        right: &T,
    ) -> Result<bool, CodecError> {
        let mut left_bits = pool.acquire();
        let mut right_bits = pool.acquire();
        self.write(&mut left_bits, left)?;
        self.write(&mut right_bits, right)?;
        Ok(left_bits.bit_length() == right_bits.bit_length()
            && left_bits.to_slice() == right_bits.to_slice())
    }

    /// Clones a value by encoding it to pooled scratch and decoding it
    /// back. Works for any registered type without a `Clone` bound.
    pub fn deep_copy<T: Any>(&self, pool: &BufferPool, value: &T) -> Result<T, CodecError> {
        let mut scratch = pool.acquire();
        self.write(&mut scratch, value)?;
        scratch.begin_read();
        self.read(&mut scratch)
    }

    /// The zero value of `T`, captured from its `Default` impl at
    /// registration. Baselines fall back to this when no snapshot has been
    /// acknowledged yet.
    pub fn default_of<T: Any>(&self) -> Result<T, CodecError> {
        let entry = self
            .by_type
            .get(&TypeId::of::<T>())
            .ok_or(CodecError::Unregistered {
                type_name: type_name::<T>(),
            })?;
        let boxed = (entry.zero)()
            .downcast::<T>()
            .expect("zero values have the type they were registered under");
        Ok(*boxed)
    }

    /// Runs the disposer registered for the value's runtime type, if any.
    pub fn dispose(&self, value: &mut (dyn Any + Send)) -> Result<(), DisposalError> {
        let Some(entry) = self.by_type.get(&(*value).type_id()) else {
            return Ok(());
        };
        match &entry.disposer {
            Some(disposer) => disposer(value),
            None => Ok(()),
        }
    }

    fn entry_mut<T: Any + Send + Default>(&mut self) -> &mut ValueEntry {
        let type_id = TypeId::of::<T>();
        if !self.by_type.contains_key(&type_id) {
            let kind = ValueKind::of::<T>();
            if let Some(existing) = self.by_kind.insert(kind, type_id) {
                if existing != type_id {
                    let existing_name = self
                        .by_type
                        .get(&existing)
                        .map_or("unknown", |entry| entry.type_name);
                    panic!(
                        "value kind {} of `{}` collides with already registered `{}`",
                        kind,
                        type_name::<T>(),
                        existing_name
                    );
                }
            }
            self.by_type.insert(
                type_id,
                ValueEntry {
                    kind,
                    type_name: type_name::<T>(),
                    writer: None,
                    reader: None,
                    disposer: None,
                    zero: Box::new(|| -> Box<dyn Any + Send> { Box::new(T::default()) }),
                },
            );
        }
        self.by_type
            .get_mut(&type_id)
            .expect("entry inserted above")
    }
}

impl Default for ValueKinds {
    fn default() -> Self {
        Self::new()
    }
}
