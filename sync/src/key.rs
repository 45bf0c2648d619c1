use std::any::type_name;
use std::fmt;

/// Version-stable identifier for a value type, derived from the type's full
/// path name. Both sides of a connection compute the same kind for the same
/// type without any registration-order coupling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueKind(u32);

impl ValueKind {
    /// The kind of a concrete type.
    pub fn of<T: 'static>() -> Self {
        Self(fnv1a_32(type_name::<T>().as_bytes()))
    }

    /// Reconstructs a kind read off the wire.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

const fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    let mut index = 0;
    while index < bytes.len() {
        hash ^= bytes[index] as u32;
        hash = hash.wrapping_mul(0x0100_0193);
        index += 1;
    }
    hash
}

/// Addresses one synchronized value: the kind of its type plus an instance
/// scope distinguishing values of the same type, such as a container id
/// combined with a field index.
///
/// Keys order by kind first, then instance, which matches the numeric order
/// of their packed form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncKey {
    kind: ValueKind,
    instance: u32,
}

impl SyncKey {
    pub fn new(kind: ValueKind, instance: u32) -> Self {
        Self { kind, instance }
    }

    /// A key for a value of type `T` under the given instance scope.
    pub fn of<T: 'static>(instance: u32) -> Self {
        Self::new(ValueKind::of::<T>(), instance)
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    /// Packs the key for the wire: kind in the high 32 bits, instance in
    /// the low 32.
    pub fn as_u64(&self) -> u64 {
        (u64::from(self.kind.to_raw()) << 32) | u64::from(self.instance)
    }

    pub fn from_u64(packed: u64) -> Self {
        Self {
            kind: ValueKind::from_raw((packed >> 32) as u32),
            instance: packed as u32,
        }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.instance)
    }
}
