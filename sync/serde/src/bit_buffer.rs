use crate::error::CapacityError;

/// Initial allocation for owned buffers, enough for several MTU-sized
/// packets before the first growth.
const INITIAL_CAPACITY_BYTES: usize = 4096;

/// Whether a buffer is currently being filled or drained.
///
/// Transitions are explicit: [`BitBuffer::begin_read`] commits the written
/// length and rewinds, [`BitBuffer::begin_write`] resets the buffer for
/// reuse. Calling a write operation while reading (or vice versa) is a
/// programming error and panics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferMode {
    Writing,
    Reading,
}

enum Storage<'b> {
    Owned(Vec<u8>),
    Wrapped(&'b [u8]),
}

/// A growable, bit-addressable buffer.
///
/// Bits are packed least-significant first: the first bit written lands in
/// bit 0 of byte 0. `write_bits` emits the low `width` bits of its value,
/// so a value wider than its width is silently masked, and
/// `read_bits(width)` after `write_bits(value, width)` always returns
/// `value & ((1 << width) - 1)`.
///
/// Owned buffers grow by doubling while writing. Buffers created with
/// [`BitBuffer::wrap_external`] borrow their bytes and are read-only views;
/// growing one reports [`CapacityError::GrowthWhileWrapped`] and switching
/// one to write mode panics.
pub struct BitBuffer<'b> {
    storage: Storage<'b>,
    mode: BufferMode,
    cursor: usize,
    length: usize,
}

impl BitBuffer<'static> {
    /// An empty owned buffer in write mode.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY_BYTES * 8)
    }

    /// An empty owned buffer in write mode with at least `bits` of capacity.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            storage: Storage::Owned(vec![0; bits.div_ceil(8)]),
            mode: BufferMode::Writing,
            cursor: 0,
            length: 0,
        }
    }

    /// An owned buffer in read mode over `bytes`, committed to its full
    /// byte length. Used for payloads whose bit length is a whole number of
    /// bytes.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let bits = bytes.len() * 8;
        Self::from_vec_bits(bytes, bits)
    }

    /// An owned buffer in read mode over `bytes`, committed to exactly
    /// `bit_length` bits. Used for decompressed payloads whose exact bit
    /// length arrived in a header.
    ///
    /// # Panics
    /// Panics if `bit_length` does not fit in `bytes`.
    pub fn from_vec_bits(bytes: Vec<u8>, bit_length: usize) -> Self {
        assert!(
            bit_length <= bytes.len() * 8,
            "BitBuffer: bit length {} exceeds the {} bits provided",
            bit_length,
            bytes.len() * 8
        );
        Self {
            storage: Storage::Owned(bytes),
            mode: BufferMode::Reading,
            cursor: 0,
            length: bit_length,
        }
    }
}

impl Default for BitBuffer<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'b> BitBuffer<'b> {
    /// A zero-copy read view over external memory, committed to its full
    /// byte length. The view cannot grow or be written.
    pub fn wrap_external(bytes: &'b [u8]) -> Self {
        let bits = bytes.len() * 8;
        Self::wrap_external_bits(bytes, bits)
    }

    /// A zero-copy read view committed to exactly `bit_length` bits.
    ///
    /// # Panics
    /// Panics if `bit_length` does not fit in `bytes`.
    pub fn wrap_external_bits(bytes: &'b [u8], bit_length: usize) -> Self {
        assert!(
            bit_length <= bytes.len() * 8,
            "BitBuffer: bit length {} exceeds the {} bits provided",
            bit_length,
            bytes.len() * 8
        );
        Self {
            storage: Storage::Wrapped(bytes),
            mode: BufferMode::Reading,
            cursor: 0,
            length: bit_length,
        }
    }

    /// Current cursor position in bits.
    pub fn bit_cursor(&self) -> usize {
        self.cursor
    }

    /// Committed length in bits: the high-water mark while writing, the
    /// readable length while reading.
    pub fn bit_length(&self) -> usize {
        self.length
    }

    /// Total addressable capacity in bits.
    pub fn capacity_bits(&self) -> usize {
        self.bytes().len() * 8
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn is_wrapped(&self) -> bool {
        matches!(self.storage, Storage::Wrapped(_))
    }

    /// Guarantees total capacity of at least `bits`.
    ///
    /// Owned buffers in write mode grow by doubling until the request fits.
    /// Requests beyond capacity fail on wrapped buffers and on buffers in
    /// read mode.
    pub fn ensure_capacity(&mut self, bits: usize) -> Result<(), CapacityError> {
        if bits <= self.capacity_bits() {
            return Ok(());
        }
        if self.is_wrapped() {
            return Err(CapacityError::GrowthWhileWrapped {
                capacity: self.capacity_bits(),
                required: bits,
            });
        }
        if self.mode == BufferMode::Reading {
            return Err(CapacityError::GrowthWhileReading {
                capacity: self.capacity_bits(),
                required: bits,
            });
        }
        self.grow_to(bits)
    }

    /// Writes the low `width` bits of `value` at the cursor, growing as
    /// needed, and advances the cursor.
    ///
    /// Byte-aligned widths at byte-aligned cursors take a whole-byte fast
    /// path; everything else merges with shifts and masks, leaving
    /// neighboring bits untouched. Width 0 is a no-op.
    ///
    /// # Panics
    /// Panics if `width > 64` or the buffer is in read mode.
    pub fn write_bits(&mut self, value: u64, width: u32) -> Result<(), CapacityError> {
        assert!(width <= 64, "BitBuffer: write width {width} exceeds 64 bits");
        assert!(
            self.mode == BufferMode::Writing,
            "BitBuffer: write_bits while in read mode, call begin_write first"
        );
        if width == 0 {
            return Ok(());
        }
        let end = self.cursor + width as usize;
        self.reserve_for_write(end)?;
        let pos = self.cursor;
        merge_bits(self.bytes_mut(), pos, mask_value(value, width), width);
        self.cursor = end;
        if self.cursor > self.length {
            self.length = self.cursor;
        }
        Ok(())
    }

    /// Reads `width` bits at the cursor and advances it.
    ///
    /// # Panics
    /// Panics if `width > 64` or the buffer is in write mode.
    pub fn read_bits(&mut self, width: u32) -> Result<u64, CapacityError> {
        assert!(width <= 64, "BitBuffer: read width {width} exceeds 64 bits");
        assert!(
            self.mode == BufferMode::Reading,
            "BitBuffer: read_bits while in write mode, call begin_read first"
        );
        if width == 0 {
            return Ok(0);
        }
        let end = self.cursor + width as usize;
        if end > self.length {
            return Err(CapacityError::ReadOverrun {
                cursor: self.cursor,
                width,
                committed: self.length,
            });
        }
        let value = extract_bits(self.bytes(), self.cursor, width);
        self.cursor = end;
        Ok(value)
    }

    /// Patches `width` bits at `bit_pos` without moving the cursor.
    ///
    /// The target region must already have been written; this exists to
    /// reserve a flag bit and fill it in once its value is known.
    ///
    /// # Panics
    /// Panics if `width > 64` or the buffer is in read mode.
    pub fn write_at(&mut self, bit_pos: usize, value: u64, width: u32) -> Result<(), CapacityError> {
        assert!(width <= 64, "BitBuffer: patch width {width} exceeds 64 bits");
        assert!(
            self.mode == BufferMode::Writing,
            "BitBuffer: write_at while in read mode, call begin_write first"
        );
        if width == 0 {
            return Ok(());
        }
        if bit_pos + width as usize > self.length {
            return Err(CapacityError::PatchOutOfRange {
                position: bit_pos,
                width,
                written: self.length,
            });
        }
        merge_bits(self.bytes_mut(), bit_pos, mask_value(value, width), width);
        Ok(())
    }

    /// Moves the cursor to an absolute bit position within the committed
    /// length.
    pub fn set_cursor(&mut self, bit_pos: usize) -> Result<(), CapacityError> {
        if bit_pos > self.length {
            return Err(CapacityError::CursorOutOfRange {
                requested: bit_pos,
                limit: self.length,
            });
        }
        self.cursor = bit_pos;
        Ok(())
    }

    /// Advances the cursor by `bits`.
    ///
    /// While writing, the skipped region is zeroed and the committed length
    /// extends over it. While reading, skipping past the committed length
    /// is an overrun.
    pub fn skip(&mut self, bits: usize) -> Result<(), CapacityError> {
        match self.mode {
            BufferMode::Writing => {
                let mut remaining = bits;
                while remaining > 0 {
                    let chunk = remaining.min(64) as u32;
                    self.write_bits(0, chunk)?;
                    remaining -= chunk as usize;
                }
                Ok(())
            }
            BufferMode::Reading => {
                let end = self.cursor + bits;
                if end > self.length {
                    return Err(CapacityError::ReadOverrun {
                        cursor: self.cursor,
                        width: bits.min(u32::MAX as usize) as u32,
                        committed: self.length,
                    });
                }
                self.cursor = end;
                Ok(())
            }
        }
    }

    /// Commits the written length and switches to read mode with the cursor
    /// rewound to the start.
    pub fn begin_read(&mut self) {
        self.mode = BufferMode::Reading;
        self.cursor = 0;
    }

    /// Resets to an empty buffer in write mode, keeping the allocation.
    ///
    /// Every byte is zeroed, so [`BitBuffer::to_slice`] output depends only
    /// on what was written since the reset.
    ///
    /// # Panics
    /// Panics on a wrapped buffer, which can never be written.
    pub fn begin_write(&mut self) {
        assert!(
            !self.is_wrapped(),
            "BitBuffer: begin_write on a buffer wrapping external memory"
        );
        self.bytes_mut().fill(0);
        self.mode = BufferMode::Writing;
        self.cursor = 0;
        self.length = 0;
    }

    /// Moves the cursor back to `bit_pos` and truncates the committed
    /// length to match, abandoning everything written after it. The
    /// abandoned region is zeroed so later writes merge into clean bytes.
    ///
    /// # Panics
    /// Panics in read mode.
    pub fn truncate(&mut self, bit_pos: usize) -> Result<(), CapacityError> {
        assert!(
            self.mode == BufferMode::Writing,
            "BitBuffer: truncate while in read mode, call begin_write first"
        );
        if bit_pos > self.length {
            return Err(CapacityError::CursorOutOfRange {
                requested: bit_pos,
                limit: self.length,
            });
        }
        let mut bit = bit_pos;
        while bit < self.length {
            let chunk = (self.length - bit).min(64) as u32;
            merge_bits(self.bytes_mut(), bit, 0, chunk);
            bit += chunk as usize;
        }
        self.cursor = bit_pos;
        self.length = bit_pos;
        Ok(())
    }

    /// The committed bytes, `ceil(bit_length / 8)` of them. For buffers
    /// filled through write calls, trailing bits of the final byte beyond
    /// the committed length are zero, so equal bit sequences produce equal
    /// slices.
    pub fn to_slice(&self) -> &[u8] {
        &self.bytes()[..self.length.div_ceil(8)]
    }

    /// Copies the first `bits` bits of `src` to the cursor, in 64-bit
    /// chunks. Used to splice a scratch encoding into an outgoing frame.
    pub fn copy_bits_from(&mut self, src: &BitBuffer, bits: usize) -> Result<(), CapacityError> {
        let mut copied = 0usize;
        while copied < bits {
            let chunk = (bits - copied).min(64) as u32;
            let value = extract_bits(src.bytes(), copied, chunk);
            self.write_bits(value, chunk)?;
            copied += chunk as usize;
        }
        Ok(())
    }

    /// Reads `bits` bits at an absolute position without touching the
    /// cursor. The region must be committed.
    pub fn peek_at(&self, bit_pos: usize, width: u32) -> Result<u64, CapacityError> {
        assert!(width <= 64, "BitBuffer: peek width {width} exceeds 64 bits");
        if bit_pos + width as usize > self.length {
            return Err(CapacityError::ReadOverrun {
                cursor: bit_pos,
                width,
                committed: self.length,
            });
        }
        Ok(extract_bits(self.bytes(), bit_pos, width))
    }

    fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(bytes) => bytes,
            Storage::Wrapped(bytes) => bytes,
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Owned(bytes) => bytes,
            Storage::Wrapped(_) => {
                // wrapped buffers are created in read mode and begin_write
                // rejects them, so no write path reaches here
                unreachable!("BitBuffer: mutable access to wrapped storage")
            }
        }
    }

    fn reserve_for_write(&mut self, required_bits: usize) -> Result<(), CapacityError> {
        if self.is_wrapped() {
            return Err(CapacityError::GrowthWhileWrapped {
                capacity: self.capacity_bits(),
                required: required_bits,
            });
        }
        if required_bits <= self.capacity_bits() {
            return Ok(());
        }
        self.grow_to(required_bits)
    }

    fn grow_to(&mut self, required_bits: usize) -> Result<(), CapacityError> {
        let required_bytes = required_bits.div_ceil(8);
        match &mut self.storage {
            Storage::Owned(bytes) => {
                let mut new_len = bytes.len().max(64);
                while new_len < required_bytes {
                    new_len *= 2;
                }
                bytes.resize(new_len, 0);
                Ok(())
            }
            Storage::Wrapped(wrapped) => Err(CapacityError::GrowthWhileWrapped {
                capacity: wrapped.len() * 8,
                required: required_bits,
            }),
        }
    }
}

fn mask_value(value: u64, width: u32) -> u64 {
    if width == 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

fn merge_bits(bytes: &mut [u8], pos: usize, value: u64, width: u32) {
    if pos % 8 == 0 && width % 8 == 0 {
        let start = pos / 8;
        let count = (width / 8) as usize;
        bytes[start..start + count].copy_from_slice(&value.to_le_bytes()[..count]);
        return;
    }
    let mut value = value;
    let mut bit = pos;
    let mut remaining = width;
    while remaining > 0 {
        let offset = (bit % 8) as u32;
        let take = (8 - offset).min(remaining);
        let mask = (((1u16 << take) - 1) as u8) << offset;
        let chunk = ((value as u8) << offset) & mask;
        let byte = &mut bytes[bit / 8];
        *byte = (*byte & !mask) | chunk;
        value >>= take;
        bit += take as usize;
        remaining -= take;
    }
}

fn extract_bits(bytes: &[u8], pos: usize, width: u32) -> u64 {
    if pos % 8 == 0 && width % 8 == 0 {
        let start = pos / 8;
        let count = (width / 8) as usize;
        let mut le = [0u8; 8];
        le[..count].copy_from_slice(&bytes[start..start + count]);
        return u64::from_le_bytes(le);
    }
    let mut output = 0u64;
    let mut filled = 0u32;
    let mut bit = pos;
    while filled < width {
        let offset = (bit % 8) as u32;
        let take = (8 - offset).min(width - filled);
        let mask = ((1u16 << take) - 1) as u8;
        let chunk = (bytes[bit / 8] >> offset) & mask;
        output |= (chunk as u64) << filled;
        filled += take;
        bit += take as usize;
    }
    output
}
