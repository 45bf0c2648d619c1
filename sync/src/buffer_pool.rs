use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

use undine_serde::BitBuffer;

/// Reuses owned bit buffers across encode passes so steady-state sync work
/// allocates nothing. Scratch encodings, outgoing frames and structural
/// comparisons all lease from here.
pub struct BufferPool {
    idle: RefCell<Vec<BitBuffer<'static>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            idle: RefCell::new(Vec::new()),
        }
    }

    /// Leases an empty buffer in write mode. The lease returns the buffer
    /// to the pool when dropped.
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let buffer = self.idle.borrow_mut().pop().unwrap_or_else(BitBuffer::new);
        PooledBuffer {
            pool: self,
            buffer: Some(buffer),
        }
    }

    /// Number of buffers currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.borrow().len()
    }

    fn release(&self, mut buffer: BitBuffer<'static>) {
        buffer.begin_write();
        self.idle.borrow_mut().push(buffer);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A leased buffer. Dereferences to [`BitBuffer`] and returns itself to the
/// pool on drop.
pub struct PooledBuffer<'p> {
    pool: &'p BufferPool,
    buffer: Option<BitBuffer<'static>>,
}

impl Deref for PooledBuffer<'_> {
    type Target = BitBuffer<'static>;

    fn deref(&self) -> &Self::Target {
        self.buffer.as_ref().expect("pooled buffer present until drop")
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer.as_mut().expect("pooled buffer present until drop")
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leases_start_empty_and_return_on_drop() {
        let pool = BufferPool::new();
        {
            let mut leased = pool.acquire();
            leased.write_bits(0xFF, 8).unwrap();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);

        let reused = pool.acquire();
        assert_eq!(reused.bit_length(), 0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn concurrent_leases_draw_distinct_buffers() {
        let pool = BufferPool::new();
        let mut first = pool.acquire();
        let mut second = pool.acquire();
        first.write_bits(0b01, 2).unwrap();
        second.write_bits(0b10, 2).unwrap();
        assert_eq!(first.to_slice(), &[0b01]);
        assert_eq!(second.to_slice(), &[0b10]);
    }
}
