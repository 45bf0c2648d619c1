use crate::{bit_buffer::BitBuffer, error::CapacityError};

/// Widths of the variable-integer ladder. A 2-bit selector picks the
/// smallest rung that fits, so small values cost 6 bits and anything up to
/// 64 bits remains representable.
const VAR_WIDTHS: [u32; 4] = [4, 12, 28, 64];

fn rung_for(value: u64) -> usize {
    for (index, width) in VAR_WIDTHS.iter().enumerate() {
        if *width == 64 || value < (1u64 << width) {
            return index;
        }
    }
    VAR_WIDTHS.len() - 1
}

/// Exact encoded size of [`BitBuffer::write_var_u64`] in bits, without
/// writing. Used to project batch sizes against the MTU before committing
/// an entry.
pub fn var_u64_bits(value: u64) -> u32 {
    2 + VAR_WIDTHS[rung_for(value)]
}

/// Exact encoded size of [`BitBuffer::write_var_i64`] in bits.
pub fn var_i64_bits(value: i64) -> u32 {
    1 + var_u64_bits(value.unsigned_abs())
}

impl<'b> BitBuffer<'b> {
    /// Writes `value` as a 2-bit width selector followed by the smallest
    /// ladder rung that fits.
    pub fn write_var_u64(&mut self, value: u64) -> Result<(), CapacityError> {
        let rung = rung_for(value);
        self.write_bits(rung as u64, 2)?;
        self.write_bits(value, VAR_WIDTHS[rung])
    }

    pub fn read_var_u64(&mut self) -> Result<u64, CapacityError> {
        let rung = self.read_bits(2)? as usize;
        self.read_bits(VAR_WIDTHS[rung])
    }

    /// Signed variant: a sign bit, then the magnitude on the unsigned
    /// ladder. `i64::MIN` round-trips through `unsigned_abs`.
    pub fn write_var_i64(&mut self, value: i64) -> Result<(), CapacityError> {
        self.write_bits((value < 0) as u64, 1)?;
        self.write_var_u64(value.unsigned_abs())
    }

    pub fn read_var_i64(&mut self) -> Result<i64, CapacityError> {
        let negative = self.read_bits(1)? != 0;
        let magnitude = self.read_var_u64()?;
        if negative {
            Ok((magnitude as i64).wrapping_neg())
        } else {
            Ok(magnitude as i64)
        }
    }
}
