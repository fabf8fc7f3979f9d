//! Fixed-width unsigned value arithmetic.
//!
//! Signal values are stored as `u64` and every write is masked to the
//! signal's width, so an observed value of a `w`-bit signal always lies in
//! `[0, 2^w)`. Bit slices use Verilog `[msb:lsb]` numbering; reversed bounds
//! are normalized.

use thiserror::Error;

/// Widest signal the simulator supports.
pub const MAX_WIDTH: u32 = 64;

/// A bit slice that does not fit inside the signal it addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bit range [{msb}:{lsb}] out of bounds for width {width}")]
pub struct BitRangeError {
    /// Requested most significant bit.
    pub msb: u32,
    /// Requested least significant bit.
    pub lsb: u32,
    /// Width of the addressed value.
    pub width: u32,
}

/// Returns the all-ones mask for `width` bits.
pub fn mask(width: u32) -> u64 {
    if width >= MAX_WIDTH {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Truncates `value` to `width` bits.
pub fn truncate(value: u64, width: u32) -> u64 {
    value & mask(width)
}

/// Returns `true` if `value` is representable in `width` bits.
pub fn fits(value: u64, width: u32) -> bool {
    value & !mask(width) == 0
}

fn normalize(msb: u32, lsb: u32, width: u32) -> Result<(u32, u32), BitRangeError> {
    let (hi, lo) = if msb >= lsb { (msb, lsb) } else { (lsb, msb) };
    if hi >= width {
        return Err(BitRangeError { msb, lsb, width });
    }
    Ok((hi, lo))
}

/// Reads bits `[msb:lsb]` of a `width`-bit value, right-aligned.
pub fn read_bits(value: u64, width: u32, msb: u32, lsb: u32) -> Result<u64, BitRangeError> {
    let (hi, lo) = normalize(msb, lsb, width)?;
    Ok((value >> lo) & mask(hi - lo + 1))
}

/// Replaces bits `[msb:lsb]` of a `width`-bit value with the low bits of `field`.
///
/// Bits outside the slice are preserved; bits of `field` beyond the slice
/// width are dropped.
pub fn write_bits(
    value: u64,
    width: u32,
    msb: u32,
    lsb: u32,
    field: u64,
) -> Result<u64, BitRangeError> {
    let (hi, lo) = normalize(msb, lsb, width)?;
    let slice_mask = mask(hi - lo + 1) << lo;
    let merged = (value & !slice_mask) | ((field << lo) & slice_mask);
    Ok(truncate(merged, width))
}

/// Interprets a `width`-bit value as two's complement.
pub fn to_signed(value: u64, width: u32) -> i64 {
    let value = truncate(value, width);
    if width >= MAX_WIDTH {
        return value as i64;
    }
    let sign = 1u64 << (width - 1);
    if value & sign != 0 {
        (value | !mask(width)) as i64
    } else {
        value as i64
    }
}

/// Encodes a signed integer as a `width`-bit two's complement value.
pub fn from_signed(value: i64, width: u32) -> u64 {
    truncate(value as u64, width)
}
