//! Low-level byte primitives shared by all codecs.
//!
//! The stream readers read exactly the bytes they promise or return an
//! error; there is no partial-read ambiguity. The `*_at` helpers do the same
//! for random access into a slice, and the `put_*` helpers patch a buffer in
//! place without ever growing it.

use std::io::Read;

use crate::{Error, Result};

/// Read one byte.
#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

/// Read a little-endian `u16`.
#[inline]
pub(crate) fn le_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

/// Read a little-endian `u32`.
#[inline]
pub(crate) fn le_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

/// Read a little-endian `u64`.
#[inline]
pub(crate) fn le_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

/// Read a big-endian `u16`.
#[inline]
pub(crate) fn be_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_be_bytes(b))
}

/// Read a big-endian `u32`.
#[inline]
pub(crate) fn be_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

/// Read a `u16` with caller-supplied endianness.
#[inline]
pub(crate) fn end_u16<R: Read>(r: &mut R, le: bool) -> Result<u16> {
    if le { le_u16(r) } else { be_u16(r) }
}

/// Read a `u32` with caller-supplied endianness.
#[inline]
pub(crate) fn end_u32<R: Read>(r: &mut R, le: bool) -> Result<u32> {
    if le { le_u32(r) } else { be_u32(r) }
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Read exactly `len` bytes into a `Vec`.
#[inline]
pub(crate) fn bytesv<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut b = vec![0u8; len];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Verify that the next `N` bytes in the stream match `expected`.
///
/// Returns [`Error::BadMagic`] on mismatch.
#[inline]
pub(crate) fn magic<R: Read, const N: usize>(r: &mut R, expected: &[u8; N]) -> Result<()> {
    let got = bytesa::<N>(r)?;
    if &got != expected {
        return Err(Error::BadMagic);
    }
    Ok(())
}

/// Read a null-terminated UTF-8 string byte-by-byte from a reader.
pub(crate) fn read_null_string<R: Read>(r: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = u8(r)?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Borrow `len` bytes of `buf` starting at `offset`.
///
/// Returns [`Error::InvalidRange`] if any part lies outside the buffer.
#[inline]
pub(crate) fn slice_at(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset.checked_add(len).ok_or(Error::InvalidRange)?;
    buf.get(offset..end).ok_or(Error::InvalidRange)
}

/// Read a little-endian `u16` at `offset`.
#[inline]
pub(crate) fn le_u16_at(buf: &[u8], offset: usize) -> Result<u16> {
    let b = slice_at(buf, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

/// Read a little-endian `u32` at `offset`.
#[inline]
pub(crate) fn le_u32_at(buf: &[u8], offset: usize) -> Result<u32> {
    let b = slice_at(buf, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Check that `buf` holds `expected` at `offset`.
#[inline]
pub(crate) fn magic_at(buf: &[u8], offset: usize, expected: &[u8]) -> Result<()> {
    if slice_at(buf, offset, expected.len())? != expected {
        return Err(Error::BadMagic);
    }
    Ok(())
}

/// Overwrite `data.len()` bytes of `buf` at `offset`.
///
/// Never grows the buffer; returns [`Error::InvalidRange`] instead.
#[inline]
pub(crate) fn put_bytes(buf: &mut [u8], offset: usize, data: &[u8]) -> Result<()> {
    let end = offset.checked_add(data.len()).ok_or(Error::InvalidRange)?;
    buf.get_mut(offset..end)
        .ok_or(Error::InvalidRange)?
        .copy_from_slice(data);
    Ok(())
}

/// Overwrite a little-endian `u32` at `offset`.
#[inline]
pub(crate) fn put_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<()> {
    put_bytes(buf, offset, &value.to_le_bytes())
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Integer division rounding towards positive infinity.
#[inline]
pub(crate) const fn div_round_up(n: usize, d: usize) -> usize {
    n.div_ceil(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_helpers_reject_out_of_bounds() {
        let buf = [1u8, 2, 3, 4, 5];
        assert_eq!(le_u32_at(&buf, 1).unwrap(), 0x0504_0302);
        assert!(matches!(le_u32_at(&buf, 2), Err(Error::InvalidRange)));
        assert!(matches!(slice_at(&buf, usize::MAX, 2), Err(Error::InvalidRange)));
    }

    #[test]
    fn put_never_grows() {
        let mut buf = vec![0u8; 4];
        assert!(put_u32(&mut buf, 1, 7).is_err());
        put_u32(&mut buf, 0, 0xAABBCCDD).unwrap();
        assert_eq!(buf, [0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn alignment() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(17, 16), 32);
        assert_eq!(div_round_up(9, 4), 3);
    }
}
