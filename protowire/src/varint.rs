//! The varint codec: reference and accelerated decoders, the encoder, zig-zag transforms
//! and the closed form size functions.
//!
//! The accelerated decoders work on whole little endian words. A varint's terminal byte is the
//! first byte with its high bit clear, so `!word & MSB_MASK` marks every terminal byte in the
//! word and its trailing zero count gives the length. The 7-bit payloads up to that byte are
//! then packed together with a single parallel bit extract.

use crate::bits::{self, MSB_MASK, PAYLOAD_MASK};
use thiserror::Error;

/// The maximum encoded length of a varint
pub const MAX_VARINT_LEN: usize = 10;

/// The maximum encoded length of a varint holding a non-negative 32-bit value
pub const MAX_VARINT32_LEN: usize = 5;

/// The number of bytes the 64-bit fast path loads
pub const FAST_PATH_LEN: usize = 16;

/// The error returned when a varint can't be decoded from a byte range
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The range ended before the varint's terminal byte
    #[error("the range ended in the middle of a varint")]
    Truncated,
    /// Ten bytes were read without finding a terminal byte
    #[error("the varint is longer than 10 bytes")]
    Malformed,
}

#[inline]
const fn keep_mask(len: usize) -> u64 {
    PAYLOAD_MASK >> (64 - 8 * len)
}

/// Decodes one varint a byte at a time, returning the value and the number of bytes it used.
///
/// # Examples
///
/// ```
/// use protowire::varint::{self, decode_reference};
///
/// assert_eq!(decode_reference(&[0xAC, 0x02]), Ok((300, 2)));
/// assert_eq!(decode_reference(&[0xAC]), Err(varint::Error::Truncated));
/// ```
pub fn decode_reference(bytes: &[u8]) -> Result<(u64, usize), Error> {
    let mut value = 0;
    for (i, &b) in bytes.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u64::from(b & 0x7F) << (7 * i);
        if b < 0x80 {
            return Ok((value, i + 1));
        }
    }
    if bytes.len() >= MAX_VARINT_LEN {
        Err(Error::Malformed)
    } else {
        Err(Error::Truncated)
    }
}

/// Decodes a varint that terminates inside `word`, returning the value and its length.
/// Returns `None` if none of the word's bytes is a terminal byte.
#[inline]
pub fn decode_word(word: u64) -> Option<(u64, usize)> {
    let terminal = !word & MSB_MASK;
    if terminal == 0 {
        return None;
    }
    let len = (terminal.trailing_zeros() / 8 + 1) as usize;
    Some((bits::pext_u64(word, keep_mask(len)), len))
}

/// Decodes a varint from a pair of consecutive little endian words.
///
/// Only the first two bytes of `hi` can belong to a valid varint, so a varint that doesn't
/// terminate in `lo` or in those two bytes is malformed.
#[inline]
pub fn decode_words(lo: u64, hi: u64) -> Result<(u64, usize), Error> {
    if let Some(decoded) = decode_word(lo) {
        return Ok(decoded);
    }
    let terminal = !hi & 0x8080;
    if terminal == 0 {
        return Err(Error::Malformed);
    }
    let len = (terminal.trailing_zeros() / 8 + 1) as usize;
    let value = bits::pext_u64(lo, PAYLOAD_MASK) | (bits::pext_u64(hi, keep_mask(len)) << 56);
    Ok((value, 8 + len))
}

/// Decodes a 64-bit varint with the word-at-a-time decoder. Ranges shorter than
/// 16 bytes go through the reference decoder.
#[inline]
pub fn decode64_fast(bytes: &[u8]) -> Result<(u64, usize), Error> {
    if bytes.len() < FAST_PATH_LEN {
        return decode_reference(bytes);
    }
    decode_words(bits::load_u64_le(bytes), bits::load_u64_le(&bytes[8..]))
}

/// Decodes a 32-bit varint with the word-at-a-time decoder, keeping the low 32 bits of longer
/// encodings. Ranges shorter than 8 bytes go through the reference decoder.
#[inline]
pub fn decode32_fast(bytes: &[u8]) -> Result<(u32, usize), Error> {
    if bytes.len() < 8 {
        return decode_reference(bytes).map(|(value, len)| (value as u32, len));
    }
    let word = bits::load_u64_le(bytes);
    let terminal = !word & MSB_MASK;
    if terminal != 0 {
        let len = (terminal.trailing_zeros() / 8 + 1) as usize;
        return Ok((bits::pext_u64(word, keep_mask(len)) as u32, len));
    }
    decode64_fast(bytes).map(|(value, len)| (value as u32, len))
}

/// Decodes a 64-bit varint, picking the fast path when enough bytes are available.
#[inline]
pub fn decode64(bytes: &[u8]) -> Result<(u64, usize), Error> {
    decode64_fast(bytes)
}

/// Decodes a 32-bit varint, picking the fast path when enough bytes are available.
#[inline]
pub fn decode32(bytes: &[u8]) -> Result<(u32, usize), Error> {
    decode32_fast(bytes)
}

/// Decodes every varint in `bytes` into `out`, mapping each raw value with `map`.
///
/// The terminal bytes are counted first to size `out`, then each 8-byte word is decoded with
/// one batch table lookup that yields every varint completed inside it. A range that ends in
/// the middle of a varint fails with [`Error::Truncated`](enum.Error.html#variant.Truncated).
pub fn decode_packed<T, F: FnMut(u64) -> T>(bytes: &[u8], out: &mut Vec<T>, mut map: F) -> Result<(), Error> {
    out.reserve(bits::count_terminal_bytes(bytes));

    let mut pos = 0;
    while bytes.len() - pos >= 8 {
        let word = bits::load_u64_le(&bytes[pos..]);
        let entry = &bits::BATCH_TABLE[bits::terminal_mask(word) as usize];
        if entry.count == 0 {
            let (value, len) = decode64(&bytes[pos..])?;
            out.push(map(value));
            pos += len;
            continue;
        }

        let mut start = 0;
        for &end in &entry.ends[..entry.count as usize] {
            let end = end as usize;
            out.push(map(bits::pext_u64(word >> (8 * start), keep_mask(end - start + 1))));
            start = end + 1;
        }
        pos += start;
    }
    while pos < bytes.len() {
        let (value, len) = decode_reference(&bytes[pos..])?;
        out.push(map(value));
        pos += len;
    }
    Ok(())
}

/// Encodes `value` into the start of `out`, returning the number of bytes written.
///
/// # Panics
///
/// Panics if `out` is shorter than [`size64(value)`](fn.size64.html).
#[inline]
pub fn encode(mut value: u64, out: &mut [u8]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        out[i] = value as u8 | 0x80;
        value >>= 7;
        i += 1;
    }
    out[i] = value as u8;
    i + 1
}

/// Encodes `value` into a fixed array, returning the array and the encoded length.
#[inline]
pub fn encode_to_array(value: u64) -> ([u8; MAX_VARINT_LEN], usize) {
    let mut buf = [0; MAX_VARINT_LEN];
    let len = encode(value, &mut buf);
    (buf, len)
}

/// Returns the encoded size of a 32-bit value.
#[inline]
pub const fn size32(value: u32) -> usize {
    (((31 ^ (value | 1).leading_zeros()) * 9 + 73) / 64) as usize
}

/// Returns the encoded size of a 64-bit value.
///
/// # Examples
///
/// ```
/// use protowire::varint::size64;
///
/// assert_eq!(size64(0), 1);
/// assert_eq!(size64(127), 1);
/// assert_eq!(size64(128), 2);
/// assert_eq!(size64(i64::MAX as u64), 9);
/// assert_eq!(size64(-1i64 as u64), 10);
/// ```
#[inline]
pub const fn size64(value: u64) -> usize {
    (((63 ^ (value | 1).leading_zeros()) * 9 + 73) / 64) as usize
}

/// Maps a signed 32-bit value to an unsigned one so small magnitudes encode in few bytes.
#[inline]
pub const fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverts [`zigzag_encode32`](fn.zigzag_encode32.html).
#[inline]
pub const fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Maps a signed 64-bit value to an unsigned one so small magnitudes encode in few bytes.
#[inline]
pub const fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverts [`zigzag_encode64`](fn.zigzag_encode64.html).
#[inline]
pub const fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;

    fn padded(bytes: &[u8]) -> Vec<u8> {
        let mut v = bytes.to_vec();
        v.resize(bytes.len() + FAST_PATH_LEN, 0);
        v
    }

    #[test]
    fn varint64_decode() {
        fn try_decode(bytes: &[u8], value: u64) {
            assert_eq!(decode_reference(bytes), Ok((value, bytes.len())));
            assert_eq!(decode64_fast(&padded(bytes)), Ok((value, bytes.len())));
        }

        try_decode(&[0x00], 0);
        try_decode(&[0x7F], 127);
        try_decode(&[0x80, 0x01], 128);
        try_decode(&[0xAC, 0x02], 300);
        try_decode(&[0xFF, 0x7F], 16_383);
        try_decode(&[0xFF, 0xFF, 0x7F], 2_097_151);
        try_decode(&[0xFF, 0xFF, 0xFF, 0x7F], 268_435_455);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::MAX as u64);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F], i64::MAX as u64);
        try_decode(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01], 1 << 63);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], u64::MAX);
    }
    #[test]
    fn varint32_decode() {
        fn try_decode(bytes: &[u8], value: u32) {
            assert_eq!(decode_reference(bytes).map(|(v, l)| (v as u32, l)), Ok((value, bytes.len())));
            assert_eq!(decode32_fast(&padded(bytes)), Ok((value, bytes.len())));
        }

        try_decode(&[0x00], 0);
        try_decode(&[0x96, 0x01], 150);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::MAX);
        // a negative int32 is sign extended to ten bytes
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], u32::MAX);
        try_decode(&[0x80, 0x80, 0x80, 0x80, 0xF8, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], i32::MIN as u32);
    }
    #[test]
    fn malformed_varint() {
        let eleven = [0xFF; 11];
        assert_matches!(decode_reference(&eleven), Err(Error::Malformed));
        assert_matches!(decode64_fast(&padded(&eleven)), Err(Error::Malformed));
        assert_matches!(decode32_fast(&padded(&eleven)), Err(Error::Malformed));

        let mut unterminated = [0x80u8; 16];
        unterminated[10] = 0x00;
        assert_matches!(decode64_fast(&unterminated), Err(Error::Malformed));
    }
    #[test]
    fn truncated_varint() {
        assert_matches!(decode_reference(&[]), Err(Error::Truncated));
        assert_matches!(decode_reference(&[0x80, 0x80]), Err(Error::Truncated));
        assert_matches!(decode64_fast(&[0x80; 9]), Err(Error::Truncated));
        assert_matches!(decode32_fast(&[0x80; 3]), Err(Error::Truncated));
    }
    #[test]
    fn varint_encode() {
        fn try_encode(value: u64, bytes: &[u8]) {
            let (buf, len) = encode_to_array(value);
            assert_eq!(&buf[..len], bytes);
            assert_eq!(size64(value), len);
        }

        try_encode(0, &[0x00]);
        try_encode(1, &[0x01]);
        try_encode(127, &[0x7F]);
        try_encode(300, &[0xAC, 0x02]);
        try_encode(16_383, &[0xFF, 0x7F]);
        try_encode(u32::MAX as u64, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        try_encode(u64::MAX, &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
    }
    #[test]
    fn sizes() {
        for shift in 0..64 {
            let value = 1u64 << shift;
            assert_eq!(size64(value), encode_to_array(value).1, "1 << {}", shift);
            assert_eq!(size64(value - 1), encode_to_array(value - 1).1);
        }
        for shift in 0..32 {
            let value = 1u32 << shift;
            assert_eq!(size32(value), size64(value as u64));
        }
        assert_eq!(size32(0), 1);
        assert_eq!(size32(u32::MAX), 5);
    }
    #[test]
    fn zigzag() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(-2), 3);
        assert_eq!(zigzag_encode32(i32::MAX), u32::MAX - 1);
        assert_eq!(zigzag_encode32(i32::MIN), u32::MAX);
        assert_eq!(zigzag_encode64(i64::MIN), u64::MAX);

        for &v in &[0, 1, -1, 2, -2, i32::MAX, i32::MIN, 12345, -12345] {
            assert_eq!(zigzag_decode32(zigzag_encode32(v)), v);
            assert_eq!(zigzag_decode64(zigzag_encode64(v as i64)), v as i64);
        }
    }
    #[test]
    fn packed_batch_decode() {
        let values = [0u64, 1, 127, 128, 300, 16_383, 16_384, u32::MAX as u64, u64::MAX, 5, 6, 7, 8, 9];
        let mut bytes = Vec::new();
        for &v in &values {
            let (buf, len) = encode_to_array(v);
            bytes.extend_from_slice(&buf[..len]);
        }

        let mut out = Vec::new();
        decode_packed(&bytes, &mut out, |v| v).unwrap();
        assert_eq!(out, values);

        out.clear();
        assert_matches!(decode_packed(&bytes[..bytes.len() - 1 - 9], &mut out, |v| v), Err(Error::Truncated));
    }
}
