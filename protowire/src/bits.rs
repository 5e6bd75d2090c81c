//! Bit-level primitives shared by the varint codec and the packed decoders.
//!
//! Everything here is pure and works on plain words or byte slices. The
//! parallel bit extract has a hardware path (BMI2 `pext`) selected at compile
//! time and a portable fallback that produces identical results.

/// The high bit of every byte lane in a 64-bit word. A set bit in a varint byte marks a continuation.
pub const MSB_MASK: u64 = 0x8080_8080_8080_8080;

/// The low seven bits of every byte lane in a 64-bit word, the payload of a varint byte.
pub const PAYLOAD_MASK: u64 = 0x7F7F_7F7F_7F7F_7F7F;

/// Loads the first 8 bytes of `bytes` as a little endian word.
///
/// # Panics
///
/// Panics if `bytes` is shorter than 8 bytes.
#[inline]
pub fn load_u64_le(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(word)
}

/// Loads the first 4 bytes of `bytes` as a little endian word.
///
/// # Panics
///
/// Panics if `bytes` is shorter than 4 bytes.
#[inline]
pub fn load_u32_le(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(word)
}

/// Loads up to 8 bytes as a little endian word, filling missing high bytes with zeros.
#[inline]
pub fn load_u64_le_padded(bytes: &[u8]) -> u64 {
    let len = bytes.len().min(8);
    let mut word = [0u8; 8];
    word[..len].copy_from_slice(&bytes[..len]);
    u64::from_le_bytes(word)
}

/// Stores `value` as 4 little endian bytes at the start of `dst`.
///
/// # Panics
///
/// Panics if `dst` is shorter than 4 bytes.
#[inline]
pub fn store_u32_le(dst: &mut [u8], value: u32) {
    dst[..4].copy_from_slice(&value.to_le_bytes());
}

/// Stores `value` as 8 little endian bytes at the start of `dst`.
///
/// # Panics
///
/// Panics if `dst` is shorter than 8 bytes.
#[inline]
pub fn store_u64_le(dst: &mut [u8], value: u64) {
    dst[..8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
const fn low_bits(n: u32) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1 << n) - 1
    }
}

/// Packs the bits of `word` selected by `mask` into the low bits of the result, in mask order.
///
/// Uses the BMI2 `pext` instruction when the crate is compiled with that target feature.
///
/// # Examples
///
/// ```
/// use protowire::bits::pext_u64;
///
/// // the 7-bit payloads of the varint 0xAC 0x02 (300)
/// assert_eq!(pext_u64(0x02AC, 0x7F7F), 300);
/// assert_eq!(pext_u64(0b1010_1010, 0b1111_0000), 0b1010);
/// ```
#[inline]
pub fn pext_u64(word: u64, mask: u64) -> u64 {
    #[cfg(all(target_arch = "x86_64", target_feature = "bmi2"))]
    {
        #[allow(unused_unsafe)]
        unsafe {
            core::arch::x86_64::_pext_u64(word, mask)
        }
    }
    #[cfg(not(all(target_arch = "x86_64", target_feature = "bmi2")))]
    {
        pext_u64_portable(word, mask)
    }
}

/// The 32-bit form of [`pext_u64`](fn.pext_u64.html).
#[inline]
pub fn pext_u32(word: u32, mask: u32) -> u32 {
    #[cfg(all(target_arch = "x86_64", target_feature = "bmi2"))]
    {
        #[allow(unused_unsafe)]
        unsafe {
            core::arch::x86_64::_pext_u32(word, mask)
        }
    }
    #[cfg(not(all(target_arch = "x86_64", target_feature = "bmi2")))]
    {
        pext_u64_portable(u64::from(word), u64::from(mask)) as u32
    }
}

/// Portable parallel bit extract. Walks the mask one contiguous run of set bits at a time,
/// so a varint keep-mask costs at most one iteration per encoded byte.
pub const fn pext_u64_portable(word: u64, mut mask: u64) -> u64 {
    let mut result = 0;
    let mut out = 0;
    while mask != 0 {
        let start = mask.trailing_zeros();
        let run = (mask >> start).trailing_ones();
        result |= ((word >> start) & low_bits(run)) << out;
        out += run;
        mask &= !(low_bits(run) << start);
    }
    result
}

/// Portable parallel bit deposit, the inverse of [`pext_u64_portable`](fn.pext_u64_portable.html):
/// scatters the low bits of `value` into the set bit positions of `mask`.
pub const fn pdep_u64_portable(value: u64, mut mask: u64) -> u64 {
    let mut result = 0;
    let mut taken = 0;
    while mask != 0 {
        let start = mask.trailing_zeros();
        let run = (mask >> start).trailing_ones();
        result |= ((value >> taken) & low_bits(run)) << start;
        taken += run;
        mask &= !(low_bits(run) << start);
    }
    result
}

/// Gathers the terminal flags of the 8 byte lanes of `word` into one byte.
/// Bit `i` of the result is set when byte `i` has its high bit clear.
#[inline]
pub const fn terminal_mask(word: u64) -> u8 {
    let terminal = (!word & MSB_MASK) >> 7;
    (terminal.wrapping_mul(0x0102_0408_1020_4080) >> 56) as u8
}

/// A batch decode table entry: how many varints end inside an 8-byte word and the lane of each
/// terminal byte, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchEntry {
    /// The number of varints that end inside the word
    pub count: u8,
    /// The lane of each terminal byte; only the first `count` entries are meaningful
    pub ends: [u8; 8],
}

const fn build_batch_table() -> [BatchEntry; 256] {
    let mut table = [BatchEntry { count: 0, ends: [0; 8] }; 256];
    let mut mask = 0;
    while mask < 256 {
        let mut count = 0;
        let mut lane = 0;
        while lane < 8 {
            if mask & (1 << lane) != 0 {
                table[mask].ends[count] = lane as u8;
                count += 1;
            }
            lane += 1;
        }
        table[mask].count = count as u8;
        mask += 1;
    }
    table
}

/// Lookup table for multi-varint batch decode, indexed by [`terminal_mask`](fn.terminal_mask.html).
pub static BATCH_TABLE: [BatchEntry; 256] = build_batch_table();

/// Counts the bytes of `bytes` with the high bit clear, which is the number of varints that
/// terminate in the range.
///
/// On x86_64 this compares 16 byte lanes at a time with SSE2; elsewhere it counts 8 lanes at a
/// time in a general purpose register.
#[inline]
pub fn count_terminal_bytes(bytes: &[u8]) -> usize {
    #[cfg(target_arch = "x86_64")]
    {
        sse2::count_terminal_bytes(bytes)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        count_terminal_bytes_swar(bytes)
    }
}

/// Counts terminal bytes eight lanes at a time.
pub fn count_terminal_bytes_swar(bytes: &[u8]) -> usize {
    let mut chunks = bytes.chunks_exact(8);
    let mut count = 0;
    for chunk in &mut chunks {
        count += (!load_u64_le(chunk) & MSB_MASK).count_ones() as usize;
    }
    count + count_terminal_bytes_scalar(chunks.remainder())
}

/// Counts terminal bytes one byte at a time.
pub fn count_terminal_bytes_scalar(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b < 0x80).count()
}

#[cfg(target_arch = "x86_64")]
mod sse2 {
    use core::arch::x86_64::{__m128i, _mm_loadu_si128, _mm_movemask_epi8};

    pub fn count_terminal_bytes(bytes: &[u8]) -> usize {
        let mut chunks = bytes.chunks_exact(16);
        let mut count = 0;
        for chunk in &mut chunks {
            // SSE2 is part of the x86_64 baseline and the load is unaligned over exactly 16 bytes
            let continuation = unsafe { _mm_movemask_epi8(_mm_loadu_si128(chunk.as_ptr() as *const __m128i)) };
            count += 16 - (continuation as u32).count_ones() as usize;
        }
        count + super::count_terminal_bytes_swar(chunks.remainder())
    }
}
