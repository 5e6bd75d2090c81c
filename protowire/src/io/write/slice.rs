//! The array and view backends, a position over a fixed size mutable slice.

use super::internal::Writer;
use super::{Error, Result};
use crate::bits;
use crate::io::Backend;
use crate::varint;
use log::debug;

/// Fixed size storage a [`SliceWriter`](struct.SliceWriter.html) writes to
pub trait Storage {
    const PREFERENCE: Backend;

    fn bytes_mut(&mut self) -> &mut [u8];
    fn len(&self) -> usize;
}

impl Storage for Box<[u8]> {
    const PREFERENCE: Backend = Backend::Array;

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }
}

impl Storage for &'_ mut [u8] {
    const PREFERENCE: Backend = Backend::View;

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }
}

pub struct SliceWriter<S> {
    data: S,
    pos: usize,
}

impl<S: Storage> SliceWriter<S> {
    pub fn new(data: S) -> Self {
        Self { data, pos: 0 }
    }

    /// Claims the next `len` bytes of the slice
    #[inline]
    fn reserve(&mut self, len: usize) -> Result<&mut [u8]> {
        if len > self.data.len() - self.pos {
            return Err(Error::BufferUnderflow);
        }
        let start = self.pos;
        self.pos += len;
        Ok(&mut self.data.bytes_mut()[start..start + len])
    }

    pub fn finish(self) -> Result<S> {
        let expected = self.data.len();
        if self.pos != expected {
            debug!("slice writer finished with {} of {} bytes written", self.pos, expected);
            return Err(Error::SizeMismatch { expected, actual: self.pos });
        }
        Ok(self.data)
    }
}

impl<S: Storage> Writer for SliceWriter<S> {
    #[inline]
    fn preference(&self) -> Backend {
        S::PREFERENCE
    }

    #[inline]
    fn position(&self) -> u64 {
        self.pos as u64
    }

    #[inline]
    fn write_varint32(&mut self, value: u32) -> Result {
        let len = varint::size32(value);
        varint::encode(value as u64, self.reserve(len)?);
        Ok(())
    }

    #[inline]
    fn write_varint64(&mut self, value: u64) -> Result {
        let len = varint::size64(value);
        varint::encode(value, self.reserve(len)?);
        Ok(())
    }

    #[inline]
    fn write_bit32(&mut self, value: u32) -> Result {
        bits::store_u32_le(self.reserve(4)?, value);
        Ok(())
    }

    #[inline]
    fn write_bit64(&mut self, value: u64) -> Result {
        bits::store_u64_le(self.reserve(8)?, value);
        Ok(())
    }

    fn write_bytes(&mut self, value: &[u8]) -> Result {
        self.reserve(value.len())?.copy_from_slice(value);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{SliceWriter, Writer};
    use crate::io::write::Error;
    use assert_matches::assert_matches;

    #[test]
    fn failed_writes_leave_position() {
        let mut output = [0u8; 3];
        let mut writer = SliceWriter::new(&mut output[..]);
        writer.write_varint32(300).unwrap();
        assert_matches!(writer.write_varint64(1 << 14), Err(Error::BufferUnderflow));
        assert_eq!(writer.position(), 2);
        writer.write_varint64(1).unwrap();
        writer.finish().unwrap();
        assert_eq!(output, [0xAC, 0x02, 0x01]);
    }
}
