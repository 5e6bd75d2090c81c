//! The raw region backend. Fixed width values are stored with unaligned little endian stores.

use super::internal::Writer;
use super::{Error, Result};
use crate::io::{Backend, RegionMut};
use crate::varint;
use log::debug;

pub struct RegionWriter<'a> {
    region: RegionMut<'a>,
    offset: usize,
}

impl<'a> RegionWriter<'a> {
    pub fn new(region: RegionMut<'a>) -> Self {
        Self { region, offset: 0 }
    }

    #[inline]
    fn advance(&mut self, stored: bool, len: usize) -> Result {
        if stored {
            self.offset += len;
            Ok(())
        } else {
            Err(Error::BufferUnderflow)
        }
    }

    pub fn finish(self) -> Result {
        let expected = self.region.len();
        if self.offset != expected {
            debug!("region writer finished with {} of {} bytes written", self.offset, expected);
            return Err(Error::SizeMismatch { expected, actual: self.offset });
        }
        Ok(())
    }
}

impl Writer for RegionWriter<'_> {
    #[inline]
    fn preference(&self) -> Backend {
        Backend::Region
    }

    #[inline]
    fn position(&self) -> u64 {
        self.offset as u64
    }

    #[inline]
    fn write_varint32(&mut self, value: u32) -> Result {
        self.write_varint64(value as u64)
    }

    fn write_varint64(&mut self, value: u64) -> Result {
        let (buf, len) = varint::encode_to_array(value);
        let stored = self.region.store(self.offset, &buf[..len]);
        self.advance(stored, len)
    }

    #[inline]
    fn write_bit32(&mut self, value: u32) -> Result {
        let stored = self.region.store_u32_le(self.offset, value);
        self.advance(stored, 4)
    }

    #[inline]
    fn write_bit64(&mut self, value: u64) -> Result {
        let stored = self.region.store_u64_le(self.offset, value);
        self.advance(stored, 8)
    }

    fn write_bytes(&mut self, value: &[u8]) -> Result {
        let stored = self.region.store(self.offset, value);
        self.advance(stored, value.len())
    }
}

#[cfg(test)]
mod test {
    use super::{RegionWriter, Writer};
    use crate::io::RegionMut;
    use crate::io::write::Error;
    use assert_matches::assert_matches;

    #[test]
    fn unaligned_stores() {
        let mut output = [0u8; 13];
        let mut writer = RegionWriter::new(RegionMut::new(&mut output).unwrap());
        writer.write_varint32(1).unwrap();
        writer.write_bit32(0x0403_0201).unwrap();
        writer.write_bit64(0x0C0B_0A09_0807_0605).unwrap();
        assert_matches!(writer.write_bytes(&[0]), Err(Error::BufferUnderflow));
        writer.finish().unwrap();
        assert_eq!(output, [1, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }
}
