//! The raw region backend. Fixed width values and varint words are loaded straight out of the
//! region with unaligned little endian loads.

use super::internal::{Reader, Split};
use super::{Error, Result};
use crate::io::{Backend, Region};
use crate::varint;

pub struct RegionReader<'a> {
    region: Region<'a>,
    offset: usize,
    limit: usize,
}

impl<'a> RegionReader<'a> {
    pub fn new(region: Region<'a>) -> Self {
        Self { limit: region.len(), region, offset: 0 }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.limit - self.offset
    }

    #[inline]
    fn slice(&self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::TruncatedMessage);
        }
        self.region.slice(self.offset, len).ok_or(Error::TruncatedMessage)
    }

    #[inline]
    fn load_u64(&self, offset: usize) -> Result<u64> {
        self.region.load_u64_le(offset).ok_or(Error::TruncatedMessage)
    }
}

impl<'a> Reader for RegionReader<'a> {
    type Limit = usize;

    #[inline]
    fn preference(&self) -> Backend {
        Backend::Region
    }

    #[inline]
    fn is_at_end(&mut self) -> Result<bool> {
        Ok(self.offset >= self.limit)
    }

    fn read_varint32(&mut self) -> Result<u32> {
        if self.remaining() >= 8 {
            if let Some((value, len)) = varint::decode_word(self.load_u64(self.offset)?) {
                self.offset += len;
                return Ok(value as u32);
            }
        }
        self.read_varint64().map(|value| value as u32)
    }

    fn read_varint64(&mut self) -> Result<u64> {
        let (value, len) = if self.remaining() >= varint::FAST_PATH_LEN {
            let lo = self.load_u64(self.offset)?;
            let hi = self.load_u64(self.offset + 8)?;
            varint::decode_words(lo, hi)?
        } else {
            varint::decode_reference(self.slice(self.remaining())?)?
        };
        self.offset += len;
        Ok(value)
    }

    fn read_bit32(&mut self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(Error::TruncatedMessage);
        }
        let value = self.region.load_u32_le(self.offset).ok_or(Error::TruncatedMessage)?;
        self.offset += 4;
        Ok(value)
    }

    fn read_bit64(&mut self) -> Result<u64> {
        if self.remaining() < 8 {
            return Err(Error::TruncatedMessage);
        }
        let value = self.load_u64(self.offset)?;
        self.offset += 8;
        Ok(value)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        buf.copy_from_slice(self.slice(buf.len())?);
        self.offset += buf.len();
        Ok(())
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        if len > self.remaining() {
            return Err(Error::TruncatedMessage);
        }
        self.offset += len;
        Ok(())
    }

    fn with_bytes<T, F: FnOnce(&[u8]) -> Result<T>>(&mut self, len: usize, f: F) -> Result<T> {
        let bytes = self.slice(len)?;
        self.offset += len;
        f(bytes)
    }

    fn push_limit(&mut self, len: usize) -> Result<usize> {
        if len > self.remaining() {
            return Err(Error::TruncatedMessage);
        }
        let old = self.limit;
        self.limit = self.offset + len;
        Ok(old)
    }

    fn pop_limit(&mut self, old: usize) -> Result<()> {
        self.offset = self.limit;
        self.limit = old;
        Ok(())
    }
}

impl<'a> Split for RegionReader<'a> {
    type Bytes = &'a [u8];

    fn split(&mut self, len: usize) -> Result<Self> {
        if len > self.remaining() {
            return Err(Error::TruncatedMessage);
        }
        let sub = Self { region: self.region, offset: self.offset, limit: self.offset + len };
        self.offset += len;
        Ok(sub)
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.slice(len)?;
        self.offset += len;
        Ok(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::{Reader, RegionReader};
    use crate::io::Region;
    use crate::io::read::Error;
    use assert_matches::assert_matches;

    #[test]
    fn limited_word_loads() {
        // a varint that continues past the limit must not be read through the word path
        let mut bytes = vec![0x01, 0x80, 0x80, 0x01];
        bytes.extend_from_slice(&[0; 16]);
        let mut reader = RegionReader::new(Region::new(&bytes));
        assert_eq!(reader.read_varint64().unwrap(), 1);
        let old = reader.push_limit(2).unwrap();
        assert_matches!(reader.read_varint64(), Err(Error::TruncatedMessage));
        assert_matches!(reader.read_bit32(), Err(Error::TruncatedMessage));
        reader.pop_limit(old).unwrap();
        assert_eq!(reader.read_varint32().unwrap(), 0x01);
    }
}
