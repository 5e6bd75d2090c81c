//! The array and view backends. Both are a position and a limit over a contiguous byte slice;
//! they differ only in how the storage is held and shared.

use super::internal::{Reader, Split};
use super::{Error, Result};
use crate::bits;
use crate::io::Backend;
use crate::varint;
use std::fmt::{self, Debug, Formatter};
use std::ops::{Deref, Range};
use std::sync::Arc;

/// Contiguous storage a [`SliceReader`](struct.SliceReader.html) reads from
pub trait Storage: AsRef<[u8]> {
    /// The zero-copy byte type handed out by `take_bytes`
    type Bytes;
    const PREFERENCE: Backend;

    fn share(&self) -> Self;
    fn bytes(&self, range: Range<usize>) -> Self::Bytes;
}

impl Storage for Arc<[u8]> {
    type Bytes = ArraySlice;
    const PREFERENCE: Backend = Backend::Array;

    fn share(&self) -> Self {
        Arc::clone(self)
    }
    fn bytes(&self, range: Range<usize>) -> ArraySlice {
        ArraySlice { data: Arc::clone(self), start: range.start, end: range.end }
    }
}

impl<'a> Storage for &'a [u8] {
    type Bytes = &'a [u8];
    const PREFERENCE: Backend = Backend::View;

    fn share(&self) -> Self {
        *self
    }
    fn bytes(&self, range: Range<usize>) -> &'a [u8] {
        let data: &'a [u8] = *self;
        &data[range]
    }
}

/// A range of a shared array returned by array readers without copying
#[derive(Clone)]
pub struct ArraySlice {
    data: Arc<[u8]>,
    start: usize,
    end: usize,
}

impl ArraySlice {
    /// Copies the bytes into a new vector
    pub fn to_vec(&self) -> Vec<u8> {
        self.deref().to_vec()
    }
}

impl Deref for ArraySlice {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }
}

impl AsRef<[u8]> for ArraySlice {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl Debug for ArraySlice {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for ArraySlice {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for ArraySlice { }

pub struct SliceReader<S> {
    data: S,
    pos: usize,
    limit: usize,
}

impl<S: Storage> SliceReader<S> {
    pub fn new(data: S) -> Self {
        let limit = data.as_ref().len();
        Self { data, pos: 0, limit }
    }

    pub fn with_range(data: S, offset: usize, len: usize) -> Option<Self> {
        let limit = offset.checked_add(len)?;
        if limit > data.as_ref().len() {
            return None;
        }
        Some(Self { data, pos: offset, limit })
    }

    #[inline]
    fn remaining(&self) -> &[u8] {
        &self.data.as_ref()[self.pos..self.limit]
    }

    #[inline]
    fn take(&mut self, len: usize) -> Result<Range<usize>> {
        if len > self.limit - self.pos {
            return Err(Error::TruncatedMessage);
        }
        let start = self.pos;
        self.pos += len;
        Ok(start..self.pos)
    }
}

impl<S: Storage> Reader for SliceReader<S> {
    type Limit = usize;

    #[inline]
    fn preference(&self) -> Backend {
        S::PREFERENCE
    }

    #[inline]
    fn is_at_end(&mut self) -> Result<bool> {
        Ok(self.pos >= self.limit)
    }

    #[inline]
    fn read_varint32(&mut self) -> Result<u32> {
        let (value, len) = varint::decode32(self.remaining())?;
        self.pos += len;
        Ok(value)
    }

    #[inline]
    fn read_varint64(&mut self) -> Result<u64> {
        let (value, len) = varint::decode64(self.remaining())?;
        self.pos += len;
        Ok(value)
    }

    #[inline]
    fn read_bit32(&mut self) -> Result<u32> {
        let range = self.take(4)?;
        Ok(bits::load_u32_le(&self.data.as_ref()[range]))
    }

    #[inline]
    fn read_bit64(&mut self) -> Result<u64> {
        let range = self.take(8)?;
        Ok(bits::load_u64_le(&self.data.as_ref()[range]))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let range = self.take(buf.len())?;
        buf.copy_from_slice(&self.data.as_ref()[range]);
        Ok(())
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(drop)
    }

    fn with_bytes<T, F: FnOnce(&[u8]) -> Result<T>>(&mut self, len: usize, f: F) -> Result<T> {
        let range = self.take(len)?;
        f(&self.data.as_ref()[range])
    }

    fn push_limit(&mut self, len: usize) -> Result<usize> {
        if len > self.limit - self.pos {
            return Err(Error::TruncatedMessage);
        }
        let old = self.limit;
        self.limit = self.pos + len;
        Ok(old)
    }

    fn pop_limit(&mut self, old: usize) -> Result<()> {
        self.pos = self.limit;
        self.limit = old;
        Ok(())
    }
}

impl<S: Storage> Split for SliceReader<S> {
    type Bytes = S::Bytes;

    fn split(&mut self, len: usize) -> Result<Self> {
        let range = self.take(len)?;
        Ok(Self { data: self.data.share(), pos: range.start, limit: range.end })
    }

    fn take_bytes(&mut self, len: usize) -> Result<S::Bytes> {
        let range = self.take(len)?;
        Ok(self.data.bytes(range))
    }
}

#[cfg(test)]
mod test {
    use super::{Reader, SliceReader, Split};
    use crate::io::read::Error;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    #[test]
    fn limits() {
        let bytes = [1u8, 2, 3, 4, 5, 6];
        let mut reader = SliceReader::new(&bytes[..]);
        reader.skip(1).unwrap();

        let old = reader.push_limit(3).unwrap();
        assert_matches!(reader.push_limit(4), Err(Error::TruncatedMessage));
        assert_matches!(reader.skip(4), Err(Error::TruncatedMessage));
        reader.skip(1).unwrap();
        reader.pop_limit(old).unwrap();

        let mut rest = [0u8; 2];
        reader.read_exact(&mut rest).unwrap();
        assert_eq!(rest, [5, 6]);
        assert!(reader.is_at_end().unwrap());
    }
    #[test]
    fn shared_array_bytes() {
        let data: Arc<[u8]> = Arc::from(&[1u8, 2, 3, 4][..]);
        let mut reader = SliceReader::new(Arc::clone(&data));
        reader.skip(1).unwrap();
        let bytes = reader.take_bytes(2).unwrap();
        assert_eq!(&*bytes, &[2, 3]);
        assert_eq!(bytes.to_vec(), vec![2, 3]);
        assert_eq!(Arc::strong_count(&data), 3);
        drop(reader);
        assert_eq!(Arc::strong_count(&data), 2);
    }
}
