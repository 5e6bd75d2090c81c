//! The stream backend. Bytes are pulled from the source into a read-ahead buffer; message
//! bounds are tracked as absolute byte counts since nothing before the buffer can be revisited.

use super::internal::Reader;
use super::{Error, ReaderOptions, Result};
use crate::bits;
use crate::io::Backend;
use crate::varint;
use log::{debug, trace};
use std::io::{self, ErrorKind, Read};

pub struct StreamReader<R> {
    source: R,
    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
    consumed: u64,
    limit: Option<u64>,
    auto_close: bool,
}

impl<R: Read> StreamReader<R> {
    pub fn new(source: R, options: &ReaderOptions) -> Self {
        debug!("opening stream reader with a {} byte read-ahead buffer", options.buffer_capacity());
        Self {
            source,
            buf: vec![0; options.buffer_capacity()].into_boxed_slice(),
            pos: 0,
            filled: 0,
            consumed: 0,
            limit: None,
            auto_close: options.auto_close(),
        }
    }

    pub fn close(self) -> Option<R> {
        debug!("closing stream reader after {} bytes", self.consumed);
        if self.auto_close {
            None
        } else {
            Some(self.source)
        }
    }

    #[inline]
    fn buffered(&self) -> usize {
        self.filled - self.pos
    }

    /// The number of bytes left before the current limit, or `u64::MAX` if there is none
    #[inline]
    fn remaining(&self) -> u64 {
        self.limit.map_or(u64::MAX, |limit| limit - self.consumed)
    }

    /// The buffered bytes that are inside the current limit
    #[inline]
    fn available(&self) -> &[u8] {
        let len = self.remaining().min(self.buffered() as u64) as usize;
        &self.buf[self.pos..self.pos + len]
    }

    #[inline]
    fn advance(&mut self, len: usize) {
        self.pos += len;
        self.consumed += len as u64;
    }

    #[inline]
    fn check_remaining(&self, len: usize) -> Result<()> {
        if len as u64 > self.remaining() {
            Err(Error::TruncatedMessage)
        } else {
            Ok(())
        }
    }

    /// Tries to buffer at least `want` bytes, stopping early at the end of the source.
    fn fill(&mut self, want: usize) -> Result<()> {
        if self.buffered() >= want {
            return Ok(());
        }
        if self.pos != 0 {
            self.buf.copy_within(self.pos..self.filled, 0);
            self.filled -= self.pos;
            self.pos = 0;
        }
        while self.filled < want {
            match self.source.read(&mut self.buf[self.filled..]) {
                Ok(0) => break,
                Ok(n) => self.filled += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => { },
                Err(e) => return Err(Error::Io(e)),
            }
        }
        trace!("refilled stream buffer, {} bytes buffered", self.filled);
        Ok(())
    }

    /// Pulls one chunk at a time from the source until the available bytes hold a terminal
    /// byte or a full length varint, or nothing more can be read before the limit.
    fn fill_varint(&mut self) -> Result<()> {
        loop {
            let available = self.available();
            if available.len() >= varint::MAX_VARINT_LEN
                || available.iter().any(|&b| b < 0x80)
                || available.len() as u64 == self.remaining()
            {
                return Ok(());
            }
            let buffered = self.buffered();
            self.fill(buffered + 1)?;
            if self.buffered() == buffered {
                return Ok(());
            }
        }
    }

    /// Reads `len` bytes that aren't buffered straight from the source
    fn read_unbuffered(&mut self, out: &mut Vec<u8>, len: usize) -> Result<()> {
        let read = (&mut self.source).take(len as u64).read_to_end(out)?;
        self.consumed += read as u64;
        if read < len {
            return Err(Error::TruncatedMessage);
        }
        Ok(())
    }
}

fn map_eof(e: io::Error) -> Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        Error::TruncatedMessage
    } else {
        Error::Io(e)
    }
}

impl<R: Read> Reader for StreamReader<R> {
    type Limit = Option<u64>;

    #[inline]
    fn preference(&self) -> Backend {
        Backend::Array
    }

    fn is_at_end(&mut self) -> Result<bool> {
        if self.remaining() == 0 {
            return Ok(true);
        }
        self.fill(1)?;
        Ok(self.buffered() == 0)
    }

    fn read_varint32(&mut self) -> Result<u32> {
        self.read_varint64().map(|value| value as u32)
    }

    fn read_varint64(&mut self) -> Result<u64> {
        if self.available().len() < varint::FAST_PATH_LEN {
            self.fill_varint()?;
        }
        let (value, len) = varint::decode64(self.available())?;
        self.advance(len);
        Ok(value)
    }

    fn read_bit32(&mut self) -> Result<u32> {
        self.check_remaining(4)?;
        self.fill(4)?;
        if self.buffered() < 4 {
            return Err(Error::TruncatedMessage);
        }
        let value = bits::load_u32_le(&self.buf[self.pos..]);
        self.advance(4);
        Ok(value)
    }

    fn read_bit64(&mut self) -> Result<u64> {
        self.check_remaining(8)?;
        self.fill(8)?;
        if self.buffered() < 8 {
            return Err(Error::TruncatedMessage);
        }
        let value = bits::load_u64_le(&self.buf[self.pos..]);
        self.advance(8);
        Ok(value)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.check_remaining(buf.len())?;
        let from_buffer = buf.len().min(self.buffered());
        buf[..from_buffer].copy_from_slice(&self.buf[self.pos..self.pos + from_buffer]);
        self.advance(from_buffer);

        let rest = &mut buf[from_buffer..];
        if !rest.is_empty() {
            self.source.read_exact(rest).map_err(map_eof)?;
            self.consumed += rest.len() as u64;
        }
        Ok(())
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.check_remaining(len)?;
        let from_buffer = len.min(self.buffered());
        self.advance(from_buffer);

        let rest = (len - from_buffer) as u64;
        if rest != 0 {
            let skipped = io::copy(&mut (&mut self.source).take(rest), &mut io::sink())?;
            self.consumed += skipped;
            if skipped < rest {
                return Err(Error::TruncatedMessage);
            }
        }
        Ok(())
    }

    fn with_bytes<T, F: FnOnce(&[u8]) -> Result<T>>(&mut self, len: usize, f: F) -> Result<T> {
        self.check_remaining(len)?;
        if len <= self.buf.len() {
            self.fill(len)?;
            if self.buffered() < len {
                return Err(Error::TruncatedMessage);
            }
            let result = f(&self.buf[self.pos..self.pos + len]);
            self.advance(len);
            return result;
        }

        // too large for the buffer, so collect the buffered part and the rest of the value
        // without allocating more than the source actually produces
        let from_buffer = self.buffered();
        let mut bytes = Vec::with_capacity(self.buf.len() * 2);
        bytes.extend_from_slice(&self.buf[self.pos..self.filled]);
        self.advance(from_buffer);
        self.read_unbuffered(&mut bytes, len - from_buffer)?;
        f(&bytes)
    }

    fn push_limit(&mut self, len: usize) -> Result<Option<u64>> {
        self.check_remaining(len)?;
        let old = self.limit;
        self.limit = Some(self.consumed + len as u64);
        Ok(old)
    }

    fn pop_limit(&mut self, old: Option<u64>) -> Result<()> {
        if let Some(limit) = self.limit {
            self.skip((limit - self.consumed) as usize)?;
        }
        self.limit = old;
        Ok(())
    }
}
