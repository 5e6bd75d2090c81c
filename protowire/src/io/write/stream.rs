//! The stream backend. Values are encoded into a write-behind buffer which is handed to the sink
//! whenever the next value wouldn't fit.

use super::internal::Writer;
use super::{Result, WriterOptions};
use crate::io::Backend;
use crate::varint;
use log::{debug, trace, warn};
use std::io::Write;

pub struct StreamWriter<W: Write> {
    sink: Option<W>,
    buf: Vec<u8>,
    capacity: usize,
    written: u64,
    auto_close: bool,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(sink: W, options: &WriterOptions) -> Self {
        debug!("opening stream writer with a {} byte write-behind buffer", options.buffer_capacity());
        Self {
            sink: Some(sink),
            buf: Vec::with_capacity(options.buffer_capacity()),
            capacity: options.buffer_capacity(),
            written: 0,
            auto_close: options.auto_close(),
        }
    }

    pub fn flush(&mut self) -> Result {
        if self.buf.is_empty() {
            return Ok(());
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.write_all(&self.buf)?;
            trace!("flushed {} bytes to the sink", self.buf.len());
            self.written += self.buf.len() as u64;
            self.buf.clear();
        }
        Ok(())
    }

    /// Makes room for `len` more bytes in the buffer, returning false if they should bypass it
    #[inline]
    fn make_room(&mut self, len: usize) -> Result<bool> {
        if self.buf.len() + len > self.capacity {
            self.flush()?;
        }
        Ok(len <= self.capacity)
    }

    fn write_through(&mut self, value: &[u8]) -> Result {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_all(value)?;
            self.written += value.len() as u64;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<Option<W>> {
        self.flush()?;
        let mut sink = match self.sink.take() {
            Some(sink) => sink,
            None => return Ok(None),
        };
        sink.flush()?;
        debug!("closing stream writer after {} bytes", self.written);
        if self.auto_close {
            Ok(None)
        } else {
            Ok(Some(sink))
        }
    }
}

impl<W: Write> Writer for StreamWriter<W> {
    #[inline]
    fn preference(&self) -> Backend {
        Backend::Array
    }

    #[inline]
    fn position(&self) -> u64 {
        self.written + self.buf.len() as u64
    }

    #[inline]
    fn write_varint32(&mut self, value: u32) -> Result {
        self.write_varint64(value as u64)
    }

    fn write_varint64(&mut self, value: u64) -> Result {
        let (buf, len) = varint::encode_to_array(value);
        self.write_bytes(&buf[..len])
    }

    #[inline]
    fn write_bit32(&mut self, value: u32) -> Result {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    fn write_bit64(&mut self, value: u64) -> Result {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_bytes(&mut self, value: &[u8]) -> Result {
        if self.make_room(value.len())? {
            self.buf.extend_from_slice(value);
            Ok(())
        } else {
            self.write_through(value)
        }
    }
}

impl<W: Write> Drop for StreamWriter<W> {
    fn drop(&mut self) {
        if self.sink.is_some() && !self.buf.is_empty() {
            if let Err(e) = self.flush() {
                warn!("dropped stream writer could not flush {} bytes: {}", self.buf.len(), e);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{StreamWriter, Writer};
    use crate::io::write::{Builder, Error};
    use assert_matches::assert_matches;
    use std::io::{self, ErrorKind, Write};

    /// A sink that records every write it's given
    #[derive(Default)]
    struct Recorder {
        writes: Vec<Vec<u8>>,
    }

    impl Write for &mut Recorder {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes.push(buf.to_vec());
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::Other, "broken"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn buffered_writes() {
        let mut recorder = Recorder::default();
        let options = Builder::new().buffer_capacity(4).options;
        let mut writer = StreamWriter::new(&mut recorder, &options);
        writer.write_bit32(1).unwrap();
        writer.write_varint32(300).unwrap();
        writer.write_bytes(&[9; 6]).unwrap();
        assert_eq!(writer.position(), 12);
        assert!(writer.finish().unwrap().is_none());
        assert_eq!(recorder.writes, vec![vec![1, 0, 0, 0], vec![0xAC, 0x02], vec![9; 6]]);
    }
    #[test]
    fn flush_on_drop() {
        let mut recorder = Recorder::default();
        {
            let mut writer = StreamWriter::new(&mut recorder, &Builder::new().options);
            writer.write_varint64(1).unwrap();
        }
        assert_eq!(recorder.writes, vec![vec![1]]);
    }
    #[test]
    fn sink_errors() {
        let mut writer = StreamWriter::new(Broken, &Builder::new().buffer_capacity(0).options);
        assert_matches!(writer.write_bit64(1), Err(Error::Io(_)));
    }
}
