//! Defines the `CodedWriter`, a writer for writing protobuf encoded values to outputs.
//!
//! Writers don't validate what they're given beyond group framing: callers that write to fixed
//! capacity outputs size them up front with [`size`](../../size/index.html) or
//! [`LengthBuilder`](../struct.LengthBuilder.html) and `finish` checks the output was filled exactly.

mod region;
mod slice;
mod stream;

use crate::internal::Sealed;
use crate::io::{Backend, FieldNumber, Length, RegionMut, Tag, WireType, DEFAULT_BUF_SIZE};
use crate::raw::{Packable, Value};
use log::debug;
use std::io::Write;
use std::marker::PhantomData;
use thiserror::Error;

mod internal {
    use super::Result;
    use crate::io::Backend;

    /// The primitive operations a writer backend provides. Framing lives in `CodedWriter`.
    pub trait Writer {
        fn preference(&self) -> Backend;
        /// The number of bytes written so far
        fn position(&self) -> u64;
        fn write_varint32(&mut self, value: u32) -> Result;
        fn write_varint64(&mut self, value: u64) -> Result;
        fn write_bit32(&mut self, value: u32) -> Result;
        fn write_bit64(&mut self, value: u64) -> Result;
        fn write_bytes(&mut self, value: &[u8]) -> Result;
    }
}

use internal::Writer;

/// The error type for [`CodedWriter`](struct.CodedWriter.html)
#[derive(Error, Debug)]
pub enum Error {
    /// The output doesn't have room for the value
    #[error("the output doesn't have enough space left for the value")]
    BufferUnderflow,
    /// A fixed capacity output wasn't filled exactly, a message body didn't match its length,
    /// or a region was larger than `i32::MAX` bytes
    #[error("expected {expected} bytes but got {actual}")]
    SizeMismatch {
        /// The expected number of bytes
        expected: usize,
        /// The actual number of bytes
        actual: usize,
    },
    /// An end group tag was written outside of any group
    #[error("an end group tag was written outside of a group")]
    MalformedGroup,
    /// An end group tag didn't match the innermost open group
    #[error("an end group tag for field {found} didn't match the open group {expected}")]
    InvalidEndObject {
        /// The field number of the open group
        expected: FieldNumber,
        /// The field number of the end group tag
        found: FieldNumber,
    },
    /// The writer was finished while a group was still open
    #[error("the writer was finished with {0} open groups")]
    InvalidStartObject(usize),
    /// A value was too large to have its length written to an output
    #[error("the value was too large to write to the output")]
    ValueTooLarge,
    /// The stream failed while writing
    #[error("an error occured while writing to the output")]
    Io(#[from] std::io::Error),
}

/// A result for a [`CodedWriter`](struct.CodedWriter.html) write operation
pub type Result<T = ()> = std::result::Result<T, Error>;

/// Options used by a [`CodedWriter`](struct.CodedWriter.html)
#[derive(Clone, Debug)]
pub struct WriterOptions {
    buffer_capacity: usize,
    auto_close: bool,
}

impl WriterOptions {
    /// The size of a stream writer's buffer
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }
    /// Whether a stream writer drops its sink when it's finished
    pub fn auto_close(&self) -> bool {
        self.auto_close
    }
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUF_SIZE,
            auto_close: true,
        }
    }
}

/// A builder used to construct [`CodedWriter`](struct.CodedWriter.html) instances
#[derive(Clone, Debug, Default)]
pub struct Builder {
    options: WriterOptions,
}

impl Builder {
    /// Creates a new builder with the default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size of a stream writer's buffer. The default is 8 KiB; zero writes every value straight through.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.buffer_capacity = capacity;
        self
    }

    /// Sets whether a stream writer drops its sink when it's finished. The default is true.
    pub fn auto_close(mut self, auto_close: bool) -> Self {
        self.options.auto_close = auto_close;
        self
    }

    /// Constructs a writer over a new zeroed array of `len` bytes
    pub fn with_array(self, len: usize) -> CodedWriter<Array> {
        self.with_vec(vec![0; len])
    }

    /// Constructs a writer that fills an existing vector's current contents, `vec.len()` bytes
    pub fn with_vec(self, vec: Vec<u8>) -> CodedWriter<Array> {
        self.build(slice::SliceWriter::new(vec.into_boxed_slice()))
    }

    /// Constructs a writer over a borrowed slice
    pub fn with_view<'a>(self, data: &'a mut [u8]) -> CodedWriter<View<'a>> {
        self.build(slice::SliceWriter::new(data))
    }

    /// Constructs a writer over a raw memory region
    pub fn with_region<'a>(self, region: RegionMut<'a>) -> CodedWriter<RawRegion<'a>> {
        self.build(region::RegionWriter::new(region))
    }

    /// Constructs a writer over a byte stream
    pub fn with_stream<W: Write>(self, sink: W) -> CodedWriter<Stream<W>> {
        let inner = stream::StreamWriter::new(sink, &self.options);
        self.build(inner)
    }

    fn build<T: Output>(self, inner: T::Writer) -> CodedWriter<T> {
        CodedWriter { inner, groups: Vec::new() }
    }
}

/// A type of output that can be used to create a writer
pub trait Output: Sealed {
    /// The backend that writes to this output
    type Writer: internal::Writer;
}

/// An owned, fixed size array output
pub struct Array(());
impl Sealed for Array { }
impl Output for Array {
    type Writer = slice::SliceWriter<Box<[u8]>>;
}

/// A borrowed, fixed size slice output
pub struct View<'a>(PhantomData<&'a mut [u8]>);
impl Sealed for View<'_> { }
impl<'a> Output for View<'a> {
    type Writer = slice::SliceWriter<&'a mut [u8]>;
}

/// A raw memory region output
pub struct RawRegion<'a>(PhantomData<RegionMut<'a>>);
impl Sealed for RawRegion<'_> { }
impl<'a> Output for RawRegion<'a> {
    type Writer = region::RegionWriter<'a>;
}

/// A byte stream output
pub struct Stream<W>(PhantomData<W>);
impl<W> Sealed for Stream<W> { }
impl<W: Write> Output for Stream<W> {
    type Writer = stream::StreamWriter<W>;
}

/// A protobuf coded output writer that writes to the specified output.
pub struct CodedWriter<T: Output> {
    inner: T::Writer,
    groups: Vec<FieldNumber>,
}

impl CodedWriter<Array> {
    /// Creates a new [`CodedWriter`](struct.CodedWriter.html) over a new zeroed array of `len` bytes
    #[inline]
    pub fn with_array(len: usize) -> Self {
        Builder::new().with_array(len)
    }

    /// Creates a new [`CodedWriter`](struct.CodedWriter.html) that fills an existing vector's current contents
    #[inline]
    pub fn with_vec(vec: Vec<u8>) -> Self {
        Builder::new().with_vec(vec)
    }

    /// Finishes writing, returning the array if it was filled exactly
    pub fn finish(self) -> Result<Box<[u8]>> {
        self.check_closed()?;
        self.inner.finish()
    }
}

impl<'a> CodedWriter<View<'a>> {
    /// Creates a new [`CodedWriter`](struct.CodedWriter.html) over a borrowed slice
    #[inline]
    pub fn with_view(data: &'a mut [u8]) -> Self {
        Builder::new().with_view(data)
    }

    /// Finishes writing, checking the slice was filled exactly
    pub fn finish(self) -> Result {
        self.check_closed()?;
        self.inner.finish().map(drop)
    }
}

impl<'a> CodedWriter<RawRegion<'a>> {
    /// Creates a new [`CodedWriter`](struct.CodedWriter.html) over a raw memory region
    #[inline]
    pub fn with_region(region: RegionMut<'a>) -> Self {
        Builder::new().with_region(region)
    }

    /// Finishes writing, checking the region was filled exactly
    pub fn finish(self) -> Result {
        self.check_closed()?;
        self.inner.finish()
    }
}

impl<W: Write> CodedWriter<Stream<W>> {
    /// Creates a new [`CodedWriter`](struct.CodedWriter.html) over a byte stream
    #[inline]
    pub fn with_stream(sink: W) -> Self {
        Builder::new().with_stream(sink)
    }

    /// Flushes the buffered bytes to the sink without finishing
    pub fn flush(&mut self) -> Result {
        self.inner.flush()
    }

    /// Finishes writing and flushes the sink. The sink is dropped if the writer was built with
    /// `auto_close`, otherwise it's returned to the caller.
    pub fn finish(self) -> Result<Option<W>> {
        self.check_closed()?;
        self.inner.finish()
    }
}

impl<T: Output> CodedWriter<T> {
    /// Gets the storage this writer prefers for length delimited values
    #[inline]
    pub fn preference(&self) -> Backend {
        self.inner.preference()
    }

    /// The number of bytes written so far
    #[inline]
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    fn check_closed(&self) -> Result {
        if self.groups.is_empty() {
            Ok(())
        } else {
            debug!("finishing writer with {} open groups", self.groups.len());
            Err(Error::InvalidStartObject(self.groups.len()))
        }
    }

    /// Writes a raw varint
    #[inline]
    pub fn write_varint32(&mut self, value: u32) -> Result {
        self.inner.write_varint32(value)
    }
    /// Writes a raw varint
    #[inline]
    pub fn write_varint64(&mut self, value: u64) -> Result {
        self.inner.write_varint64(value)
    }
    /// Writes 4 raw little endian bytes
    #[inline]
    pub fn write_bit32(&mut self, value: u32) -> Result {
        self.inner.write_bit32(value)
    }
    /// Writes 8 raw little endian bytes
    #[inline]
    pub fn write_bit64(&mut self, value: u64) -> Result {
        self.inner.write_bit64(value)
    }
    /// Writes raw bytes with no length prefix
    #[inline]
    pub fn write_bytes(&mut self, value: &[u8]) -> Result {
        self.inner.write_bytes(value)
    }

    /// Writes a length prefix
    #[inline]
    pub fn write_length(&mut self, length: Length) -> Result {
        self.write_varint32(length.get() as u32)
    }
    /// Writes a tag
    #[inline]
    pub fn write_tag(&mut self, tag: Tag) -> Result {
        self.write_varint32(tag.get())
    }
    /// Writes the tag for a field
    #[inline]
    pub fn write_field_tag(&mut self, num: FieldNumber, wire_type: WireType) -> Result {
        self.write_tag(Tag::new(num, wire_type))
    }
    /// Writes a length prefix followed by the bytes
    pub fn write_length_delimited(&mut self, value: &[u8]) -> Result {
        let len = Length::from_usize(value.len()).ok_or(Error::ValueTooLarge)?;
        self.write_length(len)?;
        self.write_bytes(value)
    }

    /// Writes a value with no tag
    #[inline]
    pub fn write_value<V: Value>(&mut self, value: &V::Inner) -> Result {
        V::wrap_ref(value).write_to(self)
    }

    /// Writes a field's tag and value
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::{CodedWriter, FieldNumber};
    /// use protowire::raw::Int32;
    ///
    /// let mut output = [0u8; 3];
    /// let mut writer = CodedWriter::with_view(&mut output);
    /// writer.write_field::<Int32>(FieldNumber::new(1).unwrap(), &300).unwrap();
    /// writer.finish().unwrap();
    /// assert_eq!(output, [0x08, 0xAC, 0x02]);
    /// ```
    #[inline]
    pub fn write_field<V: Value>(&mut self, num: FieldNumber, value: &V::Inner) -> Result {
        self.write_field_tag(num, V::WIRE_TYPE)?;
        self.write_value::<V>(value)
    }

    /// Writes the values as a packed field. An empty slice writes nothing.
    pub fn write_packed<V: Packable>(&mut self, num: FieldNumber, values: &[V::Inner]) -> Result {
        if values.is_empty() {
            return Ok(());
        }
        let len = crate::io::packed_body_len::<V>(values).ok_or(Error::ValueTooLarge)?;
        self.write_field_tag(num, WireType::LengthDelimited)?;
        self.write_length(len)?;
        for value in values {
            self.write_value::<V>(value)?;
        }
        Ok(())
    }

    /// Writes an embedded message field. `f` writes the body, which must be exactly `length` bytes.
    pub fn write_message<F: FnOnce(&mut Self) -> Result>(&mut self, num: FieldNumber, length: Length, f: F) -> Result {
        self.write_field_tag(num, WireType::LengthDelimited)?;
        self.write_length(length)?;
        let start = self.position();
        f(self)?;
        let actual = (self.position() - start) as usize;
        if actual != length.as_usize() {
            return Err(Error::SizeMismatch { expected: length.as_usize(), actual });
        }
        Ok(())
    }

    /// Writes a group field. `f` writes the group's fields between the start and end tags.
    pub fn write_group<F: FnOnce(&mut Self) -> Result>(&mut self, num: FieldNumber, f: F) -> Result {
        self.start_group(num)?;
        f(self)?;
        self.end_group(num)
    }

    /// Writes a start group tag and opens the group
    pub fn start_group(&mut self, num: FieldNumber) -> Result {
        self.write_field_tag(num, WireType::StartGroup)?;
        self.groups.push(num);
        Ok(())
    }

    /// Writes an end group tag, closing the innermost open group
    pub fn end_group(&mut self, num: FieldNumber) -> Result {
        match self.groups.last() {
            None => return Err(Error::MalformedGroup),
            Some(&expected) if expected != num => return Err(Error::InvalidEndObject { expected, found: num }),
            Some(_) => { },
        }
        self.groups.pop();
        self.write_field_tag(num, WireType::EndGroup)
    }
}
