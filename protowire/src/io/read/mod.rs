//! Defines the `CodedReader`, a reader for reading protobuf encoded values from inputs.
//!
//! A reader is a cursor with one piece of protocol state: the tag it has read but whose value
//! hasn't been consumed yet. [`read_tag`](struct.CodedReader.html#method.read_tag) and
//! [`next_field`](struct.CodedReader.html#method.next_field) are only valid while no tag is
//! pending, and every value operation is only valid while one is. Each value operation clears
//! the pending tag as its last step.

mod region;
mod slice;
mod stream;

pub use slice::ArraySlice;

use crate::internal::Sealed;
use crate::io::{Backend, ByteString, FieldNumber, Length, Region, Tag, WireType, DEFAULT_BUF_SIZE};
use crate::raw::{Packable, Value};
use crate::varint;
use std::convert::TryFrom;
use std::io::Read;
use std::marker::PhantomData;
use std::mem;
use std::string::FromUtf8Error;
use std::sync::Arc;
use thiserror::Error;

mod internal {
    use super::Result;
    use crate::io::Backend;

    /// The primitive operations a reader backend provides. Framing lives in `CodedReader`.
    pub trait Reader {
        /// A saved limit returned by `push_limit` and restored by `pop_limit`
        type Limit: Copy;

        fn preference(&self) -> Backend;
        fn is_at_end(&mut self) -> Result<bool>;
        fn read_varint32(&mut self) -> Result<u32>;
        fn read_varint64(&mut self) -> Result<u64>;
        fn read_bit32(&mut self) -> Result<u32>;
        fn read_bit64(&mut self) -> Result<u64>;
        fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;
        fn skip(&mut self, len: usize) -> Result<()>;
        /// Passes the next `len` bytes to `f` as one contiguous slice and advances past them
        fn with_bytes<T, F: FnOnce(&[u8]) -> Result<T>>(&mut self, len: usize, f: F) -> Result<T>;
        /// Bounds the reader to the next `len` bytes, returning the previous bound
        fn push_limit(&mut self, len: usize) -> Result<Self::Limit>;
        /// Advances to the current bound and restores the previous one
        fn pop_limit(&mut self, old: Self::Limit) -> Result<()>;
    }

    /// Backends that can hand out independent readers and byte views over their own storage.
    pub trait Split: Reader + Sized {
        type Bytes;

        fn split(&mut self, len: usize) -> Result<Self>;
        fn take_bytes(&mut self, len: usize) -> Result<Self::Bytes>;
    }
}

use internal::{Reader, Split};

/// The error type for [`CodedReader`](struct.CodedReader.html)
#[derive(Error, Debug)]
pub enum Error {
    /// The input ended (or the current message's bounds were reached) in the middle of a value
    #[error("the input ended in the middle of a field")]
    TruncatedMessage,
    /// A varint had no terminal byte in its first 10 bytes
    #[error("a varint was longer than 10 bytes")]
    MalformedVarInt,
    /// A length delimited value had a negative length
    #[error("a length delimited value had a negative length")]
    NegativeLength,
    /// A tag had the wire type 6 or 7, or a value was read with an operation for a different wire type
    #[error("unexpected wire type {found} (expected {expected:?})")]
    InvalidWireType {
        /// The wire type the operation accepts, if the tag's wire type was valid
        expected: Option<WireType>,
        /// The raw wire type found on the wire
        found: u8,
    },
    /// A tag had the field number 0
    #[error("a tag had the field number 0")]
    InvalidFieldIndex,
    /// An operation was called in the wrong tag state, such as reading a value with no pending tag
    #[error("the operation isn't valid in the reader's current tag state")]
    InvalidPropertyState,
    /// An end group tag was read outside of any group
    #[error("an end group tag was read outside of a group")]
    MalformedGroup,
    /// An end group tag didn't match the innermost open group
    #[error("an end group tag for field {found} didn't match the open group {expected}")]
    InvalidEndObject {
        /// The field number of the open group
        expected: FieldNumber,
        /// The field number of the end group tag
        found: FieldNumber,
    },
    /// Groups and messages were nested deeper than the reader's recursion limit
    #[error("the recursion limit was exceeded")]
    RecursionLimitExceeded,
    /// A string value wasn't valid UTF-8
    #[error("a string value wasn't valid UTF-8")]
    InvalidString(#[from] FromUtf8Error),
    /// The stream failed with an error other than reaching its end
    #[error("an error occured while reading from the input")]
    Io(#[from] std::io::Error),
}

impl From<varint::Error> for Error {
    fn from(e: varint::Error) -> Self {
        match e {
            varint::Error::Truncated => Error::TruncatedMessage,
            varint::Error::Malformed => Error::MalformedVarInt,
        }
    }
}

/// A result for a [`CodedReader`](struct.CodedReader.html) read operation
pub type Result<T> = std::result::Result<T, Error>;

const DEFAULT_RECURSION_LIMIT: u32 = 100;
const MIN_BUF_SIZE: usize = varint::FAST_PATH_LEN;

/// Options used by a [`CodedReader`](struct.CodedReader.html)
#[derive(Clone, Debug)]
pub struct ReaderOptions {
    recursion_limit: u32,
    buffer_capacity: usize,
    auto_close: bool,
}

impl ReaderOptions {
    /// The maximum depth of nested groups and messages
    pub fn recursion_limit(&self) -> u32 {
        self.recursion_limit
    }
    /// The size of a stream reader's read-ahead buffer
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }
    /// Whether a stream reader drops its source when it's closed
    pub fn auto_close(&self) -> bool {
        self.auto_close
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            buffer_capacity: DEFAULT_BUF_SIZE,
            auto_close: true,
        }
    }
}

/// A builder used to construct [`CodedReader`](struct.CodedReader.html) instances
#[derive(Clone, Debug, Default)]
pub struct Builder {
    options: ReaderOptions,
}

impl Builder {
    /// Creates a new builder with the default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum depth of nested groups and messages. The default is 100.
    pub fn recursion_limit(mut self, limit: u32) -> Self {
        self.options.recursion_limit = limit;
        self
    }

    /// Sets the size of a stream reader's read-ahead buffer. The default is 8 KiB and the
    /// smallest buffer is 16 bytes.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.buffer_capacity = capacity.max(MIN_BUF_SIZE);
        self
    }

    /// Sets whether a stream reader drops its source when it's closed. The default is true.
    pub fn auto_close(mut self, auto_close: bool) -> Self {
        self.options.auto_close = auto_close;
        self
    }

    /// Constructs a reader over an owned, shared array
    pub fn with_array(self, data: impl Into<Arc<[u8]>>) -> CodedReader<Array> {
        self.build(slice::SliceReader::new(data.into()))
    }

    /// Constructs a reader over `len` bytes of an owned, shared array starting at `offset`,
    /// failing with `TruncatedMessage` if the range isn't inside the array
    pub fn with_array_range(self, data: impl Into<Arc<[u8]>>, offset: usize, len: usize) -> Result<CodedReader<Array>> {
        let inner = slice::SliceReader::with_range(data.into(), offset, len).ok_or(Error::TruncatedMessage)?;
        Ok(self.build(inner))
    }

    /// Constructs a reader over a borrowed slice
    pub fn with_view<'a>(self, data: &'a [u8]) -> CodedReader<View<'a>> {
        self.build(slice::SliceReader::new(data))
    }

    /// Constructs a reader over a raw memory region
    pub fn with_region<'a>(self, region: Region<'a>) -> CodedReader<RawRegion<'a>> {
        self.build(region::RegionReader::new(region))
    }

    /// Constructs a reader over a byte stream
    pub fn with_stream<R: Read>(self, source: R) -> CodedReader<Stream<R>> {
        let inner = stream::StreamReader::new(source, &self.options);
        self.build(inner)
    }

    fn build<T: Input>(self, inner: T::Reader) -> CodedReader<T> {
        CodedReader {
            inner,
            pending: None,
            groups: Vec::new(),
            depth: 0,
            options: self.options,
        }
    }
}

/// A type of input that can be used to create a reader
pub trait Input: Sealed {
    /// The backend that reads from this input
    type Reader: internal::Reader;
}

/// An owned array input shared through an `Arc`
pub struct Array(());
impl Sealed for Array { }
impl Input for Array {
    type Reader = slice::SliceReader<Arc<[u8]>>;
}

/// A borrowed slice input
pub struct View<'a>(PhantomData<&'a [u8]>);
impl Sealed for View<'_> { }
impl<'a> Input for View<'a> {
    type Reader = slice::SliceReader<&'a [u8]>;
}

/// A raw memory region input
pub struct RawRegion<'a>(PhantomData<Region<'a>>);
impl Sealed for RawRegion<'_> { }
impl<'a> Input for RawRegion<'a> {
    type Reader = region::RegionReader<'a>;
}

/// A byte stream input
pub struct Stream<R>(PhantomData<R>);
impl<R> Sealed for Stream<R> { }
impl<R: Read> Input for Stream<R> {
    type Reader = stream::StreamReader<R>;
}

/// A protobuf coded input reader that reads from the specified input.
pub struct CodedReader<T: Input> {
    inner: T::Reader,
    pending: Option<Tag>,
    groups: Vec<FieldNumber>,
    depth: u32,
    options: ReaderOptions,
}

impl<T: Input> std::fmt::Debug for CodedReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodedReader")
            .field("pending", &self.pending)
            .field("groups", &self.groups)
            .field("depth", &self.depth)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl CodedReader<Array> {
    /// Creates a new [`CodedReader`](struct.CodedReader.html) with the default options over an owned array
    #[inline]
    pub fn with_array(data: impl Into<Arc<[u8]>>) -> Self {
        Builder::new().with_array(data)
    }

    /// Creates a new [`CodedReader`](struct.CodedReader.html) with the default options over a range of an owned array
    #[inline]
    pub fn with_array_range(data: impl Into<Arc<[u8]>>, offset: usize, len: usize) -> Result<Self> {
        Builder::new().with_array_range(data, offset, len)
    }
}

impl<'a> CodedReader<View<'a>> {
    /// Creates a new [`CodedReader`](struct.CodedReader.html) with the default options over a borrowed slice
    #[inline]
    pub fn with_view(data: &'a [u8]) -> Self {
        Builder::new().with_view(data)
    }
}

impl<'a> CodedReader<RawRegion<'a>> {
    /// Creates a new [`CodedReader`](struct.CodedReader.html) with the default options over a raw memory region
    #[inline]
    pub fn with_region(region: Region<'a>) -> Self {
        Builder::new().with_region(region)
    }
}

impl<R: Read> CodedReader<Stream<R>> {
    /// Creates a new [`CodedReader`](struct.CodedReader.html) with the default options over a byte stream
    #[inline]
    pub fn with_stream(source: R) -> Self {
        Builder::new().with_stream(source)
    }

    /// Closes the reader. The source is dropped if the reader was built with `auto_close`,
    /// otherwise it's returned to the caller.
    ///
    /// The reader reads ahead, so the source may have been read past the last consumed value.
    pub fn close(self) -> Option<R> {
        self.inner.close()
    }
}

impl<T: Input> CodedReader<T> {
    /// Gets the options this reader was built with
    #[inline]
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Gets the storage this reader prefers for length delimited values
    #[inline]
    pub fn preference(&self) -> Backend {
        self.inner.preference()
    }

    /// Gets the pending tag, if any
    #[inline]
    pub fn last_tag(&self) -> Option<Tag> {
        self.pending
    }

    /// Returns whether the input (or the current message) has no more bytes
    #[inline]
    pub fn is_at_end(&mut self) -> Result<bool> {
        self.inner.is_at_end()
    }

    /// Reads the next tag, returning `None` if the input or the current message is exhausted.
    ///
    /// An end group tag is checked against the innermost open group.
    pub fn read_tag(&mut self) -> Result<Option<Tag>> {
        if self.pending.is_some() {
            return Err(Error::InvalidPropertyState);
        }
        if self.inner.is_at_end()? {
            return Ok(None);
        }

        let raw = self.inner.read_varint32()?;
        let tag = self.check_tag(raw)?;
        self.pending = Some(tag);
        Ok(Some(tag))
    }

    fn check_tag(&self, raw: u32) -> Result<Tag> {
        let found = (raw & 0b111) as u8;
        let wire_type = WireType::try_from(found).map_err(|_| Error::InvalidWireType { expected: None, found })?;
        let field = FieldNumber::new(raw >> 3).ok_or(Error::InvalidFieldIndex)?;
        if wire_type == WireType::EndGroup {
            match self.groups.last() {
                None => return Err(Error::MalformedGroup),
                Some(&expected) if expected != field => return Err(Error::InvalidEndObject { expected, found: field }),
                Some(_) => { },
            }
        }
        Ok(Tag::new(field, wire_type))
    }

    /// Reads the next tag, returning whether a field was found.
    ///
    /// Returns false without reading anything if the input is exhausted, and false with the tag
    /// left pending if it's the end group tag of the current group.
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::CodedReader;
    /// use protowire::raw::Uint32;
    ///
    /// let mut reader = CodedReader::with_view(&[0x08, 0x96, 0x01]);
    /// let mut sum = 0;
    /// while reader.next_field().unwrap() {
    ///     sum += reader.read_value::<Uint32>().unwrap();
    /// }
    /// assert_eq!(sum, 150);
    /// ```
    pub fn next_field(&mut self) -> Result<bool> {
        match self.read_tag()? {
            Some(tag) => Ok(tag.wire_type() != WireType::EndGroup),
            None => Ok(false),
        }
    }

    /// Clears the pending tag. Every value operation calls this as its last step.
    #[inline]
    pub fn reset_tag(&mut self) -> Result<()> {
        self.pending.take().map(drop).ok_or(Error::InvalidPropertyState)
    }

    fn expect(&self, expected: WireType) -> Result<Tag> {
        let tag = self.pending.ok_or(Error::InvalidPropertyState)?;
        if tag.wire_type() == expected {
            Ok(tag)
        } else {
            Err(Error::InvalidWireType { expected: Some(expected), found: tag.wire_type() as u8 })
        }
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.options.recursion_limit {
            return Err(Error::RecursionLimitExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    /// Reads a raw varint without touching the tag state
    #[inline]
    pub fn read_varint32(&mut self) -> Result<u32> {
        self.inner.read_varint32()
    }
    /// Reads a raw varint without touching the tag state
    #[inline]
    pub fn read_varint64(&mut self) -> Result<u64> {
        self.inner.read_varint64()
    }
    /// Reads 4 raw little endian bytes without touching the tag state
    #[inline]
    pub fn read_bit32(&mut self) -> Result<u32> {
        self.inner.read_bit32()
    }
    /// Reads 8 raw little endian bytes without touching the tag state
    #[inline]
    pub fn read_bit64(&mut self) -> Result<u64> {
        self.inner.read_bit64()
    }
    /// Reads a raw length prefix without touching the tag state
    #[inline]
    pub fn read_length(&mut self) -> Result<Length> {
        Length::new(self.inner.read_varint32()? as i32).ok_or(Error::NegativeLength)
    }
    /// Reads a raw length prefixed byte string without touching the tag state
    pub fn read_length_delimited<B: ByteString>(&mut self) -> Result<B> {
        let len = self.read_length()?.as_usize();
        self.inner.with_bytes(len, |bytes| {
            let mut value = B::new(bytes.len());
            value.as_mut().copy_from_slice(bytes);
            Ok(value)
        })
    }
    /// Fills `buf` with raw bytes without touching the tag state
    #[inline]
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)
    }

    /// Reads the value of the pending tag, which must have the value's wire type
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::CodedReader;
    /// use protowire::raw::{Sint32, String};
    ///
    /// let mut reader = CodedReader::with_view(&[0x08, 0x03, 0x12, 0x02, b'h', b'i']);
    /// reader.read_tag().unwrap();
    /// assert_eq!(reader.read_value::<Sint32>().unwrap(), -2);
    /// reader.read_tag().unwrap();
    /// assert_eq!(reader.read_value::<String>().unwrap(), "hi");
    /// ```
    pub fn read_value<V: Value>(&mut self) -> Result<V::Inner> {
        self.expect(V::WIRE_TYPE)?;
        let value = V::read_new(self)?;
        self.reset_tag()?;
        Ok(V::unwrap(value))
    }

    /// Reads a packed field into a new vector
    pub fn read_packed<V: Packable>(&mut self) -> Result<Vec<V::Inner>> {
        let mut values = Vec::new();
        self.add_packed_to::<V>(&mut values)?;
        Ok(values)
    }

    /// Reads the pending packed field into `values`.
    ///
    /// Both encodings of a repeated scalar are accepted: a length delimited run of values, or a
    /// single value with the scalar's own wire type.
    pub fn add_packed_to<V: Packable>(&mut self, values: &mut Vec<V::Inner>) -> Result<()> {
        let tag = self.pending.ok_or(Error::InvalidPropertyState)?;
        match tag.wire_type() {
            WireType::LengthDelimited => {
                let len = self.read_length()?.as_usize();
                self.inner.with_bytes(len, |bytes| V::read_packed(bytes, values))?;
            },
            wt if wt == V::WIRE_TYPE => values.push(V::unwrap(V::read_new(self)?)),
            wt => return Err(Error::InvalidWireType { expected: Some(WireType::LengthDelimited), found: wt as u8 }),
        }
        self.reset_tag()
    }

    /// Reads the group of the pending start group tag.
    ///
    /// `f` reads the group's fields, usually with a [`next_field`](#method.next_field) loop that
    /// stops at the group's end tag. Fields `f` leaves unread are skipped, then the matching end
    /// group tag is consumed. The input running out before the end tag is `TruncatedMessage`.
    pub fn read_group<R, F: FnOnce(&mut Self) -> Result<R>>(&mut self, f: F) -> Result<R> {
        let tag = self.expect(WireType::StartGroup)?;
        self.enter()?;
        self.groups.push(tag.field());
        self.pending = None;

        let result = f(self).and_then(|value| self.close_group().map(|_| value));

        self.groups.pop();
        self.depth -= 1;
        result
    }

    fn close_group(&mut self) -> Result<()> {
        loop {
            match self.pending {
                Some(tag) if tag.wire_type() == WireType::EndGroup => return self.reset_tag(),
                Some(_) => self.skip()?,
                None => {
                    if self.read_tag()?.is_none() {
                        return Err(Error::TruncatedMessage);
                    }
                },
            }
        }
    }

    /// Reads the embedded message of the pending length delimited tag.
    ///
    /// The reader is bounded to the message while `f` runs and always advances past the message
    /// afterwards, whether or not `f` consumed all of it.
    pub fn read_message<R, F: FnOnce(&mut Self) -> Result<R>>(&mut self, f: F) -> Result<R> {
        self.expect(WireType::LengthDelimited)?;
        let len = self.read_length()?.as_usize();
        self.pending = None;
        let old = self.inner.push_limit(len)?;
        if let Err(e) = self.enter() {
            self.inner.pop_limit(old)?;
            return Err(e);
        }

        let groups = mem::take(&mut self.groups);
        let result = f(self);
        self.groups = groups;
        self.depth -= 1;
        self.pending = None;

        // the outer bounds come back even when the body failed
        let popped = self.inner.pop_limit(old);
        let value = result?;
        popped?;
        Ok(value)
    }

    /// Skips the value of the pending tag, including every field of a group
    pub fn skip(&mut self) -> Result<()> {
        let tag = self.pending.ok_or(Error::InvalidPropertyState)?;
        match tag.wire_type() {
            WireType::Varint => { self.inner.read_varint64()?; },
            WireType::Bit64 => self.inner.skip(8)?,
            WireType::LengthDelimited => {
                let len = self.read_length()?.as_usize();
                self.inner.skip(len)?;
            },
            WireType::StartGroup => return self.read_group(|_| Ok(())),
            WireType::EndGroup => { },
            WireType::Bit32 => self.inner.skip(4)?,
        }
        self.reset_tag()
    }
}

impl<T: Input> CodedReader<T> where T::Reader: Split {
    /// Reads the embedded message of the pending length delimited tag as an independent reader
    /// over the same storage and advances this reader past it.
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::CodedReader;
    /// use protowire::raw::Uint32;
    ///
    /// let bytes = [0x0A, 0x02, 0x08, 0x05, 0x10, 0x07];
    /// let mut reader = CodedReader::with_view(&bytes);
    /// reader.read_tag().unwrap();
    /// let mut message = reader.read_sub_reader().unwrap();
    ///
    /// assert!(message.next_field().unwrap());
    /// assert_eq!(message.read_value::<Uint32>().unwrap(), 5);
    /// assert!(!message.next_field().unwrap());
    ///
    /// assert!(reader.next_field().unwrap());
    /// assert_eq!(reader.read_value::<Uint32>().unwrap(), 7);
    /// ```
    pub fn read_sub_reader(&mut self) -> Result<CodedReader<T>> {
        self.expect(WireType::LengthDelimited)?;
        if self.depth >= self.options.recursion_limit {
            return Err(Error::RecursionLimitExceeded);
        }
        let len = self.read_length()?.as_usize();
        let inner = self.inner.split(len)?;
        self.reset_tag()?;
        Ok(CodedReader {
            inner,
            pending: None,
            groups: Vec::new(),
            depth: self.depth + 1,
            options: self.options.clone(),
        })
    }

    /// Reads the bytes of the pending length delimited tag without copying them.
    ///
    /// View and region readers return a slice borrowed for the input's lifetime, array readers
    /// return an [`ArraySlice`](struct.ArraySlice.html) sharing the array.
    pub fn read_bytes_view(&mut self) -> Result<<T::Reader as Split>::Bytes> {
        self.expect(WireType::LengthDelimited)?;
        let len = self.read_length()?.as_usize();
        let bytes = self.inner.take_bytes(len)?;
        self.reset_tag()?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod test {
    use crate::io::{Backend, FieldNumber, Region, Tag, WireType};
    use crate::io::read::{Builder, CodedReader, Error};
    use crate::raw::{Bool, Bytes, Double, Fixed32, Fixed64, Float, Int32, Int64, Sfixed32, Sint32, Sint64, String, Uint32, Uint64};
    use assert_matches::assert_matches;

    macro_rules! each_backend {
        ($bytes:expr, |$reader:ident| $body:block) => {{
            let bytes: &[u8] = $bytes;
            {
                let mut $reader = CodedReader::with_array(bytes.to_vec());
                $body
            }
            {
                let mut $reader = CodedReader::with_view(bytes);
                $body
            }
            {
                let mut $reader = CodedReader::with_region(Region::new(bytes));
                $body
            }
            {
                let mut $reader = Builder::new().buffer_capacity(16).with_stream(bytes);
                $body
            }
        }};
    }

    fn field(n: u32) -> FieldNumber {
        FieldNumber::new(n).unwrap()
    }

    #[test]
    fn preferences() {
        assert_eq!(CodedReader::with_array(vec![]).preference(), Backend::Array);
        assert_eq!(CodedReader::with_view(&[]).preference(), Backend::View);
        assert_eq!(CodedReader::with_region(Region::new(&[])).preference(), Backend::Region);
        assert_eq!(CodedReader::with_stream(&[][..]).preference(), Backend::Array);
    }
    #[test]
    fn varint32_decode() {
        fn try_decode(bytes: &[u8], value: u32) {
            each_backend!(bytes, |reader| {
                assert_eq!(reader.read_varint32().unwrap(), value);
                assert!(reader.is_at_end().unwrap());
            });
        }

        try_decode(&[0x00], 0);
        try_decode(&[0x7F], 127);
        try_decode(&[0xFF, 0x7F], 16_383);
        try_decode(&[0xFF, 0xFF, 0x7F], 2_097_151);
        try_decode(&[0xFF, 0xFF, 0xFF, 0x7F], 268_435_455);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::MAX);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], u32::MAX);
    }
    #[test]
    fn varint64_decode() {
        fn try_decode(bytes: &[u8], value: u64) {
            each_backend!(bytes, |reader| {
                assert_eq!(reader.read_varint64().unwrap(), value);
                assert!(reader.is_at_end().unwrap());
            });
        }

        try_decode(&[0x00], 0);
        try_decode(&[0xAC, 0x02], 300);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::MAX as u64);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F], i64::MAX as u64);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], u64::MAX);
    }
    #[test]
    fn fast_path_varints() {
        // enough trailing bytes that every backend takes the word-at-a-time path
        let mut bytes = vec![0xAC, 0x02, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        bytes.extend_from_slice(&[0x00; 20]);
        each_backend!(&bytes, |reader| {
            assert_eq!(reader.read_varint32().unwrap(), 300);
            assert_eq!(reader.read_varint64().unwrap(), u64::MAX);
            assert_eq!(reader.read_varint64().unwrap(), 0);
        });
    }
    #[test]
    fn fail_varint_decode() {
        each_backend!(&[0xFF; 11], |reader| {
            assert_matches!(reader.read_varint64(), Err(Error::MalformedVarInt));
        });
        each_backend!(&[0xFF; 11], |reader| {
            assert_matches!(reader.read_varint32(), Err(Error::MalformedVarInt));
        });
        each_backend!(&[0xFF; 9], |reader| {
            assert_matches!(reader.read_varint64(), Err(Error::TruncatedMessage));
        });
        each_backend!(&[], |reader| {
            assert_matches!(reader.read_varint32(), Err(Error::TruncatedMessage));
        });
    }
    #[test]
    fn fixed_decode() {
        let bytes = [0x78, 0x56, 0x34, 0x12, 0xEF, 0xCD, 0xAB, 0x90, 0x78, 0x56, 0x34, 0x12];
        each_backend!(&bytes, |reader| {
            assert_eq!(reader.read_bit32().unwrap(), 0x1234_5678);
            assert_eq!(reader.read_bit64().unwrap(), 0x1234_5678_90AB_CDEF);
            assert_matches!(reader.read_bit32(), Err(Error::TruncatedMessage));
        });
        each_backend!(&bytes[..7], |reader| {
            assert_matches!(reader.read_bit64(), Err(Error::TruncatedMessage));
        });
    }
    #[test]
    fn tag_decode() {
        each_backend!(&[0x08, 0x96, 0x01], |reader| {
            let tag = reader.read_tag().unwrap().unwrap();
            assert_eq!(tag, Tag::new(field(1), WireType::Varint));
            assert_eq!(reader.last_tag(), Some(tag));
            assert_eq!(reader.read_value::<Uint32>().unwrap(), 150);
            assert_eq!(reader.last_tag(), None);
            assert_eq!(reader.read_tag().unwrap(), None);
            assert!(!reader.next_field().unwrap());
        });
    }
    #[test]
    fn fail_tag_decode() {
        each_backend!(&[0x00], |reader| {
            assert_matches!(reader.read_tag(), Err(Error::InvalidFieldIndex));
        });
        each_backend!(&[0x0E], |reader| {
            assert_matches!(reader.read_tag(), Err(Error::InvalidWireType { expected: None, found: 6 }));
        });
        each_backend!(&[0x0F], |reader| {
            assert_matches!(reader.read_tag(), Err(Error::InvalidWireType { expected: None, found: 7 }));
        });
        each_backend!(&[0x0C], |reader| {
            assert_matches!(reader.read_tag(), Err(Error::MalformedGroup));
        });
    }
    #[test]
    fn tag_state_misuse() {
        each_backend!(&[0x08, 0x01, 0x08, 0x02], |reader| {
            assert_matches!(reader.read_value::<Int32>(), Err(Error::InvalidPropertyState));
            assert_matches!(reader.reset_tag(), Err(Error::InvalidPropertyState));
            assert_matches!(reader.skip(), Err(Error::InvalidPropertyState));
            assert_matches!(reader.read_packed::<Int32>(), Err(Error::InvalidPropertyState));

            reader.read_tag().unwrap();
            assert_matches!(reader.read_tag(), Err(Error::InvalidPropertyState));
            assert_matches!(reader.next_field(), Err(Error::InvalidPropertyState));
            assert_matches!(reader.read_value::<Fixed32>(), Err(Error::InvalidWireType { expected: Some(WireType::Bit32), found: 0 }));
            assert_matches!(reader.read_message(|_| Ok(())), Err(Error::InvalidWireType { .. }));

            assert_eq!(reader.read_value::<Int32>().unwrap(), 1);
            reader.read_tag().unwrap();
            reader.reset_tag().unwrap();
            // the value is still there once the tag has been discarded
            assert_eq!(reader.read_varint32().unwrap(), 2);
        });
    }
    #[test]
    fn scalar_values() {
        let bytes = [
            0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, // int32 -1
            0x10, 0x03, // sint32 -2
            0x18, 0x03, // sint64 -2
            0x20, 0x80, 0x80, 0x80, 0x80, 0x10, // int64 1 << 32
            0x28, 0x01, // bool true
            0x35, 0x00, 0x00, 0x80, 0x3F, // float 1.0
            0x39, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF0, 0xBF, // double -1.0
            0x45, 0xFE, 0xFF, 0xFF, 0xFF, // sfixed32 -2
            0x49, 0x01, 0, 0, 0, 0, 0, 0, 0x80, // fixed64 1 << 63 | 1
            0x52, 0x02, 0x68, 0x69, // string "hi"
            0x5A, 0x00, // empty bytes
            0x60, 0x80, 0x01, // uint64 128
        ];
        each_backend!(&bytes, |reader| {
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Int32>().unwrap(), -1);
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Sint32>().unwrap(), -2);
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Sint64>().unwrap(), -2);
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Int64>().unwrap(), 1 << 32);
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Bool>().unwrap(), true);
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Float>().unwrap(), 1.0);
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Double>().unwrap(), -1.0);
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Sfixed32>().unwrap(), -2);
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Fixed64>().unwrap(), 1 << 63 | 1);
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<String>().unwrap(), "hi");
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Bytes>().unwrap(), Vec::<u8>::new());
            reader.read_tag().unwrap();
            assert_eq!(reader.read_value::<Uint64>().unwrap(), 128);
            assert!(!reader.next_field().unwrap());
        });
    }
    #[test]
    fn fail_length_delimited() {
        // length -1 as a ten byte varint
        each_backend!(&[0x0A, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], |reader| {
            reader.read_tag().unwrap();
            assert_matches!(reader.read_value::<Bytes>(), Err(Error::NegativeLength));
        });
        each_backend!(&[0x0A, 0x05, 0x01, 0x02], |reader| {
            reader.read_tag().unwrap();
            assert_matches!(reader.read_value::<Bytes>(), Err(Error::TruncatedMessage));
        });
        each_backend!(&[0x0A, 0x02, 0xC3, 0x28], |reader| {
            reader.read_tag().unwrap();
            assert_matches!(reader.read_value::<String>(), Err(Error::InvalidString(_)));
        });
    }
    #[test]
    fn packed_dual_encoding() {
        // the same three values packed and as separate fields
        let bytes = [0x0A, 0x04, 0x01, 0x02, 0xAC, 0x02, 0x08, 0x01, 0x08, 0x02, 0x08, 0xAC, 0x02];
        each_backend!(&bytes, |reader| {
            reader.read_tag().unwrap();
            assert_eq!(reader.read_packed::<Int32>().unwrap(), vec![1, 2, 300]);

            let mut values = Vec::new();
            while reader.next_field().unwrap() {
                reader.add_packed_to::<Int32>(&mut values).unwrap();
            }
            assert_eq!(values, vec![1, 2, 300]);
        });
    }
    #[test]
    fn packed_fixed() {
        let bytes = [0x0A, 0x08, 0x00, 0x00, 0x80, 0x3F, 0x00, 0x00, 0x00, 0x40, 0x12, 0x03, 0x01, 0x02, 0x03];
        each_backend!(&bytes, |reader| {
            reader.read_tag().unwrap();
            assert_eq!(reader.read_packed::<Float>().unwrap(), vec![1.0, 2.0]);
            reader.read_tag().unwrap();
            assert_matches!(reader.read_packed::<Fixed32>(), Err(Error::TruncatedMessage));
        });
        each_backend!(&[0x0D, 0x01, 0x00, 0x00, 0x00], |reader| {
            reader.read_tag().unwrap();
            assert_eq!(reader.read_packed::<Fixed32>().unwrap(), vec![1]);
        });
        each_backend!(&[0x0D, 0x01, 0x00, 0x00, 0x00], |reader| {
            reader.read_tag().unwrap();
            assert_matches!(reader.read_packed::<Int32>(), Err(Error::InvalidWireType { found: 5, .. }));
        });
    }
    #[test]
    fn packed_truncated_varint() {
        each_backend!(&[0x0A, 0x03, 0x01, 0x02, 0x80], |reader| {
            reader.read_tag().unwrap();
            assert_matches!(reader.read_packed::<Uint64>(), Err(Error::TruncatedMessage));
        });
    }
    #[test]
    fn nested_messages() {
        // field 1: message { field 1: 5, field 2: message { field 1: 6 } }, field 2: 7
        let bytes = [0x0A, 0x06, 0x08, 0x05, 0x12, 0x02, 0x08, 0x06, 0x10, 0x07];
        each_backend!(&bytes, |reader| {
            reader.read_tag().unwrap();
            let (a, b) = reader.read_message(|r| {
                r.read_tag()?;
                let a = r.read_value::<Int32>()?;
                r.read_tag()?;
                let b = r.read_message(|r| {
                    r.read_tag()?;
                    r.read_value::<Int32>()
                })?;
                assert!(!r.next_field()?);
                Ok((a, b))
            }).unwrap();
            assert_eq!((a, b), (5, 6));

            assert!(reader.next_field().unwrap());
            assert_eq!(reader.read_value::<Int32>().unwrap(), 7);
            assert!(!reader.next_field().unwrap());
        });
    }
    #[test]
    fn message_advances_past_unread_fields() {
        let bytes = [0x0A, 0x04, 0x08, 0x05, 0x10, 0x06, 0x18, 0x07];
        each_backend!(&bytes, |reader| {
            reader.read_tag().unwrap();
            let first = reader.read_message(|r| {
                r.read_tag()?;
                r.read_value::<Int32>()
            }).unwrap();
            assert_eq!(first, 5);
            assert_eq!(reader.read_tag().unwrap(), Some(Tag::new(field(3), WireType::Varint)));
        });
    }
    #[test]
    fn message_bounds_values() {
        // the inner message claims 2 bytes but its field needs 3
        each_backend!(&[0x0A, 0x02, 0x08, 0xAC, 0x02], |reader| {
            reader.read_tag().unwrap();
            let result = reader.read_message(|r| {
                r.read_tag()?;
                r.read_value::<Int32>()
            });
            assert_matches!(result, Err(Error::TruncatedMessage));
        });
        each_backend!(&[0x0A, 0x05, 0x08], |reader| {
            reader.read_tag().unwrap();
            assert_matches!(reader.read_message(|_| Ok(())), Err(Error::TruncatedMessage));
        });
    }
    #[test]
    fn failed_message_restores_bounds() {
        // field 1: message { field 1: truncated varint }, field 2: 7
        each_backend!(&[0x0A, 0x02, 0x08, 0xFF, 0x10, 0x07], |reader| {
            reader.read_tag().unwrap();
            let result = reader.read_message(|r| {
                r.read_tag()?;
                r.read_value::<Int32>()
            });
            assert_matches!(result, Err(Error::TruncatedMessage));
            assert_eq!(reader.last_tag(), None);

            assert_eq!(reader.read_tag().unwrap(), Some(Tag::new(field(2), WireType::Varint)));
            assert_eq!(reader.read_value::<Int32>().unwrap(), 7);
            assert!(!reader.next_field().unwrap());
        });
        let bytes = [0x0A, 0x02, 0x0B, 0x0C, 0x10, 0x07];
        let mut reader = Builder::new().recursion_limit(0).with_view(&bytes);
        reader.read_tag().unwrap();
        assert_matches!(reader.read_message(|_| Ok(())), Err(Error::RecursionLimitExceeded));
        assert!(reader.next_field().unwrap());
        assert_eq!(reader.read_value::<Int32>().unwrap(), 7);
    }
    #[test]
    fn groups() {
        // group 5 { field 1: 1, group 6 { field 1: 2 } }, field 2: 3
        let bytes = [0x2B, 0x08, 0x01, 0x33, 0x08, 0x02, 0x34, 0x2C, 0x10, 0x03];
        each_backend!(&bytes, |reader| {
            reader.read_tag().unwrap();
            let values = reader.read_group(|r| {
                let mut values = Vec::new();
                while r.next_field()? {
                    match r.last_tag().map(Tag::wire_type) {
                        Some(WireType::StartGroup) => values.push(r.read_group(|r| {
                            r.read_tag()?;
                            r.read_value::<Int32>()
                        })?),
                        _ => values.push(r.read_value::<Int32>()?),
                    }
                }
                Ok(values)
            }).unwrap();
            assert_eq!(values, vec![1, 2]);

            assert!(reader.next_field().unwrap());
            assert_eq!(reader.read_value::<Int32>().unwrap(), 3);
        });
    }
    #[test]
    fn group_skips_unread_fields() {
        let bytes = [0x2B, 0x08, 0x01, 0x12, 0x01, 0x00, 0x2C, 0x10, 0x03];
        each_backend!(&bytes, |reader| {
            reader.read_tag().unwrap();
            reader.read_group(|_| Ok(())).unwrap();
            assert!(reader.next_field().unwrap());
            assert_eq!(reader.read_value::<Int32>().unwrap(), 3);
        });
    }
    #[test]
    fn fail_groups() {
        // end group for field 6 inside group 5
        each_backend!(&[0x2B, 0x08, 0x01, 0x34], |reader| {
            reader.read_tag().unwrap();
            let result = reader.read_group(|r| {
                while r.next_field()? {
                    r.skip()?;
                }
                Ok(())
            });
            assert_matches!(result, Err(Error::InvalidEndObject { .. }));
        });
        // group 5 is never closed
        each_backend!(&[0x2B, 0x08, 0x01], |reader| {
            reader.read_tag().unwrap();
            assert_matches!(reader.skip(), Err(Error::TruncatedMessage));
        });
        // an end group can't close a group outside the current message
        each_backend!(&[0x2B, 0x0A, 0x01, 0x2C, 0x2C], |reader| {
            reader.read_tag().unwrap();
            let result = reader.read_group(|r| {
                r.read_tag()?;
                r.read_message(|r| r.read_tag())
            });
            assert_matches!(result, Err(Error::MalformedGroup));
        });
    }
    #[test]
    fn skip_fields() {
        let bytes = [
            0x08, 0xAC, 0x02,
            0x11, 1, 2, 3, 4, 5, 6, 7, 8,
            0x1A, 0x03, 1, 2, 3,
            0x23, 0x08, 0x01, 0x24,
            0x2D, 1, 2, 3, 4,
            0x30, 0x09,
        ];
        each_backend!(&bytes, |reader| {
            for _ in 0..5 {
                assert!(reader.next_field().unwrap());
                reader.skip().unwrap();
            }
            assert!(reader.next_field().unwrap());
            assert_eq!(reader.read_value::<Int32>().unwrap(), 9);
        });
    }
    #[test]
    fn recursion_limit() {
        let bytes = [0x0B, 0x0B, 0x0B, 0x0C, 0x0C, 0x0C];
        let mut reader = Builder::new().recursion_limit(2).with_view(&bytes);
        reader.read_tag().unwrap();
        assert_matches!(reader.skip(), Err(Error::RecursionLimitExceeded));

        let mut reader = Builder::new().recursion_limit(3).with_view(&bytes);
        reader.read_tag().unwrap();
        reader.skip().unwrap();
        assert!(reader.is_at_end().unwrap());
    }
    #[test]
    fn sub_readers() {
        let bytes = [0x0A, 0x02, 0x08, 0x05, 0x12, 0x03, 1, 2, 3, 0x18, 0x07];

        let mut reader = CodedReader::with_array(bytes.to_vec());
        reader.read_tag().unwrap();
        let mut sub = reader.read_sub_reader().unwrap();
        reader.read_tag().unwrap();
        let view = reader.read_bytes_view().unwrap();
        assert_eq!(&*view, &[1, 2, 3]);
        assert!(sub.next_field().unwrap());
        assert_eq!(sub.read_value::<Int32>().unwrap(), 5);
        assert!(!sub.next_field().unwrap());

        let view = {
            let mut reader = CodedReader::with_view(&bytes);
            reader.read_tag().unwrap();
            reader.skip().unwrap();
            reader.read_tag().unwrap();
            reader.read_bytes_view().unwrap()
        };
        assert_eq!(view, &[1, 2, 3]);

        let mut reader = CodedReader::with_region(Region::new(&bytes));
        reader.read_tag().unwrap();
        let mut sub = reader.read_sub_reader().unwrap();
        assert!(sub.next_field().unwrap());
        assert_eq!(sub.read_value::<Int32>().unwrap(), 5);
        reader.read_tag().unwrap();
        assert_eq!(reader.read_bytes_view().unwrap(), &[1, 2, 3]);
        assert!(reader.next_field().unwrap());
        assert_eq!(reader.read_value::<Int32>().unwrap(), 7);
    }
    #[test]
    fn array_ranges() {
        let bytes = vec![0xFF, 0x08, 0x01, 0xFF];
        let mut reader = CodedReader::with_array_range(bytes.clone(), 1, 2).unwrap();
        assert!(reader.next_field().unwrap());
        assert_eq!(reader.read_value::<Int32>().unwrap(), 1);
        assert!(!reader.next_field().unwrap());

        assert_matches!(CodedReader::with_array_range(bytes, 3, 2), Err(Error::TruncatedMessage));
    }
    #[test]
    fn stream_close() {
        let bytes = [0x08, 0x01];
        let reader = Builder::new().auto_close(false).with_stream(&bytes[..]);
        assert!(reader.close().is_some());
        let reader = CodedReader::with_stream(&bytes[..]);
        assert!(reader.close().is_none());
    }
    #[test]
    fn large_stream_values() {
        let mut bytes = vec![0x0A, 0xE8, 0x07];
        bytes.extend((0..1000u32).map(|i| i as u8));
        bytes.extend_from_slice(&[0x10, 0x01]);

        let mut reader = Builder::new().buffer_capacity(16).with_stream(&bytes[..]);
        reader.read_tag().unwrap();
        let value = reader.read_value::<Bytes>().unwrap();
        assert_eq!(value.len(), 1000);
        assert_eq!(value[999], (999 % 256) as u8);
        assert!(reader.next_field().unwrap());
        assert_eq!(reader.read_value::<Int32>().unwrap(), 1);
    }
}
