//! Contains types and traits for reading and writing protobuf coded data.

pub mod region;
pub mod read;
pub mod write;

pub use read::{Input, CodedReader};
pub use region::{Region, RegionMut};
pub use write::{Output, CodedWriter};

use core::convert::TryFrom;
use core::fmt::{self, Display, Formatter};
use core::num::NonZeroU32;
use crate::raw::{Packable, Value};
use crate::varint;

const DEFAULT_BUF_SIZE: usize = 8 * 1024;

/// The wire type of a protobuf value.
///
/// A wire type is paired with a field number between 1 and 536,870,911 to create a tag,
/// a unique identifier for a field on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum WireType {
    /// A value read as a variable length integer.
    ///
    /// See the protobuf docs for more information on this encoding: https://developers.google.com/protocol-buffers/docs/encoding#varints
    Varint = 0,
    /// A 64-bit value encoded as 8 little endian bytes
    Bit64 = 1,
    /// A length delimited value. The length is encoded as a varint
    LengthDelimited = 2,
    /// A start group tag, deprecated in proto3.
    StartGroup = 3,
    /// An end group tag, deprecated in proto3.
    EndGroup = 4,
    /// A 32-bit value encoded as 4 little endian bytes
    Bit32 = 5,
}

/// The error returned when converting a byte with the value 6 or 7 to a wire type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidWireType(pub u8);

impl Display for InvalidWireType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} is not a valid wire type", self.0)
    }
}

impl std::error::Error for InvalidWireType { }

impl WireType {
    /// Gets whether a wire type is eligible for repeated field packing.
    /// The valid packable wire types are Bit32, Bit64, and Varint.
    pub const fn is_packable(self) -> bool {
        (self as u8 == WireType::Varint as u8) ||
        (self as u8 == WireType::Bit64 as u8) ||
        (self as u8 == WireType::Bit32 as u8)
    }
}

impl TryFrom<u8> for WireType {
    type Error = InvalidWireType;

    fn try_from(value: u8) -> Result<WireType, InvalidWireType> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Bit64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Bit32),
            _ => Err(InvalidWireType(value)),
        }
    }
}

/// A protobuf field number. Its value is known to be less than or equal to 536870911 and not 0.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldNumber(NonZeroU32);

impl FieldNumber {
    /// The max value of a field number as a u32
    pub const MAX_VALUE: u32 = 536_870_911;

    /// Creates a field number if the given value is not zero or more than 536870911
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::FieldNumber;
    ///
    /// assert_eq!(FieldNumber::new(0), None);
    /// assert_eq!(FieldNumber::new(1).map(u32::from), Some(1));
    /// assert!(FieldNumber::new(FieldNumber::MAX_VALUE).is_some());
    /// assert_eq!(FieldNumber::new(FieldNumber::MAX_VALUE + 1), None);
    /// ```
    #[inline]
    pub fn new(n: u32) -> Option<FieldNumber> {
        if n <= Self::MAX_VALUE {
            NonZeroU32::new(n).map(FieldNumber)
        } else {
            None
        }
    }

    /// Returns the value as a [`u32`](https://doc.rust-lang.org/std/primitive.u32.html)
    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl Display for FieldNumber {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<FieldNumber> for u32 {
    fn from(x: FieldNumber) -> u32 {
        x.get()
    }
}

/// A tag containing a wire type and field number. Its value is known to not be 0, and both field number and wire type are valid values
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    field: FieldNumber,
    wire_type: WireType,
}

impl Tag {
    /// Creates a new tag value
    #[inline]
    pub const fn new(field: FieldNumber, wire_type: WireType) -> Tag {
        Tag { field, wire_type }
    }

    /// Gets the wire type from this tag
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::{Tag, WireType};
    /// # use std::convert::TryFrom;
    ///
    /// assert_eq!(Tag::try_from(8).unwrap().wire_type(), WireType::Varint);
    /// assert_eq!(Tag::try_from(17).unwrap().wire_type(), WireType::Bit64);
    /// ```
    #[inline]
    pub const fn wire_type(self) -> WireType {
        self.wire_type
    }

    /// Gets the field number from this tag
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::Tag;
    /// # use std::convert::TryFrom;
    ///
    /// assert_eq!(Tag::try_from(8).unwrap().field().get(), 1);
    /// assert_eq!(Tag::try_from(17).unwrap().field().get(), 2);
    /// ```
    #[inline]
    pub const fn field(self) -> FieldNumber {
        self.field
    }

    /// Returns the encoded value of the tag, `(field << 3) | wire_type`
    #[inline]
    pub const fn get(self) -> u32 {
        (self.field.get() << 3) | self.wire_type as u32
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.get().fmt(f)
    }
}

impl From<Tag> for u32 {
    fn from(x: Tag) -> u32 {
        x.get()
    }
}

/// The error returned when an attempt to convert a 32-bit value to a tag fails due to an invalid field number or wire type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TryTagFromRawError {
    /// The field number was zero
    InvalidFieldNumber,
    /// The wire type was 6 or 7
    InvalidWireType(u8),
}

impl Display for TryTagFromRawError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TryTagFromRawError::InvalidFieldNumber => write!(f, "invalid tag; the field number was 0"),
            TryTagFromRawError::InvalidWireType(wt) => write!(f, "invalid tag; {} is not a valid wire type", wt),
        }
    }
}

impl std::error::Error for TryTagFromRawError { }

impl TryFrom<u32> for Tag {
    type Error = TryTagFromRawError;

    /// Creates a new tag if the value has a non-zero field number and a valid wire type
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::Tag;
    /// # use std::convert::TryFrom;
    ///
    /// assert!(Tag::try_from(1).is_err());
    /// assert!(Tag::try_from(8).is_ok());
    /// assert!(Tag::try_from(16).is_ok());
    /// assert!(Tag::try_from(14).is_err());
    /// ```
    #[inline]
    fn try_from(n: u32) -> Result<Tag, TryTagFromRawError> {
        let raw_wire_type = (n & 0b111) as u8;
        let wire_type = WireType::try_from(raw_wire_type).map_err(|_| TryTagFromRawError::InvalidWireType(raw_wire_type))?;
        let field = FieldNumber::new(n >> 3).ok_or(TryTagFromRawError::InvalidFieldNumber)?;
        Ok(Tag::new(field, wire_type))
    }
}

/// The storage a reader or writer prefers for length delimited values.
///
/// This is a performance hint for callers choosing between copying accessors and zero-copy
/// accessors. Stream backends report `Array` since they can only produce copies.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Backend {
    /// Owned, copied byte arrays
    Array,
    /// Borrowed views into the caller's buffer
    View,
    /// Views into an externally managed memory region
    Region,
}

/// An opaque type that represents the length of a delimited value
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Length(i32);

impl Display for Length {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        self.get().fmt(fmt)
    }
}

impl Length {
    /// Returns the value as a [`i32`](https://doc.rust-lang.org/std/primitive.i32.html)
    #[inline]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Makes a new length from the specified [`i32`], returning [`None`] if the value is negative
    ///
    /// [`i32`]: https://doc.rust-lang.org/std/primitive.i32.html
    /// [`None`]: https://doc.rust-lang.org/std/option/enum.Option.html#variant.None
    pub fn new(x: i32) -> Option<Length> {
        if x < 0 {
            None
        } else {
            Some(Length(x))
        }
    }

    /// Makes a new length from a byte count, returning [`None`] if it doesn't fit in an `i32`
    ///
    /// [`None`]: https://doc.rust-lang.org/std/option/enum.Option.html#variant.None
    pub fn from_usize(x: usize) -> Option<Length> {
        i32::try_from(x).ok().map(Length)
    }

    /// Returns the value as a `usize`
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) const fn fixed(len: i32) -> Length {
        Length(len)
    }

    /// Returns the length of the value in the specified form
    pub fn of_value<V: Value>(value: &V::Inner) -> Option<Length> {
        LengthBuilder::new().add_value::<V>(value).map(LengthBuilder::build)
    }

    /// Returns the length of the value with its tag
    pub fn of_field<V: Value>(num: FieldNumber, value: &V::Inner) -> Option<Length> {
        LengthBuilder::new().add_field::<V>(num, value).map(LengthBuilder::build)
    }

    /// Returns the length of a packed field holding the values
    pub fn of_packed<V: Packable>(num: FieldNumber, values: &[V::Inner]) -> Option<Length> {
        LengthBuilder::new().add_packed::<V>(num, values).map(LengthBuilder::build)
    }
}

impl From<Length> for i32 {
    fn from(x: Length) -> i32 {
        x.get()
    }
}

/// An opaque type for building a length for writing to an output.
///
/// This exists to make creating checked lengths easier in generated code.
#[derive(Debug, Default)]
pub struct LengthBuilder(i32);

impl LengthBuilder {
    /// Creates a new length builder
    #[inline]
    pub const fn new() -> LengthBuilder {
        Self(0)
    }

    /// Adds an arbitrary number of bytes to the length
    #[inline]
    #[must_use = "this returns the builder to chain and does not mutate it in place"]
    pub fn add_bytes(self, value: Length) -> Option<Self> {
        #[cfg(feature = "checked_size")]
        return self.0.checked_add(value.get()).map(LengthBuilder);

        #[cfg(not(feature = "checked_size"))]
        return Some(LengthBuilder(self.0 + value.get()));
    }

    /// Adds the encoded size of a raw varint to the length
    #[inline]
    #[must_use = "this returns the builder to chain and does not mutate it in place"]
    pub fn add_varint(self, value: u64) -> Option<Self> {
        self.add_bytes(raw_varint64_size(value))
    }

    /// Adds a tag's size to the length
    #[inline]
    #[must_use = "this returns the builder to chain and does not mutate it in place"]
    pub fn add_tag(self, tag: Tag) -> Option<Self> {
        self.add_bytes(raw_varint32_size(tag.get()))
    }

    /// Adds a value's length to this instance
    #[inline]
    #[must_use = "this returns the builder to chain and does not mutate it in place"]
    pub fn add_value<V: Value>(self, value: &V::Inner) -> Option<Self> {
        V::wrap_ref(value).calculate_size(self)
    }

    /// Adds a field's length to this instance using the specified field number
    #[inline]
    #[must_use = "this returns the builder to chain and does not mutate it in place"]
    pub fn add_field<V: Value>(self, num: FieldNumber, value: &V::Inner) -> Option<Self> {
        self.add_tag(Tag::new(num, V::WIRE_TYPE))?
            .add_value::<V>(value)
    }

    /// Adds the length of a packed field to this instance. Empty fields aren't written and add nothing.
    #[inline]
    #[must_use = "this returns the builder to chain and does not mutate it in place"]
    pub fn add_packed<V: Packable>(self, num: FieldNumber, values: &[V::Inner]) -> Option<Self> {
        if values.is_empty() {
            return Some(self);
        }
        let body = packed_body_len::<V>(values)?;
        self.add_tag(Tag::new(num, WireType::LengthDelimited))?
            .add_varint(body.get() as u64)?
            .add_bytes(body)
    }

    /// Consumes the builder, returning a [`Length`](struct.Length.html) for writing to an output
    #[inline]
    pub const fn build(self) -> Length {
        Length(self.0)
    }
}

pub(crate) fn packed_body_len<V: Packable>(values: &[V::Inner]) -> Option<Length> {
    values.iter()
        .try_fold(LengthBuilder::new(), |builder, value| builder.add_value::<V>(value))
        .map(LengthBuilder::build)
}

/// A generic string of bytes.
/// This is used by [`CodedReader`](read/struct.CodedReader.html) to read length delimited byte values
/// into various kinds of byte collections.
pub trait ByteString: AsRef<[u8]> + AsMut<[u8]> {
    /// Creates a new zeroed instance of the byte string.
    fn new(len: usize) -> Self;
}

impl ByteString for Box<[u8]> {
    fn new(len: usize) -> Self {
        <Vec<u8> as ByteString>::new(len).into_boxed_slice()
    }
}

impl ByteString for Vec<u8> {
    fn new(len: usize) -> Self {
        vec![0; len]
    }
}

#[inline]
pub(crate) const fn raw_varint32_size(value: u32) -> Length {
    Length(varint::size32(value) as i32)
}

#[inline]
pub(crate) const fn raw_varint64_size(value: u64) -> Length {
    Length(varint::size64(value) as i32)
}

#[cfg(test)]
mod test {
    use super::{FieldNumber, Length, LengthBuilder, Tag, TryTagFromRawError, WireType};
    use crate::raw::{Int32, Sint32, Fixed64, Bytes};
    use std::convert::TryFrom;

    fn field(n: u32) -> FieldNumber {
        FieldNumber::new(n).unwrap()
    }

    #[test]
    fn tag_parts() {
        let tag = Tag::new(field(5), WireType::StartGroup);
        assert_eq!(tag.get(), 43);
        assert_eq!(Tag::try_from(43), Ok(tag));
        assert_eq!(Tag::try_from(6), Err(TryTagFromRawError::InvalidWireType(6)));
        assert_eq!(Tag::try_from(7), Err(TryTagFromRawError::InvalidWireType(7)));
        assert_eq!(Tag::try_from(2), Err(TryTagFromRawError::InvalidFieldNumber));

        let max = Tag::new(field(FieldNumber::MAX_VALUE), WireType::Bit32);
        assert_eq!(max.get(), u32::MAX - 2);
        assert_eq!(Tag::try_from(max.get()).map(Tag::field), Ok(max.field()));
    }
    #[test]
    fn wire_types() {
        for wt in 0..6u8 {
            assert_eq!(WireType::try_from(wt).map(|wt| wt as u8), Ok(wt));
        }
        assert!(WireType::try_from(6).is_err());
        assert!(WireType::try_from(7).is_err());
        assert!(WireType::Varint.is_packable());
        assert!(WireType::Bit32.is_packable());
        assert!(!WireType::LengthDelimited.is_packable());
        assert!(!WireType::StartGroup.is_packable());
    }
    #[test]
    fn lengths() {
        assert_eq!(Length::new(-1), None);
        assert_eq!(Length::from_usize(i32::MAX as usize + 1), None);
        assert_eq!(Length::of_value::<Int32>(&-1).map(Length::get), Some(10));
        assert_eq!(Length::of_value::<Sint32>(&-1).map(Length::get), Some(1));
        assert_eq!(Length::of_field::<Int32>(field(1), &300).map(Length::get), Some(3));
        assert_eq!(Length::of_field::<Fixed64>(field(16), &0).map(Length::get), Some(10));
        assert_eq!(Length::of_field::<Bytes>(field(1), &vec![0; 128]).map(Length::get), Some(131));
        assert_eq!(Length::of_packed::<Int32>(field(1), &[]).map(Length::get), Some(0));
        assert_eq!(Length::of_packed::<Int32>(field(1), &[1, 2, 300]).map(Length::get), Some(6));
        assert_eq!(LengthBuilder::new().add_varint(u64::MAX).map(LengthBuilder::build).map(Length::get), Some(10));
    }
}
