//! Functions for calculating the encoded size of fields before writing them.
//!
//! Fixed capacity writers must be filled exactly, so callers size their output with these first.
//! Scalar fields always fit in a [`Length`](../io/struct.Length.html); byte strings and packed
//! fields return `None` when the field is too large to be written.
//!
//! ```
//! use protowire::io::FieldNumber;
//! use protowire::size;
//!
//! let num = FieldNumber::new(1).unwrap();
//! assert_eq!(size::uint64(num, 0).get(), 2);
//! assert_eq!(size::sint32(num, -1).get(), 2);
//! assert_eq!(size::packed_fixed32(num, &[1, 2]).unwrap().get(), 10);
//! assert_eq!(size::packed_fixed32(num, &[]).unwrap().get(), 0);
//! ```

use crate::io::{raw_varint32_size, raw_varint64_size, FieldNumber, Length, Tag, WireType};
use crate::raw::{self, Packable, Value};
use crate::varint;

#[inline]
const fn scalar(num: FieldNumber, value_len: usize) -> Length {
    // tags are at most 5 bytes and scalars at most 10, so this can't overflow
    Length::fixed((varint::size32(num.get() << 3) + value_len) as i32)
}

/// Returns the size of a tag with the field number. The wire type never changes the size.
#[inline]
pub const fn tag(num: FieldNumber) -> Length {
    raw_varint32_size(Tag::new(num, WireType::Varint).get())
}

/// Returns the size of a raw 32-bit varint
#[inline]
pub const fn varint32(value: u32) -> Length {
    raw_varint32_size(value)
}

/// Returns the size of a raw 64-bit varint
#[inline]
pub const fn varint64(value: u64) -> Length {
    raw_varint64_size(value)
}

/// Returns the size of an `int32` field. Negative values are always 10 bytes.
#[inline]
pub const fn int32(num: FieldNumber, value: i32) -> Length {
    scalar(num, varint::size64(value as i64 as u64))
}

/// Returns the size of an `int64` field
#[inline]
pub const fn int64(num: FieldNumber, value: i64) -> Length {
    scalar(num, varint::size64(value as u64))
}

/// Returns the size of a `uint32` field
#[inline]
pub const fn uint32(num: FieldNumber, value: u32) -> Length {
    scalar(num, varint::size32(value))
}

/// Returns the size of a `uint64` field
#[inline]
pub const fn uint64(num: FieldNumber, value: u64) -> Length {
    scalar(num, varint::size64(value))
}

/// Returns the size of a zig-zag encoded `sint32` field
#[inline]
pub const fn sint32(num: FieldNumber, value: i32) -> Length {
    scalar(num, varint::size32(varint::zigzag_encode32(value)))
}

/// Returns the size of a zig-zag encoded `sint64` field
#[inline]
pub const fn sint64(num: FieldNumber, value: i64) -> Length {
    scalar(num, varint::size64(varint::zigzag_encode64(value)))
}

/// Returns the size of a `fixed32` field
#[inline]
pub const fn fixed32(num: FieldNumber, _value: u32) -> Length {
    scalar(num, 4)
}

/// Returns the size of a `fixed64` field
#[inline]
pub const fn fixed64(num: FieldNumber, _value: u64) -> Length {
    scalar(num, 8)
}

/// Returns the size of an `sfixed32` field
#[inline]
pub const fn sfixed32(num: FieldNumber, _value: i32) -> Length {
    scalar(num, 4)
}

/// Returns the size of an `sfixed64` field
#[inline]
pub const fn sfixed64(num: FieldNumber, _value: i64) -> Length {
    scalar(num, 8)
}

/// Returns the size of a `float` field
#[inline]
pub fn float(num: FieldNumber, _value: f32) -> Length {
    scalar(num, 4)
}

/// Returns the size of a `double` field
#[inline]
pub fn double(num: FieldNumber, _value: f64) -> Length {
    scalar(num, 8)
}

/// Returns the size of a `bool` field
#[inline]
pub const fn bool(num: FieldNumber, _value: bool) -> Length {
    scalar(num, 1)
}

/// Returns the size of a `bytes` field, or `None` if the field is too large to write
pub fn bytes(num: FieldNumber, value: &[u8]) -> Option<Length> {
    let len = Length::from_usize(value.len())?;
    tag_and_body(num, len)
}

/// Returns the size of a `string` field, or `None` if the field is too large to write
pub fn string(num: FieldNumber, value: &str) -> Option<Length> {
    bytes(num, value.as_bytes())
}

fn tag_and_body(num: FieldNumber, body: Length) -> Option<Length> {
    Length::from_usize(tag(num).as_usize() + varint32(body.get() as u32).as_usize() + body.as_usize())
}

/// Returns the size of a field of any value type
#[inline]
pub fn field<V: Value>(num: FieldNumber, value: &V::Inner) -> Option<Length> {
    Length::of_field::<V>(num, value)
}

/// Returns the size of a packed field of any packable value type. Empty fields are zero bytes.
#[inline]
pub fn packed<V: Packable>(num: FieldNumber, values: &[V::Inner]) -> Option<Length> {
    Length::of_packed::<V>(num, values)
}

macro_rules! packed_fns {
    ($($(#[$attr:meta])* $name:ident => $v:ty, $t:ty;)*) => {
        $(
            $(#[$attr])*
            #[inline]
            pub fn $name(num: FieldNumber, values: &[$t]) -> Option<Length> {
                packed::<$v>(num, values)
            }
        )*
    };
}

macro_rules! packed_fixed_fns {
    ($($(#[$attr:meta])* $name:ident => $t:ty, $width:expr;)*) => {
        $(
            $(#[$attr])*
            #[inline]
            pub fn $name(num: FieldNumber, values: &[$t]) -> Option<Length> {
                if values.is_empty() {
                    return Some(Length::fixed(0));
                }
                let body = Length::from_usize(values.len().checked_mul($width)?)?;
                tag_and_body(num, body)
            }
        )*
    };
}

packed_fns! {
    /// Returns the size of a packed `int32` field
    packed_int32 => raw::Int32, i32;
    /// Returns the size of a packed `int64` field
    packed_int64 => raw::Int64, i64;
    /// Returns the size of a packed `uint32` field
    packed_uint32 => raw::Uint32, u32;
    /// Returns the size of a packed `uint64` field
    packed_uint64 => raw::Uint64, u64;
    /// Returns the size of a packed `sint32` field
    packed_sint32 => raw::Sint32, i32;
    /// Returns the size of a packed `sint64` field
    packed_sint64 => raw::Sint64, i64;
}

packed_fixed_fns! {
    /// Returns the size of a packed `fixed32` field
    packed_fixed32 => u32, 4;
    /// Returns the size of a packed `fixed64` field
    packed_fixed64 => u64, 8;
    /// Returns the size of a packed `sfixed32` field
    packed_sfixed32 => i32, 4;
    /// Returns the size of a packed `sfixed64` field
    packed_sfixed64 => i64, 8;
    /// Returns the size of a packed `float` field
    packed_float => f32, 4;
    /// Returns the size of a packed `double` field
    packed_double => f64, 8;
    /// Returns the size of a packed `bool` field
    packed_bool => bool, 1;
}
