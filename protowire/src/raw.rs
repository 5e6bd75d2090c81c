//! Contains types for protobuf values and traits for value operations.
//!
//! Each value type is a transparent newtype over the Rust type it's read into. The newtypes are
//! never constructed by callers: readers and writers take them as type parameters and work with
//! the inner values directly.
//!
//! ```
//! use protowire::io::{CodedReader, CodedWriter, FieldNumber};
//! use protowire::raw::{Sint32, Uint32};
//!
//! let num = FieldNumber::new(2).unwrap();
//! let mut writer = CodedWriter::with_array(6);
//! writer.write_field::<Sint32>(num, &-1).unwrap();
//! writer.write_packed::<Uint32>(num, &[1, 2]).unwrap();
//! let bytes = writer.finish().unwrap();
//!
//! let mut reader = CodedReader::with_view(&bytes);
//! reader.read_tag().unwrap();
//! assert_eq!(reader.read_value::<Sint32>().unwrap(), -1);
//! reader.read_tag().unwrap();
//! assert_eq!(reader.read_packed::<Uint32>().unwrap(), [1, 2]);
//! ```

use crate::bits;
use crate::internal::Sealed;
use crate::io::{read, write, CodedReader, CodedWriter, Input, Length, LengthBuilder, Output, WireType};
use crate::varint;
use trapper::{newtype, Wrapper};

/// A value that knows its wire type and how to size, read, and write itself
pub trait Value: Wrapper + Sealed + Sized {
    /// The wire type of the value when it isn't packed
    const WIRE_TYPE: WireType;

    /// Adds the encoded size of the value, without a tag, to the builder
    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder>;

    /// Reads a new instance of the value from the [`CodedReader`](../io/read/struct.CodedReader.html)
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self>;

    /// Writes the value to the [`CodedWriter`](../io/write/struct.CodedWriter.html)
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result;
}

/// A value that can be packed into a length delimited run of values
pub trait Packable: Value {
    /// Decodes a whole packed run, appending the values to `values`
    fn read_packed(bytes: &[u8], values: &mut Vec<Self::Inner>) -> read::Result<()>;
}

fn read_packed_varints<T, F: FnMut(u64) -> T>(bytes: &[u8], values: &mut Vec<T>, map: F) -> read::Result<()> {
    Ok(varint::decode_packed(bytes, values, map)?)
}

fn read_packed_fixed<T, F: FnMut(&[u8]) -> T>(bytes: &[u8], width: usize, values: &mut Vec<T>, map: F) -> read::Result<()> {
    if bytes.len() % width != 0 {
        return Err(read::Error::TruncatedMessage);
    }
    values.extend(bytes.chunks_exact(width).map(map));
    Ok(())
}

fn add_length_delimited(builder: LengthBuilder, len: usize) -> Option<LengthBuilder> {
    let len = Length::from_usize(len)?;
    builder.add_varint(len.get() as u64)?.add_bytes(len)
}

const FIXED32_SIZE: Length = Length::fixed(4);
const FIXED64_SIZE: Length = Length::fixed(8);

newtype! {
    /// A varint encoded 32-bit value. Negative values are encoded as 10-byte varints.
    pub type Int32(i32);
}

impl Sealed for Int32 { }
impl Value for Int32 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_varint(self.0 as i64 as u64)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_varint32().map(|v| Self(v as i32))
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        if self.0 >= 0 {
            output.write_varint32(self.0 as u32)
        } else {
            output.write_varint64(self.0 as i64 as u64)
        }
    }
}
impl Packable for Int32 {
    fn read_packed(bytes: &[u8], values: &mut Vec<i32>) -> read::Result<()> {
        read_packed_varints(bytes, values, |v| v as i32)
    }
}

newtype! {
    /// A varint encoded 32-bit value. Can be at most 5 bytes.
    pub type Uint32(u32);
}

impl Sealed for Uint32 { }
impl Value for Uint32 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_varint(self.0 as u64)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_varint32().map(Self)
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_varint32(self.0)
    }
}
impl Packable for Uint32 {
    fn read_packed(bytes: &[u8], values: &mut Vec<u32>) -> read::Result<()> {
        read_packed_varints(bytes, values, |v| v as u32)
    }
}

newtype! {
    /// A varint encoded 64-bit value. Can be at most 10 bytes.
    pub type Int64(i64);
}

impl Sealed for Int64 { }
impl Value for Int64 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_varint(self.0 as u64)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_varint64().map(|v| Self(v as i64))
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_varint64(self.0 as u64)
    }
}
impl Packable for Int64 {
    fn read_packed(bytes: &[u8], values: &mut Vec<i64>) -> read::Result<()> {
        read_packed_varints(bytes, values, |v| v as i64)
    }
}

newtype! {
    /// A varint encoded 64-bit value. Can be at most 10 bytes.
    pub type Uint64(u64);
}

impl Sealed for Uint64 { }
impl Value for Uint64 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_varint(self.0)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_varint64().map(Self)
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_varint64(self.0)
    }
}
impl Packable for Uint64 {
    fn read_packed(bytes: &[u8], values: &mut Vec<u64>) -> read::Result<()> {
        read_packed_varints(bytes, values, |v| v)
    }
}

newtype! {
    /// A varint encoded 32-bit value. This is more efficient for encoding negative values than `Int32`.
    /// Can be at most 5 bytes.
    pub type Sint32(i32);
}

impl Sealed for Sint32 { }
impl Value for Sint32 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_varint(varint::zigzag_encode32(self.0) as u64)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_varint32().map(|v| Self(varint::zigzag_decode32(v)))
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_varint32(varint::zigzag_encode32(self.0))
    }
}
impl Packable for Sint32 {
    fn read_packed(bytes: &[u8], values: &mut Vec<i32>) -> read::Result<()> {
        read_packed_varints(bytes, values, |v| varint::zigzag_decode32(v as u32))
    }
}

newtype! {
    /// A varint encoded 64-bit value. This is more efficient for encoding negative values than `Int64`.
    /// Can be at most 10 bytes.
    pub type Sint64(i64);
}

impl Sealed for Sint64 { }
impl Value for Sint64 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_varint(varint::zigzag_encode64(self.0))
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_varint64().map(|v| Self(varint::zigzag_decode64(v)))
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_varint64(varint::zigzag_encode64(self.0))
    }
}
impl Packable for Sint64 {
    fn read_packed(bytes: &[u8], values: &mut Vec<i64>) -> read::Result<()> {
        read_packed_varints(bytes, values, varint::zigzag_decode64)
    }
}

newtype! {
    /// A fixed 32-bit value. This is encoded as 4 little endian bytes.
    pub type Fixed32(u32);
}

impl Sealed for Fixed32 { }
impl Value for Fixed32 {
    const WIRE_TYPE: WireType = WireType::Bit32;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_bytes(FIXED32_SIZE)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_bit32().map(Self)
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_bit32(self.0)
    }
}
impl Packable for Fixed32 {
    fn read_packed(bytes: &[u8], values: &mut Vec<u32>) -> read::Result<()> {
        read_packed_fixed(bytes, 4, values, bits::load_u32_le)
    }
}

newtype! {
    /// A fixed 64-bit value. This is encoded as 8 little endian bytes.
    pub type Fixed64(u64);
}

impl Sealed for Fixed64 { }
impl Value for Fixed64 {
    const WIRE_TYPE: WireType = WireType::Bit64;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_bytes(FIXED64_SIZE)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_bit64().map(Self)
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_bit64(self.0)
    }
}
impl Packable for Fixed64 {
    fn read_packed(bytes: &[u8], values: &mut Vec<u64>) -> read::Result<()> {
        read_packed_fixed(bytes, 8, values, bits::load_u64_le)
    }
}

newtype! {
    /// A fixed signed 32-bit value. This is encoded as 4 little endian bytes.
    pub type Sfixed32(i32);
}

impl Sealed for Sfixed32 { }
impl Value for Sfixed32 {
    const WIRE_TYPE: WireType = WireType::Bit32;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_bytes(FIXED32_SIZE)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_bit32().map(|v| Self(v as i32))
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_bit32(self.0 as u32)
    }
}
impl Packable for Sfixed32 {
    fn read_packed(bytes: &[u8], values: &mut Vec<i32>) -> read::Result<()> {
        read_packed_fixed(bytes, 4, values, |b| bits::load_u32_le(b) as i32)
    }
}

newtype! {
    /// A fixed signed 64-bit value. This is encoded as 8 little endian bytes.
    pub type Sfixed64(i64);
}

impl Sealed for Sfixed64 { }
impl Value for Sfixed64 {
    const WIRE_TYPE: WireType = WireType::Bit64;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_bytes(FIXED64_SIZE)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_bit64().map(|v| Self(v as i64))
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_bit64(self.0 as u64)
    }
}
impl Packable for Sfixed64 {
    fn read_packed(bytes: &[u8], values: &mut Vec<i64>) -> read::Result<()> {
        read_packed_fixed(bytes, 8, values, |b| bits::load_u64_le(b) as i64)
    }
}

newtype! {
    /// A 32-bit floating point value. This is encoded as 4 little endian bytes.
    pub type Float(f32);
}

impl Sealed for Float { }
impl Value for Float {
    const WIRE_TYPE: WireType = WireType::Bit32;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_bytes(FIXED32_SIZE)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_bit32().map(|v| Self(f32::from_bits(v)))
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_bit32(self.0.to_bits())
    }
}
impl Packable for Float {
    fn read_packed(bytes: &[u8], values: &mut Vec<f32>) -> read::Result<()> {
        read_packed_fixed(bytes, 4, values, |b| f32::from_bits(bits::load_u32_le(b)))
    }
}

newtype! {
    /// A 64-bit floating point value. This is encoded as 8 little endian bytes.
    pub type Double(f64);
}

impl Sealed for Double { }
impl Value for Double {
    const WIRE_TYPE: WireType = WireType::Bit64;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_bytes(FIXED64_SIZE)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_bit64().map(|v| Self(f64::from_bits(v)))
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_bit64(self.0.to_bits())
    }
}
impl Packable for Double {
    fn read_packed(bytes: &[u8], values: &mut Vec<f64>) -> read::Result<()> {
        read_packed_fixed(bytes, 8, values, |b| f64::from_bits(bits::load_u64_le(b)))
    }
}

newtype! {
    /// A bool value. This is encoded as a varint value; any non-zero value reads as true.
    pub type Bool(bool);
}

impl Sealed for Bool { }
impl Value for Bool {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        builder.add_varint(self.0 as u64)
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_varint64().map(|v| Self(v != 0))
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_varint32(self.0 as u32)
    }
}
impl Packable for Bool {
    fn read_packed(bytes: &[u8], values: &mut Vec<bool>) -> read::Result<()> {
        read_packed_varints(bytes, values, |v| v != 0)
    }
}

newtype! {
    /// A length delimited string of bytes, copied into a vector.
    ///
    /// Readers over an array, view, or region can return the bytes without copying with
    /// [`read_bytes_view`](../io/read/struct.CodedReader.html#method.read_bytes_view).
    pub type Bytes(Vec<u8>);
}

impl Sealed for Bytes { }
impl Value for Bytes {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        add_length_delimited(builder, self.0.len())
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        input.read_length_delimited().map(Self)
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_length_delimited(&self.0)
    }
}

newtype! {
    /// A length delimited UTF-8 string.
    pub type String(std::string::String);
}

impl Sealed for String { }
impl Value for String {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        add_length_delimited(builder, self.0.len())
    }
    fn read_new<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        let bytes = input.read_length_delimited::<Vec<u8>>()?;
        Ok(Self(std::string::String::from_utf8(bytes)?))
    }
    fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        output.write_length_delimited(self.0.as_bytes())
    }
}
