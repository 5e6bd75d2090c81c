//! A fast protobuf wire format engine.
//!
//! The crate reads and writes the protobuf binary encoding over four kinds of storage: owned
//! arrays, borrowed views, raw memory regions and byte streams. Framing lives once in
//! [`CodedReader`](io/read/struct.CodedReader.html) and
//! [`CodedWriter`](io/write/struct.CodedWriter.html) while the backends provide the primitive
//! byte operations.
//!
//! ```
//! use protowire::io::{CodedReader, CodedWriter, FieldNumber};
//! use protowire::raw::Int32;
//! use protowire::size;
//!
//! let field = FieldNumber::new(1).unwrap();
//! let len = size::int32(field, 300).get() as usize;
//! let mut writer = CodedWriter::with_array(len);
//! writer.write_field::<Int32>(field, &300).unwrap();
//! let bytes = writer.finish().unwrap();
//! assert_eq!(&*bytes, &[0x08, 0xAC, 0x02]);
//!
//! let mut reader = CodedReader::with_view(&bytes);
//! assert!(reader.next_field().unwrap());
//! assert_eq!(reader.read_value::<Int32>().unwrap(), 300);
//! assert!(!reader.next_field().unwrap());
//! ```

#![warn(missing_docs)]

mod internal {
    pub trait Sealed { }
}

pub mod bits;
pub mod io;
pub mod raw;
pub mod size;
pub mod unknown_fields;
pub mod varint;

pub use unknown_fields::{UnknownFieldSet, UnknownValue};
