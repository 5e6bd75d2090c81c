//! Defines the `UnknownFieldSet`, a struct used to contain unknown fields as they were read from coded readers.
//!
//! As APIs are updated, certain fields may be removed or added from proto file definitions. A reader
//! that doesn't recognize a field can capture it here so it can be written back out unchanged.
//!
//! Fields are kept in the order they were read and one field number can hold values of several
//! wire types at once, so re-encoding a captured set reproduces the input exactly.

use crate::io::{read, write, CodedReader, CodedWriter, FieldNumber, Input, LengthBuilder, Output, Tag, WireType};
use crate::raw;
use either::Either;
use hashbrown::HashMap;
use std::iter;

/// An unknown field value in an [`UnknownFieldSet`](struct.UnknownFieldSet.html).
#[derive(Clone, Debug, PartialEq)]
pub enum UnknownValue {
    /// A varint field value
    Varint(i64),
    /// A 32-bit field value
    Fixed32(i32),
    /// A 64-bit field value
    Fixed64(i64),
    /// A length delimited series of bytes
    LengthDelimited(Vec<u8>),
    /// A group of other unknown fields
    Group(UnknownFieldSet),
}

impl UnknownValue {
    /// Gets the wire type the value is encoded with
    pub fn wire_type(&self) -> WireType {
        match self {
            UnknownValue::Varint(_) => WireType::Varint,
            UnknownValue::Fixed32(_) => WireType::Bit32,
            UnknownValue::Fixed64(_) => WireType::Bit64,
            UnknownValue::LengthDelimited(_) => WireType::LengthDelimited,
            UnknownValue::Group(_) => WireType::StartGroup,
        }
    }

    /// Adds the encoded size of the value and its tag to the builder
    pub fn calculate_size(&self, num: FieldNumber, builder: LengthBuilder) -> Option<LengthBuilder> {
        match self {
            UnknownValue::Varint(v) => builder.add_field::<raw::Int64>(num, v),
            UnknownValue::Fixed32(v) => builder.add_field::<raw::Sfixed32>(num, v),
            UnknownValue::Fixed64(v) => builder.add_field::<raw::Sfixed64>(num, v),
            UnknownValue::LengthDelimited(v) => builder.add_field::<raw::Bytes>(num, v),
            UnknownValue::Group(set) => {
                let builder = builder.add_tag(Tag::new(num, WireType::StartGroup))?;
                set.calculate_size(builder)?
                    .add_tag(Tag::new(num, WireType::EndGroup))
            },
        }
    }

    /// Writes the value and its tag to the writer
    pub fn write_to<T: Output>(&self, num: FieldNumber, output: &mut CodedWriter<T>) -> write::Result {
        match self {
            UnknownValue::Varint(v) => output.write_field::<raw::Int64>(num, v),
            UnknownValue::Fixed32(v) => output.write_field::<raw::Sfixed32>(num, v),
            UnknownValue::Fixed64(v) => output.write_field::<raw::Sfixed64>(num, v),
            UnknownValue::LengthDelimited(v) => output.write_field::<raw::Bytes>(num, v),
            UnknownValue::Group(set) => output.write_group(num, |output| set.write_to(output)),
        }
    }
}

/// A set of unknown fields encountered while parsing
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnknownFieldSet {
    entries: Vec<(FieldNumber, UnknownValue)>,
    index: HashMap<FieldNumber, Vec<usize>>,
}

impl UnknownFieldSet {
    /// Creates a new empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every remaining field of the current message or group into a new set.
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::UnknownFieldSet;
    /// use protowire::io::CodedReader;
    ///
    /// let mut reader = CodedReader::with_view(&[0x08, 0x96, 0x01, 0x15, 1, 0, 0, 0]);
    /// let set = UnknownFieldSet::read_from(&mut reader).unwrap();
    /// assert_eq!(set.len(), 2);
    /// ```
    pub fn read_from<T: Input>(input: &mut CodedReader<T>) -> read::Result<Self> {
        let mut set = Self::new();
        while input.next_field()? {
            set.add_field_from(input)?;
        }
        Ok(set)
    }

    /// Reads the reader's pending field into the set
    pub fn add_field_from<T: Input>(&mut self, input: &mut CodedReader<T>) -> read::Result<()> {
        let tag = input.last_tag().ok_or(read::Error::InvalidPropertyState)?;
        let value = input.read_unknown()?;
        self.push(tag.field(), value);
        Ok(())
    }

    /// Adds a value to the end of the set
    pub fn push(&mut self, num: FieldNumber, value: UnknownValue) {
        self.index.entry(num).or_insert_with(Vec::new).push(self.entries.len());
        self.entries.push((num, value));
    }

    /// Returns the number of values in the set
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the set has no values
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns every value of the field in the order they were added
    pub fn values(&self, num: FieldNumber) -> impl Iterator<Item = &UnknownValue> + '_ {
        match self.index.get(&num) {
            None => Either::Left(iter::empty()),
            Some(indices) => Either::Right(indices.iter().map(move |&i| &self.entries[i].1)),
        }
    }

    /// Returns the last value of the field, the one a singular field would keep
    pub fn get(&self, num: FieldNumber) -> Option<&UnknownValue> {
        let &i = self.index.get(&num)?.last()?;
        Some(&self.entries[i].1)
    }

    /// Returns every field and value in the order they were added
    pub fn iter(&self) -> impl Iterator<Item = (FieldNumber, &UnknownValue)> {
        self.entries.iter().map(|(num, value)| (*num, value))
    }

    /// Returns each field number in the set once, in the order they were first added
    pub fn field_numbers(&self) -> impl Iterator<Item = FieldNumber> + '_ {
        self.entries.iter()
            .enumerate()
            .filter(move |(i, (num, _))| self.index[num].first() == Some(i))
            .map(|(_, (num, _))| *num)
    }

    /// Removes every value from the set
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Appends every value of another set to this one
    pub fn merge(&mut self, other: &Self) {
        for (num, value) in &other.entries {
            self.push(*num, value.clone());
        }
    }

    /// Adds the encoded size of every field in the set to the builder
    pub fn calculate_size(&self, builder: LengthBuilder) -> Option<LengthBuilder> {
        self.entries.iter().try_fold(builder, |builder, (num, value)| value.calculate_size(*num, builder))
    }

    /// Writes every field in the set to the writer
    pub fn write_to<T: Output>(&self, output: &mut CodedWriter<T>) -> write::Result {
        for (num, value) in &self.entries {
            value.write_to(*num, output)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a UnknownFieldSet {
    type Item = (FieldNumber, &'a UnknownValue);
    type IntoIter = Box<dyn Iterator<Item = (FieldNumber, &'a UnknownValue)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl<T: Input> CodedReader<T> {
    /// Reads the value of the pending field without knowing its type.
    ///
    /// Groups are read recursively with the same end tag matching as
    /// [`read_group`](io/read/struct.CodedReader.html#method.read_group). A pending end group tag
    /// has no value and is `MalformedGroup`.
    pub fn read_unknown(&mut self) -> read::Result<UnknownValue> {
        let tag = self.last_tag().ok_or(read::Error::InvalidPropertyState)?;
        let value = match tag.wire_type() {
            WireType::Varint => UnknownValue::Varint(self.read_varint64()? as i64),
            WireType::Bit64 => UnknownValue::Fixed64(self.read_bit64()? as i64),
            WireType::LengthDelimited => UnknownValue::LengthDelimited(self.read_length_delimited()?),
            WireType::StartGroup => return self.read_group(UnknownFieldSet::read_from).map(UnknownValue::Group),
            WireType::EndGroup => return Err(read::Error::MalformedGroup),
            WireType::Bit32 => UnknownValue::Fixed32(self.read_bit32()? as i32),
        };
        self.reset_tag()?;
        Ok(value)
    }
}

#[cfg(test)]
mod test {
    use crate::io::{CodedReader, CodedWriter, FieldNumber, LengthBuilder};
    use crate::io::read::Error;
    use crate::{UnknownFieldSet, UnknownValue};
    use assert_matches::assert_matches;

    fn field(n: u32) -> FieldNumber {
        FieldNumber::new(n).unwrap()
    }

    fn encode(set: &UnknownFieldSet) -> Vec<u8> {
        let len = set.calculate_size(LengthBuilder::new()).unwrap().build();
        let mut writer = CodedWriter::with_array(len.as_usize());
        set.write_to(&mut writer).unwrap();
        writer.finish().unwrap().into_vec()
    }

    #[test]
    fn capture_every_wire_type() {
        let bytes = [
            0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01,
            0x11, 1, 0, 0, 0, 0, 0, 0, 0x80,
            0x1A, 0x02, b'h', b'i',
            0x25, 0xFF, 0xFF, 0xFF, 0xFF,
            0x08, 0x05,
        ];
        let mut reader = CodedReader::with_view(&bytes);
        let set = UnknownFieldSet::read_from(&mut reader).unwrap();

        assert_eq!(set.len(), 5);
        assert_eq!(set.values(field(1)).collect::<Vec<_>>(), [&UnknownValue::Varint(-1), &UnknownValue::Varint(5)]);
        assert_eq!(set.get(field(1)), Some(&UnknownValue::Varint(5)));
        assert_eq!(set.get(field(2)), Some(&UnknownValue::Fixed64(i64::MIN + 1)));
        assert_eq!(set.get(field(3)), Some(&UnknownValue::LengthDelimited(b"hi".to_vec())));
        assert_eq!(set.get(field(4)), Some(&UnknownValue::Fixed32(-1)));
        assert_eq!(set.get(field(5)), None);
        assert_eq!(set.values(field(5)).count(), 0);
        assert_eq!(set.field_numbers().map(FieldNumber::get).collect::<Vec<_>>(), [1, 2, 3, 4]);

        assert_eq!(encode(&set), bytes);
    }
    #[test]
    fn nested_groups() {
        let bytes = [0x2B, 0x08, 0x01, 0x33, 0x10, 0x02, 0x34, 0x2C, 0x08, 0x03];
        let mut reader = CodedReader::with_view(&bytes);
        let set = UnknownFieldSet::read_from(&mut reader).unwrap();
        assert_eq!(set.len(), 2);

        let group = match set.get(field(5)) {
            Some(UnknownValue::Group(group)) => group,
            other => panic!("expected a group, found {:?}", other),
        };
        assert_eq!(group.len(), 2);
        assert_matches!(group.get(field(6)), Some(UnknownValue::Group(inner)) if inner.len() == 1);
        assert_eq!(encode(&set), bytes);
    }
    #[test]
    fn fail_group_capture() {
        let mut reader = CodedReader::with_view(&[0x2B, 0x08, 0x01]);
        assert_matches!(UnknownFieldSet::read_from(&mut reader), Err(Error::TruncatedMessage));

        let mut reader = CodedReader::with_view(&[0x2B, 0x34]);
        assert_matches!(UnknownFieldSet::read_from(&mut reader), Err(Error::InvalidEndObject { .. }));

        let mut reader = CodedReader::with_view(&[0x2C]);
        assert_matches!(UnknownFieldSet::read_from(&mut reader), Err(Error::MalformedGroup));

        let mut reader = CodedReader::with_view(&[0x08, 0x01]);
        assert_matches!(reader.read_unknown(), Err(Error::InvalidPropertyState));
    }
    #[test]
    fn merge_and_clear() {
        let mut a = UnknownFieldSet::new();
        a.push(field(2), UnknownValue::Varint(1));
        let mut b = UnknownFieldSet::new();
        b.push(field(1), UnknownValue::Fixed32(2));
        b.push(field(2), UnknownValue::Varint(3));

        a.merge(&b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.field_numbers().map(FieldNumber::get).collect::<Vec<_>>(), [2, 1]);
        assert_eq!(a.get(field(2)), Some(&UnknownValue::Varint(3)));
        assert_eq!((&a).into_iter().count(), 3);

        a.clear();
        assert!(a.is_empty());
        assert_eq!(a.get(field(2)), None);
        assert_eq!(encode(&a), Vec::<u8>::new());
    }
}
