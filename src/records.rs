use std::io::Read;

use num_enum::TryFromPrimitive;

use crate::bitreader::BitReader;
use crate::descriptor::BinaryType;
use crate::error::{ParseErrorKind, Result};
use crate::primitive::{self, Primitive, PrimitiveType};

/// `RecordTypeEnumeration`: the one-byte discriminant every top-level (and
/// nested sub-) record begins with.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, TryFromPrimitive)]
pub enum RecordType {
    SerializedStreamHeader = 0,
    ClassWithId = 1,
    SystemClassWithMembers = 2,
    ClassWithMembers = 3,
    SystemClassWithMembersAndTypes = 4,
    ClassWithMembersAndTypes = 5,
    BinaryObjectString = 6,
    BinaryArray = 7,
    MemberPrimitiveTyped = 8,
    MemberReference = 9,
    ObjectNull = 10,
    MessageEnd = 11,
    BinaryLibrary = 12,
    ObjectNullMultiple256 = 13,
    ObjectNullMultiple = 14,
    ArraySinglePrimitive = 15,
    ArraySingleObject = 16,
    ArraySingleString = 17,
    MethodCall = 21,
    MethodReturn = 22,
}

impl RecordType {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        let code = reader.read_u8()?;
        Self::try_from_primitive(code)
            .map_err(|_| reader.err(ParseErrorKind::InvalidRecordType(code)))
    }
}

/// `SerializedStreamHeaderRecord`.
#[derive(Debug, Clone)]
pub(crate) struct SerializationHeader {
    pub root_id: i32,
    pub header_id: i32,
    pub major_version: i32,
    pub minor_version: i32,
}

impl SerializationHeader {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        let header = Self {
            root_id: reader.read_i32_le()?,
            header_id: reader.read_i32_le()?,
            major_version: reader.read_i32_le()?,
            minor_version: reader.read_i32_le()?,
        };

        if header.major_version != 1 || header.minor_version != 0 {
            return Err(reader.err(ParseErrorKind::InvalidHeader(
                "unsupported major/minor version, expected 1.0",
            )));
        }

        Ok(header)
    }
}

/// `BinaryLibrary` record: library id + assembly-qualified name.
#[derive(Debug, Clone)]
pub(crate) struct BinaryLibraryRecord {
    pub library_id: i32,
    pub library_name: String,
}

impl BinaryLibraryRecord {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        Ok(Self {
            library_id: reader.read_i32_le()?,
            library_name: reader.read_length_prefixed_string()?,
        })
    }
}

/// A string tagged with an explicit `BinaryType::String` code, as used by
/// `MethodCall`/`MethodReturn`'s method name, type name and call context
/// operands ([MS-NRBF] 2.2.3.2).
pub(crate) struct StringValueWithCode(pub String);

impl StringValueWithCode {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        let code = reader.read_u8()?;
        if code != BinaryType::String as u8 {
            return Err(reader.err(ParseErrorKind::UnexpectedBinaryType(code)));
        }
        Ok(Self(reader.read_length_prefixed_string()?))
    }
}

/// A primitive tagged with an explicit `PrimitiveType` code, as used by
/// `MethodCall` arguments and `MethodReturn`'s return value.
pub(crate) struct ValueWithCode(pub Primitive);

impl ValueWithCode {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        let primitive_type = PrimitiveType::read(reader)?;
        Ok(Self(primitive::decode(reader, primitive_type)?))
    }
}

/// A length-prefixed array of [`ValueWithCode`], used for inline
/// `MethodCall` arguments and `MethodReturn` output arguments.
pub(crate) struct ArrayOfValueWithCode(pub Vec<Primitive>);

impl ArrayOfValueWithCode {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        let length = reader.read_i32_le()?.max(0);
        let mut values = Vec::with_capacity(length as usize);
        for _ in 0..length {
            values.push(ValueWithCode::read(reader)?.0);
        }
        Ok(Self(values))
    }
}
