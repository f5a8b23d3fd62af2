use std::io::Read;

use num_enum::TryFromPrimitive;

use crate::bitreader::BitReader;
use crate::error::{ParseErrorKind, Result};
use crate::value::{DateTimeKind, DateTimeValue};

/// `PrimitiveTypeEnumeration`: the discriminant that tags a scalar value
/// wherever MS-NRBF needs one to be self-describing (typed members, typed
/// array elements, `MemberPrimitiveTyped`).
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, TryFromPrimitive)]
pub enum PrimitiveType {
    Boolean = 1,
    Byte = 2,
    Char = 3,
    Decimal = 5,
    Double = 6,
    Int16 = 7,
    Int32 = 8,
    Int64 = 9,
    SByte = 10,
    Single = 11,
    TimeSpan = 12,
    DateTime = 13,
    UInt16 = 14,
    UInt32 = 15,
    UInt64 = 16,
    Null = 17,
    String = 18,
}

impl PrimitiveType {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        let code = reader.read_u8()?;
        Self::try_from_primitive(code)
            .map_err(|_| reader.err(ParseErrorKind::InvalidPrimitiveCode(code)))
    }
}

/// A decoded primitive scalar, tagged by the `PrimitiveType` it was read
/// as. `Null` and `String` are legal codes for a typed *member*
/// (`MemberPrimitiveTyped`, class member descriptors) but never appear as
/// the element type of a primitive array.
#[derive(Debug, PartialEq, Clone)]
pub enum Primitive {
    Boolean(bool),
    Byte(u8),
    Char(char),
    Decimal(String),
    Double(f64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    SByte(i8),
    Single(f32),
    TimeSpan(i64),
    DateTime(DateTimeValue),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Null,
    String(String),
}

/// Table-driven decode of one primitive value given its `PrimitiveType`
/// discriminant.
pub(crate) fn decode<R: Read>(
    reader: &mut BitReader<R>,
    primitive_type: PrimitiveType,
) -> Result<Primitive> {
    Ok(match primitive_type {
        PrimitiveType::Boolean => Primitive::Boolean(reader.read_bool()?),
        PrimitiveType::Byte => Primitive::Byte(reader.read_u8()?),
        PrimitiveType::Char => Primitive::Char(reader.read_char()?),
        PrimitiveType::Decimal => Primitive::Decimal(reader.read_decimal()?),
        PrimitiveType::Double => Primitive::Double(reader.read_f64_le()?),
        PrimitiveType::Int16 => Primitive::Int16(reader.read_i16_le()?),
        PrimitiveType::Int32 => Primitive::Int32(reader.read_i32_le()?),
        PrimitiveType::Int64 => Primitive::Int64(reader.read_i64_le()?),
        PrimitiveType::SByte => Primitive::SByte(reader.read_i8()?),
        PrimitiveType::Single => Primitive::Single(reader.read_f32_le()?),
        PrimitiveType::TimeSpan => Primitive::TimeSpan(reader.read_timespan_ticks()?),
        PrimitiveType::DateTime => Primitive::DateTime(decode_datetime(reader)?),
        PrimitiveType::UInt16 => Primitive::UInt16(reader.read_u16_le()?),
        PrimitiveType::UInt32 => Primitive::UInt32(reader.read_u32_le()?),
        PrimitiveType::UInt64 => Primitive::UInt64(reader.read_u64_le()?),
        PrimitiveType::Null => Primitive::Null,
        PrimitiveType::String => Primitive::String(reader.read_length_prefixed_string()?),
    })
}

/// Splits the packed 64-bit `DateTime` field into its `ticks` (low 62 bits)
/// and `DateTimeKind` (top 2 bits), per [MS-NRBF] 2.3.1.
fn decode_datetime<R: Read>(reader: &mut BitReader<R>) -> Result<DateTimeValue> {
    let raw = reader.read_datetime_raw()?;
    let ticks = raw & 0x3FFF_FFFF_FFFF_FFFF;
    let kind = match raw >> 62 {
        0 => DateTimeKind::Unspecified,
        1 => DateTimeKind::Utc,
        2 => DateTimeKind::Local,
        _ => DateTimeKind::Unspecified,
    };
    Ok(DateTimeValue { ticks, kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_bytes(bytes: &[u8], ty: PrimitiveType) -> Primitive {
        let mut reader = BitReader::new(bytes);
        decode(&mut reader, ty).unwrap()
    }

    #[test]
    fn decodes_int64_exactly_eight_bytes() {
        let bytes = 42i64.to_le_bytes();
        assert_eq!(
            decode_bytes(&bytes, PrimitiveType::Int64),
            Primitive::Int64(42)
        );
    }

    #[test]
    fn decodes_boolean_nonzero_as_true() {
        assert_eq!(
            decode_bytes(&[5], PrimitiveType::Boolean),
            Primitive::Boolean(true)
        );
        assert_eq!(
            decode_bytes(&[0], PrimitiveType::Boolean),
            Primitive::Boolean(false)
        );
    }

    #[test]
    fn decodes_datetime_kind_and_ticks() {
        // kind = Utc (1), ticks = 5.
        let raw: u64 = (1u64 << 62) | 5;
        let bytes = raw.to_le_bytes();
        let Primitive::DateTime(value) = decode_bytes(&bytes, PrimitiveType::DateTime) else {
            panic!("expected DateTime");
        };
        assert_eq!(value.kind, DateTimeKind::Utc);
        assert_eq!(value.ticks, 5);
    }

    #[test]
    fn rejects_invalid_primitive_code() {
        let mut reader = BitReader::new(&[0xFFu8][..]);
        let err = PrimitiveType::read(&mut reader).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidPrimitiveCode(0xFF)));
    }
}
