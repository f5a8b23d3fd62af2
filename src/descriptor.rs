use std::io::Read;

use num_enum::TryFromPrimitive;

use crate::bitreader::BitReader;
use crate::error::{ParseErrorKind, Result};
use crate::primitive::PrimitiveType;

/// `BinaryTypeEnumeration`: how a class member or array element is typed.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, TryFromPrimitive)]
pub enum BinaryType {
    Primitive = 0,
    String = 1,
    Object = 2,
    SystemClass = 3,
    Class = 4,
    ObjectArray = 5,
    StringArray = 6,
    PrimitiveArray = 7,
}

impl BinaryType {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        let code = reader.read_u8()?;
        Self::try_from_primitive(code)
            .map_err(|_| reader.err(ParseErrorKind::UnexpectedBinaryType(code)))
    }
}

/// The operand that follows a `BinaryType` code: a second descriptor
/// naming the primitive/class/system-class the member or array holds.
#[derive(Debug, Clone)]
pub(crate) enum AdditionalInfo {
    Primitive(PrimitiveType),
    SystemClass(String),
    Class(ClassTypeInfo),
    PrimitiveArray(PrimitiveType),
    /// `String`, `Object`, `ObjectArray`, `StringArray` carry no operand.
    None,
}

impl AdditionalInfo {
    pub(crate) fn read<R: Read>(
        reader: &mut BitReader<R>,
        binary_type: BinaryType,
    ) -> Result<Self> {
        Ok(match binary_type {
            BinaryType::Primitive => {
                AdditionalInfo::Primitive(PrimitiveType::read(reader)?)
            }
            BinaryType::PrimitiveArray => {
                AdditionalInfo::PrimitiveArray(PrimitiveType::read(reader)?)
            }
            BinaryType::SystemClass => {
                AdditionalInfo::SystemClass(reader.read_length_prefixed_string()?)
            }
            BinaryType::Class => AdditionalInfo::Class(ClassTypeInfo::read(reader)?),
            BinaryType::String | BinaryType::Object | BinaryType::ObjectArray | BinaryType::StringArray => {
                AdditionalInfo::None
            }
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ClassTypeInfo {
    pub type_name: String,
    pub library_id: i32,
}

impl ClassTypeInfo {
    fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        Ok(Self {
            type_name: reader.read_length_prefixed_string()?,
            library_id: reader.read_i32_le()?,
        })
    }
}

/// `ClassInfo`: object id, class name, and declared member names, common
/// to every class-shaped record.
#[derive(Debug, Clone)]
pub(crate) struct ClassInfo {
    pub object_id: i32,
    pub name: String,
    pub member_names: Vec<String>,
}

impl ClassInfo {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        let object_id = reader.read_i32_le()?;
        let name = reader.read_length_prefixed_string()?;
        let member_count = reader.read_i32_le()?;

        let mut member_names = Vec::with_capacity(member_count.max(0) as usize);
        for _ in 0..member_count {
            member_names.push(reader.read_length_prefixed_string()?);
        }

        Ok(Self {
            object_id,
            name,
            member_names,
        })
    }
}

/// The per-member type descriptor table attached to `*WithMembersAndTypes`
/// records: one `BinaryType` + `AdditionalInfo` pair per declared member,
/// in the same order as `ClassInfo::member_names`.
#[derive(Debug, Clone)]
pub(crate) struct MemberTypeInfo {
    pub member_types: Vec<BinaryType>,
    pub additional_info: Vec<AdditionalInfo>,
}

impl MemberTypeInfo {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>, member_count: usize) -> Result<Self> {
        let mut member_types = Vec::with_capacity(member_count);
        for _ in 0..member_count {
            member_types.push(BinaryType::read(reader)?);
        }

        let mut additional_info = Vec::with_capacity(member_count);
        for binary_type in &member_types {
            additional_info.push(AdditionalInfo::read(reader, *binary_type)?);
        }

        Ok(Self {
            member_types,
            additional_info,
        })
    }
}

/// `ArrayInfo`: object id + element count, common to every single-dimension
/// array record.
#[derive(Debug, Clone)]
pub(crate) struct ArrayInfo {
    pub object_id: i32,
    pub length: i32,
}

impl ArrayInfo {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        Ok(Self {
            object_id: reader.read_i32_le()?,
            length: reader.read_i32_le()?,
        })
    }
}

/// `BinaryArrayTypeEnumeration`.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, TryFromPrimitive)]
pub enum BinaryArrayType {
    Single = 0,
    Jagged = 1,
    Rectangular = 2,
    SingleOffset = 3,
    JaggedOffset = 4,
    RectangularOffset = 5,
}

impl BinaryArrayType {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        let code = reader.read_u8()?;
        Self::try_from_primitive(code)
            .map_err(|_| reader.err(ParseErrorKind::InvalidBinaryArrayType(code)))
    }

    pub(crate) fn has_lower_bounds(self) -> bool {
        matches!(
            self,
            BinaryArrayType::SingleOffset
                | BinaryArrayType::JaggedOffset
                | BinaryArrayType::RectangularOffset
        )
    }
}

/// Bit layout of the `MessageFlags` field shared by `MethodCall` and
/// `MethodReturn`, per [MS-NRBF] 2.2.3.1. Only the `*_inline` bits gate a
/// conditional sub-record the dispatcher actually decodes; the rest are
/// kept so the full flag word is inspectable.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub(crate) struct MessageFlags {
    pub no_args: bool,
    pub args_inline: bool,
    pub args_is_array: bool,
    pub args_in_array: bool,
    pub no_context: bool,
    pub context_inline: bool,
    pub context_in_array: bool,
    pub method_signature_in_array: bool,
    pub properties_in_array: bool,
    pub no_return_value: bool,
    pub return_value_void: bool,
    pub return_value_inline: bool,
    pub return_value_in_array: bool,
    pub exception_in_array: bool,
    pub generic_method: bool,
}

mod flag_bits {
    pub const NO_ARGS: u32 = 0x0001;
    pub const ARGS_INLINE: u32 = 0x0002;
    pub const ARGS_IS_ARRAY: u32 = 0x0004;
    pub const ARGS_IN_ARRAY: u32 = 0x0008;
    pub const NO_CONTEXT: u32 = 0x0010;
    pub const CONTEXT_INLINE: u32 = 0x0020;
    pub const CONTEXT_IN_ARRAY: u32 = 0x0040;
    pub const METHOD_SIGNATURE_IN_ARRAY: u32 = 0x0080;
    pub const PROPERTIES_IN_ARRAY: u32 = 0x0100;
    pub const NO_RETURN_VALUE: u32 = 0x0200;
    pub const RETURN_VALUE_VOID: u32 = 0x0400;
    pub const RETURN_VALUE_INLINE: u32 = 0x0800;
    pub const RETURN_VALUE_IN_ARRAY: u32 = 0x1000;
    pub const EXCEPTION_IN_ARRAY: u32 = 0x2000;
    pub const GENERIC_METHOD: u32 = 0x8000;
}

impl MessageFlags {
    pub(crate) fn read<R: Read>(reader: &mut BitReader<R>) -> Result<Self> {
        let bits = reader.read_u32_le()?;
        use flag_bits::*;
        Ok(Self {
            no_args: bits & NO_ARGS != 0,
            args_inline: bits & ARGS_INLINE != 0,
            args_is_array: bits & ARGS_IS_ARRAY != 0,
            args_in_array: bits & ARGS_IN_ARRAY != 0,
            no_context: bits & NO_CONTEXT != 0,
            context_inline: bits & CONTEXT_INLINE != 0,
            context_in_array: bits & CONTEXT_IN_ARRAY != 0,
            method_signature_in_array: bits & METHOD_SIGNATURE_IN_ARRAY != 0,
            properties_in_array: bits & PROPERTIES_IN_ARRAY != 0,
            no_return_value: bits & NO_RETURN_VALUE != 0,
            return_value_void: bits & RETURN_VALUE_VOID != 0,
            return_value_inline: bits & RETURN_VALUE_INLINE != 0,
            return_value_in_array: bits & RETURN_VALUE_IN_ARRAY != 0,
            exception_in_array: bits & EXCEPTION_IN_ARRAY != 0,
            generic_method: bits & GENERIC_METHOD != 0,
        })
    }
}
