use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

/// A width- and sign-tagged integer, so a consumer re-serializing to JSON
/// (or anything else) can recover the original CLR type instead of
/// collapsing everything to one numeric type.
#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum IntegerValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum FloatValue {
    F32(f32),
    F64(f64),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum DateTimeKind {
    Unspecified,
    Utc,
    Local,
}

/// .NET ticks are 100-nanosecond intervals since `0001-01-01T00:00:00`.
/// This is the offset, in ticks, from that epoch to the Unix epoch
/// (`1970-01-01T00:00:00`), used to convert losslessly to `chrono` types
/// without assuming (as a naive `ticks / 10` cast would) that .NET's epoch
/// coincides with Unix's.
const NET_EPOCH_TICKS_TO_UNIX: i64 = 621_355_968_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub struct DateTimeValue {
    pub ticks: u64,
    pub kind: DateTimeKind,
}

impl DateTimeValue {
    /// Converts to a `chrono::NaiveDateTime`, anchored at the actual .NET
    /// epoch rather than the Unix one.
    pub fn to_naive_datetime(self) -> Option<chrono::NaiveDateTime> {
        let unix_ticks = self.ticks as i64 - NET_EPOCH_TICKS_TO_UNIX;
        let secs = unix_ticks.div_euclid(TICKS_PER_SECOND);
        let sub_tick = unix_ticks.rem_euclid(TICKS_PER_SECOND);
        let nanos = (sub_tick * 100) as u32;
        chrono::DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
    }
}

/// A decoded class instance: field names in declaration order mapped to
/// their decoded values, plus the class and (if any) library name the
/// stream tagged it with.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ClassInstance {
    pub name: String,
    pub library: Option<String>,
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
}

/// The acyclic output tree produced by expansion-mode reference
/// resolution: every [`crate::Value::Reference`] in a well-formed,
/// fully-resolved stream has been substituted by the node it points to, a
/// shallow copy at each occurrence. A `Reference` only survives into this
/// tree as a caller-requested stub for an otherwise-unresolvable id (see
/// [`crate::resolver::UnresolvedPolicy`]).
#[derive(Debug, PartialEq, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(IntegerValue),
    Float(FloatValue),
    Decimal(String),
    Char(char),
    String(Rc<str>),
    DateTime(DateTimeValue),
    TimeSpan(i64),
    Array(Vec<Value>),
    Class(ClassInstance),
    Reference(i32),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}
