use thiserror::Error;

/// A single failure in decoding an MS-NRBF stream, tagged with the byte
/// offset at which it was detected.
///
/// All variants are fatal to the current parse; MS-NRBF has no framing
/// beyond the one-byte record discriminant, so there is no way to
/// resynchronize after a bad read.
#[derive(Error, Debug)]
#[error("{kind} (at byte offset {offset})")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: u64,
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, offset: u64) -> Self {
        Self { kind, offset }
    }
}

#[derive(Error, Debug)]
pub enum ParseErrorKind {
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid record type code {0}")]
    InvalidRecordType(u8),

    #[error("invalid primitive type code {0}")]
    InvalidPrimitiveCode(u8),

    #[error("invalid binary type code {0}")]
    UnexpectedBinaryType(u8),

    #[error("invalid binary array type code {0}")]
    InvalidBinaryArrayType(u8),

    #[error("invalid stream header: {0}")]
    InvalidHeader(&'static str),

    #[error("unexpected record in this context: {0}")]
    UnexpectedRecordInContext(&'static str),

    #[error("duplicate id {0}")]
    DuplicateId(i32),

    #[error("reference to unknown object id {0}")]
    UnknownObjectId(i32),

    #[error("reference to unknown class metadata id {0}")]
    UnknownClass(i32),

    #[error("reference to unknown library id {0}")]
    UnknownLibrary(i32),

    #[error("unsupported array shape: {0}")]
    UnsupportedArrayShape(&'static str),

    #[error("cyclic reference detected while expanding object {0}")]
    CyclicReference(i32),

    #[error("invalid UTF-8 in string")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("invalid UTF-16 char encoding")]
    InvalidChar,

    #[error("invalid decimal literal {0:?}")]
    InvalidDecimal(String),

    #[error("invalid timespan encoding")]
    InvalidTimeSpan,

    #[error("the stream already reached MessageEnd; no further records may follow")]
    StreamTerminated,
}

pub type Result<T> = std::result::Result<T, ParseError>;
