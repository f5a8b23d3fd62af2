//! A reader for the Microsoft .NET Remoting Binary Format (MS-NRBF).
//!
//! Decodes a complete MS-NRBF stream — `SerializedStreamHeader` through
//! `MessageEnd` — into a self-describing [`Value`] tree with its
//! `MemberReference` graph resolved, suitable for re-serialization as a
//! generic interchange format such as JSON.
//!
//! The entry points are [`parse_and_resolve`] (acyclic `Value` tree,
//! the common case), [`parse_in_place`] (graph-preserving, for callers
//! that can walk shared/cyclic `Rc` structure themselves), and
//! [`iter_records`] (lazy, unresolved, one top-level record at a time).

mod bitreader;
mod descriptor;
mod dispatcher;
mod driver;
mod error;
mod graph;
mod primitive;
mod records;
mod resolver;
mod tables;
mod value;

pub use driver::{iter_records, parse_and_resolve, parse_in_place, RecordIter, RecordItem};
pub use error::{ParseError, ParseErrorKind, Result};
pub use graph::{ClassNode, Node, NodeRef};
pub use primitive::{Primitive, PrimitiveType};
pub use resolver::UnresolvedPolicy;
pub use value::{ClassInstance, DateTimeKind, DateTimeValue, FloatValue, IntegerValue, Value};
