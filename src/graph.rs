use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::primitive::Primitive;
use crate::value::{ClassInstance, DateTimeValue, FloatValue, IntegerValue, Value};

/// The mutable, shared-ownership mirror of [`Value`] the object registry
/// is built from. `NodeRef`s are `Rc`-shared so that two `MemberReference`
/// records pointing at the same object id really do point at the same
/// allocation (the in-place resolution invariant), and so a class can
/// legally contain a field that (directly or transitively) points back at
/// itself.
///
/// Exposed publicly only as the return type of
/// [`crate::parse_in_place`]: callers who need the graph-preserving
/// (possibly cyclic) form walk it directly rather than through `Value`,
/// which cannot represent a cycle.
pub type NodeRef = Rc<RefCell<Node>>;

#[derive(Debug)]
pub enum Node {
    Null,
    Boolean(bool),
    Integer(IntegerValue),
    Float(FloatValue),
    Decimal(String),
    Char(char),
    String(Rc<str>),
    DateTime(DateTimeValue),
    TimeSpan(i64),
    Array(Vec<NodeRef>),
    Class(ClassNode),
    /// An unresolved `MemberReference(id)`, pending the post-parse
    /// resolution pass. `offset` is where the reference itself was read,
    /// so a dangling id can still report a useful byte offset even though
    /// resolution happens after the whole stream is consumed.
    Reference { id: i32, offset: u64 },
}

#[derive(Debug)]
pub struct ClassNode {
    pub name: String,
    pub library: Option<String>,
    pub fields: IndexMap<String, NodeRef>,
}

pub(crate) fn leaf(node: Node) -> NodeRef {
    Rc::new(RefCell::new(node))
}

impl From<Primitive> for Node {
    fn from(value: Primitive) -> Self {
        match value {
            Primitive::Boolean(v) => Node::Boolean(v),
            Primitive::Byte(v) => Node::Integer(IntegerValue::U8(v)),
            Primitive::Char(v) => Node::Char(v),
            Primitive::Decimal(v) => Node::Decimal(v),
            Primitive::Double(v) => Node::Float(FloatValue::F64(v)),
            Primitive::Int16(v) => Node::Integer(IntegerValue::I16(v)),
            Primitive::Int32(v) => Node::Integer(IntegerValue::I32(v)),
            Primitive::Int64(v) => Node::Integer(IntegerValue::I64(v)),
            Primitive::SByte(v) => Node::Integer(IntegerValue::I8(v)),
            Primitive::Single(v) => Node::Float(FloatValue::F32(v)),
            Primitive::TimeSpan(v) => Node::TimeSpan(v),
            Primitive::DateTime(v) => Node::DateTime(v),
            Primitive::UInt16(v) => Node::Integer(IntegerValue::U16(v)),
            Primitive::UInt32(v) => Node::Integer(IntegerValue::U32(v)),
            Primitive::UInt64(v) => Node::Integer(IntegerValue::U64(v)),
            Primitive::Null => Node::Null,
            Primitive::String(v) => Node::String(Rc::from(v.as_str())),
        }
    }
}

impl Node {
    pub(crate) fn from_primitive(value: Primitive) -> NodeRef {
        leaf(Node::from(value))
    }

    /// A non-recursive snapshot into [`Value`]; used by the expansion
    /// resolver once children have already been resolved to `Value`s.
    pub(crate) fn to_leaf_value(&self) -> Option<Value> {
        Some(match self {
            Node::Null => Value::Null,
            Node::Boolean(v) => Value::Boolean(*v),
            Node::Integer(v) => Value::Integer(*v),
            Node::Float(v) => Value::Float(*v),
            Node::Decimal(v) => Value::Decimal(v.clone()),
            Node::Char(v) => Value::Char(*v),
            Node::String(v) => Value::String(Rc::clone(v)),
            Node::DateTime(v) => Value::DateTime(*v),
            Node::TimeSpan(v) => Value::TimeSpan(*v),
            Node::Array(_) | Node::Class(_) | Node::Reference { .. } => return None,
        })
    }
}

/// Builds a class-instance graph node whose field order follows the class
/// layout's declared member order (per the spec's "named fields in
/// declaration order" requirement).
pub(crate) fn class_node(
    name: String,
    library: Option<String>,
    fields: IndexMap<String, NodeRef>,
) -> NodeRef {
    leaf(Node::Class(ClassNode {
        name,
        library,
        fields,
    }))
}
