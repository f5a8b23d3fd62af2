use std::io::Read;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, trace};

use crate::bitreader::BitReader;
use crate::descriptor::{
    AdditionalInfo, ArrayInfo, BinaryArrayType, BinaryType, ClassInfo, MemberTypeInfo, MessageFlags,
};
use crate::error::{ParseErrorKind, Result};
use crate::graph::{self, class_node, Node, NodeRef};
use crate::primitive::{self, Primitive, PrimitiveType};
use crate::records::{
    ArrayOfValueWithCode, BinaryLibraryRecord, RecordType, SerializationHeader,
    StringValueWithCode, ValueWithCode,
};
use crate::tables::SymbolTables;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum State {
    Initial,
    Ready,
    Terminated,
}

/// What a single fully-decoded top-level record turned out to be. Nested
/// reads (class members, array elements) only ever see the `Value` arm —
/// `next_value` rejects the rest as out of context.
pub(crate) enum RecordOutcome {
    Header(SerializationHeader),
    Library(BinaryLibraryRecord),
    End,
    Value(NodeRef),
}

/// The record-dispatch state machine: `Initial -> Ready -> Terminated`.
/// Owns the single `BitReader` for a parse and the three symbol tables it
/// populates as it goes. One discriminant byte is read per call to
/// [`Dispatcher::step`]; nested container records (classes, arrays) recurse
/// back into the same decode machinery without consuming another top-level
/// step.
pub(crate) struct Dispatcher<R> {
    reader: BitReader<R>,
    tables: SymbolTables,
    state: State,
    root_id: Option<i32>,
    /// Remaining `Null`s owed by an in-progress `ObjectNullMultiple*` run,
    /// consumed one at a time by subsequent calls to `next_value`/`next`
    /// without reading another discriminant byte.
    null_pending: usize,
}

impl<R: Read> Dispatcher<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            reader: BitReader::new(inner),
            tables: SymbolTables::new(),
            state: State::Initial,
            root_id: None,
            null_pending: 0,
        }
    }

    pub(crate) fn root_id(&self) -> Option<i32> {
        self.root_id
    }

    pub(crate) fn tables(&self) -> &SymbolTables {
        &self.tables
    }

    pub(crate) fn into_tables(self) -> SymbolTables {
        self.tables
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.state == State::Terminated
    }

    /// Reads and fully decodes the next top-level record, enforcing the
    /// `Initial -> Ready -> Terminated` state machine: the first record
    /// must be the stream header, and no record may follow `MessageEnd`.
    pub(crate) fn step(&mut self) -> Result<RecordOutcome> {
        if self.state == State::Terminated {
            return Err(self.reader.err(ParseErrorKind::StreamTerminated));
        }

        let outcome = self.next()?;

        match (&outcome, self.state) {
            (RecordOutcome::Header(header), State::Initial) => {
                self.root_id = Some(header.root_id);
                self.state = State::Ready;
            }
            (RecordOutcome::Header(_), _) => {
                return Err(self
                    .reader
                    .err(ParseErrorKind::UnexpectedRecordInContext("duplicate stream header")));
            }
            (_, State::Initial) => {
                return Err(self.reader.err(ParseErrorKind::InvalidHeader(
                    "the first record in a stream must be SerializedStreamHeader",
                )));
            }
            _ => {}
        }

        if matches!(outcome, RecordOutcome::End) {
            self.state = State::Terminated;
        }

        Ok(outcome)
    }

    /// Reads one record, fully absorbing `ObjectNullMultiple*` runs into a
    /// sequence of `Value(Null)` outcomes so no caller ever has to special
    /// case a null run directly.
    fn next(&mut self) -> Result<RecordOutcome> {
        if self.null_pending > 0 {
            self.null_pending -= 1;
            return Ok(RecordOutcome::Value(graph::leaf(Node::Null)));
        }

        match self.read_one()? {
            NullRunOr::NullRun(count) => {
                if count == 0 {
                    self.next()
                } else {
                    self.null_pending = count - 1;
                    Ok(RecordOutcome::Value(graph::leaf(Node::Null)))
                }
            }
            NullRunOr::Outcome(outcome) => Ok(outcome),
        }
    }

    /// Reads one value-bearing record appropriate for a nested context
    /// (class member, array element). Errors if the next record is a
    /// control record (header/library/end) that has no business appearing
    /// there.
    fn next_value(&mut self) -> Result<NodeRef> {
        match self.next()? {
            RecordOutcome::Value(node) => Ok(node),
            _ => Err(self
                .reader
                .err(ParseErrorKind::UnexpectedRecordInContext("expected a value-bearing record"))),
        }
    }

    fn decode_member(&mut self, binary_type: BinaryType, info: &AdditionalInfo) -> Result<NodeRef> {
        match (binary_type, info) {
            (BinaryType::Primitive, AdditionalInfo::Primitive(primitive_type)) => {
                let value = primitive::decode(&mut self.reader, *primitive_type)?;
                Ok(Node::from_primitive(value))
            }
            _ => self.next_value(),
        }
    }

    fn read_one(&mut self) -> Result<NullRunOr> {
        let offset = self.reader.offset();
        let record_type = RecordType::read(&mut self.reader)?;
        trace!("record {:?} at offset {}", record_type, offset);

        Ok(NullRunOr::Outcome(match record_type {
            RecordType::SerializedStreamHeader => {
                RecordOutcome::Header(SerializationHeader::read(&mut self.reader)?)
            }
            RecordType::BinaryLibrary => {
                let record = BinaryLibraryRecord::read(&mut self.reader)?;
                debug!("library {} = {}", record.library_id, record.library_name);
                self.tables
                    .register_library(record.library_id, record.library_name.clone(), offset)?;
                RecordOutcome::Library(record)
            }
            RecordType::MessageEnd => RecordOutcome::End,
            RecordType::ObjectNull => RecordOutcome::Value(graph::leaf(Node::Null)),
            RecordType::ObjectNullMultiple256 => {
                let count = self.reader.read_u8()? as usize;
                return Ok(NullRunOr::NullRun(count));
            }
            RecordType::ObjectNullMultiple => {
                let count = self.reader.read_i32_le()?.max(0) as usize;
                return Ok(NullRunOr::NullRun(count));
            }
            RecordType::MemberReference => {
                let id = self.reader.read_i32_le()?;
                RecordOutcome::Value(graph::leaf(Node::Reference { id, offset }))
            }
            RecordType::BinaryObjectString => {
                let object_id = self.reader.read_i32_le()?;
                let text = self.reader.read_length_prefixed_string()?;
                let node = graph::leaf(Node::String(Rc::from(text.as_str())));
                self.tables.register_object(object_id, Rc::clone(&node), offset)?;
                RecordOutcome::Value(node)
            }
            RecordType::MemberPrimitiveTyped => {
                let primitive_type = PrimitiveType::read(&mut self.reader)?;
                let value = primitive::decode(&mut self.reader, primitive_type)?;
                RecordOutcome::Value(Node::from_primitive(value))
            }
            RecordType::ClassWithMembersAndTypes => {
                RecordOutcome::Value(self.decode_class_with_types(false, offset)?)
            }
            RecordType::SystemClassWithMembersAndTypes => {
                RecordOutcome::Value(self.decode_class_with_types(true, offset)?)
            }
            RecordType::ClassWithMembers => {
                RecordOutcome::Value(self.decode_class_members_only(false, offset)?)
            }
            RecordType::SystemClassWithMembers => {
                RecordOutcome::Value(self.decode_class_members_only(true, offset)?)
            }
            RecordType::ClassWithId => RecordOutcome::Value(self.decode_class_with_id(offset)?),
            RecordType::ArraySinglePrimitive => {
                RecordOutcome::Value(self.decode_array_single_primitive(offset)?)
            }
            RecordType::ArraySingleObject => {
                RecordOutcome::Value(self.decode_array_single_generic(offset)?)
            }
            RecordType::ArraySingleString => {
                RecordOutcome::Value(self.decode_array_single_generic(offset)?)
            }
            RecordType::BinaryArray => RecordOutcome::Value(self.decode_binary_array(offset)?),
            RecordType::MethodCall => RecordOutcome::Value(self.decode_method_call(offset)?),
            RecordType::MethodReturn => RecordOutcome::Value(self.decode_method_return(offset)?),
        }))
    }

    fn decode_class_with_types(&mut self, is_system: bool, offset: u64) -> Result<NodeRef> {
        let info = ClassInfo::read(&mut self.reader)?;
        let member_type_info = MemberTypeInfo::read(&mut self.reader, info.member_names.len())?;

        let library_id = if is_system {
            None
        } else {
            let id = self.reader.read_i32_le()?;
            self.tables.lookup_library(id, offset)?;
            Some(id)
        };
        let library_name = library_id.and_then(|id| self.tables.libraries.get(&id).cloned());

        let member_types: Vec<(BinaryType, AdditionalInfo)> = member_type_info
            .member_types
            .iter()
            .copied()
            .zip(member_type_info.additional_info.iter().cloned())
            .collect();

        self.tables
            .register_class(&info, library_id, Some(member_types.clone()), offset)?;

        let mut fields = IndexMap::with_capacity(info.member_names.len());
        for (name, (binary_type, additional_info)) in info.member_names.iter().zip(member_types.iter()) {
            let value = self.decode_member(*binary_type, additional_info)?;
            fields.insert(name.clone(), value);
        }

        let node = class_node(info.name.clone(), library_name, fields);
        self.tables.register_object(info.object_id, Rc::clone(&node), offset)?;
        debug!("class {} (object {})", info.name, info.object_id);
        Ok(node)
    }

    fn decode_class_members_only(&mut self, is_system: bool, offset: u64) -> Result<NodeRef> {
        let info = ClassInfo::read(&mut self.reader)?;

        let library_id = if is_system {
            None
        } else {
            let id = self.reader.read_i32_le()?;
            self.tables.lookup_library(id, offset)?;
            Some(id)
        };
        let library_name = library_id.and_then(|id| self.tables.libraries.get(&id).cloned());

        self.tables.register_class(&info, library_id, None, offset)?;

        let mut fields = IndexMap::with_capacity(info.member_names.len());
        for name in &info.member_names {
            let value = self.next_value()?;
            fields.insert(name.clone(), value);
        }

        let node = class_node(info.name.clone(), library_name, fields);
        self.tables.register_object(info.object_id, Rc::clone(&node), offset)?;
        Ok(node)
    }

    fn decode_class_with_id(&mut self, offset: u64) -> Result<NodeRef> {
        let object_id = self.reader.read_i32_le()?;
        let metadata_id = self.reader.read_i32_le()?;
        let layout = self.tables.lookup_class(metadata_id, offset)?.clone();

        let mut fields = IndexMap::with_capacity(layout.member_names.len());
        match &layout.member_types {
            Some(member_types) => {
                for (name, (binary_type, additional_info)) in
                    layout.member_names.iter().zip(member_types.iter())
                {
                    let value = self.decode_member(*binary_type, additional_info)?;
                    fields.insert(name.clone(), value);
                }
            }
            None => {
                for name in &layout.member_names {
                    let value = self.next_value()?;
                    fields.insert(name.clone(), value);
                }
            }
        }

        let library_name = layout.library_id.and_then(|id| self.tables.libraries.get(&id).cloned());
        let node = class_node(layout.name.clone(), library_name, fields);
        self.tables.register_object(object_id, Rc::clone(&node), offset)?;
        Ok(node)
    }

    fn decode_array_single_primitive(&mut self, offset: u64) -> Result<NodeRef> {
        let array_info = ArrayInfo::read(&mut self.reader)?;
        let primitive_type = PrimitiveType::read(&mut self.reader)?;

        let mut items = Vec::with_capacity(array_info.length.max(0) as usize);
        for _ in 0..array_info.length.max(0) {
            let value = primitive::decode(&mut self.reader, primitive_type)?;
            items.push(Node::from_primitive(value));
        }

        let node = graph::leaf(Node::Array(items));
        self.tables
            .register_object(array_info.object_id, Rc::clone(&node), offset)?;
        Ok(node)
    }

    /// Shared by `ArraySingleObject` and `ArraySingleString`: both are a
    /// length-prefixed sequence of value-bearing records (objects,
    /// strings, nulls, references) with no further per-element type tag.
    fn decode_array_single_generic(&mut self, offset: u64) -> Result<NodeRef> {
        let array_info = ArrayInfo::read(&mut self.reader)?;

        let mut items = Vec::with_capacity(array_info.length.max(0) as usize);
        for _ in 0..array_info.length.max(0) {
            items.push(self.next_value()?);
        }

        let node = graph::leaf(Node::Array(items));
        self.tables
            .register_object(array_info.object_id, Rc::clone(&node), offset)?;
        Ok(node)
    }

    fn decode_binary_array(&mut self, offset: u64) -> Result<NodeRef> {
        let object_id = self.reader.read_i32_le()?;
        let array_type = BinaryArrayType::read(&mut self.reader)?;
        let rank = self.reader.read_i32_le()?;

        if array_type.has_lower_bounds() {
            return Err(self
                .reader
                .err(ParseErrorKind::UnsupportedArrayShape("offset arrays are not supported")));
        }
        if rank != 1 {
            return Err(self.reader.err(ParseErrorKind::UnsupportedArrayShape(
                "only rank-1 arrays are supported",
            )));
        }

        let length = self.reader.read_i32_le()?;
        let binary_type = BinaryType::read(&mut self.reader)?;
        let additional_info = AdditionalInfo::read(&mut self.reader, binary_type)?;

        let mut items = Vec::with_capacity(length.max(0) as usize);
        for _ in 0..length.max(0) {
            items.push(self.decode_member(binary_type, &additional_info)?);
        }

        let node = graph::leaf(Node::Array(items));
        self.tables.register_object(object_id, Rc::clone(&node), offset)?;
        Ok(node)
    }

    fn decode_method_call(&mut self, _offset: u64) -> Result<NodeRef> {
        let flags = MessageFlags::read(&mut self.reader)?;
        let method_name = StringValueWithCode::read(&mut self.reader)?.0;
        let type_name = StringValueWithCode::read(&mut self.reader)?.0;

        let call_context = if flags.context_inline {
            Some(StringValueWithCode::read(&mut self.reader)?.0)
        } else {
            None
        };

        let args = if flags.args_inline {
            Some(ArrayOfValueWithCode::read(&mut self.reader)?.0)
        } else {
            None
        };

        let mut fields = IndexMap::new();
        fields.insert("method_name".to_string(), Node::from_primitive(Primitive::String(method_name)));
        fields.insert("type_name".to_string(), Node::from_primitive(Primitive::String(type_name)));
        fields.insert(
            "call_context".to_string(),
            match call_context {
                Some(s) => Node::from_primitive(Primitive::String(s)),
                None => graph::leaf(Node::Null),
            },
        );
        fields.insert(
            "args".to_string(),
            match args {
                Some(values) => graph::leaf(Node::Array(values.into_iter().map(Node::from_primitive).collect())),
                None => graph::leaf(Node::Null),
            },
        );

        Ok(class_node("MethodCall".to_string(), None, fields))
    }

    fn decode_method_return(&mut self, _offset: u64) -> Result<NodeRef> {
        let flags = MessageFlags::read(&mut self.reader)?;

        let return_value = if flags.return_value_inline {
            Some(ValueWithCode::read(&mut self.reader)?.0)
        } else {
            None
        };

        let call_context = if flags.context_inline {
            Some(StringValueWithCode::read(&mut self.reader)?.0)
        } else {
            None
        };

        let args = if flags.args_inline {
            Some(ArrayOfValueWithCode::read(&mut self.reader)?.0)
        } else {
            None
        };

        let mut fields = IndexMap::new();
        fields.insert(
            "return_value".to_string(),
            match return_value {
                Some(v) => Node::from_primitive(v),
                None => graph::leaf(Node::Null),
            },
        );
        fields.insert(
            "call_context".to_string(),
            match call_context {
                Some(s) => Node::from_primitive(Primitive::String(s)),
                None => graph::leaf(Node::Null),
            },
        );
        fields.insert(
            "args".to_string(),
            match args {
                Some(values) => graph::leaf(Node::Array(values.into_iter().map(Node::from_primitive).collect())),
                None => graph::leaf(Node::Null),
            },
        );

        Ok(class_node("MethodReturn".to_string(), None, fields))
    }
}

enum NullRunOr {
    NullRun(usize),
    Outcome(RecordOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::IntegerValue;

    fn header_bytes(root_id: i32) -> Vec<u8> {
        let mut bytes = vec![0u8]; // SerializedStreamHeader
        bytes.extend(root_id.to_le_bytes());
        bytes.extend(1i32.to_le_bytes()); // header_id
        bytes.extend(1i32.to_le_bytes()); // major version
        bytes.extend(0i32.to_le_bytes()); // minor version
        bytes
    }

    #[test]
    fn rejects_stream_not_starting_with_header() {
        let mut dispatcher = Dispatcher::new(&[11u8][..]); // MessageEnd first
        let err = dispatcher.step().unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidHeader(_)));
    }

    #[test]
    fn accepts_well_formed_header_then_end() {
        let mut bytes = header_bytes(1);
        bytes.push(11); // MessageEnd
        let mut dispatcher = Dispatcher::new(&bytes[..]);

        assert!(matches!(dispatcher.step().unwrap(), RecordOutcome::Header(_)));
        assert!(matches!(dispatcher.step().unwrap(), RecordOutcome::End));
        assert!(dispatcher.is_terminated());
        assert!(dispatcher.step().is_err());
    }

    #[test]
    fn expands_null_multiple_256_run_across_calls() {
        // ObjectNullMultiple256 with count = 3, followed by MessageEnd.
        let bytes = [13u8, 3, 11];
        let mut dispatcher = Dispatcher::new(&bytes[..]);
        dispatcher.state = State::Ready;

        for _ in 0..3 {
            match dispatcher.next().unwrap() {
                RecordOutcome::Value(node) => assert!(matches!(&*node.borrow(), Node::Null)),
                _ => panic!("expected a null value"),
            }
        }
        assert!(matches!(dispatcher.next().unwrap(), RecordOutcome::End));
    }

    #[test]
    fn decodes_binary_object_string_and_registers_it() {
        let mut bytes = vec![6u8]; // BinaryObjectString
        bytes.extend(7i32.to_le_bytes()); // object id
        bytes.push(5); // length prefix
        bytes.extend_from_slice(b"hello");
        let mut dispatcher = Dispatcher::new(&bytes[..]);
        dispatcher.state = State::Ready;

        let RecordOutcome::Value(node) = dispatcher.next().unwrap() else {
            panic!("expected a value");
        };
        match &*node.borrow() {
            Node::String(s) => assert_eq!(&**s, "hello"),
            other => panic!("unexpected node {other:?}"),
        }
        assert!(dispatcher.tables().objects.contains_key(&7));
    }

    #[test]
    fn rejects_non_rank_one_binary_array() {
        let mut bytes = vec![7u8]; // BinaryArray
        bytes.extend(1i32.to_le_bytes()); // object id
        bytes.push(2); // BinaryArrayType::Rectangular
        bytes.extend(2i32.to_le_bytes()); // rank = 2
        let mut dispatcher = Dispatcher::new(&bytes[..]);
        dispatcher.state = State::Ready;

        let err = dispatcher.next().unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnsupportedArrayShape(_)));
    }

    #[test]
    fn decodes_method_call_with_inline_args_only() {
        let mut bytes = vec![21u8]; // MethodCall
        bytes.extend(0x0002u32.to_le_bytes()); // MessageFlags: ARGS_INLINE only

        bytes.push(1); // BinaryType::String for method_name
        bytes.push(3);
        bytes.extend_from_slice(b"Foo");

        bytes.push(1); // BinaryType::String for type_name
        bytes.push(3);
        bytes.extend_from_slice(b"Bar");

        bytes.extend(1i32.to_le_bytes()); // args length
        bytes.push(8); // PrimitiveType::Int32
        bytes.extend(5i32.to_le_bytes());

        let mut dispatcher = Dispatcher::new(&bytes[..]);
        dispatcher.state = State::Ready;

        let RecordOutcome::Value(node) = dispatcher.next().unwrap() else {
            panic!("expected a value");
        };
        let Node::Class(class) = &*node.borrow() else {
            panic!("expected a class-shaped node");
        };
        assert_eq!(class.name, "MethodCall");
        match &*class.fields.get("method_name").unwrap().borrow() {
            Node::String(s) => assert_eq!(&**s, "Foo"),
            other => panic!("unexpected method_name {other:?}"),
        }
        match &*class.fields.get("call_context").unwrap().borrow() {
            Node::Null => {}
            other => panic!("expected no inline call context, got {other:?}"),
        }
        match &*class.fields.get("args").unwrap().borrow() {
            Node::Array(items) => {
                assert_eq!(items.len(), 1);
                assert!(matches!(&*items[0].borrow(), Node::Integer(IntegerValue::I32(5))));
            }
            other => panic!("unexpected args {other:?}"),
        }
    }
}
