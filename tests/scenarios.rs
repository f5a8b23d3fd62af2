//! Integration tests covering the S1-S6 scenarios and the eight
//! testable properties called out for the MS-NRBF reader.

use nrbf_reader::{parse_and_resolve, parse_in_place, ParseErrorKind, UnresolvedPolicy, Value};

fn header(root_id: i32) -> Vec<u8> {
    let mut bytes = vec![0u8]; // SerializedStreamHeader
    bytes.extend(root_id.to_le_bytes());
    bytes.extend((-1i32).to_le_bytes()); // header_id
    bytes.extend(1i32.to_le_bytes()); // major version
    bytes.extend(0i32.to_le_bytes()); // minor version
    bytes
}

fn prefixed_string(bytes: &mut Vec<u8>, s: &str) {
    assert!(s.len() < 128, "test helper only handles short strings");
    bytes.push(s.len() as u8);
    bytes.extend_from_slice(s.as_bytes());
}

fn binary_object_string(bytes: &mut Vec<u8>, object_id: i32, s: &str) {
    bytes.push(6); // BinaryObjectString
    bytes.extend(object_id.to_le_bytes());
    prefixed_string(bytes, s);
}

fn message_end(bytes: &mut Vec<u8>) {
    bytes.push(11);
}

/// S1 - a single string at the root.
#[test]
fn s1_root_string() {
    let mut bytes = header(1);
    binary_object_string(&mut bytes, 1, "hello");
    message_end(&mut bytes);

    let value = parse_and_resolve(&bytes[..], UnresolvedPolicy::Fail).unwrap();
    match value {
        Value::String(s) => assert_eq!(&*s, "hello"),
        other => panic!("expected a string, got {other:?}"),
    }
}

/// S2 - a class with two typed Int32 members, in one library.
#[test]
fn s2_class_with_primitive_members() {
    let mut bytes = header(2);

    bytes.push(12); // BinaryLibrary
    bytes.extend(1i32.to_le_bytes());
    prefixed_string(&mut bytes, "asm");

    bytes.push(5); // ClassWithMembersAndTypes
    bytes.extend(2i32.to_le_bytes()); // object id
    prefixed_string(&mut bytes, "Foo");
    bytes.extend(2i32.to_le_bytes()); // member count
    prefixed_string(&mut bytes, "x");
    prefixed_string(&mut bytes, "y");
    bytes.push(0); // BinaryType::Primitive for x
    bytes.push(0); // BinaryType::Primitive for y
    bytes.push(8); // PrimitiveType::Int32 for x
    bytes.push(8); // PrimitiveType::Int32 for y
    bytes.extend(1i32.to_le_bytes()); // library id

    bytes.extend(42i32.to_le_bytes()); // raw x value
    bytes.extend(7i32.to_le_bytes()); // raw y value

    message_end(&mut bytes);

    let value = parse_and_resolve(&bytes[..], UnresolvedPolicy::Fail).unwrap();
    let Value::Class(class) = value else {
        panic!("expected a class instance");
    };
    assert_eq!(class.name, "Foo");
    assert_eq!(class.library.as_deref(), Some("asm"));
    assert_eq!(class.fields.get("x"), Some(&Value::Integer(nrbf_reader::IntegerValue::I32(42))));
    assert_eq!(class.fields.get("y"), Some(&Value::Integer(nrbf_reader::IntegerValue::I32(7))));
}

/// S3 - two members referencing the same shared string object.
#[test]
fn s3_shared_reference_expands_to_two_copies() {
    let mut full = header(6); // root is the class below (object id 6)
    full.push(12); // BinaryLibrary
    full.extend(1i32.to_le_bytes());
    prefixed_string(&mut full, "asm");
    binary_object_string(&mut full, 5, "shared");
    full.push(3); // ClassWithMembers
    full.extend(6i32.to_le_bytes());
    prefixed_string(&mut full, "Bar");
    full.extend(2i32.to_le_bytes());
    prefixed_string(&mut full, "a");
    prefixed_string(&mut full, "b");
    full.extend(1i32.to_le_bytes());
    full.push(9); // MemberReference for a
    full.extend(5i32.to_le_bytes());
    full.push(9); // MemberReference for b
    full.extend(5i32.to_le_bytes());
    message_end(&mut full);

    let value = parse_and_resolve(&full[..], UnresolvedPolicy::Fail).unwrap();
    let Value::Class(class) = value else {
        panic!("expected a class instance");
    };
    let a = class.fields.get("a").unwrap();
    let b = class.fields.get("b").unwrap();
    match (a, b) {
        (Value::String(a), Value::String(b)) => {
            assert_eq!(&**a, "shared");
            assert_eq!(&**b, "shared");
        }
        other => panic!("unexpected fields {other:?}"),
    }

    // in-place mode: both fields point at the literal same allocation.
    let graph = parse_in_place(&full[..], UnresolvedPolicy::Fail).unwrap();
    let class_node = graph.borrow();
    let nrbf_reader::Node::Class(class) = &*class_node else {
        panic!("expected a class node");
    };
    let a_ptr = std::rc::Rc::as_ptr(class.fields.get("a").unwrap());
    let b_ptr = std::rc::Rc::as_ptr(class.fields.get("b").unwrap());
    assert_eq!(a_ptr, b_ptr, "both references should share the same allocation");
}

/// S4 - a null run inside an ArraySingleObject.
#[test]
fn s4_null_run_in_object_array() {
    let mut bytes = header(3); // root is the array below (object id 3)

    bytes.push(16); // ArraySingleObject
    bytes.extend(3i32.to_le_bytes()); // object id
    bytes.extend(5i32.to_le_bytes()); // length

    binary_object_string(&mut bytes, 4, "a");
    bytes.push(13); // ObjectNullMultiple256
    bytes.push(3);
    binary_object_string(&mut bytes, 5, "b");

    message_end(&mut bytes);

    let value = parse_and_resolve(&bytes[..], UnresolvedPolicy::Fail).unwrap();
    let Value::Array(items) = value else {
        panic!("expected an array");
    };
    assert_eq!(items.len(), 5);
    assert!(matches!(&items[0], Value::String(s) if &**s == "a"));
    assert!(items[1].is_null());
    assert!(items[2].is_null());
    assert!(items[3].is_null());
    assert!(matches!(&items[4], Value::String(s) if &**s == "b"));
}

/// S5 - two instances of the same class layout, the second via ClassWithId.
#[test]
fn s5_class_reuse_via_class_with_id() {
    let mut b = header(10);
    b.push(12);
    b.extend(1i32.to_le_bytes());
    prefixed_string(&mut b, "asm");
    b.push(5);
    b.extend(2i32.to_le_bytes());
    prefixed_string(&mut b, "Point");
    b.extend(2i32.to_le_bytes());
    prefixed_string(&mut b, "x");
    prefixed_string(&mut b, "y");
    b.push(0);
    b.push(0);
    b.push(8);
    b.push(8);
    b.extend(1i32.to_le_bytes());
    b.extend(1i32.to_le_bytes());
    b.extend(2i32.to_le_bytes());

    b.push(1); // ClassWithId
    b.extend(10i32.to_le_bytes());
    b.extend(2i32.to_le_bytes());
    b.extend(3i32.to_le_bytes());
    b.extend(4i32.to_le_bytes());

    message_end(&mut b);

    let value = parse_and_resolve(&b[..], UnresolvedPolicy::Fail).unwrap();
    let Value::Class(class) = value else {
        panic!("expected a class instance");
    };
    assert_eq!(class.name, "Point");
    assert_eq!(class.fields.get("x"), Some(&Value::Integer(nrbf_reader::IntegerValue::I32(3))));
    assert_eq!(class.fields.get("y"), Some(&Value::Integer(nrbf_reader::IntegerValue::I32(4))));
}

/// S6 - a BinaryArray with rank 2 must be rejected.
#[test]
fn s6_unsupported_array_shape_is_rejected() {
    let mut bytes = header(6);

    bytes.push(7); // BinaryArray
    bytes.extend(1i32.to_le_bytes()); // object id
    bytes.push(2); // BinaryArrayType::Rectangular
    bytes.extend(2i32.to_le_bytes()); // rank = 2

    let err = parse_and_resolve(&bytes[..], UnresolvedPolicy::Fail).unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::UnsupportedArrayShape(_)));
}

/// Property: parsing fails if the first byte is not SerializedStreamHeader.
#[test]
fn header_first_is_enforced() {
    let bytes = [11u8]; // MessageEnd as the first byte
    let err = parse_and_resolve(&bytes[..], UnresolvedPolicy::Fail).unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::InvalidHeader(_)));
}

/// Property: a well-formed prefix truncated before MessageEnd fails.
#[test]
fn truncation_before_message_end_fails() {
    let mut bytes = header(1);
    binary_object_string(&mut bytes, 1, "x");
    // no MessageEnd.
    let err = parse_and_resolve(&bytes[..], UnresolvedPolicy::Fail).unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::UnexpectedEndOfStream));
}

/// Property: duplicate object ids are rejected.
#[test]
fn duplicate_object_id_is_rejected() {
    let mut bytes = header(1);
    binary_object_string(&mut bytes, 1, "first");
    binary_object_string(&mut bytes, 1, "second");
    message_end(&mut bytes);

    let err = parse_and_resolve(&bytes[..], UnresolvedPolicy::Fail).unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::DuplicateId(1)));
}

/// Property: an unresolvable reference fails unless the caller opts into
/// stub substitution.
#[test]
fn unresolved_reference_fails_by_default_but_can_be_stubbed() {
    // Root is a class (object id 1) whose only member is a dangling reference,
    // so the reference - not the root lookup itself - is what fails to resolve.
    let mut bytes = header(1);
    bytes.push(2); // SystemClassWithMembers
    bytes.extend(1i32.to_le_bytes()); // object id
    prefixed_string(&mut bytes, "Foo");
    bytes.extend(1i32.to_le_bytes()); // member count
    prefixed_string(&mut bytes, "ref");
    bytes.push(9); // MemberReference
    bytes.extend(999i32.to_le_bytes());
    message_end(&mut bytes);

    let err = parse_and_resolve(&bytes[..], UnresolvedPolicy::Fail).unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::UnknownObjectId(999)));

    let value = parse_and_resolve(&bytes[..], UnresolvedPolicy::Stub).unwrap();
    let Value::Class(class) = value else {
        panic!("expected a class instance");
    };
    assert!(matches!(class.fields.get("ref"), Some(Value::Reference(999))));
}
