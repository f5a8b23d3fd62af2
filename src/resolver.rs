use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{ParseError, ParseErrorKind, Result};
use crate::graph::{Node, NodeRef};
use crate::value::{ClassInstance, Value};

/// How the resolver should handle a `MemberReference` whose target id was
/// never registered — typically a truncated stream. The default (`Fail`)
/// matches the spec's invariant that every reference must resolve; `Stub`
/// is the caller-selected escape hatch for partial inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    Fail,
    Stub,
}

/// Walks the object graph in place, replacing every `MemberReference`
/// placeholder edge with the `Rc` it points to. Shared objects keep their
/// identity (two placeholders for the same id end up pointing at the same
/// allocation) and cycles are left standing — the returned graph is only
/// suitable for consumers that can walk `Rc<RefCell<_>>` graphs, not flat
/// tree-serializers such as JSON.
pub(crate) fn resolve_in_place(
    root: &NodeRef,
    registry: &BTreeMap<i32, NodeRef>,
    policy: UnresolvedPolicy,
) -> Result<()> {
    let mut visited: HashSet<*const RefCell<Node>> = HashSet::new();
    resolve_node_in_place(root, registry, &mut visited, policy)
}

fn resolve_node_in_place(
    node: &NodeRef,
    registry: &BTreeMap<i32, NodeRef>,
    visited: &mut HashSet<*const RefCell<Node>>,
    policy: UnresolvedPolicy,
) -> Result<()> {
    let ptr = Rc::as_ptr(node);
    if !visited.insert(ptr) {
        return Ok(());
    }

    let mut borrowed = node.borrow_mut();
    match &mut *borrowed {
        Node::Array(items) => {
            for item in items.iter_mut() {
                resolve_edge_in_place(item, registry, visited, policy)?;
            }
        }
        Node::Class(class) => {
            for item in class.fields.values_mut() {
                resolve_edge_in_place(item, registry, visited, policy)?;
            }
        }
        _ => {}
    }

    Ok(())
}

fn resolve_edge_in_place(
    edge: &mut NodeRef,
    registry: &BTreeMap<i32, NodeRef>,
    visited: &mut HashSet<*const RefCell<Node>>,
    policy: UnresolvedPolicy,
) -> Result<()> {
    let reference = match &*edge.borrow() {
        Node::Reference { id, offset } => Some((*id, *offset)),
        _ => None,
    };

    if let Some((id, offset)) = reference {
        match registry.get(&id) {
            Some(target) => *edge = Rc::clone(target),
            None if policy == UnresolvedPolicy::Stub => {}
            None => return Err(ParseError::new(ParseErrorKind::UnknownObjectId(id), offset)),
        }
    }

    resolve_node_in_place(edge, registry, visited, policy)
}

/// Expands the object graph from `root` into an acyclic [`Value`] tree: a
/// fresh, independent copy is produced at every occurrence of a shared
/// object, and a genuine cycle fails with [`ParseErrorKind::CyclicReference`]
/// (expansion mode never silently truncates a cycle).
pub(crate) fn resolve_expanded(
    root: &NodeRef,
    registry: &BTreeMap<i32, NodeRef>,
    policy: UnresolvedPolicy,
) -> Result<Value> {
    let id_by_ptr: HashMap<*const RefCell<Node>, i32> = registry
        .iter()
        .map(|(id, node)| (Rc::as_ptr(node), *id))
        .collect();
    let mut on_stack: HashSet<*const RefCell<Node>> = HashSet::new();
    expand(root, registry, policy, &id_by_ptr, &mut on_stack)
}

fn expand(
    node: &NodeRef,
    registry: &BTreeMap<i32, NodeRef>,
    policy: UnresolvedPolicy,
    id_by_ptr: &HashMap<*const RefCell<Node>, i32>,
    on_stack: &mut HashSet<*const RefCell<Node>>,
) -> Result<Value> {
    let ptr = Rc::as_ptr(node);

    if !on_stack.insert(ptr) {
        let id = id_by_ptr.get(&ptr).copied().unwrap_or(-1);
        return Err(ParseError::new(ParseErrorKind::CyclicReference(id), 0));
    }

    let result = expand_inner(node, registry, policy, id_by_ptr, on_stack);
    on_stack.remove(&ptr);
    result
}

fn expand_inner(
    node: &NodeRef,
    registry: &BTreeMap<i32, NodeRef>,
    policy: UnresolvedPolicy,
    id_by_ptr: &HashMap<*const RefCell<Node>, i32>,
    on_stack: &mut HashSet<*const RefCell<Node>>,
) -> Result<Value> {
    enum Shape {
        Leaf(Value),
        Reference { id: i32, offset: u64 },
        Array(Vec<NodeRef>),
        Class {
            name: String,
            library: Option<String>,
            fields: Vec<(String, NodeRef)>,
        },
    }

    let shape = {
        let borrowed = node.borrow();
        match &*borrowed {
            Node::Reference { id, offset } => Shape::Reference {
                id: *id,
                offset: *offset,
            },
            Node::Array(items) => Shape::Array(items.clone()),
            Node::Class(class) => Shape::Class {
                name: class.name.clone(),
                library: class.library.clone(),
                fields: class
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Rc::clone(v)))
                    .collect(),
            },
            other => Shape::Leaf(other.to_leaf_value().expect("leaf node has a leaf value")),
        }
    };

    match shape {
        Shape::Leaf(value) => Ok(value),
        Shape::Reference { id, offset } => match registry.get(&id) {
            Some(target) => {
                let target = Rc::clone(target);
                expand(&target, registry, policy, id_by_ptr, on_stack)
            }
            None => match policy {
                UnresolvedPolicy::Stub => Ok(Value::Reference(id)),
                UnresolvedPolicy::Fail => {
                    Err(ParseError::new(ParseErrorKind::UnknownObjectId(id), offset))
                }
            },
        },
        Shape::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(expand(item, registry, policy, id_by_ptr, on_stack)?);
            }
            Ok(Value::Array(out))
        }
        Shape::Class {
            name,
            library,
            fields,
        } => {
            let mut out = IndexMap::with_capacity(fields.len());
            for (key, value) in fields {
                out.insert(key, expand(&value, registry, policy, id_by_ptr, on_stack)?);
            }
            Ok(Value::Class(ClassInstance {
                name,
                library,
                fields: out,
            }))
        }
    }
}
