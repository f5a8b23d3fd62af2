use std::io::Read;

use crate::dispatcher::{Dispatcher, RecordOutcome};
use crate::error::{ParseError, ParseErrorKind, Result};
use crate::graph::{Node, NodeRef};
use crate::resolver::{self, UnresolvedPolicy};
use crate::value::Value;

/// The fully-parsed, *unresolved* result of a single MS-NRBF stream:
/// the root object graph (still containing `Reference` placeholders)
/// plus the header fields and symbol tables a caller may want to
/// inspect before (or instead of) resolving references.
pub(crate) struct ParsedStream {
    pub(crate) root: NodeRef,
    pub(crate) root_id: i32,
}

/// Runs the dispatcher from `Initial` through `Terminated`, collecting
/// every value-bearing top-level record into the object registry, and
/// returns the node registered under the header's `root_id`.
///
/// This is the `parse` entry point from spec.md 4.7: header through
/// `MessageEnd`, no reference resolution performed yet.
pub(crate) fn parse_stream<R: Read>(input: R) -> Result<(ParsedStream, crate::tables::SymbolTables)> {
    let mut dispatcher = Dispatcher::new(input);

    loop {
        match dispatcher.step()? {
            RecordOutcome::End => break,
            RecordOutcome::Header(_) | RecordOutcome::Library(_) | RecordOutcome::Value(_) => {}
        }
    }

    let root_id = dispatcher
        .root_id()
        .expect("Terminated state implies a header was read");
    let tables = dispatcher.into_tables();

    let root = tables
        .objects
        .get(&root_id)
        .cloned()
        .ok_or_else(|| ParseError::new(ParseErrorKind::UnknownObjectId(root_id), 0))?;

    Ok((ParsedStream { root, root_id }, tables))
}

/// Parses a complete stream and resolves every `MemberReference` in
/// place, returning the (possibly cyclic, possibly sharing
/// substructure) object graph rooted at `root_id`.
pub fn parse_in_place<R: Read>(input: R, policy: UnresolvedPolicy) -> Result<NodeRef> {
    let (parsed, tables) = parse_stream(input)?;
    resolver::resolve_in_place(&parsed.root, &tables.objects, policy)?;
    Ok(parsed.root)
}

/// Parses a complete stream and expands every `MemberReference` into
/// an acyclic [`Value`] tree suitable for a flat interchange format
/// such as JSON. Fails with [`crate::error::ParseErrorKind::CyclicReference`]
/// unless `policy` is [`UnresolvedPolicy::Stub`].
pub fn parse_and_resolve<R: Read>(input: R, policy: UnresolvedPolicy) -> Result<Value> {
    let (parsed, tables) = parse_stream(input)?;
    resolver::resolve_expanded(&parsed.root, &tables.objects, policy)
}

/// Yields each top-level record's decoded value lazily, one per call to
/// `Iterator::next`, stopping at `MessageEnd`. No reference resolution
/// is performed; placeholders are returned as-is. Not restartable: the
/// underlying `Dispatcher` is consumed by the iterator.
pub fn iter_records<R: Read>(input: R) -> RecordIter<R> {
    RecordIter {
        dispatcher: Dispatcher::new(input),
        done: false,
    }
}

pub struct RecordIter<R> {
    dispatcher: Dispatcher<R>,
    done: bool,
}

impl<R: Read> Iterator for RecordIter<R> {
    type Item = Result<RecordItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.dispatcher.step() {
            Ok(RecordOutcome::End) => {
                self.done = true;
                None
            }
            Ok(RecordOutcome::Header(header)) => Some(Ok(RecordItem::Header {
                root_id: header.root_id,
            })),
            Ok(RecordOutcome::Library(library)) => Some(Ok(RecordItem::Library {
                library_id: library.library_id,
                library_name: library.library_name,
            })),
            Ok(RecordOutcome::Value(node)) => Some(Ok(RecordItem::Value(node_to_debug_value(&node)))),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// A single top-level record as seen by [`iter_records`], before any
/// reference resolution.
pub enum RecordItem {
    Header { root_id: i32 },
    Library { library_id: i32, library_name: String },
    Value(Value),
}

/// Converts a possibly-unresolved node graph to a `Value` for display
/// purposes in the lazy iterator, leaving any reference placeholder as
/// [`Value::Reference`] rather than resolving it (resolution requires
/// the complete symbol tables, which are not yet final mid-stream).
fn node_to_debug_value(node: &NodeRef) -> Value {
    match &*node.borrow() {
        Node::Reference { id, .. } => Value::Reference(*id),
        Node::Array(items) => Value::Array(items.iter().map(node_to_debug_value).collect()),
        Node::Class(class) => Value::Class(crate::value::ClassInstance {
            name: class.name.clone(),
            library: class.library.clone(),
            fields: class
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), node_to_debug_value(v)))
                .collect(),
        }),
        other => other.to_leaf_value().expect("leaf node has a leaf value"),
    }
}
