use std::collections::BTreeMap;

use crate::descriptor::{BinaryType, ClassInfo};
use crate::error::{ParseErrorKind, Result};
use crate::graph::NodeRef;

/// A registered class layout: enough information to decode later
/// `ClassWithId` instances that reuse it, and to know each member's shape
/// without re-reading type descriptors.
#[derive(Debug, Clone)]
pub(crate) struct ClassLayout {
    pub name: String,
    pub library_id: Option<i32>,
    pub member_names: Vec<String>,
    /// `None` for the members-only variants (`ClassWithMembers`,
    /// `SystemClassWithMembers`), whose member shapes are instead
    /// self-describing via the records that follow.
    pub member_types: Option<Vec<(BinaryType, crate::descriptor::AdditionalInfo)>>,
}

/// The three append-only maps a single stream parse populates: library
/// id -> name, class metadata id -> layout, object id -> decoded node.
/// Created at parse entry, mutated only by the dispatcher, consumed by
/// the resolver, and dropped when the parse completes.
#[derive(Debug, Default)]
pub(crate) struct SymbolTables {
    pub libraries: BTreeMap<i32, String>,
    pub classes: BTreeMap<i32, ClassLayout>,
    pub objects: BTreeMap<i32, NodeRef>,
}

impl SymbolTables {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register_library(&mut self, id: i32, name: String, offset: u64) -> Result<()> {
        if self.libraries.insert(id, name).is_some() {
            return Err(crate::error::ParseError::new(
                ParseErrorKind::DuplicateId(id),
                offset,
            ));
        }
        Ok(())
    }

    pub(crate) fn register_class(
        &mut self,
        info: &ClassInfo,
        library_id: Option<i32>,
        member_types: Option<Vec<(BinaryType, crate::descriptor::AdditionalInfo)>>,
        offset: u64,
    ) -> Result<()> {
        let layout = ClassLayout {
            name: info.name.clone(),
            library_id,
            member_names: info.member_names.clone(),
            member_types,
        };
        if self.classes.insert(info.object_id, layout).is_some() {
            return Err(crate::error::ParseError::new(
                ParseErrorKind::DuplicateId(info.object_id),
                offset,
            ));
        }
        Ok(())
    }

    pub(crate) fn lookup_class(&self, metadata_id: i32, offset: u64) -> Result<&ClassLayout> {
        self.classes
            .get(&metadata_id)
            .ok_or_else(|| crate::error::ParseError::new(ParseErrorKind::UnknownClass(metadata_id), offset))
    }

    pub(crate) fn lookup_library(&self, library_id: i32, offset: u64) -> Result<&str> {
        self.libraries
            .get(&library_id)
            .map(|s| s.as_str())
            .ok_or_else(|| {
                crate::error::ParseError::new(ParseErrorKind::UnknownLibrary(library_id), offset)
            })
    }

    pub(crate) fn register_object(&mut self, id: i32, node: NodeRef, offset: u64) -> Result<()> {
        if self.objects.insert(id, node).is_some() {
            return Err(crate::error::ParseError::new(
                ParseErrorKind::DuplicateId(id),
                offset,
            ));
        }
        Ok(())
    }
}
