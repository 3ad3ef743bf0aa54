//! CollectTypes + UpdateOffsets (spec.md §4.5).
//!
//! Runs once, before `ApplyTypeAnnotations`, so it resolves struct field
//! annotations itself rather than relying on the node's `data_type` slot
//! (which annotation application hasn't touched yet). A struct is only
//! added to the returned map once every field's annotation resolves —
//! either to a primitive or to an earlier entry in the same map, letting
//! structs reference structs declared earlier in the file.

use indexmap::IndexMap;

use crate::ast::{DeclStruct, Node};
use crate::types::{DataType, Primitive, StructField, StructType};

pub type TypesMap = IndexMap<String, DataType>;

/// Walks the whole tree, resolving every `DeclStruct` it can and assigning
/// field offsets for newly resolved structs. Returns the accumulated map;
/// call again (e.g. from a later fixpoint iteration) to pick up structs that
/// depend on ones resolved this time.
pub fn run(root: &mut Node) -> TypesMap {
    let mut types = TypesMap::new();
    walk(root, &mut types);
    types
}

fn walk(node: &mut Node, types: &mut TypesMap) {
    if let Node::DeclStruct(decl) = node {
        if !decl.data_type.is_struct() {
            if let Some(mut struct_type) = resolve_struct(decl, types) {
                update_offsets(&mut struct_type);
                decl.data_type = DataType::Struct(struct_type.clone());
                types.insert(decl.name.clone(), DataType::Struct(struct_type));
            }
        }
    }

    for child in node.children_mut() {
        walk(child, types);
    }
}

fn resolve_struct(decl: &DeclStruct, types: &TypesMap) -> Option<StructType> {
    let mut fields = IndexMap::new();
    for member in &decl.members {
        let annotation = member.identifier.type_annotation.as_deref()?;
        let ty = resolve_annotation(annotation, types)?;
        fields.insert(member.identifier.name.clone(), StructField { ty, offset: None });
    }
    Some(StructType { name: decl.name.clone(), fields })
}

pub(crate) fn resolve_annotation(name: &str, types: &TypesMap) -> Option<DataType> {
    Primitive::parse(name).map(DataType::Simple).or_else(|| types.get(name).cloned())
}

/// Assigns each unset field a stable offset equal to the running sum of
/// prior fields' memory sizes, in declaration order. A field that already
/// has an offset (from a previous call) keeps it.
fn update_offsets(struct_type: &mut StructType) {
    let mut offset = 0usize;
    for field in struct_type.fields.values_mut() {
        if field.offset.is_none() {
            field.offset = Some(offset);
        }
        offset += field.ty.memory_size();
    }
}
