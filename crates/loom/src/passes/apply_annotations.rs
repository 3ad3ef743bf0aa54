//! ApplyTypeAnnotations (spec.md §4.4 step 1): resolves every user-written
//! annotation on a `Declvar`/`Declfn` parameter/`ExternFn` into a concrete
//! `DataType`, using the struct map `CollectTypes` built. Runs once, before
//! the inference fixpoint.

use crate::ast::{ExternFn, Identifier, Node};
use crate::error::TypeError;
use crate::passes::collect_types::{TypesMap, resolve_annotation};
use crate::types::{DataType, set_data_type};

pub fn run(root: &mut Node, types: &TypesMap) -> Vec<TypeError> {
    let mut errors = Vec::new();
    walk(root, types, &mut errors);
    errors
}

fn walk(node: &mut Node, types: &TypesMap, errors: &mut Vec<TypeError>) {
    match node {
        Node::Identifier(identifier) => apply_to_identifier(identifier, types, errors),
        Node::Declvar(decl) => apply_to_identifier(&mut decl.identifier, types, errors),
        Node::Declfn(decl) => {
            for param in &mut decl.parameters {
                apply_to_identifier(param, types, errors);
            }
        }
        Node::ExternFn(extern_fn) => apply_to_extern_fn(extern_fn, types, errors),
        _ => {}
    }

    for child in node.children_mut() {
        walk(child, types, errors);
    }
}

fn apply_to_identifier(identifier: &mut Identifier, types: &TypesMap, errors: &mut Vec<TypeError>) {
    let Some(annotation) = identifier.type_annotation.clone() else { return };
    let position = identifier.position;
    match resolve_annotation(&annotation, types) {
        Some(ty) => set_data_type(&mut identifier.data_type, ty, |msg| errors.push(TypeError::new(msg, position))),
        None => errors.push(TypeError::new(format!("unknown type annotation '{annotation}'"), position)),
    }
}

fn apply_to_extern_fn(extern_fn: &mut ExternFn, types: &TypesMap, errors: &mut Vec<TypeError>) {
    for param in &mut extern_fn.parameters {
        apply_to_identifier(param, types, errors);
    }

    let position = extern_fn.position;
    let ret = match &extern_fn.return_annotation {
        Some(name) => resolve_annotation(name, types).unwrap_or_else(|| {
            errors.push(TypeError::new(format!("unknown type annotation '{name}'"), position));
            DataType::unknown()
        }),
        None => DataType::void(),
    };

    let params = extern_fn.parameters.iter().map(|p| p.data_type.clone()).collect();
    let ty = DataType::function(params, ret, true);
    set_data_type(&mut extern_fn.data_type, ty, |msg| errors.push(TypeError::new(msg, position)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::passes::collect_types;
    use crate::tokenizer::Tokenizer;
    use crate::types::Primitive;

    #[test]
    fn resolves_primitive_annotation_on_declvar() {
        let tokens = Tokenizer::tokenize("let x: int;");
        let mut ast = parser::parse(&tokens).unwrap();
        let types = collect_types::run(&mut ast);
        let errors = run(&mut ast, &types);
        assert!(errors.is_empty());
        let Node::Block(block) = &ast else { unreachable!() };
        let Node::Declvar(decl) = &block.statements[0] else { panic!("expected declvar") };
        assert_eq!(decl.identifier.data_type, DataType::Simple(Primitive::Int));
    }

    #[test]
    fn builds_extern_fn_type_from_return_annotation() {
        let tokens = Tokenizer::tokenize("extern libprint::mul(a, b) : int;");
        let mut ast = parser::parse(&tokens).unwrap();
        let types = collect_types::run(&mut ast);
        let errors = run(&mut ast, &types);
        assert!(errors.is_empty());
        let Node::Block(block) = &ast else { unreachable!() };
        let Node::ExternFn(extern_fn) = &block.statements[0] else { panic!("expected extern fn") };
        let func = extern_fn.data_type.as_function().expect("function type");
        assert_eq!(*func.ret, DataType::Simple(Primitive::Int));
        assert!(func.is_extern);
    }

    #[test]
    fn unknown_annotation_reports_error() {
        let tokens = Tokenizer::tokenize("let x: frobnicator;");
        let mut ast = parser::parse(&tokens).unwrap();
        let types = collect_types::run(&mut ast);
        let errors = run(&mut ast, &types);
        assert_eq!(errors.len(), 1);
    }
}
