//! InfereParameterTypes (spec.md §4.4 step 3): back-propagates resolved
//! argument types onto the parameters of the `Declfn` a still-unresolved
//! `Call` refers to.
//!
//! Implemented as two tree walks rather than one: a function's parameters
//! can only be written to from calls located anywhere else in the tree
//! (including inside the function's own body, for recursion), so the
//! desired parameter types are collected into a side table first (keyed by
//! the `Declfn`'s own position — stable and, in practice, unique) and
//! applied in a second pass.

use ahash::AHashMap;

use crate::ast::Node;
use crate::position::SourcePosition;
use crate::types::{DataType, set_data_type};

pub fn run(root: &mut Node) -> Vec<String> {
    let mut messages = Vec::new();
    let mut scope: Vec<AHashMap<String, SourcePosition>> = vec![AHashMap::new()];
    let mut desired: AHashMap<SourcePosition, Vec<DataType>> = AHashMap::new();

    collect(root, &mut scope, &mut desired, &mut messages);
    apply(root, &desired, &mut messages);
    messages
}

fn collect(node: &Node, scope: &mut Vec<AHashMap<String, SourcePosition>>, desired: &mut AHashMap<SourcePosition, Vec<DataType>>, messages: &mut Vec<String>) {
    match node {
        Node::Block(block) => {
            scope.push(AHashMap::new());
            for stmt in &block.statements {
                collect(stmt, scope, desired, messages);
            }
            scope.pop();
        }

        Node::Assign(assign) => {
            if let Node::Declfn(declfn) = assign.left.as_ref() {
                scope.last_mut().expect("scope always has a frame").insert(declfn.identifier.name.clone(), declfn.position);
                desired.entry(declfn.position).or_insert_with(|| vec![DataType::unknown(); declfn.parameters.len()]);
            }
            collect(&assign.left, scope, desired, messages);
            collect(&assign.right, scope, desired, messages);
        }

        Node::Call(call) => {
            if call.callee.data_type.is_unknown() {
                let target = scope.iter().rev().find_map(|frame| frame.get(&call.callee.name).copied());
                match target {
                    Some(position) => merge_desired(desired, position, &call.arguments, &call.callee.name, messages),
                    None => {} // undeclared; InfereIdentifierTypes already reported it.
                }
            }
            for arg in &call.arguments {
                collect(arg, scope, desired, messages);
            }
        }

        _ => {
            for child in node.children() {
                collect(child, scope, desired, messages);
            }
        }
    }
}

fn merge_desired(desired: &mut AHashMap<SourcePosition, Vec<DataType>>, position: SourcePosition, arguments: &[Node], name: &str, messages: &mut Vec<String>) {
    let Some(slots) = desired.get_mut(&position) else { return };

    if slots.len() != arguments.len() {
        messages.push(format!("'{name}' called with {} argument(s), expected {}", arguments.len(), slots.len()));
        return;
    }

    for (slot, arg) in slots.iter_mut().zip(arguments) {
        if let Some(arg_ty) = arg.data_type() {
            if arg_ty.is_resolved() {
                set_data_type(slot, arg_ty.clone(), |m| messages.push(m));
            }
        }
    }
}

fn apply(node: &mut Node, desired: &AHashMap<SourcePosition, Vec<DataType>>, messages: &mut Vec<String>) {
    if let Node::Assign(assign) = node {
        if let Node::Declfn(declfn) = assign.left.as_mut() {
            if let Some(types) = desired.get(&declfn.position) {
                for (param, ty) in declfn.parameters.iter_mut().zip(types) {
                    if !ty.is_unknown() {
                        set_data_type(&mut param.data_type, ty.clone(), |m| messages.push(m));
                    }
                }
            }
        }
    }

    for child in node.children_mut() {
        apply(child, desired, messages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::passes::{apply_annotations, collect_types, implicit_return, infer_identifiers};
    use crate::tokenizer::Tokenizer;
    use crate::types::Primitive;

    fn prepare(source: &str) -> Node {
        let tokens = Tokenizer::tokenize(source);
        let mut ast = parser::parse(&tokens).unwrap();
        implicit_return::run(&mut ast);
        let types = collect_types::run(&mut ast);
        apply_annotations::run(&mut ast, &types);
        ast
    }

    #[test]
    fn backpropagates_argument_type_onto_unannotated_parameter() {
        let mut ast = prepare("let f(a, b) = a + b; f(4, 5);");
        infer_identifiers::run(&mut ast);
        run(&mut ast);

        let Node::Block(block) = &ast else { unreachable!() };
        let Node::Assign(assign) = &block.statements[0] else { panic!("expected assign") };
        let Node::Declfn(declfn) = assign.left.as_ref() else { panic!("expected declfn") };
        assert_eq!(declfn.parameters[0].data_type, DataType::Simple(Primitive::Int));
        assert_eq!(declfn.parameters[1].data_type, DataType::Simple(Primitive::Int));
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let mut ast = prepare("let f(a, b) = a + b; f(4);");
        infer_identifiers::run(&mut ast);
        let messages = run(&mut ast);
        assert!(messages.iter().any(|m| m.contains("expected 2")));
    }
}
