//! AllPathsReturn validator (spec.md §8 boundary case): a function whose
//! declared return type is not `Void` must return on every control-flow
//! path through its body. Runs before `InstantiateFunctions`, against the
//! still-unflattened `let f(..) = body` assignments.

use crate::ast::Node;
use crate::error::TypeError;
use crate::types::{DataType, Primitive};

pub fn run(root: &Node) -> Vec<TypeError> {
    let mut errors = Vec::new();
    walk(root, &mut errors);
    errors
}

fn walk(node: &Node, errors: &mut Vec<TypeError>) {
    if let Node::Assign(assign) = node {
        if let Node::Declfn(declfn) = assign.left.as_ref() {
            if !is_void(&declfn.identifier.data_type) && !all_paths_return(&assign.right) {
                errors.push(TypeError::new(
                    format!("function '{}' has a non-void return type but not every path returns", declfn.identifier.name),
                    declfn.position,
                ));
            }
        }
    }

    for child in node.children() {
        walk(child, errors);
    }
}

fn is_void(ty: &DataType) -> bool {
    match ty.as_function() {
        Some(f) => matches!(f.ret.as_ref(), DataType::Simple(Primitive::Void)),
        None => true, // not yet resolved as a function type; ApplyTypeAnnotations/inference already flagged it.
    }
}

/// Conservative reachability check: a `while` body never counts, since the
/// condition may be false on entry; an `if` only counts when both branches
/// return; a block returns as soon as any of its statements unconditionally
/// does (later, unreachable statements don't change that).
fn all_paths_return(node: &Node) -> bool {
    match node {
        Node::Ret(_) => true,
        Node::Block(block) => block.statements.iter().any(all_paths_return),
        Node::If(if_node) => match &if_node.negative {
            Some(negative) => all_paths_return(&if_node.positive) && all_paths_return(negative),
            None => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::passes::{apply_annotations, collect_types, implicit_return, infer_identifiers, infer_parameters};
    use crate::tokenizer::Tokenizer;

    fn prepare(source: &str) -> Node {
        let tokens = Tokenizer::tokenize(source);
        let mut ast = parser::parse(&tokens).unwrap();
        implicit_return::run(&mut ast);
        let types = collect_types::run(&mut ast);
        apply_annotations::run(&mut ast, &types);
        infer_identifiers::run(&mut ast);
        infer_parameters::run(&mut ast);
        ast
    }

    #[test]
    fn function_returning_on_every_branch_is_accepted() {
        let ast = prepare("let f(a: bool) = { if (a) { ret 1; } else { ret 2; } };");
        assert!(run(&ast).is_empty());
    }

    #[test]
    fn non_void_function_with_non_returning_branch_is_rejected() {
        let ast = prepare("let f(a: bool) = { if (a) { ret 1; } };");
        let errors = run(&ast);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn while_body_never_satisfies_all_paths_return() {
        let ast = prepare("let f(a: bool) = { while (a) { ret 1; } };");
        assert_eq!(run(&ast).len(), 1);
    }
}
