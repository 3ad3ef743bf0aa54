//! HasUnknownTypes (spec.md §4.4 step 4): counts `Unknown`/`Conflict`
//! `DataType`s left in the tree and collects a `TypeError` for each.

use crate::ast::{Declfn, Identifier, Node};
use crate::error::TypeError;

#[derive(Debug, Default)]
pub struct Summary {
    pub unknown_count: usize,
    pub conflict_count: usize,
    pub errors: Vec<TypeError>,
}

impl Summary {
    #[must_use]
    pub fn is_fully_resolved(&self) -> bool {
        self.unknown_count == 0 && self.conflict_count == 0
    }
}

pub fn run(root: &Node) -> Summary {
    let mut summary = Summary::default();
    walk(root, &mut summary);
    summary
}

fn walk(node: &Node, summary: &mut Summary) {
    if let Some(ty) = node.data_type() {
        check(ty, node.to_string(), node.position(), summary);
    }

    match node {
        Node::Declvar(declvar) => check_identifier(&declvar.identifier, summary),
        Node::Declfn(declfn) => check_declfn(declfn, summary),
        Node::StructAccess(access) => {
            for segment in &access.path {
                check_identifier(segment, summary);
            }
        }
        _ => {}
    }

    for child in node.children() {
        walk(child, summary);
    }
}

fn check_declfn(declfn: &Declfn, summary: &mut Summary) {
    check_identifier(&declfn.identifier, summary);
    for param in &declfn.parameters {
        check_identifier(param, summary);
    }
}

fn check_identifier(identifier: &Identifier, summary: &mut Summary) {
    check(&identifier.data_type, identifier.name.clone(), identifier.position, summary);
}

fn check(ty: &crate::types::DataType, label: String, position: crate::position::SourcePosition, summary: &mut Summary) {
    if ty.is_unknown() {
        summary.unknown_count += 1;
        summary.errors.push(TypeError::new(format!("could not resolve the type of '{label}'"), position));
    } else if ty.is_conflict() {
        summary.conflict_count += 1;
        summary.errors.push(TypeError::new(format!("conflicting types for '{label}'"), position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::passes::{apply_annotations, collect_types, implicit_return, infer_identifiers, infer_parameters};
    use crate::tokenizer::Tokenizer;

    fn run_fixpoint(source: &str) -> Node {
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
    fn fully_typed_program_has_no_unknowns() {
        let ast = run_fixpoint("let x = 1 + 2 * 3;");
        let summary = run(&ast);
        assert!(summary.is_fully_resolved(), "{:?}", summary.errors);
    }

    #[test]
    fn conflicting_reassignment_is_counted() {
        let ast = run_fixpoint("let x = 1; x = true;");
        let summary = run(&ast);
        assert_eq!(summary.conflict_count, 1);
    }

    #[test]
    fn undeclared_identifier_stays_unknown() {
        let ast = run_fixpoint("ret undeclared_name;");
        let summary = run(&ast);
        assert!(summary.unknown_count > 0);
    }
}
