//! InstantiateFunctions (spec.md §4.6).
//!
//! Extracts every `let f(..) = body` assignment into a flat `id → Function`
//! map, rewriting the assignment in place to `Declvar(f) = FnPtr(id)`. The
//! transformed top-level block itself becomes the synthetic `"main"`
//! function. After this runs, the map is the only AST surface the emitter
//! sees — no `Declfn` remains anywhere in expression position.

use indexmap::IndexMap;

use crate::ast::{Assign, Declvar, Function, Identifier, Node};
use crate::position::SourcePosition;
use crate::types::DataType;

pub const MAIN_ID: &str = "main";

pub fn run(mut root: Node) -> IndexMap<String, Function> {
    let mut functions = IndexMap::new();
    instantiate(&mut root, 0, &mut functions);

    let position = root.position();
    let ret = root.return_type();
    let main = Function {
        head: crate::ast::Declfn { identifier: Box::new(Identifier::new(MAIN_ID, position)), parameters: vec![], position },
        body: root,
        data_type: DataType::function(vec![], ret, false),
        position,
    };
    functions.insert(MAIN_ID.to_owned(), main);
    functions
}

fn instantiate(node: &mut Node, depth: usize, functions: &mut IndexMap<String, Function>) {
    match node {
        Node::Block(block) => {
            for stmt in &mut block.statements {
                instantiate(stmt, depth + 1, functions);
            }
        }
        Node::Assign(assign) if matches!(assign.left.as_ref(), Node::Declfn(_)) => {
            extract(assign, depth, functions);
        }
        _ => {
            for child in node.children_mut() {
                instantiate(child, depth, functions);
            }
        }
    }
}

fn placeholder(position: SourcePosition) -> Node {
    Node::Identifier(Identifier::new(String::new(), position))
}

fn extract(assign: &mut Assign, depth: usize, functions: &mut IndexMap<String, Function>) {
    let position = assign.position;
    let left = std::mem::replace(assign.left.as_mut(), placeholder(position));
    let Node::Declfn(declfn) = left else { unreachable!("guarded by caller") };

    let mut body = std::mem::replace(assign.right.as_mut(), placeholder(position));
    instantiate(&mut body, depth + 1, functions);

    let name = declfn.identifier.name.clone();
    let fn_type = declfn.identifier.data_type.clone();
    let id = unique_id(depth, &name, &fn_type);
    let fn_position = declfn.position;

    functions.insert(id.clone(), Function { head: declfn, body, data_type: fn_type.clone(), position: fn_position });

    *assign.left = Node::Declvar(Declvar { identifier: Box::new(Identifier::new(name, position)), position });
    *assign.right = Node::FnPtr(crate::ast::FnPtr { id, data_type: fn_type, position });
}

fn unique_id(depth: usize, name: &str, ty: &DataType) -> String {
    format!("{depth}_{name}_{ty}")
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
    fn extracts_function_and_rewrites_assignment_site() {
        let ast = prepare("let f(a, b) = a + b; f(4, 5);");
        let functions = run(ast);

        assert!(functions.contains_key(MAIN_ID));
        let extracted = functions.keys().find(|k| *k != MAIN_ID).expect("one extracted function");
        assert!(extracted.contains("_f_"));

        let main = &functions[MAIN_ID];
        let Node::Block(block) = &main.body else { unreachable!() };
        let Node::Assign(assign) = &block.statements[0] else { panic!("expected assign") };
        assert!(matches!(assign.left.as_ref(), Node::Declvar(_)));
        assert!(matches!(assign.right.as_ref(), Node::FnPtr(_)));
    }

    #[test]
    fn main_return_type_matches_top_level_block() {
        let ast = prepare("ret 5;");
        let functions = run(ast);
        let main = &functions[MAIN_ID];
        let func = main.data_type.as_function().expect("function type");
        assert_eq!(*func.ret, DataType::Simple(crate::types::Primitive::Int));
    }
}
