//! AddVoidReturn (spec.md §4.7): functions whose resolved return type is
//! `Void` get a trailing `Ret(None)` appended if their body doesn't already
//! end in one. Non-void functions are left untouched — `AllPathsReturn`
//! already guarantees they terminate in an explicit `Ret` on every path.

use indexmap::IndexMap;

use crate::ast::{Block, Function, Node, Ret};
use crate::types::{DataType, Primitive};

pub fn run(functions: &mut IndexMap<String, Function>) {
    for function in functions.values_mut() {
        if !is_void(&function.data_type) {
            continue;
        }
        ensure_trailing_return(&mut function.body, function.position);
    }
}

fn is_void(ty: &DataType) -> bool {
    ty.as_function().is_some_and(|f| matches!(f.ret.as_ref(), DataType::Simple(Primitive::Void)))
}

fn ensure_trailing_return(body: &mut Node, position: crate::position::SourcePosition) {
    ensure_block(body, position);
    let Node::Block(block) = body else { unreachable!("ensure_block always leaves a Block") };
    if !matches!(block.statements.last(), Some(Node::Ret(_))) {
        block.statements.push(Node::Ret(Ret { expr: None, position }));
    }
}

fn ensure_block(body: &mut Node, position: crate::position::SourcePosition) {
    if matches!(body, Node::Block(_)) {
        return;
    }
    let placeholder = Node::Ret(Ret { expr: None, position });
    let old = std::mem::replace(body, placeholder);
    *body = Node::Block(Block { statements: vec![old], position });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Declfn;
    use crate::ast::Identifier;
    use crate::position::SourcePosition;

    fn void_fn(body: Node) -> Function {
        let position = SourcePosition::default();
        Function {
            head: Declfn { identifier: Box::new(Identifier::new("f", position)), parameters: vec![], position },
            body,
            data_type: DataType::function(vec![], DataType::void(), false),
            position,
        }
    }

    #[test]
    fn appends_ret_to_void_function_missing_one() {
        let position = SourcePosition::default();
        let mut functions = IndexMap::new();
        functions.insert("f".to_owned(), void_fn(Node::Block(Block { statements: vec![], position })));

        run(&mut functions);

        let Node::Block(block) = &functions["f"].body else { unreachable!() };
        assert!(matches!(block.statements.last(), Some(Node::Ret(_))));
    }

    #[test]
    fn leaves_already_terminated_void_function_untouched() {
        let position = SourcePosition::default();
        let mut functions = IndexMap::new();
        functions.insert("f".to_owned(), void_fn(Node::Block(Block { statements: vec![Node::Ret(Ret { expr: None, position })], position })));

        run(&mut functions);

        let Node::Block(block) = &functions["f"].body else { unreachable!() };
        assert_eq!(block.statements.len(), 1);
    }

    #[test]
    fn non_void_function_is_left_untouched() {
        let position = SourcePosition::default();
        let mut functions = IndexMap::new();
        let mut f = void_fn(Node::Block(Block { statements: vec![], position }));
        f.data_type = DataType::function(vec![], DataType::Simple(Primitive::Int), false);
        functions.insert("f".to_owned(), f);

        run(&mut functions);

        let Node::Block(block) = &functions["f"].body else { unreachable!() };
        assert!(block.statements.is_empty());
    }
}
