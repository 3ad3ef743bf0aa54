//! ImplicitReturn (spec.md §4.3): `let f(params) = EXPR` where `EXPR` is
//! neither a `Block` nor a `Ret` becomes `let f(params) = ret EXPR`.

use crate::ast::{Node, Ret};

pub fn run(node: &mut Node) {
    if let Node::Assign(assign) = node {
        if matches!(assign.left.as_ref(), Node::Declfn(_)) && !matches!(assign.right.as_ref(), Node::Block(_) | Node::Ret(_)) {
            let position = assign.right.position();
            let placeholder = Node::Ret(Ret { expr: None, position });
            let old_right = std::mem::replace(assign.right.as_mut(), placeholder);
            *assign.right = Node::Ret(Ret { expr: Some(Box::new(old_right)), position });
            return;
        }
    }

    for child in node.children_mut() {
        run(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::tokenizer::Tokenizer;

    #[test]
    fn wraps_non_block_non_ret_body() {
        let tokens = Tokenizer::tokenize("let f(a) = a + 1;");
        let mut ast = parser::parse(&tokens).unwrap();
        run(&mut ast);
        let Node::Block(block) = &ast else { unreachable!() };
        let Node::Assign(assign) = &block.statements[0] else { panic!("expected assign") };
        assert!(matches!(assign.right.as_ref(), Node::Ret(_)));
    }

    #[test]
    fn leaves_ret_body_untouched() {
        use crate::ast::{Assign, Declfn, Identifier, Ret};
        use crate::position::SourcePosition;

        let position = SourcePosition::default();
        let ret_body = Node::Ret(Ret { expr: Some(Box::new(Node::Identifier(Identifier::new("a", position)))), position });
        let mut assign = Node::Assign(Assign {
            left: Box::new(Node::Declfn(Declfn { identifier: Box::new(Identifier::new("f", position)), parameters: vec![], position })),
            right: Box::new(ret_body),
            position,
        });

        let before = format!("{assign}");
        run(&mut assign);
        assert_eq!(format!("{assign}"), before);
    }
}
