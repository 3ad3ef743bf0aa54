//! The AST (spec.md §3): an owned tree of [`Node`]s, no `Rc`/`RefCell`
//! back-pointers. Passes mutate nodes in place through `&mut Node`; passes
//! that restructure the tree (like function instantiation) move subtrees out
//! by value instead of rewriting shared pointers.

use std::fmt;

use crate::position::SourcePosition;
use crate::types::DataType;

#[derive(Debug, Clone)]
pub struct Identifier {
    pub name: String,
    /// The annotation text parsed after a `:` in a declaration, if any
    /// (e.g. `x: int`). Consumed by `ApplyTypeAnnotations`.
    pub type_annotation: Option<String>,
    pub data_type: DataType,
    pub position: SourcePosition,
}

impl Identifier {
    #[must_use]
    pub fn new(name: impl Into<String>, position: SourcePosition) -> Self {
        Self { name: name.into(), type_annotation: None, data_type: DataType::unknown(), position }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Int,
    Float,
    String,
    Bool,
}

#[derive(Debug, Clone)]
pub struct Literal {
    pub kind: LiteralKind,
    /// The raw lexeme; parsed into a concrete value by the emitter, not
    /// here, so the AST stays free of interpretation concerns.
    pub raw: String,
    pub data_type: DataType,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Node>,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub callee: Box<Identifier>,
    pub arguments: Vec<Node>,
    pub data_type: DataType,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct Ret {
    pub expr: Option<Box<Node>>,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct Assign {
    pub left: Box<Node>,
    pub right: Box<Node>,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct Declvar {
    pub identifier: Box<Identifier>,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct Declfn {
    pub identifier: Box<Identifier>,
    pub parameters: Vec<Identifier>,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct ExternFn {
    pub name: String,
    pub library: String,
    pub parameters: Vec<Identifier>,
    pub return_annotation: Option<String>,
    pub data_type: DataType,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct DeclStruct {
    pub name: String,
    pub members: Vec<Declvar>,
    /// `Simple(StructTag)` until `CollectTypes` resolves the real layout,
    /// then `Struct(..)`.
    pub data_type: DataType,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct StructAccess {
    /// `p.x.y` parses to `["p", "x", "y"]`; always at least two segments.
    pub path: Vec<Identifier>,
    pub data_type: DataType,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct If {
    pub condition: Box<Node>,
    pub positive: Box<Node>,
    pub negative: Option<Box<Node>>,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub struct While {
    pub condition: Box<Node>,
    pub body: Box<Node>,
    pub position: SourcePosition,
}

/// A reference to an instantiated function, by its unique id
/// (`<depth>_<name>_<type>`, spec.md §4.6). Only appears after
/// `InstantiateFunctions` has run.
#[derive(Debug, Clone)]
pub struct FnPtr {
    pub id: String,
    pub data_type: DataType,
    pub position: SourcePosition,
}

#[derive(Debug, Clone)]
pub enum Node {
    Block(Block),
    Identifier(Identifier),
    Literal(Literal),
    Call(Call),
    Ret(Ret),
    Assign(Assign),
    Declvar(Declvar),
    Declfn(Declfn),
    ExternFn(ExternFn),
    DeclStruct(DeclStruct),
    StructAccess(StructAccess),
    If(If),
    While(While),
    FnPtr(FnPtr),
}

impl Node {
    #[must_use]
    pub fn position(&self) -> SourcePosition {
        match self {
            Self::Block(n) => n.position,
            Self::Identifier(n) => n.position,
            Self::Literal(n) => n.position,
            Self::Call(n) => n.position,
            Self::Ret(n) => n.position,
            Self::Assign(n) => n.position,
            Self::Declvar(n) => n.position,
            Self::Declfn(n) => n.position,
            Self::ExternFn(n) => n.position,
            Self::DeclStruct(n) => n.position,
            Self::StructAccess(n) => n.position,
            Self::If(n) => n.position,
            Self::While(n) => n.position,
            Self::FnPtr(n) => n.position,
        }
    }

    /// The node's own type slot, if it carries one. `Block`/`Ret`/`Assign`/
    /// `If`/`While`/`Declvar`/`Declfn` have no type of their own — their
    /// contribution to inference runs through the identifiers/literals they
    /// contain.
    #[must_use]
    pub fn data_type(&self) -> Option<&DataType> {
        match self {
            Self::Identifier(n) => Some(&n.data_type),
            Self::Literal(n) => Some(&n.data_type),
            Self::Call(n) => Some(&n.data_type),
            Self::ExternFn(n) => Some(&n.data_type),
            Self::DeclStruct(n) => Some(&n.data_type),
            Self::StructAccess(n) => Some(&n.data_type),
            Self::FnPtr(n) => Some(&n.data_type),
            Self::Block(_) | Self::Ret(_) | Self::Assign(_) | Self::Declvar(_) | Self::Declfn(_) | Self::If(_) | Self::While(_) => None,
        }
    }

    #[must_use]
    pub fn data_type_mut(&mut self) -> Option<&mut DataType> {
        match self {
            Self::Identifier(n) => Some(&mut n.data_type),
            Self::Literal(n) => Some(&mut n.data_type),
            Self::Call(n) => Some(&mut n.data_type),
            Self::ExternFn(n) => Some(&mut n.data_type),
            Self::DeclStruct(n) => Some(&mut n.data_type),
            Self::StructAccess(n) => Some(&mut n.data_type),
            Self::FnPtr(n) => Some(&mut n.data_type),
            Self::Block(_) | Self::Ret(_) | Self::Assign(_) | Self::Declvar(_) | Self::Declfn(_) | Self::If(_) | Self::While(_) => None,
        }
    }

    /// Every node's immediate children, in evaluation order. The generic
    /// fallback used by passes that don't care about node identity (e.g.
    /// `HasUnknownTypes`).
    #[must_use]
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Self::Block(n) => n.statements.iter().collect(),
            Self::Call(n) => n.arguments.iter().collect(),
            Self::Ret(n) => n.expr.as_deref().into_iter().collect(),
            Self::Assign(n) => vec![&n.left, &n.right],
            Self::If(n) => {
                let mut out = vec![n.condition.as_ref(), n.positive.as_ref()];
                if let Some(negative) = &n.negative {
                    out.push(negative);
                }
                out
            }
            Self::While(n) => vec![&n.condition, &n.body],
            Self::Identifier(_)
            | Self::Literal(_)
            | Self::Declvar(_)
            | Self::Declfn(_)
            | Self::ExternFn(_)
            | Self::DeclStruct(_)
            | Self::StructAccess(_)
            | Self::FnPtr(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn children_mut(&mut self) -> Vec<&mut Node> {
        match self {
            Self::Block(n) => n.statements.iter_mut().collect(),
            Self::Call(n) => n.arguments.iter_mut().collect(),
            Self::Ret(n) => n.expr.as_deref_mut().into_iter().collect(),
            Self::Assign(n) => vec![&mut n.left, &mut n.right],
            Self::If(n) => {
                let mut out = vec![n.condition.as_mut(), n.positive.as_mut()];
                if let Some(negative) = &mut n.negative {
                    out.push(negative);
                }
                out
            }
            Self::While(n) => vec![&mut n.condition, &mut n.body],
            Self::Identifier(_)
            | Self::Literal(_)
            | Self::Declvar(_)
            | Self::Declfn(_)
            | Self::ExternFn(_)
            | Self::DeclStruct(_)
            | Self::StructAccess(_)
            | Self::FnPtr(_) => Vec::new(),
        }
    }

    /// Approximates this node's return type without crossing into a nested
    /// function declaration's own body (that body gets its own call to this
    /// method once it becomes a `Function`). Used by `InfereIdentifierTypes`
    /// to derive a `let f(..) = <body>` assignment's function type, and by
    /// `InstantiateFunctions` for the synthetic top-level `main` function.
    ///
    /// Walks the subtree collecting the type of every `Ret` reached without
    /// descending into the right-hand side of a nested `Declfn` assignment.
    /// No `Ret` anywhere means the node returns `void`; conflicting `Ret`
    /// types collapse to `DataType::conflict()`; any still-`Unknown` `Ret`
    /// makes the aggregate `Unknown` so the fixpoint revisits it.
    #[must_use]
    pub fn return_type(&self) -> DataType {
        let mut found: Option<DataType> = None;
        let mut saw_unknown = false;
        collect_return_types(self, &mut found, &mut saw_unknown);

        if saw_unknown {
            return DataType::unknown();
        }
        found.unwrap_or_else(DataType::void)
    }
}

fn collect_return_types(node: &Node, found: &mut Option<DataType>, saw_unknown: &mut bool) {
    if let Node::Ret(ret) = node {
        let ty = ret.expr.as_ref().map_or_else(DataType::void, |expr| expr.data_type().cloned().unwrap_or_else(DataType::unknown));
        if ty.is_unknown() {
            *saw_unknown = true;
        } else {
            match found {
                None => *found = Some(ty),
                Some(existing) if *existing == ty => {}
                Some(_) => *found = Some(DataType::conflict()),
            }
        }
        return;
    }

    // A nested function declaration's body belongs to that function, not to
    // the block containing the declaration.
    if let Node::Assign(assign) = node {
        if matches!(assign.left.as_ref(), Node::Declfn(_)) {
            return;
        }
    }

    for child in node.children() {
        collect_return_types(child, found, saw_unknown);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(n) => {
                write!(f, "{{")?;
                for (i, stmt) in n.statements.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{stmt}")?;
                }
                write!(f, "}}")
            }
            Self::Identifier(n) => write!(f, "{}", n.name),
            Self::Literal(n) => write!(f, "{:?}({})", n.kind, n.raw),
            Self::Call(n) => {
                write!(f, "{}(", n.callee.name)?;
                for (i, arg) in n.arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Ret(n) => match &n.expr {
                Some(expr) => write!(f, "ret {expr}"),
                None => write!(f, "ret"),
            },
            Self::Assign(n) => write!(f, "{} = {}", n.left, n.right),
            Self::Declvar(n) => write!(f, "let {}", n.identifier.name),
            Self::Declfn(n) => {
                write!(f, "fn({}", n.identifier.name)?;
                for param in &n.parameters {
                    write!(f, ", {}", param.name)?;
                }
                write!(f, ")")
            }
            Self::ExternFn(n) => write!(f, "extern {}::{}", n.library, n.name),
            Self::DeclStruct(n) => write!(f, "struct {}", n.name),
            Self::StructAccess(n) => {
                for (i, segment) in n.path.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", segment.name)?;
                }
                Ok(())
            }
            Self::If(n) => match &n.negative {
                Some(negative) => write!(f, "if {} {} else {}", n.condition, n.positive, negative),
                None => write!(f, "if {} {}", n.condition, n.positive),
            },
            Self::While(n) => write!(f, "while {} {}", n.condition, n.body),
            Self::FnPtr(n) => write!(f, "&{}", n.id),
        }
    }
}

/// A named, instantiated function (spec.md §4.6): exists only after
/// `InstantiateFunctions` has extracted it from its enclosing `let f(..) =
/// <body>` assignment into this map entry, keyed by its unique id.
#[derive(Debug, Clone)]
pub struct Function {
    pub head: Declfn,
    pub body: Node,
    pub data_type: DataType,
    pub position: SourcePosition,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    fn pos() -> SourcePosition {
        SourcePosition::default()
    }

    fn ident(name: &str, ty: DataType) -> Identifier {
        Identifier { name: name.to_owned(), type_annotation: None, data_type: ty, position: pos() }
    }

    fn ret_of(ty: DataType) -> Node {
        Node::Ret(Ret {
            expr: Some(Box::new(Node::Literal(Literal { kind: LiteralKind::Int, raw: "1".into(), data_type: ty, position: pos() }))),
            position: pos(),
        })
    }

    #[test]
    fn return_type_of_block_with_no_ret_is_void() {
        let block = Node::Block(Block { statements: vec![], position: pos() });
        assert_eq!(block.return_type(), DataType::void());
    }

    #[test]
    fn return_type_collects_through_if_branches() {
        let if_node = Node::If(If {
            condition: Box::new(Node::Identifier(ident("cond", DataType::Simple(Primitive::Bool)))),
            positive: Box::new(ret_of(DataType::Simple(Primitive::Int))),
            negative: Some(Box::new(ret_of(DataType::Simple(Primitive::Int)))),
            position: pos(),
        });
        let block = Node::Block(Block { statements: vec![if_node], position: pos() });
        assert_eq!(block.return_type(), DataType::Simple(Primitive::Int));
    }

    #[test]
    fn return_type_conflicts_on_mismatched_branches() {
        let if_node = Node::If(If {
            condition: Box::new(Node::Identifier(ident("cond", DataType::Simple(Primitive::Bool)))),
            positive: Box::new(ret_of(DataType::Simple(Primitive::Int))),
            negative: Some(Box::new(ret_of(DataType::Simple(Primitive::Bool)))),
            position: pos(),
        });
        assert!(if_node.return_type().is_conflict());
    }

    #[test]
    fn return_type_skips_nested_function_bodies() {
        let inner_fn = Node::Assign(Assign {
            left: Box::new(Node::Declfn(Declfn { identifier: Box::new(ident("g", DataType::unknown())), parameters: vec![], position: pos() })),
            right: Box::new(ret_of(DataType::Simple(Primitive::Bool))),
            position: pos(),
        });
        let outer = Node::Block(Block { statements: vec![inner_fn, ret_of(DataType::Simple(Primitive::Int))], position: pos() });
        assert_eq!(outer.return_type(), DataType::Simple(Primitive::Int));
    }

    #[test]
    fn display_renders_call_with_arguments() {
        let call = Node::Call(Call {
            callee: Box::new(ident("add", DataType::unknown())),
            arguments: vec![Node::Identifier(ident("a", DataType::unknown())), Node::Identifier(ident("b", DataType::unknown()))],
            data_type: DataType::unknown(),
            position: pos(),
        });
        assert_eq!(call.to_string(), "add(a, b)");
    }
}
