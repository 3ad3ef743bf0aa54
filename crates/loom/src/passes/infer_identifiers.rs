//! InfereIdentifierTypes (spec.md §4.4 step 2): one fixpoint iteration of
//! identifier/struct-access type resolution over a scoped stack of
//! name→DataType frames. Re-run from scratch every iteration — the AST's
//! own `DataType` slots are what persists across iterations, not this
//! pass's scope.

use ahash::AHashMap;

use crate::ast::Node;
use crate::types::{DataType, Primitive, set_data_type};

struct Scope {
    frames: Vec<AHashMap<String, DataType>>,
}

fn int() -> DataType {
    DataType::Simple(Primitive::Int)
}

fn boolean() -> DataType {
    DataType::Simple(Primitive::Bool)
}

impl Scope {
    fn with_builtins() -> Self {
        let mut builtins = AHashMap::new();
        for op in ["+", "-", "*", "/", "%"] {
            builtins.insert(op.to_owned(), DataType::function(vec![int(), int()], int(), false));
        }
        for op in ["<", ">", "<=", ">=", "==", "!="] {
            builtins.insert(op.to_owned(), DataType::function(vec![int(), int()], boolean(), false));
        }
        for op in ["&&", "||"] {
            builtins.insert(op.to_owned(), DataType::function(vec![boolean(), boolean()], boolean(), false));
        }
        Self { frames: vec![builtins] }
    }

    fn push(&mut self) {
        self.frames.push(AHashMap::new());
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn bind(&mut self, name: String, ty: DataType) {
        self.frames.last_mut().expect("scope always has a frame").insert(name, ty);
    }

    fn lookup(&self, name: &str) -> Option<&DataType> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut DataType> {
        self.frames.iter_mut().rev().find_map(|frame| frame.get_mut(name))
    }

    /// Merges `ty` into the existing binding for `name` if there is one
    /// (via `set_data_type`, so a mismatch becomes `Conflict`), otherwise
    /// creates a fresh binding. Returns the resulting type.
    fn bind_or_merge(&mut self, name: &str, ty: DataType, messages: &mut Vec<String>) -> DataType {
        if let Some(existing) = self.lookup_mut(name) {
            set_data_type(existing, ty, |m| messages.push(m));
            existing.clone()
        } else {
            self.bind(name.to_owned(), ty.clone());
            ty
        }
    }
}

pub fn run(root: &mut Node) -> Vec<String> {
    let mut scope = Scope::with_builtins();
    let mut messages = Vec::new();
    infer(root, &mut scope, &mut messages);
    messages
}

fn infer(node: &mut Node, scope: &mut Scope, messages: &mut Vec<String>) -> DataType {
    match node {
        Node::Block(block) => {
            scope.push();
            for stmt in &mut block.statements {
                infer(stmt, scope, messages);
            }
            scope.pop();
            DataType::void()
        }

        Node::Identifier(identifier) => {
            match scope.lookup(&identifier.name).cloned() {
                Some(ty) => set_data_type(&mut identifier.data_type, ty, |m| messages.push(m)),
                None => messages.push(format!("undeclared identifier '{}'", identifier.name)),
            }
            identifier.data_type.clone()
        }

        Node::Literal(literal) => literal.data_type.clone(),

        Node::Declvar(declvar) => {
            scope.bind(declvar.identifier.name.clone(), declvar.identifier.data_type.clone());
            declvar.identifier.data_type.clone()
        }

        Node::DeclStruct(decl) => {
            set_data_type(&mut decl.data_type, DataType::Simple(Primitive::StructTag), |m| messages.push(m));
            decl.data_type.clone()
        }

        Node::ExternFn(extern_fn) => {
            scope.bind(extern_fn.name.clone(), extern_fn.data_type.clone());
            extern_fn.data_type.clone()
        }

        Node::Assign(assign) => {
            infer_assign(assign, scope, messages);
            DataType::void()
        }

        Node::Call(call) => {
            for arg in &mut call.arguments {
                infer(arg, scope, messages);
            }
            let callee_ty = match scope.lookup(&call.callee.name).cloned() {
                Some(ty) => {
                    set_data_type(&mut call.callee.data_type, ty.clone(), |m| messages.push(m));
                    ty
                }
                None => {
                    messages.push(format!("undeclared identifier '{}'", call.callee.name));
                    DataType::unknown()
                }
            };
            let ret = callee_ty.as_function().map_or_else(DataType::unknown, |f| (*f.ret).clone());
            set_data_type(&mut call.data_type, ret, |m| messages.push(m));
            call.data_type.clone()
        }

        Node::StructAccess(access) => infer_struct_access_read(access, scope, messages),

        Node::Ret(ret) => ret.expr.as_deref_mut().map_or_else(DataType::void, |expr| infer(expr, scope, messages)),

        Node::If(if_node) => {
            infer(&mut if_node.condition, scope, messages);
            infer(&mut if_node.positive, scope, messages);
            if let Some(negative) = &mut if_node.negative {
                infer(negative, scope, messages);
            }
            DataType::void()
        }

        Node::While(while_node) => {
            infer(&mut while_node.condition, scope, messages);
            infer(&mut while_node.body, scope, messages);
            DataType::void()
        }

        Node::Declfn(_) | Node::FnPtr(_) => node.data_type().cloned().unwrap_or_else(DataType::void),
    }
}

fn infer_assign(assign: &mut crate::ast::Assign, scope: &mut Scope, messages: &mut Vec<String>) {
    match assign.left.as_mut() {
        Node::Declvar(declvar) => {
            let right_ty = infer(&mut assign.right, scope, messages);
            let name = declvar.identifier.name.clone();
            declvar.identifier.data_type = scope.bind_or_merge(&name, right_ty, messages);
        }

        Node::Declfn(declfn) => {
            scope.push();
            for param in &mut declfn.parameters {
                scope.bind(param.name.clone(), param.data_type.clone());
            }
            infer(&mut assign.right, scope, messages);
            let ret = assign.right.return_type();
            scope.pop();

            let all_params_known = declfn.parameters.iter().all(|p| !p.data_type.is_unknown());
            let fn_type = DataType::function(declfn.parameters.iter().map(|p| p.data_type.clone()).collect(), ret, false);
            if all_params_known {
                scope.bind(declfn.identifier.name.clone(), fn_type.clone());
            }
            set_data_type(&mut declfn.identifier.data_type, fn_type, |m| messages.push(m));
        }

        Node::Identifier(_) => {
            let right_ty = infer(&mut assign.right, scope, messages);
            let name = if let Node::Identifier(identifier) = assign.left.as_ref() { identifier.name.clone() } else { unreachable!() };
            let merged = scope.bind_or_merge(&name, right_ty, messages);
            if let Node::Identifier(identifier) = assign.left.as_mut() {
                identifier.data_type = merged;
            }
        }

        Node::StructAccess(_) => {
            let right_ty = infer(&mut assign.right, scope, messages);
            infer(assign.left.as_mut(), scope, messages);
            if let Node::StructAccess(access) = assign.left.as_mut() {
                set_data_type(&mut access.data_type, right_ty, |m| messages.push(m));
            }
        }

        _ => {
            messages.push("assignment target is not assignable".to_owned());
        }
    }
}

fn infer_struct_access_read(access: &mut crate::ast::StructAccess, scope: &mut Scope, messages: &mut Vec<String>) -> DataType {
    let Some(mut current_ty) = scope.lookup(&access.path[0].name).cloned() else {
        messages.push(format!("undeclared identifier '{}'", access.path[0].name));
        return DataType::unknown();
    };
    access.path[0].data_type = current_ty.clone();

    for segment in &mut access.path[1..] {
        let Some(struct_ty) = current_ty.as_struct() else {
            messages.push(format!("'{}' is not a struct", segment.name));
            return DataType::unknown();
        };
        let Some(field) = struct_ty.fields.get(&segment.name) else {
            messages.push(format!("unknown field '{}'", segment.name));
            return DataType::unknown();
        };
        current_ty = field.ty.clone();
        segment.data_type = current_ty.clone();
    }

    set_data_type(&mut access.data_type, current_ty, |m| messages.push(m));
    access.data_type.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::passes::{apply_annotations, collect_types};
    use crate::tokenizer::Tokenizer;

    fn prepare(source: &str) -> Node {
        let tokens = Tokenizer::tokenize(source);
        let mut ast = parser::parse(&tokens).unwrap();
        crate::passes::implicit_return::run(&mut ast);
        let types = collect_types::run(&mut ast);
        apply_annotations::run(&mut ast, &types);
        ast
    }

    #[test]
    fn resolves_arithmetic_expression() {
        let mut ast = prepare("let x = 1 + 2 * 3;");
        run(&mut ast);
        let Node::Block(block) = &ast else { unreachable!() };
        let Node::Assign(assign) = &block.statements[0] else { panic!("expected assign") };
        assert_eq!(assign.right.data_type(), Some(&DataType::Simple(Primitive::Int)));
    }

    #[test]
    fn infers_function_signature_from_body() {
        let mut ast = prepare("let f(a: int, b: int) = a + b;");
        run(&mut ast);
        let Node::Block(block) = &ast else { unreachable!() };
        let Node::Assign(assign) = &block.statements[0] else { panic!("expected assign") };
        let Node::Declfn(declfn) = assign.left.as_ref() else { panic!("expected declfn") };
        let func = declfn.identifier.data_type.as_function().expect("function type");
        assert_eq!(*func.ret, DataType::Simple(Primitive::Int));
    }

    #[test]
    fn reassigning_with_conflicting_type_is_flagged() {
        let mut ast = prepare("let x = 1; x = true;");
        run(&mut ast);
        let Node::Block(block) = &ast else { unreachable!() };
        let Node::Assign(second) = &block.statements[1] else { panic!("expected assign") };
        assert!(second.left.data_type().is_some_and(DataType::is_conflict));
    }

    #[test]
    fn struct_access_resolves_field_type() {
        let mut ast = prepare("struct P { let x: int; let y: int; } let p: P; p.x = 3;");
        run(&mut ast);
        let Node::Block(block) = &ast else { unreachable!() };
        let Node::Assign(assign) = &block.statements[2] else { panic!("expected assign") };
        assert_eq!(assign.left.data_type(), Some(&DataType::Simple(Primitive::Int)));
    }
}
