//! ByteCodeEmitter (spec.md §4.8): lowers the flat `id -> Function` map
//! `InstantiateFunctions`/`AddVoidReturn` produced into a `Program`.
//!
//! Code layout:
//!
//! ```text
//! [0]  PUSH 0     ; placeholder for main's entry address
//! [1]  CALL 0     ; call main
//! [2]  TERM       ; halt with top-of-stack as result
//! [3…] function bodies, concatenated, each at a recorded offset
//! ```

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::ast::{Assign, Block, Call, Declvar, ExternFn, Function, If, Literal, LiteralKind, Node, StructAccess, While};
use crate::bytecode::op::{FfiType, Instruction, Opcode, Program};
use crate::error::Todo;
use crate::passes::instantiate::MAIN_ID;
use crate::types::{DataType, Primitive, StructType};

type EmitResult<T = ()> = Result<T, Todo>;

/// A function's locals, in allocation order. Frame-relative indices only —
/// `LOCALL`/`LOCALS` address `frame_base + idx` at runtime.
#[derive(Default)]
struct LocalScope {
    index: AHashMap<String, i64>,
    next: i64,
}

impl LocalScope {
    fn alloc(&mut self, name: &str) -> i64 {
        let idx = self.next;
        self.next += 1;
        self.index.insert(name.to_owned(), idx);
        idx
    }

    fn lookup(&self, name: &str) -> Option<i64> {
        self.index.get(name).copied()
    }
}

struct Emitter {
    code: Vec<Instruction>,
    data: Vec<u8>,
    fn_ptr_sites: Vec<(usize, String)>,
}

pub fn emit(functions: &IndexMap<String, Function>) -> EmitResult<Program> {
    let mut emitter = Emitter { code: Vec::new(), data: Vec::new(), fn_ptr_sites: Vec::new() };

    emitter.code.push(Instruction::with_arg1(Opcode::Push, 0));
    emitter.code.push(Instruction::with_arg1(Opcode::Call, 0));
    emitter.code.push(Instruction::bare(Opcode::Term));

    let mut offsets: IndexMap<String, usize> = IndexMap::new();
    for (id, function) in functions {
        let start = emitter.code.len();
        offsets.insert(id.clone(), start);
        let mut locals = LocalScope::default();
        for param in &function.head.parameters {
            locals.alloc(&param.name);
        }
        emitter.emit_statement(&function.body, &mut locals)?;
    }

    let main_offset = *offsets.get(MAIN_ID).expect("InstantiateFunctions always produces a main entry");
    emitter.code[0].arg1 = main_offset as i64;

    for (instr_index, id) in &emitter.fn_ptr_sites {
        let offset = offsets.get(id).unwrap_or_else(|| panic!("unresolved function id '{id}' in FnPtr backpatch table"));
        emitter.code[*instr_index].arg1 = *offset as i64;
    }

    Ok(Program { data: emitter.data, code: emitter.code })
}

impl Emitter {
    fn push(&mut self, instr: Instruction) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    fn backpatch_arg1(&mut self, index: usize, target: i64) {
        self.code[index].arg1 = target;
    }

    fn intern_string(&mut self, text: &str) -> i64 {
        let offset = self.data.len() as i64;
        self.data.extend_from_slice(text.as_bytes());
        self.data.push(0);
        offset
    }

    /// Statement position: leaves the stack unchanged. Recurses for
    /// control-flow shapes; delegates to `emit_value` (plus a discarding
    /// `POP`) for anything that is fundamentally an expression.
    fn emit_statement(&mut self, node: &Node, locals: &mut LocalScope) -> EmitResult {
        match node {
            Node::Block(Block { statements, .. }) => {
                for stmt in statements {
                    self.emit_statement(stmt, locals)?;
                }
                Ok(())
            }

            Node::Ret(ret) => {
                let has_value = ret.expr.is_some();
                if let Some(expr) = &ret.expr {
                    self.emit_value(expr, locals)?;
                }
                self.push(Instruction::with_arg1(Opcode::Ret, i64::from(has_value)));
                Ok(())
            }

            Node::If(if_node) => self.emit_if(if_node, locals),
            Node::While(while_node) => self.emit_while(while_node, locals),
            Node::Assign(assign) => self.emit_assign(assign, locals),
            Node::Declvar(declvar) => self.emit_bare_declvar(declvar, locals),
            Node::ExternFn(extern_fn) => self.emit_extern_fn(extern_fn, locals),
            Node::DeclStruct(_) => Ok(()), // a pure compile-time type declaration; no code.

            Node::Call(call) => {
                self.emit_call(call, locals)?;
                if !is_void(&call.data_type) {
                    self.push(Instruction::bare(Opcode::Pop));
                }
                Ok(())
            }

            Node::Identifier(_) | Node::Literal(_) | Node::StructAccess(_) | Node::FnPtr(_) => {
                self.emit_value(node, locals)?;
                if node.data_type().is_some_and(|ty| !is_void(ty)) {
                    self.push(Instruction::bare(Opcode::Pop));
                }
                Ok(())
            }

            Node::Declfn(_) => Err(Todo::new("a raw Declfn reached the emitter; InstantiateFunctions should have rewritten it")),
        }
    }

    /// Value position: leaves exactly one word on the stack.
    fn emit_value(&mut self, node: &Node, locals: &mut LocalScope) -> EmitResult {
        match node {
            Node::Literal(literal) => self.emit_literal(literal),

            Node::Identifier(identifier) => {
                let idx = self.local_idx(&identifier.name, locals)?;
                self.push(Instruction::with_arg1(Opcode::Locall, idx));
                Ok(())
            }

            Node::Call(call) => self.emit_call(call, locals),

            Node::StructAccess(access) => self.emit_struct_access_read(access, locals),

            Node::FnPtr(fn_ptr) => {
                let index = self.push(Instruction::with_arg1(Opcode::Push, 0));
                self.fn_ptr_sites.push((index, fn_ptr.id.clone()));
                Ok(())
            }

            Node::Assign(_) | Node::Block(_) | Node::If(_) | Node::While(_) | Node::Ret(_) | Node::Declvar(_) | Node::Declfn(_) | Node::ExternFn(_) | Node::DeclStruct(_) => {
                Err(Todo::new(format!("'{node}' has no value-position lowering")))
            }
        }
    }

    fn emit_literal(&mut self, literal: &Literal) -> EmitResult {
        match literal.kind {
            LiteralKind::Int => {
                let value: i64 = literal.raw.parse().map_err(|_| Todo::new(format!("malformed int literal '{}'", literal.raw)))?;
                self.push(Instruction::with_arg1(Opcode::Push, value));
            }
            LiteralKind::Bool => {
                self.push(Instruction::with_arg1(Opcode::Push, i64::from(literal.raw == "true")));
            }
            LiteralKind::String => {
                let offset = self.intern_string(&literal.raw);
                self.push(Instruction::with_arg1(Opcode::DataAddr, offset));
            }
            LiteralKind::Float => {
                let value: f64 = literal.raw.parse().map_err(|_| Todo::new(format!("malformed float literal '{}'", literal.raw)))?;
                self.push(Instruction::with_arg1(Opcode::Push, value.to_bits() as i64));
            }
        }
        Ok(())
    }

    fn local_idx(&self, name: &str, locals: &LocalScope) -> EmitResult<i64> {
        locals.lookup(name).ok_or_else(|| Todo::new(format!("unresolved local '{name}'")))
    }

    fn emit_if(&mut self, if_node: &If, locals: &mut LocalScope) -> EmitResult {
        self.emit_value(&if_node.condition, locals)?;
        let jump_if = self.push(Instruction::with_arg1(Opcode::JumpIf, 0));
        self.emit_statement(&if_node.positive, locals)?;

        if let Some(negative) = &if_node.negative {
            let jump_end = self.push(Instruction::with_arg1(Opcode::Jump, 0));
            self.backpatch_arg1(jump_if, self.here() as i64);
            self.emit_statement(negative, locals)?;
            self.backpatch_arg1(jump_end, self.here() as i64);
        } else {
            self.backpatch_arg1(jump_if, self.here() as i64);
        }

        self.push(Instruction::bare(Opcode::Nop));
        Ok(())
    }

    fn emit_while(&mut self, while_node: &While, locals: &mut LocalScope) -> EmitResult {
        let start = self.here();
        self.emit_value(&while_node.condition, locals)?;
        let jump_if = self.push(Instruction::with_arg1(Opcode::JumpIf, 0));
        self.emit_statement(&while_node.body, locals)?;
        self.push(Instruction::with_arg1(Opcode::Jump, start as i64));
        self.backpatch_arg1(jump_if, self.here() as i64);
        self.push(Instruction::bare(Opcode::Nop));
        Ok(())
    }

    fn emit_assign(&mut self, assign: &Assign, locals: &mut LocalScope) -> EmitResult {
        self.emit_value(&assign.right, locals)?;
        match assign.left.as_ref() {
            Node::Identifier(identifier) => {
                let idx = self.local_idx(&identifier.name, locals)?;
                self.push(Instruction::with_arg1(Opcode::Locals, idx));
            }
            Node::Declvar(declvar) => {
                let idx = locals.alloc(&declvar.identifier.name);
                self.push(Instruction::with_arg1(Opcode::Locals, idx));
            }
            Node::StructAccess(access) => self.emit_struct_access_store(access, locals)?,
            other => return Err(Todo::new(format!("'{other}' is not a valid assignment target in the emitter"))),
        }
        Ok(())
    }

    /// An uninitialized declaration statement (`let p: P;` / `let x;`).
    /// Struct-typed locals get a freshly `ALLOC`ed, zero-initialized heap
    /// block; everything else gets a zero word.
    fn emit_bare_declvar(&mut self, declvar: &Declvar, locals: &mut LocalScope) -> EmitResult {
        let idx = locals.alloc(&declvar.identifier.name);
        match &declvar.identifier.data_type {
            DataType::Struct(struct_ty) => self.emit_struct_alloc(struct_ty)?,
            _ => {
                self.push(Instruction::with_arg1(Opcode::Push, 0));
            }
        }
        self.push(Instruction::with_arg1(Opcode::Locals, idx));
        Ok(())
    }

    /// Allocates a zero-initialized heap block for `struct_ty`, recursing
    /// into nested struct fields. Leaves the block's base address on top of
    /// the stack.
    fn emit_struct_alloc(&mut self, struct_ty: &StructType) -> EmitResult {
        self.push(Instruction::with_arg1(Opcode::Alloc, struct_ty.memory_size() as i64));
        for field in struct_ty.fields.values() {
            let offset = field.offset.ok_or_else(|| Todo::new(format!("struct '{}' field with no assigned offset", struct_ty.name)))?;
            match &field.ty {
                DataType::Struct(nested) => self.emit_struct_alloc(nested)?,
                _ => {
                    self.push(Instruction::with_arg1(Opcode::Push, 0));
                }
            }
            self.push(Instruction::with_arg1(Opcode::Dub, 1)); // copy of the block's own base address, for STOREW's target
            self.push(Instruction::with_arg1(Opcode::Storew, offset as i64));
        }
        Ok(())
    }

    /// Loads `access.path[0]`'s local, then `LOADW`s through every
    /// subsequent segment (spec.md §4.8: "load head local with LOCALL, then
    /// LOADW per intermediate field, final LOADW at the tail").
    fn emit_struct_access_read(&mut self, access: &StructAccess, locals: &mut LocalScope) -> EmitResult {
        let head = &access.path[0];
        let idx = self.local_idx(&head.name, locals)?;
        self.push(Instruction::with_arg1(Opcode::Locall, idx));

        let mut current_ty = &head.data_type;
        for segment in &access.path[1..] {
            let struct_ty = current_ty.as_struct().ok_or_else(|| Todo::new(format!("'{}' is not a struct in the emitter", segment.name)))?;
            let field = struct_ty.fields.get(&segment.name).ok_or_else(|| Todo::new(format!("unknown field '{}'", segment.name)))?;
            let offset = field.offset.ok_or_else(|| Todo::new(format!("field '{}' has no assigned offset", segment.name)))?;
            self.push(Instruction::with_arg1(Opcode::Loadw, offset as i64));
            current_ty = &field.ty;
        }
        Ok(())
    }

    /// The RHS value is already on top of the stack. Walks the chain with
    /// `LOADW` for every intermediate hop, then `STOREW` at the tail.
    fn emit_struct_access_store(&mut self, access: &StructAccess, locals: &mut LocalScope) -> EmitResult {
        let head = &access.path[0];
        let idx = self.local_idx(&head.name, locals)?;
        self.push(Instruction::with_arg1(Opcode::Locall, idx));

        let mut current_ty = &head.data_type;
        let (intermediate, tail) = access.path[1..].split_at(access.path.len() - 2);
        for segment in intermediate {
            let struct_ty = current_ty.as_struct().ok_or_else(|| Todo::new(format!("'{}' is not a struct in the emitter", segment.name)))?;
            let field = struct_ty.fields.get(&segment.name).ok_or_else(|| Todo::new(format!("unknown field '{}'", segment.name)))?;
            let offset = field.offset.ok_or_else(|| Todo::new(format!("field '{}' has no assigned offset", segment.name)))?;
            self.push(Instruction::with_arg1(Opcode::Loadw, offset as i64));
            current_ty = &field.ty;
        }

        let tail_field = &tail[0];
        let struct_ty = current_ty.as_struct().ok_or_else(|| Todo::new(format!("'{}' is not a struct in the emitter", tail_field.name)))?;
        let field = struct_ty.fields.get(&tail_field.name).ok_or_else(|| Todo::new(format!("unknown field '{}'", tail_field.name)))?;
        let offset = field.offset.ok_or_else(|| Todo::new(format!("field '{}' has no assigned offset", tail_field.name)))?;
        self.push(Instruction::with_arg1(Opcode::Storew, offset as i64));
        Ok(())
    }

    fn emit_extern_fn(&mut self, extern_fn: &ExternFn, locals: &mut LocalScope) -> EmitResult {
        let idx = locals.alloc(&extern_fn.name);
        let lib_offset = self.intern_string(&extern_fn.library);
        let name_offset = self.intern_string(&extern_fn.name);
        let ret_tag = extern_fn.data_type.as_function().map_or(FfiType::Void, |f| ffi_type_of(&f.ret));
        self.push(Instruction { op: Opcode::RegFfi, arg1: lib_offset, arg2: name_offset, arg3: ret_tag.as_tag() });
        self.push(Instruction::with_arg1(Opcode::Locals, idx));
        Ok(())
    }

    /// Leaves the call's result value on top of the stack (`Void` calls
    /// leave nothing; callers in statement position pop non-void results
    /// themselves).
    fn emit_call(&mut self, call: &Call, locals: &mut LocalScope) -> EmitResult {
        if matches!(call.callee.name.as_str(), "&&" | "||") {
            return Err(Todo::new(format!("'{}' has no emitted opcode", call.callee.name)));
        }

        if let Some(op) = builtin_opcode(&call.callee.name) {
            if call.arguments.iter().any(|arg| matches!(arg.data_type(), Some(DataType::Simple(Primitive::Float)))) {
                return Err(Todo::new("the VM's integer ALU has no float arithmetic opcodes"));
            }
            for arg in &call.arguments {
                self.emit_value(arg, locals)?;
            }
            self.push(Instruction::bare(op));
            return Ok(());
        }

        let is_extern = call.callee.data_type.as_function().is_some_and(|f| f.is_extern);
        for arg in &call.arguments {
            self.emit_value(arg, locals)?;
            if is_extern {
                let tag = arg.data_type().map_or(FfiType::None, ffi_type_of);
                self.push(Instruction::with_arg1(Opcode::PushFfiQword, tag.as_tag()));
            }
        }

        let idx = self.local_idx(&call.callee.name, locals)?;
        self.push(Instruction::with_arg1(Opcode::Locall, idx));

        if is_extern {
            self.push(Instruction::with_arg1(Opcode::CallFfi, call.arguments.len() as i64));
        } else {
            self.push(Instruction::with_arg1(Opcode::Call, call.arguments.len() as i64));
        }
        Ok(())
    }
}

fn is_void(ty: &DataType) -> bool {
    matches!(ty, DataType::Simple(Primitive::Void))
}

fn ffi_type_of(ty: &DataType) -> FfiType {
    match ty {
        DataType::Simple(Primitive::Int | Primitive::Bool) => FfiType::Int,
        DataType::Simple(Primitive::Void) => FfiType::Void,
        _ => FfiType::None,
    }
}

fn builtin_opcode(name: &str) -> Option<Opcode> {
    Some(match name {
        "+" => Opcode::Add,
        "-" => Opcode::Sub,
        "*" => Opcode::Mul,
        "/" => Opcode::Div,
        "%" => Opcode::Mod,
        "<" => Opcode::Lt,
        ">" => Opcode::Gt,
        "==" => Opcode::Eq,
        "<=" => Opcode::Lte,
        ">=" => Opcode::Gte,
        "!=" => Opcode::Neq,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::passes::{all_paths_return, apply_annotations, collect_types, implicit_return, infer_identifiers, infer_parameters, instantiate, unknown_types, void_return};
    use crate::tokenizer::Tokenizer;

    fn compile(source: &str) -> Program {
        let tokens = Tokenizer::tokenize(source);
        let mut ast = parser::parse(&tokens).unwrap();
        implicit_return::run(&mut ast);
        let types = collect_types::run(&mut ast);
        apply_annotations::run(&mut ast, &types);
        for _ in 0..4 {
            infer_identifiers::run(&mut ast);
            infer_parameters::run(&mut ast);
        }
        let summary = unknown_types::run(&ast);
        assert!(summary.is_fully_resolved(), "{:?}", summary.errors);
        assert!(all_paths_return::run(&ast).is_empty());
        let mut functions = instantiate::run(ast);
        void_return::run(&mut functions);
        emit(&functions).unwrap()
    }

    #[test]
    fn main_entry_is_backpatched_to_a_real_offset() {
        let program = compile("ret 1;");
        assert_eq!(program.code[0].op, Opcode::Push);
        assert!(program.code[0].arg1 >= 3, "main offset should be past the fixed [0..2] prologue");
        assert_eq!(program.code[1], Instruction::with_arg1(Opcode::Call, 0));
        assert_eq!(program.code[2], Instruction::bare(Opcode::Term));
    }

    #[test]
    fn arithmetic_expression_lowers_to_push_add_sequence() {
        let program = compile("ret 1 + 2;");
        let ops: Vec<Opcode> = program.code.iter().map(|i| i.op).collect();
        assert!(ops.windows(2).any(|w| w == [Opcode::Push, Opcode::Push]));
        assert!(ops.contains(&Opcode::Add));
        assert!(ops.contains(&Opcode::Ret));
    }

    #[test]
    fn string_literal_interns_into_data_blob() {
        let program = compile(r#"ret "hi";"#);
        assert!(program.code.iter().any(|i| i.op == Opcode::DataAddr));
        assert_eq!(&program.data[0..2], b"hi");
        assert_eq!(program.data[2], 0);
    }

    #[test]
    fn function_pointer_site_is_backpatched_to_a_real_offset() {
        let program = compile("let f(a, b) = a + b; f(4, 5);");
        let fn_ptr_push = program.code.iter().skip(3).find(|i| i.op == Opcode::Push).expect("a PUSH for the FnPtr site");
        assert!(fn_ptr_push.arg1 >= 3);
    }

    #[test]
    fn struct_field_write_and_read_use_storew_and_loadw() {
        let program = compile("struct P { let x: int; let y: int; } let p: P; p.x = 3; ret p.x + p.y;");
        let ops: Vec<Opcode> = program.code.iter().map(|i| i.op).collect();
        assert!(ops.contains(&Opcode::Alloc));
        assert!(ops.contains(&Opcode::Storew));
        assert!(ops.contains(&Opcode::Loadw));
    }
}
