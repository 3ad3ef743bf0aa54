//! VM execution tracing (spec.md §4.9's "Debug mode"): a trait-based hook
//! system monomorphized into the VM via a generic type parameter, so
//! [`NoopTracer`] compiles away entirely in production.

use crate::bytecode::Opcode;

/// One recorded execution event, used by [`RecordingTracer`].
#[derive(Debug, Clone)]
pub enum TraceEvent {
    Instruction { ip: usize, opcode: Opcode, stack_depth: usize },
    Call { ip: usize, depth: usize },
    Return { depth: usize },
}

/// Hook points the VM's run loop calls at key events. All methods default to
/// no-ops so implementations only override what they use.
pub trait VmTracer: std::fmt::Debug {
    #[inline(always)]
    fn on_instruction(&mut self, _ip: usize, _opcode: Opcode, _stack_depth: usize) {}

    #[inline(always)]
    fn on_call(&mut self, _ip: usize, _depth: usize) {}

    #[inline(always)]
    fn on_return(&mut self, _depth: usize) {}
}

/// Zero-cost production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Prints a human-readable instruction log to stderr.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl VmTracer for StderrTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize) {
        eprintln!("[{ip:>5}] {opcode}  stack={stack_depth}");
    }

    fn on_call(&mut self, ip: usize, depth: usize) {
        eprintln!("  >>> CALL @{ip} depth={depth}");
    }

    fn on_return(&mut self, depth: usize) {
        eprintln!("  <<< RETURN depth={depth}");
    }
}

/// Captures every event for post-mortem inspection or deterministic replay.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize) {
        self.events.push(TraceEvent::Instruction { ip, opcode, stack_depth });
    }

    fn on_call(&mut self, ip: usize, depth: usize) {
        self.events.push(TraceEvent::Call { ip, depth });
    }

    fn on_return(&mut self, depth: usize) {
        self.events.push(TraceEvent::Return { depth });
    }
}
