//! `loom`: tokenizer, parser, type inference, bytecode emitter, and VM for a
//! small statically-typed imperative scripting language with a System V
//! AMD64 FFI bridge to native `.so` libraries.

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod parser;
pub mod passes;
pub mod pipeline;
pub mod position;
pub mod token;
pub mod tokenizer;
pub mod tracer;
pub mod types;
pub mod vm;

pub use error::PipelineError;
pub use pipeline::{Runner, Settings};
