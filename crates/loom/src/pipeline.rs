//! `Runner`/`Settings`: the top-level compile/execute orchestration (spec.md
//! §2), sequencing Tokenizer → Parser → ImplicitReturn → CollectTypes →
//! ApplyTypeAnnotations → the inference fixpoint → AllPathsReturn →
//! InstantiateFunctions → AddVoidReturn → ByteCodeEmitter → VM. Mirrors the
//! teacher's `Runner`/`RunProgress` orchestration shape and the original's
//! `core::Mlang::execute`.

use indexmap::IndexMap;

use crate::ast::{Function, Node};
use crate::bytecode::{self, Program};
use crate::error::PipelineError;
use crate::passes::instantiate::MAIN_ID;
use crate::passes::{all_paths_return, apply_annotations, collect_types, implicit_return, infer_identifiers, infer_parameters, instantiate, unknown_types, void_return};
use crate::tokenizer::Tokenizer;
use crate::tracer::{NoopTracer, VmTracer};
use crate::types::{DataType, Primitive};
use crate::vm::{Budget, RunOutcome, Vm};

/// The inference fixpoint (spec.md §4.4) is guaranteed to converge within a
/// bounded number of passes over any finite program; this is a defensive
/// ceiling against a pass that never settles, not a tuned performance knob.
const MAX_INFERENCE_ITERATIONS: usize = 64;

/// CLI-level knobs (spec.md §6), collected independently of how they were
/// parsed so `loom_cli`'s hand-rolled argument scan and any future caller
/// (e.g. tests) can build one the same way.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub show_tokens: bool,
    pub show_file_content: bool,
    pub show_result: bool,
    pub show_ast: bool,
    pub show_type_inference: bool,
    pub show_inferred_types: bool,
    pub show_functions: bool,
    pub show_emission: bool,
    pub show_execution: bool,
    pub budget: Budget,
}

impl Settings {
    /// `--debug` implies every `show-*` flag (spec.md §6).
    #[must_use]
    pub fn debug() -> Self {
        Self {
            show_tokens: true,
            show_file_content: true,
            show_result: true,
            show_ast: true,
            show_type_inference: true,
            show_inferred_types: true,
            show_functions: true,
            show_emission: true,
            show_execution: true,
            budget: Budget::Unlimited,
        }
    }
}

/// What a successful run produced, plus whatever intermediate artifacts the
/// caller's `Settings` asked to be surfaced.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// `main`'s declared return type is `void` (spec.md §6: "0 on successful
    /// Void result; parsed integer for integer results").
    pub main_is_void: bool,
    /// `main`'s declared return type is `float`: the result word is an `f64`
    /// bit pattern, not an integer (spec.md §9: floats are Int-width words).
    pub main_is_float: bool,
    pub tokens_rendered: Option<String>,
    pub ast_rendered: Option<String>,
    pub functions_rendered: Option<String>,
    pub emission_rendered: Option<String>,
}

impl RunReport {
    /// Renders a `Finished` result word the way spec.md §7 describes it for
    /// display ("the result string ... or 'void' is printed"): float-typed
    /// results go through `ryu` instead of printing their raw bit pattern.
    #[must_use]
    pub fn render_result(&self, value: i64) -> String {
        if self.main_is_void {
            "void".to_owned()
        } else if self.main_is_float {
            ryu::Buffer::new().format(f64::from_bits(value as u64)).to_owned()
        } else {
            value.to_string()
        }
    }
}

pub struct Runner {
    settings: Settings,
}

impl Runner {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Runs the full pipeline over `source`. An empty file is `PipelineError::EmptyInput`
    /// (spec.md §8's "empty file yields Failure(\"empty\")"); everything else
    /// surfaces the first error the offending phase produced.
    pub fn run(&self, source: &str) -> Result<RunReport, PipelineError> {
        if source.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let tokens = Tokenizer::tokenize(source);
        let tokens_rendered = self.settings.show_tokens.then(|| tokens.iter().map(|t| format!("{t:?}")).collect::<Vec<_>>().join("\n"));

        let mut ast = crate::parser::parse(&tokens).map_err(|e| PipelineError::Parse(annotate(e, source)))?;

        implicit_return::run(&mut ast);
        self.run_inference(&mut ast)?;

        let path_errors = all_paths_return::run(&ast);
        if let Some(error) = path_errors.into_iter().next() {
            return Err(PipelineError::Type(error));
        }

        let ast_rendered = self.settings.show_ast.then(|| ast.to_string());

        let mut functions = instantiate::run(ast);
        void_return::run(&mut functions);
        let functions_rendered = self.settings.show_functions.then(|| render_functions(&functions));
        let main_ret = functions.get(MAIN_ID).and_then(|main| main.data_type.as_function()).map(|f| f.ret.as_ref());
        let main_is_void = main_ret.is_none_or(|ret| matches!(ret, DataType::Simple(Primitive::Void)));
        let main_is_float = matches!(main_ret, Some(DataType::Simple(Primitive::Float)));

        let program = bytecode::emit(&functions).map_err(PipelineError::Todo)?;
        crate::vm::assert_backpatches_resolved(&program).map_err(PipelineError::Constraint)?;
        let emission_rendered = self.settings.show_emission.then(|| program.describe());

        let outcome = self.execute(&program)?;

        Ok(RunReport { outcome, main_is_void, main_is_float, tokens_rendered, ast_rendered, functions_rendered, emission_rendered })
    }

    /// Re-runs `InfereIdentifierTypes`/`InfereParameterTypes`/`HasUnknownTypes`
    /// to a fixpoint (spec.md §4.4): each iteration mutates the AST's own
    /// `DataType` slots; the loop stops once a pass makes no further progress
    /// or the program is fully resolved.
    fn run_inference(&self, ast: &mut Node) -> Result<(), PipelineError> {
        let types = collect_types::run(ast);
        let annotation_errors = apply_annotations::run(ast, &types);
        if let Some(error) = annotation_errors.into_iter().next() {
            return Err(PipelineError::Type(error));
        }

        let mut summary = unknown_types::run(ast);
        for _ in 0..MAX_INFERENCE_ITERATIONS {
            if summary.is_fully_resolved() {
                break;
            }
            infer_identifiers::run(ast);
            infer_parameters::run(ast);
            summary = unknown_types::run(ast);
        }

        if let Some(error) = summary.errors.into_iter().next() {
            return Err(PipelineError::Type(error));
        }
        Ok(())
    }

    fn execute(&self, program: &Program) -> Result<RunOutcome, PipelineError> {
        if self.settings.show_execution {
            let mut vm = Vm::with_tracer(program, crate::tracer::StderrTracer::new());
            run_to_completion(&mut vm, self.settings.budget)
        } else {
            let mut vm = Vm::with_tracer(program, NoopTracer);
            run_to_completion(&mut vm, self.settings.budget)
        }
    }
}

fn run_to_completion<Tr: VmTracer>(vm: &mut Vm<'_, Tr>, budget: Budget) -> Result<RunOutcome, PipelineError> {
    vm.run(budget).map_err(PipelineError::Constraint)
}

fn render_functions(functions: &IndexMap<String, Function>) -> String {
    functions.iter().map(|(id, function)| format!("{id}: {}", function.body)).collect::<Vec<_>>().join("\n")
}

/// `ParseError` doesn't carry the source text (so the error type stays
/// decoupled from file I/O); the `Runner` is the one place that knows the
/// source, so it fills in the marked-code excerpt for display purposes by
/// prepending it to the message instead of threading a lifetime through
/// every pass.
fn annotate(error: crate::error::ParseError, source: &str) -> crate::error::ParseError {
    crate::error::ParseError { message: error.render(source), ..error }
}
