//! CLI front-end (spec.md §6): one positional script path plus a set of
//! boolean `--show-*` flags. Hand-rolled argument scanning, in the style of
//! the original's `ArgumentsParser` — no `clap`.

use std::process::ExitCode;
use std::{env, fs};

use loom::vm::RunOutcome;
use loom::{PipelineError, Runner, Settings};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let (script_path, settings) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let source = match fs::read_to_string(&script_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading '{script_path}': {err}");
            return ExitCode::from(2);
        }
    };

    if settings.show_file_content {
        eprintln!("--- {script_path} ---\n{source}\n---");
    }

    let runner = Runner::new(settings.clone());
    match runner.run(&source) {
        Ok(report) => report_success(&report, &settings),
        Err(error) => report_failure(&error),
    }
}

fn report_success(report: &loom::pipeline::RunReport, settings: &Settings) -> ExitCode {
    if let Some(tokens) = &report.tokens_rendered {
        eprintln!("{tokens}");
    }
    if let Some(ast) = &report.ast_rendered {
        eprintln!("{ast}");
    }
    if let Some(functions) = &report.functions_rendered {
        eprintln!("{functions}");
    }
    if let Some(emission) = &report.emission_rendered {
        eprintln!("{emission}");
    }

    match report.outcome {
        RunOutcome::Paused => {
            eprintln!("execution paused: instruction budget exhausted");
            ExitCode::from(1)
        }
        RunOutcome::Finished(value) => {
            // The result line itself is unconditional (spec.md §7); `show-result`
            // additionally echoes it to stderr alongside the other trace output.
            let rendered = report.render_result(value);
            println!("{rendered}");
            if settings.show_result {
                eprintln!("result: {rendered}");
            }
            // Exit code mirrors an integer result; void and non-integer
            // (float) results both exit 0 (spec.md §6).
            if report.main_is_void || report.main_is_float { ExitCode::SUCCESS } else { exit_code_for(value) }
        }
    }
}

/// spec.md §6 names exit 1 for `ConstraintViolated`; parser/type/empty-input
/// failures aren't given a distinct code, so they share it (2 is reserved
/// for the CLI's own argument-count failure, handled before this runs).
fn report_failure(error: &PipelineError) -> ExitCode {
    eprintln!("{error}");
    ExitCode::from(1)
}

/// Exit codes are `u8` at the OS boundary; an integer result that doesn't
/// fit is truncated, matching how every shell already treats `exit()`.
fn exit_code_for(value: i64) -> ExitCode {
    ExitCode::from((value & 0xFF) as u8)
}

const FLAGS: &[(&str, fn(&mut Settings) -> &mut bool)] = &[
    ("show-tokens", |s| &mut s.show_tokens),
    ("show-file-content", |s| &mut s.show_file_content),
    ("show-result", |s| &mut s.show_result),
    ("show-ast", |s| &mut s.show_ast),
    ("show-type-inference", |s| &mut s.show_type_inference),
    ("show-inferred-types", |s| &mut s.show_inferred_types),
    ("show-functions", |s| &mut s.show_functions),
    ("show-emission", |s| &mut s.show_emission),
    ("show-execution", |s| &mut s.show_execution),
];

/// Scans `args` for one positional script path and any number of `--flag`
/// switches (spec.md §6). Wrong argument count (no script path, or more than
/// one positional) is reported so the caller can exit(2).
fn parse_args(args: &[String]) -> Result<(String, Settings), String> {
    let mut settings = Settings::default();
    let mut script_path = None;

    for arg in args {
        if let Some(name) = arg.strip_prefix("--") {
            if name == "debug" {
                settings = Settings::debug();
                continue;
            }
            let Some((_, setter)) = FLAGS.iter().find(|(flag, _)| *flag == name) else {
                return Err(format!("unrecognized flag '--{name}'"));
            };
            *setter(&mut settings) = true;
        } else if script_path.replace(arg.clone()).is_some() {
            return Err("expected exactly one script path".to_owned());
        }
    }

    let script_path = script_path.ok_or_else(|| "missing script path argument".to_owned())?;
    Ok((script_path, settings))
}
