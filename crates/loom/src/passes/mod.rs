//! The compiler's pass pipeline, run in order by `crate::pipeline::Runner`
//! (spec.md §2, §4.3–§4.7).

pub mod all_paths_return;
pub mod apply_annotations;
pub mod collect_types;
pub mod implicit_return;
pub mod infer_identifiers;
pub mod infer_parameters;
pub mod instantiate;
pub mod unknown_types;
pub mod void_return;
