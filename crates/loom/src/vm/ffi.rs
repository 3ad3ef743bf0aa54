//! The FFI bridge (spec.md §4.10): `REG_FFI` resolves a `(library, symbol)`
//! pair through a dynamically loaded `.so`, caching both the library handle
//! and the resolved function; `CALL_FFI` dispatches through `libffi`'s portable
//! System V AMD64 shim (spec.md §9: "a portable re-implementation should use
//! libffi ... in place of the original's inline assembly").

use std::ffi::c_void;

use ahash::AHashMap;
use libffi::middle::{Arg, Cif, CodePtr, Type};
use libloading::Library;
use smallvec::SmallVec;

use crate::bytecode::FfiType;
use crate::constraint_violated;
use crate::error::ConstraintViolated;

/// System V AMD64 passes the first six integer/pointer arguments in
/// registers; beyond that the original falls back to the stack, which this
/// bridge does not implement (spec.md §4.10).
const MAX_INT_ARGS: usize = 6;

struct FfiFunction {
    ptr: *mut c_void,
    ret: FfiType,
}

/// Owns every dynamically loaded library and resolved symbol for one VM
/// run. Libraries are released when the registry drops, matching spec.md
/// §5's "the library cache releases all handles on VM teardown".
#[derive(Default)]
pub struct FfiRegistry {
    libraries: AHashMap<String, Library>,
    functions: Vec<FfiFunction>,
}

impl FfiRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads (or reuses a cached) `lib<library>.so`, resolves `symbol`, and
    /// returns an opaque handle for `CALL_FFI`.
    pub fn register(&mut self, library: &str, symbol: &str, ret: FfiType) -> Result<i64, ConstraintViolated> {
        if !self.libraries.contains_key(library) {
            let filename = format!("lib{library}.so");
            let lib = unsafe { Library::new(&filename) }.map_err(|e| ConstraintViolated::new(format!("failed to load '{filename}': {e}"), "vm::ffi::register"))?;
            self.libraries.insert(library.to_owned(), lib);
        }
        let lib = self.libraries.get(library).expect("just inserted");

        let ptr = unsafe {
            let symbol_fn: libloading::Symbol<unsafe extern "C" fn()> =
                lib.get(symbol.as_bytes()).map_err(|e| ConstraintViolated::new(format!("symbol '{symbol}' not found in '{library}': {e}"), "vm::ffi::register"))?;
            *symbol_fn as usize as *mut c_void
        };

        self.functions.push(FfiFunction { ptr, ret });
        Ok((self.functions.len() - 1) as i64)
    }

    /// Calls the function registered under `handle` with `args` (each an
    /// integer-or-bool cell; `None`-tagged cells terminate scanning early
    /// per spec.md §4.10) and returns the `rax` result, or 0 for `Void`.
    pub fn call(&self, handle: i64, args: &[(FfiType, i64)]) -> Result<i64, ConstraintViolated> {
        let handle = usize::try_from(handle).map_err(|_| ConstraintViolated::new("negative FFI handle", "vm::ffi::call"))?;
        let function = self.functions.get(handle).ok_or_else(|| ConstraintViolated::new(format!("unregistered FFI handle {handle}"), "vm::ffi::call"))?;

        // Never more than MAX_INT_ARGS survive the loop below, so a stack-allocated
        // SmallVec avoids a heap allocation for every single FFI call.
        let mut int_args: SmallVec<[i64; MAX_INT_ARGS]> = SmallVec::new();
        for &(tag, value) in args {
            if tag == FfiType::None {
                break;
            }
            int_args.push(value);
        }

        if int_args.len() > MAX_INT_ARGS {
            constraint_violated!(format!("FFI call passes {} integer arguments, the System V integer-register ceiling is {MAX_INT_ARGS}", int_args.len()));
        }

        let arg_types = vec![Type::i64(); int_args.len()];
        let cif = Cif::new(arg_types, ffi_result_type(function.ret));
        let call_args: Vec<Arg> = int_args.iter().map(Arg::new).collect();

        let result: i64 = unsafe { cif.call(CodePtr(function.ptr), &call_args) };

        Ok(match function.ret {
            FfiType::Void => 0,
            _ => result,
        })
    }
}

fn ffi_result_type(ret: FfiType) -> Type {
    match ret {
        FfiType::Void => Type::void(),
        FfiType::Int | FfiType::Bool | FfiType::None => Type::i64(),
    }
}

/// Interprets `data[offset..]` as a null-terminated C string, matching the
/// layout `ByteCodeEmitter` writes `library`/`name` strings in (spec.md
/// §6's "Strings passed to FFI are null-terminated and live in the
/// program's data blob").
#[must_use]
pub fn read_c_string(data: &[u8], offset: usize) -> String {
    let end = data[offset..].iter().position(|&b| b == 0).map_or(data.len(), |pos| offset + pos);
    String::from_utf8_lossy(&data[offset..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_null_terminated_string_from_data_blob() {
        let mut data = b"libprint\0mul\0".to_vec();
        assert_eq!(read_c_string(&data, 0), "libprint");
        assert_eq!(read_c_string(&data, 9), "mul");
        data.truncate(8); // unterminated tail: falls back to end-of-slice.
        assert_eq!(read_c_string(&data, 0), "libprint");
    }
}
