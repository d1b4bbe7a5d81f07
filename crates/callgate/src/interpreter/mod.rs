//! Depth-gated function dispatch.
//!
//! Every function invocation, whether it comes from an embedder, a `call`
//! instruction, a table, an import crossing into another instance, or a host
//! function re-entering wasm, goes through [`dispatch`]. The depth check at its
//! top is the only call-depth gate. Depth grows only at call instructions.

mod exec;
mod numeric;

use crate::limits::CALL_STACK_LIMIT;
use crate::result::Trap;
use crate::{Callable, ExecutionResult, FuncIdx, Instance, Value};

/// Execute function `func_idx` of `instance` with `args` at call depth `depth`.
///
/// `func_idx` must belong to `instance` and `args` must match its signature.
/// A fresh call chain starts at depth 0. Host functions calling back into wasm
/// pass on the depth they were given, or one more for a nested frame. Calls at or beyond
/// [`CALL_STACK_LIMIT`] trap without executing anything.
pub fn execute(instance: &Instance, func_idx: FuncIdx, args: &[Value], depth: u32) -> ExecutionResult {
    let result = dispatch(instance, Callee::Index(func_idx), args, depth);
    if let Err(trap) = &result {
        tracing::debug!(func = func_idx.0, depth, %trap, "execution trapped");
    }
    result.into()
}

/// What to invoke: a function of the current instance by index, or a callable
/// already resolved from a table.
#[derive(Clone, Copy)]
pub(crate) enum Callee<'a> {
    Index(FuncIdx),
    Resolved(&'a Callable),
}

pub(crate) fn dispatch(instance: &Instance, callee: Callee<'_>, args: &[Value], depth: u32) -> Result<Vec<Value>, Trap> {
    if depth >= CALL_STACK_LIMIT {
        tracing::debug!(depth, "call stack limit reached");
        return Err(Trap::CallStackExhausted { depth });
    }

    let callable = match callee {
        Callee::Index(func_idx) => match instance.module.code(func_idx) {
            Some(code) => return exec::run(instance, code, args, depth),
            None => &instance.imported_functions[func_idx.0 as usize].callable,
        },
        Callee::Resolved(callable) => callable,
    };

    match callable {
        Callable::Host(function) => function(instance, args, depth).into_host_result(),
        Callable::Internal { instance: target, func_idx } => {
            let target = target.upgrade().ok_or(Trap::InstanceDropped)?;
            dispatch(&target, Callee::Index(*func_idx), args, depth)
        }
        Callable::Owned { instance: target, func_idx } => dispatch(target, Callee::Index(*func_idx), args, depth),
    }
}
