//! Depth-gated invocation of WebAssembly functions.
//!
//! [`execute`] runs a function of an [`Instance`] at an explicit call depth.
//! Calls between functions (within an instance, across imports into other
//! instances, and into host functions) recurse on the native stack, and every
//! one of them enters through the same depth check against
//! [`CALL_STACK_LIMIT`]. Deep call chains need a thread with at least
//! [`EXECUTION_STACK_SIZE`](limits::EXECUTION_STACK_SIZE) of stack.

mod engine;
mod func;
mod instance;
mod interpreter;
pub mod limits;
mod linker;
mod module;
mod result;
mod value;

pub use engine::Engine;
pub use func::{Callable, ExternalFunction, HostFunction};
pub use instance::{
    ExternalGlobal, ExternalMemory, ExternalTable, Imports, Instance, InstantiateError, SharedGlobal,
    SharedMemory, SharedTable, find_exported_function, find_exported_global, find_exported_memory,
    find_exported_table, instantiate, instantiate_with_limit,
};
pub use interpreter::execute;
pub use limits::CALL_STACK_LIMIT;
pub use linker::{Extern, Linker};
pub use module::{Export, ExportKind, FuncIdx, GlobalType, Import, ImportKind, Limits, Module};
pub use result::{ExecutionResult, Trap};
pub use value::Value;
pub use wasmparser::{FuncType, ValType};
