//! Things that can be called: bytecode functions of an instance and host functions.

use std::fmt;
use std::rc::{Rc, Weak};

use wasmparser::FuncType;

use crate::{ExecutionResult, FuncIdx, Instance, Value};

/// A natively implemented function.
///
/// Receives the calling instance, the arguments and the depth at which it was
/// entered. It may call back into [`execute`](crate::execute), passing
/// `depth + 1` for a nested call.
pub type HostFunction = Rc<dyn Fn(&Instance, &[Value], u32) -> ExecutionResult>;

/// A function that can be invoked by the dispatcher.
#[derive(Clone)]
pub enum Callable {
    /// A function of an instance, identified by its index in that instance.
    /// The handle does not keep the instance alive.
    Internal { instance: Weak<Instance>, func_idx: FuncIdx },
    /// A function of an instance that the handle keeps alive. Used for
    /// elements an instance writes into a table it imported, so they stay
    /// callable even if that instance's owner lets go of it.
    Owned { instance: Rc<Instance>, func_idx: FuncIdx },
    Host(HostFunction),
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Internal { func_idx, .. } => f.debug_struct("Internal").field("func_idx", func_idx).finish_non_exhaustive(),
            Callable::Owned { func_idx, .. } => f.debug_struct("Owned").field("func_idx", func_idx).finish_non_exhaustive(),
            Callable::Host(_) => f.write_str("Host"),
        }
    }
}

/// A callable paired with its signature, as bound to an import slot,
/// exported, or stored in a table.
#[derive(Debug, Clone)]
pub struct ExternalFunction {
    pub callable: Callable,
    pub ty: FuncType,
}

impl ExternalFunction {
    pub fn new(callable: Callable, ty: FuncType) -> Self {
        Self { callable, ty }
    }

    /// Wrap a closure as a host function with signature `ty`.
    pub fn host<F>(ty: FuncType, f: F) -> Self
    where
        F: Fn(&Instance, &[Value], u32) -> ExecutionResult + 'static,
    {
        Self { callable: Callable::Host(Rc::new(f)), ty }
    }

    /// Refer to function `func_idx` of `instance`.
    ///
    /// An imported function resolves to the binding the instance was given,
    /// so chains of re-exports collapse to the original function.
    pub fn from_instance(instance: &Rc<Instance>, func_idx: FuncIdx) -> Option<Self> {
        if let Some(imported) = instance.imported_functions.get(func_idx.0 as usize) {
            return Some(imported.clone());
        }
        let ty = instance.module.func_type(func_idx)?.clone();
        Some(Self {
            callable: Callable::Internal { instance: Rc::downgrade(instance), func_idx },
            ty,
        })
    }
}
