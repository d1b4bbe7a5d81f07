//! Outcome of a function invocation.

use thiserror::Error;

use crate::Value;

/// The result of executing a function: either a trap or the function's results.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Trapped,
    Success(Vec<Value>),
}

impl ExecutionResult {
    /// A successful result with no values.
    pub fn void() -> Self {
        ExecutionResult::Success(Vec::new())
    }

    pub fn trapped(&self) -> bool {
        matches!(self, ExecutionResult::Trapped)
    }

    /// Result values; empty when trapped.
    pub fn values(&self) -> &[Value] {
        match self {
            ExecutionResult::Trapped => &[],
            ExecutionResult::Success(values) => values,
        }
    }

    /// The single result value of a successful call, if it has exactly one.
    pub fn value(&self) -> Option<Value> {
        match self.values() {
            [value] => Some(*value),
            _ => None,
        }
    }

    /// Convert into the internal form, attributing a trap to a host callback.
    pub(crate) fn into_host_result(self) -> Result<Vec<Value>, Trap> {
        match self {
            ExecutionResult::Trapped => Err(Trap::HostTrapped),
            ExecutionResult::Success(values) => Ok(values),
        }
    }
}

impl From<Value> for ExecutionResult {
    fn from(value: Value) -> Self {
        ExecutionResult::Success(vec![value])
    }
}

impl From<Result<Vec<Value>, Trap>> for ExecutionResult {
    fn from(result: Result<Vec<Value>, Trap>) -> Self {
        match result {
            Ok(values) => ExecutionResult::Success(values),
            Err(_) => ExecutionResult::Trapped,
        }
    }
}

/// Cause of a trap. Callers of [`execute`](crate::execute) only observe
/// [`ExecutionResult::Trapped`]; the cause is kept for logging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("call stack exhausted at depth {depth}")]
    CallStackExhausted { depth: u32 },
    #[error("unreachable executed")]
    Unreachable,
    #[error("integer divide by zero")]
    IntegerDivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversion,
    #[error("out of bounds memory access")]
    OutOfBoundsMemoryAccess,
    #[error("undefined element {index}")]
    UndefinedElement { index: u32 },
    #[error("uninitialized element {index}")]
    UninitializedElement { index: u32 },
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
    #[error("host function trapped")]
    HostTrapped,
    #[error("callee instance has been dropped")]
    InstanceDropped,
}
