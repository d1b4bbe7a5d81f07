#![allow(dead_code)]

use std::rc::Rc;
use std::thread;

use callgate::limits::EXECUTION_STACK_SIZE;
use callgate::{Engine, FuncType, Imports, Instance, Module, ValType, instantiate};

/// Run `f` on a thread with enough native stack for a full-depth call chain.
pub fn run_with_deep_stack<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let handle = thread::Builder::new()
        .name("callgate-test".into())
        .stack_size(EXECUTION_STACK_SIZE)
        .spawn(f)
        .expect("failed to spawn test thread");
    match handle.join() {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

pub fn module(wat: &str) -> Result<Module, anyhow::Error> {
    Module::new(&Engine::default(), wat)
}

pub fn instantiate_wat(wat: &str) -> Result<Rc<Instance>, anyhow::Error> {
    instantiate_wat_with(wat, Imports::default())
}

pub fn instantiate_wat_with(wat: &str, imports: Imports) -> Result<Rc<Instance>, anyhow::Error> {
    Ok(instantiate(module(wat)?, imports)?)
}

pub fn func_type(params: &[ValType], results: &[ValType]) -> FuncType {
    FuncType::new(params.iter().copied(), results.iter().copied())
}
