use std::cell::{Cell, RefCell};
use std::rc::Rc;

use thiserror::Error;

use super::{ExternalGlobal, ExternalMemory, ExternalTable, Instance};
use crate::limits::{DEFAULT_MEMORY_PAGES_LIMIT, PAGE_SIZE};
use crate::module::{ConstExpr, Limits, Module};
use crate::{Callable, ExternalFunction, FuncIdx, Value, interpreter};

/// Externals bound to a module's imports, in declaration order per kind.
#[derive(Debug, Clone, Default)]
pub struct Imports {
    pub functions: Vec<ExternalFunction>,
    pub tables: Vec<ExternalTable>,
    pub memories: Vec<ExternalMemory>,
    pub globals: Vec<ExternalGlobal>,
}

#[derive(Debug, Error)]
pub enum InstantiateError {
    #[error("module requires {expected} imported {kind}s, {actual} provided")]
    ImportCount { kind: &'static str, expected: usize, actual: usize },
    #[error("import {module}.{name} was not found")]
    MissingImport { module: String, name: String },
    #[error("import {module}.{name} has the wrong kind")]
    ImportKindMismatch { module: String, name: String },
    #[error("function {index} type doesn't match module's imported function type")]
    FunctionTypeMismatch { index: usize },
    #[error("global {index} type doesn't match module's global type")]
    GlobalTypeMismatch { index: usize },
    #[error("provided import's {kind} limits do not match the declared limits")]
    LimitsMismatch { kind: &'static str },
    #[error("cannot exceed hard memory limit of {limit} pages")]
    MemoryLimitExceeded { limit: u32 },
    #[error("constant expression refers to undefined global {index}")]
    UndefinedGlobal { index: u32 },
    #[error("element segment is out of table bounds")]
    ElementOutOfBounds,
    #[error("data segment is out of memory bounds")]
    DataOutOfBounds,
    #[error("start function failed to execute")]
    StartFunctionFailed,
}

/// Instantiate `module` with the default memory page limit.
pub fn instantiate(module: impl Into<Rc<Module>>, imports: Imports) -> Result<Rc<Instance>, InstantiateError> {
    instantiate_with_limit(module, imports, DEFAULT_MEMORY_PAGES_LIMIT)
}

/// Instantiate `module`, binding `imports` positionally, and run its start
/// function.
pub fn instantiate_with_limit(
    module: impl Into<Rc<Module>>,
    imports: Imports,
    memory_pages_limit: u32,
) -> Result<Rc<Instance>, InstantiateError> {
    let module: Rc<Module> = module.into();
    let Imports { functions, mut tables, memories, globals } = imports;

    check_imported_functions(&module, &functions)?;
    check_imported_tables(&module, &tables)?;
    let memory = resolve_memory(&module, memories, memory_pages_limit)?;
    let globals = init_globals(&module, globals)?;

    for limits in &module.tables {
        tables.push(ExternalTable::new(*limits));
    }

    // Every segment is checked before any of them is written.
    let mut element_offsets = Vec::with_capacity(module.elements.len());
    for segment in &module.elements {
        let offset = eval_offset(&segment.offset, &globals)?;
        let table_len = tables
            .get(segment.table_idx as usize)
            .map_or(0, |table| table.table.borrow().len() as u64);
        if offset as u64 + segment.items.len() as u64 > table_len {
            return Err(InstantiateError::ElementOutOfBounds);
        }
        element_offsets.push(offset as usize);
    }
    let mut data_offsets = Vec::with_capacity(module.data.len());
    for segment in &module.data {
        let offset = eval_offset(&segment.offset, &globals)?;
        let memory_len = memory.as_ref().map_or(0, |memory| memory.memory.borrow().len() as u64);
        if offset as u64 + segment.bytes.len() as u64 > memory_len {
            return Err(InstantiateError::DataOutOfBounds);
        }
        data_offsets.push(offset as usize);
    }

    if let Some(memory) = &memory {
        let mut bytes = memory.memory.borrow_mut();
        for (segment, offset) in module.data.iter().zip(data_offsets) {
            bytes[offset..offset + segment.bytes.len()].copy_from_slice(&segment.bytes);
        }
    }

    let num_imported_tables = module.imported_tables().count();
    let instance = Rc::new(Instance {
        module: Rc::clone(&module),
        imported_functions: functions,
        tables,
        memory,
        memory_pages_limit,
        globals,
    });
    for (segment, offset) in module.elements.iter().zip(element_offsets) {
        let imported_table = (segment.table_idx as usize) < num_imported_tables;
        let mut table = instance.tables[segment.table_idx as usize].table.borrow_mut();
        for (slot, item) in table[offset..].iter_mut().zip(&segment.items) {
            *slot = item.and_then(|func_idx| table_element(&instance, func_idx, imported_table));
        }
    }
    tracing::trace!(
        functions = instance.module.func_count(),
        tables = instance.tables.len(),
        globals = instance.globals.len(),
        "instantiated module"
    );

    if let Some(start) = instance.module.start {
        if interpreter::execute(&instance, start, &[], 0).trapped() {
            return Err(InstantiateError::StartFunctionFailed);
        }
    }
    Ok(instance)
}

fn check_imported_functions(module: &Module, functions: &[ExternalFunction]) -> Result<(), InstantiateError> {
    let expected = module.imported_function_types().count();
    if functions.len() != expected {
        return Err(InstantiateError::ImportCount { kind: "function", expected, actual: functions.len() });
    }
    for (index, (declared, provided)) in module.imported_function_types().zip(functions).enumerate() {
        if *declared != provided.ty {
            return Err(InstantiateError::FunctionTypeMismatch { index });
        }
    }
    Ok(())
}

fn check_imported_tables(module: &Module, tables: &[ExternalTable]) -> Result<(), InstantiateError> {
    let expected = module.imported_tables().count();
    if tables.len() != expected {
        return Err(InstantiateError::ImportCount { kind: "table", expected, actual: tables.len() });
    }
    for (declared, provided) in module.imported_tables().zip(tables) {
        let size = provided.table.borrow().len() as u32;
        check_limits("table", declared, size, provided.limits.max)?;
    }
    Ok(())
}

fn resolve_memory(
    module: &Module,
    mut memories: Vec<ExternalMemory>,
    memory_pages_limit: u32,
) -> Result<Option<ExternalMemory>, InstantiateError> {
    let declared: Vec<&Limits> = module.imported_memories().collect();
    if memories.len() != declared.len() {
        return Err(InstantiateError::ImportCount {
            kind: "memory",
            expected: declared.len(),
            actual: memories.len(),
        });
    }
    if let (Some(declared), Some(provided)) = (declared.first(), memories.first()) {
        let pages = (provided.memory.borrow().len() / PAGE_SIZE as usize) as u32;
        check_limits("memory", declared, pages, provided.limits.max)?;
        if pages > memory_pages_limit {
            return Err(InstantiateError::MemoryLimitExceeded { limit: memory_pages_limit });
        }
        return Ok(memories.pop());
    }
    let Some(limits) = module.memory else {
        return Ok(None);
    };
    if limits.min > memory_pages_limit {
        return Err(InstantiateError::MemoryLimitExceeded { limit: memory_pages_limit });
    }
    let bytes = vec![0u8; limits.min as usize * PAGE_SIZE as usize];
    Ok(Some(ExternalMemory { memory: Rc::new(RefCell::new(bytes)), limits }))
}

/// An imported table or memory must be at least as large as declared, and
/// bounded at least as tightly as declared.
fn check_limits(kind: &'static str, declared: &Limits, size: u32, provided_max: Option<u32>) -> Result<(), InstantiateError> {
    let max_ok = match (declared.max, provided_max) {
        (None, _) => true,
        (Some(declared_max), Some(provided_max)) => provided_max <= declared_max,
        (Some(_), None) => false,
    };
    if size < declared.min || !max_ok {
        return Err(InstantiateError::LimitsMismatch { kind });
    }
    Ok(())
}

fn init_globals(module: &Module, imported: Vec<ExternalGlobal>) -> Result<Vec<ExternalGlobal>, InstantiateError> {
    let expected = module.imported_globals().count();
    if imported.len() != expected {
        return Err(InstantiateError::ImportCount { kind: "global", expected, actual: imported.len() });
    }
    for (index, (declared, provided)) in module.imported_globals().zip(&imported).enumerate() {
        if *declared != provided.ty || provided.value.get().ty() != declared.ty {
            return Err(InstantiateError::GlobalTypeMismatch { index });
        }
    }

    let mut globals = imported;
    for def in &module.globals {
        let value = eval_const_expr(&def.init, &globals)?;
        globals.push(ExternalGlobal { value: Rc::new(Cell::new(value)), ty: def.ty });
    }
    Ok(globals)
}

fn eval_const_expr(expr: &ConstExpr, globals: &[ExternalGlobal]) -> Result<Value, InstantiateError> {
    match *expr {
        ConstExpr::Value(value) => Ok(value),
        ConstExpr::GlobalGet(index) => globals
            .get(index as usize)
            .map(|global| global.value.get())
            .ok_or(InstantiateError::UndefinedGlobal { index }),
    }
}

/// Segment offsets are i32 values interpreted as unsigned.
fn eval_offset(expr: &ConstExpr, globals: &[ExternalGlobal]) -> Result<u32, InstantiateError> {
    Ok(eval_const_expr(expr, globals)?.to_bits() as u32)
}

/// A function written into a table. Functions placed in a table the instance
/// imported hold their instance strongly; in its own tables a weak handle
/// avoids a reference cycle through the instance's table list.
fn table_element(instance: &Rc<Instance>, func_idx: FuncIdx, imported_table: bool) -> Option<ExternalFunction> {
    if let Some(imported) = instance.imported_functions.get(func_idx.0 as usize) {
        return Some(imported.clone());
    }
    let ty = instance.module.func_type(func_idx)?.clone();
    let callable = if imported_table {
        Callable::Owned { instance: Rc::clone(instance), func_idx }
    } else {
        Callable::Internal { instance: Rc::downgrade(instance), func_idx }
    };
    Some(ExternalFunction::new(callable, ty))
}
